//! Gateway self-update plumbing.
//!
//! `GatewayFirmwareInstaller` replaces the running executable with the
//! downloaded firmware and re-execs it with a freshly built argument list
//! (configuration file, log level, incremented firmware version). The new
//! process reports the new version on boot, which is how the platform
//! observes completion.

use async_trait::async_trait;
use edge_bridge_core::{FirmwareInstaller, UrlFileDownloader};
use edge_bridge_error::{BridgeError, BridgeResult};
use edge_bridge_models::FileTransferError;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct GatewayFirmwareInstaller {
    config_file: String,
    log_level: String,
    firmware_version: String,
}

impl GatewayFirmwareInstaller {
    pub fn new(config_file: String, log_level: String, firmware_version: String) -> Self {
        Self {
            config_file,
            log_level,
            firmware_version,
        }
    }
}

#[async_trait]
impl FirmwareInstaller for GatewayFirmwareInstaller {
    async fn install(&self, firmware_path: &Path) -> BridgeResult<()> {
        let current_exe = std::env::current_exe()
            .map_err(|e| BridgeError::from(format!("Cannot resolve current executable: {e}")))?;

        info!(
            firmware = %firmware_path.display(),
            target = %current_exe.display(),
            "Installing firmware"
        );

        tokio::fs::copy(firmware_path, &current_exe)
            .await
            .map_err(|e| BridgeError::from(format!("Failed to replace executable: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            use std::os::unix::process::CommandExt;

            let permissions = std::fs::Permissions::from_mode(0o755);
            tokio::fs::set_permissions(&current_exe, permissions)
                .await
                .map_err(|e| BridgeError::from(format!("Failed to set permissions: {e}")))?;

            // Materialize a fresh argument list; never touch the caller's
            let next_version = bump_version(&self.firmware_version);
            info!(version = %next_version, "Restarting with new firmware");

            let error = std::process::Command::new(&current_exe)
                .arg(&self.config_file)
                .arg(&self.log_level)
                .arg(&next_version)
                .exec();

            // exec only returns on failure
            Err(BridgeError::from(format!("Failed to exec new firmware: {error}")))
        }

        #[cfg(not(unix))]
        {
            Err(BridgeError::from(
                "Self-install is only supported on unix targets",
            ))
        }
    }
}

/// Increment the last numeric component of a dotted version string.
fn bump_version(version: &str) -> String {
    let mut parts: Vec<String> = version.split('.').map(str::to_string).collect();
    for part in parts.iter_mut().rev() {
        if let Ok(number) = part.parse::<u64>() {
            *part = (number + 1).to_string();
            return parts.join(".");
        }
    }
    warn!(version, "Version has no numeric component to bump");
    version.to_string()
}

/// URL downloader serving local paths, enough for bench setups where the
/// firmware image is already on disk.
pub struct LocalUrlFileDownloader;

#[async_trait]
impl UrlFileDownloader for LocalUrlFileDownloader {
    async fn download(&self, url: &str, directory: &Path) -> Result<PathBuf, FileTransferError> {
        let source = Path::new(url);
        if !source.is_file() {
            warn!(url, "URL does not name a local file");
            return Err(FileTransferError::MalformedResponse);
        }

        let file_name = source
            .file_name()
            .ok_or(FileTransferError::MalformedResponse)?;
        let target = directory.join(file_name);

        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|_| FileTransferError::FileSystemError)?;
        tokio::fs::copy(source, &target)
            .await
            .map_err(|_| FileTransferError::FileSystemError)?;

        Ok(target)
    }

    async fn abort(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_version_increments_the_last_numeric_part() {
        assert_eq!(bump_version("1.0.0"), "1.0.1");
        assert_eq!(bump_version("2"), "3");
        assert_eq!(bump_version("1.2.beta"), "1.3.beta");
        assert_eq!(bump_version("snapshot"), "snapshot");
    }

    #[tokio::test]
    async fn local_url_downloader_copies_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("fw.bin");
        tokio::fs::write(&source, b"firmware").await.unwrap();

        let target_dir = dir.path().join("downloads");
        let downloaded = LocalUrlFileDownloader
            .download(source.to_str().unwrap(), &target_dir)
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&downloaded).await.unwrap(), b"firmware");

        let missing = LocalUrlFileDownloader
            .download("/no/such/file", &target_dir)
            .await;
        assert_eq!(missing, Err(FileTransferError::MalformedResponse));
    }
}
