//! Firmware update service.
//!
//! Runs one update state machine per device key:
//!
//! `IDLE → FILE_TRANSFER → FILE_READY → INSTALLATION → COMPLETED`
//!
//! with `ERROR` and `ABORTED` exits. For the gateway itself, installation
//! replaces the running binary through the injected installer; completion
//! is observed at next boot by comparing the reported version against a
//! marker left before the install. Commands addressed to child devices are
//! forwarded on the device side and their progress relayed back.

use crate::publish::OutboundMessageHandler;
use async_trait::async_trait;
use dashmap::DashMap;
use edge_bridge_error::BridgeResult;
use edge_bridge_models::{
    FileTransferError, FirmwareUpdateCommand, FirmwareUpdateCommandType, FirmwareUpdateState,
    FirmwareUpdateStatus, Message,
};
use edge_bridge_protocol::{topics::Topics, DfuProtocol};
use edge_bridge_repository::FileRepository;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Marker file recording the version that initiated a self-install; its
/// presence at boot means an installation is awaiting verification.
const VERSION_MARKER_FILE: &str = ".dfu-version";

/// Replaces the gateway executable and restarts the process. Returns only
/// on failure.
#[async_trait]
pub trait FirmwareInstaller: Send + Sync {
    async fn install(&self, firmware_path: &Path) -> BridgeResult<()>;
}

/// Pluggable URL download path, independent of the chunked transfer.
#[async_trait]
pub trait UrlFileDownloader: Send + Sync {
    async fn download(&self, url: &str, directory: &Path) -> Result<PathBuf, FileTransferError>;
    async fn abort(&self);
}

pub struct FirmwareUpdateService {
    gateway_key: String,
    firmware_version: String,
    download_directory: PathBuf,
    platform_outbound: Arc<dyn OutboundMessageHandler>,
    device_outbound: Arc<dyn OutboundMessageHandler>,
    file_repository: Arc<FileRepository>,
    installer: Arc<dyn FirmwareInstaller>,
    url_downloader: Option<Arc<dyn UrlFileDownloader>>,
    sessions: DashMap<String, FirmwareUpdateState>,
}

impl FirmwareUpdateService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway_key: impl Into<String>,
        firmware_version: impl Into<String>,
        download_directory: impl Into<PathBuf>,
        platform_outbound: Arc<dyn OutboundMessageHandler>,
        device_outbound: Arc<dyn OutboundMessageHandler>,
        file_repository: Arc<FileRepository>,
        installer: Arc<dyn FirmwareInstaller>,
        url_downloader: Option<Arc<dyn UrlFileDownloader>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway_key: gateway_key.into(),
            firmware_version: firmware_version.into(),
            download_directory: download_directory.into(),
            platform_outbound,
            device_outbound,
            file_repository,
            installer,
            url_downloader,
            sessions: DashMap::new(),
        })
    }

    pub fn state_of(&self, device_key: &str) -> FirmwareUpdateState {
        self.sessions
            .get(device_key)
            .map(|entry| *entry.value())
            .unwrap_or(FirmwareUpdateState::Idle)
    }

    /// Report the running firmware version, and close out a pending
    /// self-install: a version marker differing from the current version
    /// means the previous installation took effect.
    pub async fn report_version(&self) {
        self.platform_outbound
            .add_message(DfuProtocol::make_firmware_version_message(
                &self.gateway_key,
                &self.gateway_key,
                &self.firmware_version,
            ))
            .await;

        let marker = self.download_directory.join(VERSION_MARKER_FILE);
        match tokio::fs::read_to_string(&marker).await {
            Ok(previous) => {
                let previous = previous.trim();
                let status = if previous != self.firmware_version {
                    info!(
                        previous,
                        current = %self.firmware_version,
                        "Firmware installation verified"
                    );
                    FirmwareUpdateStatus::ok(FirmwareUpdateState::Completed)
                } else {
                    warn!(version = previous, "Firmware version unchanged after installation");
                    FirmwareUpdateStatus::err(FileTransferError::UnspecifiedError)
                };
                self.send_status(&self.gateway_key, &status).await;
                let _ = tokio::fs::remove_file(&marker).await;
            }
            Err(_) => debug!("No pending installation to verify"),
        }
    }

    /// Commands from the platform.
    pub async fn platform_message_received(&self, message: &Message) {
        if !DfuProtocol::is_firmware_update_command(message) {
            warn!(channel = %message.channel, "Unexpected firmware channel");
            return;
        }
        let Some(device_key) = Topics::extract_device_key(&message.channel) else {
            warn!(channel = %message.channel, "Firmware command without device key");
            return;
        };
        let Some(command) = DfuProtocol::make_firmware_update_command(message) else {
            return;
        };

        let device_key = device_key.to_string();
        if device_key == self.gateway_key {
            self.handle_gateway_command(command).await;
        } else {
            self.forward_child_command(&device_key, &command).await;
        }
    }

    /// Child status and version reports from the device side, relayed to
    /// the platform with the session table kept in sync.
    pub async fn device_message_received(&self, message: &Message) {
        if DfuProtocol::is_firmware_update_status(message) {
            if let (Some(device_key), Some(status)) = (
                Topics::extract_device_key(&message.channel),
                DfuProtocol::make_firmware_update_status(message),
            ) {
                self.sessions.insert(device_key.to_string(), status.status);
            }
        } else if !DfuProtocol::is_firmware_version(message) {
            warn!(channel = %message.channel, "Unexpected firmware channel");
            return;
        }

        let Some(channel) = DfuProtocol::route_device_to_platform(&message.channel, &self.gateway_key)
        else {
            warn!(channel = %message.channel, "Cannot route firmware message to platform");
            return;
        };
        self.platform_outbound
            .add_message(Message::new(channel, message.content.clone()))
            .await;
    }

    async fn handle_gateway_command(&self, command: FirmwareUpdateCommand) {
        match command.command {
            FirmwareUpdateCommandType::Abort => {
                info!("Firmware update aborted");
                if let Some(downloader) = &self.url_downloader {
                    downloader.abort().await;
                }
                self.transition(
                    &self.gateway_key.clone(),
                    FirmwareUpdateState::Aborted,
                    None,
                )
                .await;
            }
            FirmwareUpdateCommandType::Install => {
                let key = self.gateway_key.clone();
                let state = self.state_of(&key);
                if !matches!(
                    state,
                    FirmwareUpdateState::Idle
                        | FirmwareUpdateState::Completed
                        | FirmwareUpdateState::Error
                        | FirmwareUpdateState::Aborted
                ) {
                    warn!(?state, "Firmware update already in progress");
                    return;
                }
                self.run_gateway_install(command).await;
            }
            FirmwareUpdateCommandType::Unknown => {
                warn!("Unknown firmware update command");
                self.send_status(
                    &self.gateway_key.clone(),
                    &FirmwareUpdateStatus::err(FileTransferError::MalformedResponse),
                )
                .await;
            }
        }
    }

    async fn run_gateway_install(&self, command: FirmwareUpdateCommand) {
        let key = self.gateway_key.clone();

        self.transition(&key, FirmwareUpdateState::FileTransfer, None)
            .await;

        let firmware_path = match self.acquire_firmware(&command).await {
            Ok(path) => path,
            Err(error) => {
                self.transition(&key, FirmwareUpdateState::Error, Some(error))
                    .await;
                self.sessions.insert(key, FirmwareUpdateState::Idle);
                return;
            }
        };

        if self.state_of(&key) == FirmwareUpdateState::Aborted {
            debug!("Install aborted during file acquisition");
            return;
        }

        self.transition(&key, FirmwareUpdateState::FileReady, None)
            .await;
        self.transition(&key, FirmwareUpdateState::Installation, None)
            .await;

        // Leave the marker so the next boot can verify the version change
        let marker = self.download_directory.join(VERSION_MARKER_FILE);
        if let Err(e) = async {
            tokio::fs::create_dir_all(&self.download_directory).await?;
            tokio::fs::write(&marker, &self.firmware_version).await
        }
        .await
        {
            warn!(error = %e, "Failed to write version marker");
        }

        // install() re-execs the process on success and only returns on
        // failure
        if let Err(e) = self.installer.install(&firmware_path).await {
            warn!(error = %e, "Firmware installation failed");
            let _ = tokio::fs::remove_file(&marker).await;
            self.transition(
                &key,
                FirmwareUpdateState::Error,
                Some(FileTransferError::FileSystemError),
            )
            .await;
            self.sessions.insert(key, FirmwareUpdateState::Idle);
        }
    }

    async fn acquire_firmware(
        &self,
        command: &FirmwareUpdateCommand,
    ) -> Result<PathBuf, FileTransferError> {
        if let Some(file_name) = &command.file_name {
            return match self.file_repository.get_file_info(file_name).await {
                Ok(Some(info)) => Ok(PathBuf::from(info.path)),
                Ok(None) => {
                    warn!(file = %file_name, "Firmware file not present");
                    Err(FileTransferError::UnspecifiedError)
                }
                Err(e) => {
                    warn!(error = %e, "File repository lookup failed");
                    Err(FileTransferError::FileSystemError)
                }
            };
        }

        if let Some(url) = &command.file_url {
            let Some(downloader) = &self.url_downloader else {
                warn!("URL download requested but no downloader configured");
                return Err(FileTransferError::TransferProtocolDisabled);
            };
            return downloader.download(url, &self.download_directory).await;
        }

        warn!("Install command names neither a file nor a URL");
        Err(FileTransferError::UnspecifiedError)
    }

    async fn forward_child_command(&self, device_key: &str, command: &FirmwareUpdateCommand) {
        let Some(message) =
            DfuProtocol::make_device_firmware_update_command_message(device_key, command)
        else {
            return;
        };
        debug!(device_key, "Forwarding firmware command to child device");
        if command.command == FirmwareUpdateCommandType::Install {
            self.sessions
                .insert(device_key.to_string(), FirmwareUpdateState::FileTransfer);
        }
        self.device_outbound.add_message(message).await;
    }

    async fn transition(
        &self,
        device_key: &str,
        state: FirmwareUpdateState,
        error: Option<FileTransferError>,
    ) {
        self.sessions.insert(device_key.to_string(), state);
        let status = match error {
            Some(error) => FirmwareUpdateStatus::err(error),
            None => FirmwareUpdateStatus::ok(state),
        };
        self.send_status(device_key, &status).await;
    }

    async fn send_status(&self, device_key: &str, status: &FirmwareUpdateStatus) {
        if let Some(message) = DfuProtocol::make_firmware_update_status_message(
            &self.gateway_key,
            device_key,
            status,
        ) {
            self.platform_outbound.add_message(message).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::CollectingOutbound;
    use edge_bridge_models::FileInfo;
    use edge_bridge_utils::hash::sha256_base64;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct RecordingInstaller {
        installed: Mutex<Option<PathBuf>>,
        fail: AtomicBool,
    }

    impl RecordingInstaller {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                installed: Mutex::new(None),
                fail: AtomicBool::new(fail),
            })
        }
    }

    #[async_trait]
    impl FirmwareInstaller for RecordingInstaller {
        async fn install(&self, firmware_path: &Path) -> BridgeResult<()> {
            *self.installed.lock().unwrap() = Some(firmware_path.to_path_buf());
            if self.fail.load(Ordering::SeqCst) {
                Err(edge_bridge_error::BridgeError::from("install failed"))
            } else {
                // A real installer re-execs and never returns; the test
                // double reports success by pending forever.
                futures::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    struct LocalUrlDownloader;

    #[async_trait]
    impl UrlFileDownloader for LocalUrlDownloader {
        async fn download(&self, url: &str, _directory: &Path) -> Result<PathBuf, FileTransferError> {
            let path = PathBuf::from(url);
            if path.exists() {
                Ok(path)
            } else {
                Err(FileTransferError::MalformedResponse)
            }
        }
        async fn abort(&self) {}
    }

    struct Fixture {
        service: Arc<FirmwareUpdateService>,
        platform: Arc<CollectingOutbound>,
        device: Arc<CollectingOutbound>,
        repository: Arc<FileRepository>,
        installer: Arc<RecordingInstaller>,
        dir: tempfile::TempDir,
    }

    async fn fixture(fail_install: bool) -> Fixture {
        let conn = edge_bridge_storage::open_in_memory().await.unwrap();
        let repository = Arc::new(FileRepository::new(conn));
        let platform = CollectingOutbound::new();
        let device = CollectingOutbound::new();
        let installer = RecordingInstaller::new(fail_install);
        let dir = tempfile::tempdir().unwrap();
        let service = FirmwareUpdateService::new(
            "GW",
            "1.0.0",
            dir.path(),
            platform.clone(),
            device.clone(),
            repository.clone(),
            installer.clone(),
            Some(Arc::new(LocalUrlDownloader)),
        );
        Fixture {
            service,
            platform,
            device,
            repository,
            installer,
            dir,
        }
    }

    fn statuses(outbound: &CollectingOutbound) -> Vec<Value> {
        outbound
            .messages()
            .iter()
            .filter(|m| m.channel.starts_with("d2p/firmware_update_status"))
            .map(|m| serde_json::from_slice(&m.content).unwrap())
            .collect()
    }

    async fn receive_install(f: &Fixture, command: FirmwareUpdateCommand) {
        let message =
            DfuProtocol::make_firmware_update_command_message("GW", "GW", &command).unwrap();
        // Install drives the FSM to the blocking installer; run it under a
        // timeout since a successful install never returns.
        let _ = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            f.service.platform_message_received(&message),
        )
        .await;
    }

    #[tokio::test]
    async fn file_install_walks_the_states_and_invokes_the_installer() {
        let f = fixture(false).await;
        let firmware = f.dir.path().join("fw.bin");
        tokio::fs::write(&firmware, b"firmware bytes").await.unwrap();
        f.repository
            .store(&FileInfo {
                name: "fw.bin".to_string(),
                hash: sha256_base64(b"firmware bytes"),
                path: firmware.to_string_lossy().into_owned(),
            })
            .await
            .unwrap();

        receive_install(&f, FirmwareUpdateCommand::install_file("fw.bin")).await;

        let status_list = statuses(&f.platform);
        let seen: Vec<&str> = status_list
            .iter()
            .map(|s| s["status"].as_str().unwrap())
            .collect();
        assert_eq!(seen, vec!["FILE_TRANSFER", "FILE_READY", "INSTALLATION"]);
        assert_eq!(
            *f.installer.installed.lock().unwrap(),
            Some(firmware.clone())
        );
        // The version marker awaits the next boot
        assert!(f.dir.path().join(VERSION_MARKER_FILE).exists());
    }

    #[tokio::test]
    async fn missing_file_reports_error_and_returns_to_idle() {
        let f = fixture(false).await;

        receive_install(&f, FirmwareUpdateCommand::install_file("ghost.bin")).await;

        let status_list = statuses(&f.platform);
        assert_eq!(status_list.last().unwrap()["status"], "ERROR");
        assert_eq!(f.service.state_of("GW"), FirmwareUpdateState::Idle);
        assert!(f.installer.installed.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn url_install_uses_the_url_downloader() {
        let f = fixture(false).await;
        let firmware = f.dir.path().join("url-fw.bin");
        tokio::fs::write(&firmware, b"url firmware").await.unwrap();

        receive_install(
            &f,
            FirmwareUpdateCommand::install_url(firmware.to_string_lossy()),
        )
        .await;

        assert_eq!(*f.installer.installed.lock().unwrap(), Some(firmware));
    }

    #[tokio::test]
    async fn url_install_without_downloader_is_disabled() {
        let conn = edge_bridge_storage::open_in_memory().await.unwrap();
        let repository = Arc::new(FileRepository::new(conn));
        let platform = CollectingOutbound::new();
        let dir = tempfile::tempdir().unwrap();
        let service = FirmwareUpdateService::new(
            "GW",
            "1.0.0",
            dir.path(),
            platform.clone(),
            CollectingOutbound::new(),
            repository,
            RecordingInstaller::new(false),
            None,
        );

        let message = DfuProtocol::make_firmware_update_command_message(
            "GW",
            "GW",
            &FirmwareUpdateCommand::install_url("http://example.com/fw.bin"),
        )
        .unwrap();
        service.platform_message_received(&message).await;

        let status_list = statuses(&platform);
        assert_eq!(
            status_list.last().unwrap()["errorCode"],
            "TRANSFER_PROTOCOL_DISABLED"
        );
    }

    #[tokio::test]
    async fn failed_install_reports_error_and_clears_the_marker() {
        let f = fixture(true).await;
        let firmware = f.dir.path().join("fw.bin");
        tokio::fs::write(&firmware, b"bad firmware").await.unwrap();
        f.repository
            .store(&FileInfo {
                name: "fw.bin".to_string(),
                hash: sha256_base64(b"bad firmware"),
                path: firmware.to_string_lossy().into_owned(),
            })
            .await
            .unwrap();

        receive_install(&f, FirmwareUpdateCommand::install_file("fw.bin")).await;

        let status_list = statuses(&f.platform);
        assert_eq!(status_list.last().unwrap()["status"], "ERROR");
        assert_eq!(f.service.state_of("GW"), FirmwareUpdateState::Idle);
        assert!(!f.dir.path().join(VERSION_MARKER_FILE).exists());
    }

    #[tokio::test]
    async fn abort_is_honored_from_any_state() {
        let f = fixture(false).await;

        let message = DfuProtocol::make_firmware_update_command_message(
            "GW",
            "GW",
            &FirmwareUpdateCommand::abort(),
        )
        .unwrap();
        f.service.platform_message_received(&message).await;

        assert_eq!(f.service.state_of("GW"), FirmwareUpdateState::Aborted);
        assert_eq!(statuses(&f.platform).last().unwrap()["status"], "ABORTED");
    }

    #[tokio::test]
    async fn child_commands_are_forwarded_to_the_device_side() {
        let f = fixture(false).await;

        let message = DfuProtocol::make_firmware_update_command_message(
            "GW",
            "child_X",
            &FirmwareUpdateCommand::install_file("fw.bin"),
        )
        .unwrap();
        f.service.platform_message_received(&message).await;

        let out = f.device.messages();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].channel, "p2d/firmware_update_install/d/child_X");
        assert_eq!(
            f.service.state_of("child_X"),
            FirmwareUpdateState::FileTransfer
        );
    }

    #[tokio::test]
    async fn child_status_reports_are_relayed_and_tracked() {
        let f = fixture(false).await;

        let status = FirmwareUpdateStatus::ok(FirmwareUpdateState::Installation);
        let content = serde_json::to_vec(&status).unwrap();
        let message = Message::new("d2p/firmware_update_status/d/child_X", content);
        f.service.device_message_received(&message).await;

        assert_eq!(
            f.service.state_of("child_X"),
            FirmwareUpdateState::Installation
        );
        let out = f.platform.messages();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].channel, "d2p/firmware_update_status/g/GW/d/child_X");
    }

    #[tokio::test]
    async fn boot_version_report_verifies_a_pending_install() {
        let f = fixture(false).await;
        tokio::fs::write(f.dir.path().join(VERSION_MARKER_FILE), "0.9.0")
            .await
            .unwrap();

        f.service.report_version().await;

        let out = f.platform.messages();
        assert_eq!(out[0].channel, "d2p/firmware_version_update/g/GW/d/GW");
        assert_eq!(out[0].as_text(), Some("1.0.0"));

        let status_list = statuses(&f.platform);
        assert_eq!(status_list.last().unwrap()["status"], "COMPLETED");
        assert!(!f.dir.path().join(VERSION_MARKER_FILE).exists());
    }

    #[tokio::test]
    async fn unchanged_version_after_install_reports_error() {
        let f = fixture(false).await;
        tokio::fs::write(f.dir.path().join(VERSION_MARKER_FILE), "1.0.0")
            .await
            .unwrap();

        f.service.report_version().await;

        let status_list = statuses(&f.platform);
        assert_eq!(status_list.last().unwrap()["status"], "ERROR");
    }
}
