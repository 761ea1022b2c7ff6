//! Firmware update (DFU) wire types and session states.

use crate::transfer::FileTransferError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FirmwareUpdateCommandType {
    Install,
    Abort,
    Unknown,
}

/// Platform command driving the per-device update state machine.
///
/// An install names either a file already transferred to the gateway or a
/// URL to fetch through the pluggable URL downloader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareUpdateCommand {
    pub command: FirmwareUpdateCommandType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default)]
    pub auto_install: bool,
}

impl FirmwareUpdateCommand {
    pub fn install_file(file_name: impl Into<String>) -> Self {
        Self {
            command: FirmwareUpdateCommandType::Install,
            file_name: Some(file_name.into()),
            file_url: None,
            auto_install: true,
        }
    }

    pub fn install_url(file_url: impl Into<String>) -> Self {
        Self {
            command: FirmwareUpdateCommandType::Install,
            file_name: None,
            file_url: Some(file_url.into()),
            auto_install: true,
        }
    }

    pub fn abort() -> Self {
        Self {
            command: FirmwareUpdateCommandType::Abort,
            file_name: None,
            file_url: None,
            auto_install: false,
        }
    }
}

/// Per-device update session state. `Idle` is internal and never reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FirmwareUpdateState {
    Idle,
    FileTransfer,
    FileReady,
    Installation,
    Completed,
    Error,
    Aborted,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareUpdateStatus {
    pub status: FirmwareUpdateState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<FileTransferError>,
}

impl FirmwareUpdateStatus {
    pub fn ok(status: FirmwareUpdateState) -> Self {
        Self {
            status,
            error_code: None,
        }
    }

    pub fn err(error_code: FileTransferError) -> Self {
        Self {
            status: FirmwareUpdateState::Error,
            error_code: Some(error_code),
        }
    }
}
