//! Device registration wire types.

use crate::device::DeviceTemplate;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistrationRequest {
    pub device_name: String,
    pub device_key: String,
    pub template: DeviceTemplate,
}

impl DeviceRegistrationRequest {
    pub fn new(
        device_name: impl Into<String>,
        device_key: impl Into<String>,
        template: DeviceTemplate,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            device_key: device_key.into(),
            template,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationResult {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR_GATEWAY_NOT_FOUND")]
    GatewayNotFound,
    #[serde(rename = "ERROR_KEY_CONFLICT")]
    KeyConflict,
    #[serde(rename = "ERROR_MANIFEST_CONFLICT")]
    ManifestConflict,
    #[serde(rename = "ERROR_READING_PAYLOAD")]
    ReadingPayload,
    #[serde(rename = "ERROR_UNKNOWN")]
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistrationResponse {
    pub result: RegistrationResult,
}

impl DeviceRegistrationResponse {
    pub fn ok() -> Self {
        Self {
            result: RegistrationResult::Ok,
        }
    }
}
