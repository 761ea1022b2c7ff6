//! Gateway configuration file.
//!
//! The configuration is a single JSON document given on the command line.
//! Parse failures at startup are fatal.

use crate::device::{Device, DeviceTemplate};
use config::{Config, File, FileFormat};
use edge_bridge_error::BridgeResult;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueGenerator {
    Random,
    Incremental,
}

/// Who answers child-device registration requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubdeviceManagement {
    Platform,
    Gateway,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub key: String,
    pub password: String,
    pub platform_mqtt_uri: String,
    pub local_mqtt_uri: String,
    /// PEM bundle used to trust the platform broker's TLS certificate.
    #[serde(default)]
    pub platform_trust_store: Option<String>,
    #[serde(default = "GatewayConfig::keep_alive_default")]
    pub keep_alive: bool,
    /// Demo reading publication period in milliseconds.
    #[serde(default = "GatewayConfig::readings_interval_default")]
    pub readings_interval: u64,
    #[serde(default = "GatewayConfig::generator_default")]
    pub generator: ValueGenerator,
    pub subdevice_management: SubdeviceManagement,
    pub manifest: DeviceTemplate,

    #[serde(default = "GatewayConfig::database_path_default")]
    pub database_path: String,
    #[serde(default = "GatewayConfig::file_download_directory_default")]
    pub file_download_directory: String,
    #[serde(default = "GatewayConfig::max_file_size_default")]
    pub max_file_size: u64,
    #[serde(default = "GatewayConfig::max_packet_size_default")]
    pub max_packet_size: u64,
}

impl GatewayConfig {
    pub fn load(path: &str) -> BridgeResult<Self> {
        let builder = Config::builder().add_source(File::new(path, FileFormat::Json));
        let config: GatewayConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// The gateway itself, as a device.
    pub fn gateway_device(&self) -> Device {
        Device::new(self.key.clone(), self.password.clone(), self.manifest.clone())
    }

    fn keep_alive_default() -> bool {
        true
    }

    fn readings_interval_default() -> u64 {
        1_000
    }

    fn generator_default() -> ValueGenerator {
        ValueGenerator::Random
    }

    fn database_path_default() -> String {
        "edgeBridgeDevices.db".into()
    }

    fn file_download_directory_default() -> String {
        "files".into()
    }

    fn max_file_size_default() -> u64 {
        100 * 1024 * 1024
    }

    fn max_packet_size_default() -> u64 {
        1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let json = r#"{
            "key": "GW",
            "password": "secret",
            "platformMqttUri": "ssl://cloud.example.com:8883",
            "localMqttUri": "tcp://localhost:1883",
            "subdeviceManagement": "PLATFORM",
            "manifest": {
                "name": "Gateway",
                "protocol": "json",
                "firmwareUpdateProtocol": "dfu"
            }
        }"#;

        let config: GatewayConfig = Config::builder()
            .add_source(File::from_str(json, FileFormat::Json))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.key, "GW");
        assert!(config.keep_alive);
        assert_eq!(config.readings_interval, 1_000);
        assert_eq!(config.generator, ValueGenerator::Random);
        assert_eq!(config.subdevice_management, SubdeviceManagement::Platform);
        assert_eq!(config.gateway_device().key, "GW");
    }

    #[test]
    fn rejects_missing_required_fields() {
        let json = r#"{ "key": "GW" }"#;
        let result: Result<GatewayConfig, _> = Config::builder()
            .add_source(File::from_str(json, FileFormat::Json))
            .build()
            .unwrap()
            .try_deserialize();
        assert!(result.is_err());
    }
}
