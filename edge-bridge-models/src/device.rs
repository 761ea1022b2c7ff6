//! Device and template model.
//!
//! A template (a.k.a. manifest) describes the schema of a device: its
//! sensors, actuators, alarms and configuration slots. Two templates are
//! equivalent iff their canonical SHA-256 digests are equal; the digest
//! hashes every field in a fixed order, so it is stable across processes
//! and usable as a content address in the repository.

use edge_bridge_utils::hash::FieldDigest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value shape of a sensor/actuator/configuration slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Boolean,
    Numeric,
    String,
}

impl DataType {
    /// Single-letter code used in digests.
    #[inline]
    pub fn letter(&self) -> &'static str {
        match self {
            DataType::Boolean => "B",
            DataType::Numeric => "N",
            DataType::String => "S",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Numeric => "NUMERIC",
            DataType::String => "STRING",
        }
    }

    pub fn from_str_loose(value: &str) -> DataType {
        match value {
            "BOOLEAN" => DataType::Boolean,
            "NUMERIC" => DataType::Numeric,
            _ => DataType::String,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmSeverity {
    Alert,
    Critical,
    Error,
}

impl AlarmSeverity {
    /// Single-letter code used in digests.
    #[inline]
    pub fn letter(&self) -> &'static str {
        match self {
            AlarmSeverity::Alert => "A",
            AlarmSeverity::Critical => "C",
            AlarmSeverity::Error => "E",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmSeverity::Alert => "ALERT",
            AlarmSeverity::Critical => "CRITICAL",
            AlarmSeverity::Error => "ERROR",
        }
    }

    pub fn from_str_loose(value: &str) -> AlarmSeverity {
        match value {
            "CRITICAL" => AlarmSeverity::Critical,
            "ERROR" => AlarmSeverity::Error,
            _ => AlarmSeverity::Alert,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorManifest {
    pub reference: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub reading_type: String,
    pub data_type: DataType,
    #[serde(default)]
    pub precision: u32,
    #[serde(default)]
    pub minimum: f64,
    #[serde(default = "default_maximum")]
    pub maximum: f64,
    /// Non-empty delimiter means readings are composite vectors split on it.
    #[serde(default)]
    pub delimiter: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl SensorManifest {
    pub fn digest(&self) -> String {
        let mut d = FieldDigest::new();
        d.update(&self.name);
        d.update(&self.reference);
        d.update(&self.description);
        d.update(&self.unit);
        d.update(&self.reading_type);
        d.update(&self.precision.to_string());
        d.update(&self.minimum.to_string());
        d.update(&self.maximum.to_string());
        d.update(&self.delimiter);
        d.update(self.data_type.letter());
        for label in &self.labels {
            d.update(label);
        }
        d.finish_hex()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuatorManifest {
    pub reference: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub reading_type: String,
    pub data_type: DataType,
    #[serde(default)]
    pub precision: u32,
    #[serde(default)]
    pub minimum: f64,
    #[serde(default = "default_maximum")]
    pub maximum: f64,
    #[serde(default)]
    pub delimiter: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl ActuatorManifest {
    pub fn digest(&self) -> String {
        let mut d = FieldDigest::new();
        d.update(&self.name);
        d.update(&self.reference);
        d.update(&self.description);
        d.update(&self.unit);
        d.update(&self.reading_type);
        d.update(&self.precision.to_string());
        d.update(&self.minimum.to_string());
        d.update(&self.maximum.to_string());
        d.update(&self.delimiter);
        d.update(self.data_type.letter());
        for label in &self.labels {
            d.update(label);
        }
        d.finish_hex()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmManifest {
    pub reference: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub message: String,
    pub severity: AlarmSeverity,
}

impl AlarmManifest {
    pub fn digest(&self) -> String {
        let mut d = FieldDigest::new();
        d.update(&self.name);
        d.update(&self.reference);
        d.update(&self.message);
        d.update(&self.description);
        d.update(self.severity.letter());
        d.finish_hex()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationManifest {
    pub reference: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub data_type: DataType,
    #[serde(default)]
    pub minimum: f64,
    #[serde(default = "default_maximum")]
    pub maximum: f64,
    #[serde(default)]
    pub delimiter: String,
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl ConfigurationManifest {
    pub fn digest(&self) -> String {
        let mut d = FieldDigest::new();
        d.update(&self.name);
        d.update(&self.reference);
        d.update(&self.description);
        d.update(&self.minimum.to_string());
        d.update(&self.maximum.to_string());
        d.update(&self.delimiter);
        d.update(&self.default_value);
        d.update(self.data_type.letter());
        for label in &self.labels {
            d.update(label);
        }
        d.finish_hex()
    }
}

fn default_maximum() -> f64 {
    1.0
}

/// Device schema. Deduplicated by digest in the repository.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub protocol: String,
    #[serde(default)]
    pub firmware_update_protocol: String,
    #[serde(default)]
    pub sensors: Vec<SensorManifest>,
    #[serde(default)]
    pub actuators: Vec<ActuatorManifest>,
    #[serde(default)]
    pub alarms: Vec<AlarmManifest>,
    #[serde(default)]
    pub configurations: Vec<ConfigurationManifest>,
    #[serde(default)]
    pub type_parameters: BTreeMap<String, serde_json::Value>,
}

impl DeviceTemplate {
    pub fn new(name: impl Into<String>, description: impl Into<String>,
               protocol: impl Into<String>, firmware_update_protocol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            protocol: protocol.into(),
            firmware_update_protocol: firmware_update_protocol.into(),
            sensors: Vec::new(),
            actuators: Vec::new(),
            alarms: Vec::new(),
            configurations: Vec::new(),
            type_parameters: BTreeMap::new(),
        }
    }

    /// Canonical content digest.
    ///
    /// Field order is fixed: own scalar fields, then child digests in
    /// definition order, alarms first, then actuators, sensors and
    /// configurations. Equal digests mean equivalent templates.
    pub fn digest(&self) -> String {
        let mut d = FieldDigest::new();
        d.update(&self.name);
        d.update(&self.description);
        d.update(&self.protocol);
        d.update(&self.firmware_update_protocol);
        for alarm in &self.alarms {
            d.update(&alarm.digest());
        }
        for actuator in &self.actuators {
            d.update(&actuator.digest());
        }
        for sensor in &self.sensors {
            d.update(&sensor.digest());
        }
        for configuration in &self.configurations {
            d.update(&configuration.digest());
        }
        d.finish_hex()
    }

    /// Whether `reference` names a sensor, actuator, alarm or
    /// configuration slot of this template.
    pub fn has_reference(&self, reference: &str) -> bool {
        self.sensors.iter().any(|s| s.reference == reference)
            || self.actuators.iter().any(|a| a.reference == reference)
            || self.alarms.iter().any(|a| a.reference == reference)
            || self.configurations.iter().any(|c| c.reference == reference)
    }

    /// Delimiter declared for `reference`, if any manifest declares one.
    pub fn delimiter_of(&self, reference: &str) -> Option<&str> {
        self.sensors
            .iter()
            .find(|s| s.reference == reference)
            .map(|s| s.delimiter.as_str())
            .or_else(|| {
                self.actuators
                    .iter()
                    .find(|a| a.reference == reference)
                    .map(|a| a.delimiter.as_str())
            })
            .or_else(|| {
                self.configurations
                    .iter()
                    .find(|c| c.reference == reference)
                    .map(|c| c.delimiter.as_str())
            })
            .filter(|d| !d.is_empty())
    }
}

/// A device as known to the gateway: stable key, broker credentials and
/// exactly one template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub key: String,
    #[serde(default)]
    pub password: String,
    pub template: DeviceTemplate,
}

impl Device {
    pub fn new(key: impl Into<String>, password: impl Into<String>, template: DeviceTemplate) -> Self {
        Self {
            key: key.into(),
            password: password.into(),
            template,
        }
    }
}
