use serde::{Deserialize, Serialize};

/// A sensor reading as relayed between the sides.
///
/// `timestamp` is seconds since epoch; zero means the platform stamps the
/// reading on arrival. `values` holds one element unless the declaring
/// manifest carries a delimiter, in which case the values are joined with
/// that delimiter on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub reference: String,
    #[serde(default)]
    pub timestamp: u64,
    pub values: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActuatorState {
    Ready,
    Busy,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuatorStatus {
    pub reference: String,
    pub value: String,
    pub state: ActuatorState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationItem {
    pub reference: String,
    pub values: Vec<String>,
}

/// An alarm event raised by a device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub reference: String,
    #[serde(default)]
    pub timestamp: u64,
    pub active: bool,
}
