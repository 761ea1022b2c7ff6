//! Data sub-protocol: readings, events, actuation and configuration.
//!
//! The data service relays raw messages between the sides; this module
//! owns the channel sets, the direction rewrites and the payload
//! extractors used for validation.

use crate::codec::{make_json, parse_json};
use crate::topics::{self, Topics};
use edge_bridge_models::{ActuatorStatus, Alarm, ConfigurationItem, Message, Reading};

pub struct DataProtocol;

impl DataProtocol {
    pub const NAME: &'static str = "json";

    /// Platform-side subscriptions (commands toward devices).
    pub fn inbound_platform_channels(gateway_key: &str) -> Vec<String> {
        [
            topics::ACTUATOR_SET,
            topics::ACTUATOR_GET,
            topics::CONFIGURATION_SET,
            topics::CONFIGURATION_GET,
        ]
        .iter()
        .map(|kind| format!("{}/#", Topics::gateway(topics::P2D, kind, gateway_key)))
        .collect()
    }

    /// Device-side subscriptions (data toward the platform).
    pub fn inbound_device_channels() -> Vec<String> {
        [
            topics::SENSOR_READING,
            topics::EVENTS,
            topics::ACTUATOR_STATUS,
            topics::CONFIGURATION_CURRENT,
        ]
        .iter()
        .map(|kind| format!("{}/{}/#", topics::D2P, kind))
        .collect()
    }

    /// Whether `channel` belongs to this protocol's grammar.
    pub fn owns_channel(channel: &str) -> bool {
        matches!(
            Topics::extract_kind(channel),
            Some(
                topics::SENSOR_READING
                    | topics::EVENTS
                    | topics::ACTUATOR_STATUS
                    | topics::ACTUATOR_SET
                    | topics::ACTUATOR_GET
                    | topics::CONFIGURATION_SET
                    | topics::CONFIGURATION_GET
                    | topics::CONFIGURATION_CURRENT
            )
        )
    }

    #[inline]
    pub fn route_device_to_platform(channel: &str, gateway_key: &str) -> Option<String> {
        Topics::device_to_platform(channel, gateway_key)
    }

    #[inline]
    pub fn route_platform_to_device(channel: &str, gateway_key: &str) -> Option<String> {
        Topics::platform_to_device(channel, gateway_key)
    }

    #[inline]
    pub fn extract_device_key(channel: &str) -> Option<&str> {
        Topics::extract_device_key(channel)
    }

    pub fn is_sensor_reading(channel: &str) -> bool {
        Topics::extract_kind(channel) == Some(topics::SENSOR_READING)
    }

    pub fn make_reading(message: &Message) -> Option<Reading> {
        parse_json(message)
    }

    pub fn make_actuator_status(message: &Message) -> Option<ActuatorStatus> {
        parse_json(message)
    }

    pub fn make_configuration_item(message: &Message) -> Option<ConfigurationItem> {
        parse_json(message)
    }

    pub fn make_alarm(message: &Message) -> Option<Alarm> {
        parse_json(message)
    }

    /// Reading message on the device convention, used by the demo
    /// application publishing on behalf of the gateway's own module.
    pub fn make_reading_message(device_key: &str, reading: &Reading) -> Option<Message> {
        let channel = format!(
            "{}/{}/{}",
            Topics::device(topics::D2P, topics::SENSOR_READING, device_key),
            topics::REFERENCE_PATH_PREFIX,
            reading.reference
        );
        make_json(channel, reading)
    }

    /// Actuator status message on the device convention.
    pub fn make_actuator_status_message(device_key: &str, status: &ActuatorStatus) -> Option<Message> {
        let channel = format!(
            "{}/{}/{}",
            Topics::device(topics::D2P, topics::ACTUATOR_STATUS, device_key),
            topics::REFERENCE_PATH_PREFIX,
            status.reference
        );
        make_json(channel, status)
    }
}
