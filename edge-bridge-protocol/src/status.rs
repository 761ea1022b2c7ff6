//! Device status sub-protocol: presence tracking and last will.

use crate::codec::{make_json, parse_json};
use crate::topics::{self, Topics};
use edge_bridge_models::status::DeviceStatus;
use edge_bridge_models::{DeviceState, Message};

pub struct StatusProtocol;

impl StatusProtocol {
    /// Platform-side subscriptions: status requests from the platform.
    pub fn inbound_platform_channels(gateway_key: &str) -> Vec<String> {
        vec![format!(
            "{}/#",
            Topics::gateway(topics::P2D, topics::STATUS, gateway_key)
        )]
    }

    /// Device-side subscriptions: child status reports and last wills.
    pub fn inbound_device_channels() -> Vec<String> {
        vec![
            format!(
                "{}/{}/{}/{}",
                topics::D2P,
                topics::STATUS,
                topics::DEVICE_PATH_PREFIX,
                topics::SINGLE_LEVEL_WILDCARD
            ),
            format!("{}/{}/#", topics::D2P, topics::LASTWILL),
        ]
    }

    pub fn is_status_message(message: &Message) -> bool {
        Topics::extract_kind(&message.channel) == Some(topics::STATUS)
    }

    pub fn is_lastwill_message(message: &Message) -> bool {
        Topics::extract_kind(&message.channel) == Some(topics::LASTWILL)
    }

    pub fn make_device_status(message: &Message) -> Option<DeviceStatus> {
        parse_json(message)
    }

    /// Status report toward the platform for one device.
    pub fn make_status_message(
        gateway_key: &str,
        device_key: &str,
        state: DeviceState,
    ) -> Option<Message> {
        let channel =
            Topics::gateway_device(topics::D2P, topics::STATUS, gateway_key, device_key);
        make_json(channel, &DeviceStatus { state })
    }

    /// Status request fanned out to one child device.
    pub fn make_device_status_request_message(device_key: &str) -> Message {
        Message::new(
            Topics::device(topics::P2D, topics::STATUS, device_key),
            &b"{}"[..],
        )
    }

    /// Last-will channel registered with the platform broker; the broker
    /// publishes it on ungraceful disconnect.
    pub fn lastwill_channel(gateway_key: &str) -> String {
        Topics::gateway(topics::D2P, topics::LASTWILL, gateway_key)
    }

    /// Last-will payload: the broker announces the gateway as offline.
    pub fn lastwill_payload() -> Vec<u8> {
        b"Gone offline".to_vec()
    }

    #[inline]
    pub fn extract_device_key(channel: &str) -> Option<&str> {
        Topics::extract_device_key(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_message_codec() {
        let msg = StatusProtocol::make_status_message("GW", "X", DeviceState::Connected).unwrap();
        assert_eq!(msg.channel, "d2p/status/g/GW/d/X");
        assert!(StatusProtocol::is_status_message(&msg));
        assert_eq!(
            StatusProtocol::make_device_status(&msg).unwrap().state,
            DeviceState::Connected
        );
    }

    #[test]
    fn lastwill() {
        assert_eq!(StatusProtocol::lastwill_channel("GW"), "d2p/lastwill/g/GW");
        let msg = Message::new("d2p/lastwill/d/X", StatusProtocol::lastwill_payload());
        assert!(StatusProtocol::is_lastwill_message(&msg));
        assert_eq!(StatusProtocol::extract_device_key(&msg.channel), Some("X"));
    }
}
