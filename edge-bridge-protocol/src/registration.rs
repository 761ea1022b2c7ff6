//! Device registration sub-protocol.

use crate::codec::{make_json, parse_json};
use crate::topics::{self, Topics};
use edge_bridge_models::{
    DeviceRegistrationRequest, DeviceRegistrationResponse, Message, RegistrationResult,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReregistrationAck {
    result: RegistrationResult,
}

pub struct RegistrationProtocol;

impl RegistrationProtocol {
    /// Platform-side subscriptions: per-device registration responses and
    /// the reregister-all request.
    pub fn inbound_platform_channels(gateway_key: &str) -> Vec<String> {
        vec![
            format!(
                "{}/#",
                Topics::gateway(topics::P2D, topics::REGISTER_DEVICE, gateway_key)
            ),
            Topics::gateway(topics::P2D, topics::REREGISTER_DEVICE, gateway_key),
        ]
    }

    /// Device-side subscriptions: child registration requests.
    pub fn inbound_device_channels() -> Vec<String> {
        vec![format!(
            "{}/{}/{}/{}",
            topics::D2P,
            topics::REGISTER_DEVICE,
            topics::DEVICE_PATH_PREFIX,
            topics::SINGLE_LEVEL_WILDCARD
        )]
    }

    /// Registration request toward the platform.
    pub fn make_registration_request_message(
        gateway_key: &str,
        request: &DeviceRegistrationRequest,
    ) -> Option<Message> {
        let channel = Topics::gateway(topics::D2P, topics::REGISTER_DEVICE, gateway_key);
        make_json(channel, request)
    }

    /// Child registration request as published on the device side.
    pub fn make_device_registration_request_message(
        request: &DeviceRegistrationRequest,
    ) -> Option<Message> {
        let channel = Topics::device(topics::D2P, topics::REGISTER_DEVICE, &request.device_key);
        make_json(channel, request)
    }

    pub fn is_registration_request(message: &Message) -> bool {
        Topics::extract_kind(&message.channel) == Some(topics::REGISTER_DEVICE)
            && message.channel.starts_with(topics::D2P)
    }

    pub fn make_registration_request(message: &Message) -> Option<DeviceRegistrationRequest> {
        parse_json(message)
    }

    /// Registration response as received from the platform on
    /// `p2d/register_device/g/{gw}/d/{key}`.
    pub fn is_registration_response(message: &Message) -> bool {
        Topics::extract_kind(&message.channel) == Some(topics::REGISTER_DEVICE)
            && message.channel.starts_with(topics::P2D)
    }

    pub fn make_registration_response(message: &Message) -> Option<DeviceRegistrationResponse> {
        parse_json(message)
    }

    /// Platform response message; used by tests and by the gateway when it
    /// answers child registrations locally.
    pub fn make_registration_response_message(
        gateway_key: &str,
        device_key: &str,
        response: &DeviceRegistrationResponse,
    ) -> Option<Message> {
        let channel =
            Topics::gateway_device(topics::P2D, topics::REGISTER_DEVICE, gateway_key, device_key);
        make_json(channel, response)
    }

    /// Registration response forwarded to a child on the device side.
    pub fn make_device_registration_response_message(
        device_key: &str,
        response: &DeviceRegistrationResponse,
    ) -> Option<Message> {
        let channel = Topics::device(topics::P2D, topics::REGISTER_DEVICE, device_key);
        make_json(channel, response)
    }

    pub fn is_reregistration_request(message: &Message, gateway_key: &str) -> bool {
        message.channel == Topics::gateway(topics::P2D, topics::REREGISTER_DEVICE, gateway_key)
    }

    /// Reregister-all request as sent by the platform; used by tests.
    pub fn make_reregistration_request_message(gateway_key: &str) -> Message {
        Message::new(
            Topics::gateway(topics::P2D, topics::REREGISTER_DEVICE, gateway_key),
            &b"{}"[..],
        )
    }

    /// Reregistration request fanned out to one child device.
    pub fn make_device_reregistration_request_message(device_key: &str) -> Message {
        Message::new(
            Topics::device(topics::P2D, topics::REREGISTER_DEVICE, device_key),
            &b"{}"[..],
        )
    }

    /// Acknowledgment of a reregister-all request, sent to the platform.
    pub fn make_reregistration_ack_message(gateway_key: &str) -> Option<Message> {
        let channel = Topics::gateway(topics::D2P, topics::REREGISTER_DEVICE, gateway_key);
        make_json(
            channel,
            &ReregistrationAck {
                result: RegistrationResult::Ok,
            },
        )
    }

    /// Deletion request toward the platform for one removed device.
    pub fn make_deletion_request_message(gateway_key: &str, device_key: &str) -> Message {
        Message::new(
            Topics::gateway_device(topics::D2P, topics::DELETE_DEVICE, gateway_key, device_key),
            &b"{}"[..],
        )
    }

    pub fn is_deletion_request(message: &Message) -> bool {
        Topics::extract_kind(&message.channel) == Some(topics::DELETE_DEVICE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_bridge_models::DeviceTemplate;

    fn request() -> DeviceRegistrationRequest {
        DeviceRegistrationRequest::new(
            "Child",
            "child_X",
            DeviceTemplate::new("Child", "", "json", "dfu"),
        )
    }

    #[test]
    fn registration_request_roundtrip() {
        let msg = RegistrationProtocol::make_device_registration_request_message(&request()).unwrap();
        assert_eq!(msg.channel, "d2p/register_device/d/child_X");
        assert!(RegistrationProtocol::is_registration_request(&msg));

        let parsed = RegistrationProtocol::make_registration_request(&msg).unwrap();
        assert_eq!(parsed.device_key, "child_X");
        assert_eq!(parsed.template.digest(), request().template.digest());
    }

    #[test]
    fn forwarded_request_targets_gateway_channel() {
        let msg =
            RegistrationProtocol::make_registration_request_message("GW", &request()).unwrap();
        assert_eq!(msg.channel, "d2p/register_device/g/GW");
    }

    #[test]
    fn response_roundtrip() {
        let msg = RegistrationProtocol::make_registration_response_message(
            "GW",
            "child_X",
            &DeviceRegistrationResponse::ok(),
        )
        .unwrap();
        assert_eq!(msg.channel, "p2d/register_device/g/GW/d/child_X");
        assert!(RegistrationProtocol::is_registration_response(&msg));
        assert_eq!(
            RegistrationProtocol::make_registration_response(&msg)
                .unwrap()
                .result,
            RegistrationResult::Ok
        );
    }

    #[test]
    fn reregistration_channels() {
        let req = RegistrationProtocol::make_reregistration_request_message("GW");
        assert!(RegistrationProtocol::is_reregistration_request(&req, "GW"));
        assert!(!RegistrationProtocol::is_reregistration_request(&req, "OTHER"));

        let fanout = RegistrationProtocol::make_device_reregistration_request_message("child_X");
        assert_eq!(fanout.channel, "p2d/reregister_device/d/child_X");
    }

    #[test]
    fn deletion_request() {
        let msg = RegistrationProtocol::make_deletion_request_message("GW", "child_X");
        assert_eq!(msg.channel, "d2p/delete_device/g/GW/d/child_X");
        assert!(RegistrationProtocol::is_deletion_request(&msg));
    }
}
