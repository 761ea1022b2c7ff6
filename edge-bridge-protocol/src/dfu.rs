//! Firmware update (DFU) sub-protocol.

use crate::codec::{make_json, parse_json};
use crate::topics::{self, Topics};
use edge_bridge_models::{FirmwareUpdateCommand, FirmwareUpdateStatus, Message};

pub struct DfuProtocol;

impl DfuProtocol {
    /// Platform-side subscriptions: install/abort commands per device.
    pub fn inbound_platform_channels(gateway_key: &str) -> Vec<String> {
        vec![format!(
            "{}/#",
            Topics::gateway(topics::P2D, topics::FIRMWARE_UPDATE_INSTALL, gateway_key)
        )]
    }

    /// Device-side subscriptions: child status and version reports.
    pub fn inbound_device_channels() -> Vec<String> {
        vec![
            format!(
                "{}/{}/{}/{}",
                topics::D2P,
                topics::FIRMWARE_UPDATE_STATUS,
                topics::DEVICE_PATH_PREFIX,
                topics::SINGLE_LEVEL_WILDCARD
            ),
            format!(
                "{}/{}/{}/{}",
                topics::D2P,
                topics::FIRMWARE_VERSION_UPDATE,
                topics::DEVICE_PATH_PREFIX,
                topics::SINGLE_LEVEL_WILDCARD
            ),
        ]
    }

    pub fn is_firmware_update_command(message: &Message) -> bool {
        Topics::extract_kind(&message.channel) == Some(topics::FIRMWARE_UPDATE_INSTALL)
    }

    pub fn make_firmware_update_command(message: &Message) -> Option<FirmwareUpdateCommand> {
        parse_json(message)
    }

    /// Command message as sent by the platform; used by tests.
    pub fn make_firmware_update_command_message(
        gateway_key: &str,
        device_key: &str,
        command: &FirmwareUpdateCommand,
    ) -> Option<Message> {
        let channel = Topics::gateway_device(
            topics::P2D,
            topics::FIRMWARE_UPDATE_INSTALL,
            gateway_key,
            device_key,
        );
        make_json(channel, command)
    }

    /// Command forwarded to a child device on the device side.
    pub fn make_device_firmware_update_command_message(
        device_key: &str,
        command: &FirmwareUpdateCommand,
    ) -> Option<Message> {
        let channel = Topics::device(topics::P2D, topics::FIRMWARE_UPDATE_INSTALL, device_key);
        make_json(channel, command)
    }

    pub fn is_firmware_update_status(message: &Message) -> bool {
        Topics::extract_kind(&message.channel) == Some(topics::FIRMWARE_UPDATE_STATUS)
    }

    pub fn make_firmware_update_status(message: &Message) -> Option<FirmwareUpdateStatus> {
        parse_json(message)
    }

    /// Status report toward the platform.
    pub fn make_firmware_update_status_message(
        gateway_key: &str,
        device_key: &str,
        status: &FirmwareUpdateStatus,
    ) -> Option<Message> {
        let channel = Topics::gateway_device(
            topics::D2P,
            topics::FIRMWARE_UPDATE_STATUS,
            gateway_key,
            device_key,
        );
        make_json(channel, status)
    }

    pub fn is_firmware_version(message: &Message) -> bool {
        Topics::extract_kind(&message.channel) == Some(topics::FIRMWARE_VERSION_UPDATE)
    }

    /// Version report toward the platform. The payload is the bare
    /// version string.
    pub fn make_firmware_version_message(
        gateway_key: &str,
        device_key: &str,
        version: &str,
    ) -> Message {
        let channel = Topics::gateway_device(
            topics::D2P,
            topics::FIRMWARE_VERSION_UPDATE,
            gateway_key,
            device_key,
        );
        Message::new(channel, version.as_bytes().to_vec())
    }

    #[inline]
    pub fn extract_device_key(channel: &str) -> Option<&str> {
        Topics::extract_device_key(channel)
    }

    #[inline]
    pub fn route_device_to_platform(channel: &str, gateway_key: &str) -> Option<String> {
        Topics::device_to_platform(channel, gateway_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_bridge_models::{FirmwareUpdateState, FirmwareUpdateCommandType};

    #[test]
    fn command_roundtrip() {
        let command = FirmwareUpdateCommand::install_file("fw.bin");
        let msg =
            DfuProtocol::make_firmware_update_command_message("GW", "GW", &command).unwrap();
        assert_eq!(msg.channel, "p2d/firmware_update_install/g/GW/d/GW");
        assert!(DfuProtocol::is_firmware_update_command(&msg));

        let parsed = DfuProtocol::make_firmware_update_command(&msg).unwrap();
        assert_eq!(parsed.command, FirmwareUpdateCommandType::Install);
        assert_eq!(parsed.file_name.as_deref(), Some("fw.bin"));
    }

    #[test]
    fn status_message() {
        let status = FirmwareUpdateStatus::ok(FirmwareUpdateState::Installation);
        let msg = DfuProtocol::make_firmware_update_status_message("GW", "X", &status).unwrap();
        assert_eq!(msg.channel, "d2p/firmware_update_status/g/GW/d/X");
        assert_eq!(DfuProtocol::make_firmware_update_status(&msg).unwrap(), status);
    }

    #[test]
    fn version_message_is_plain_text() {
        let msg = DfuProtocol::make_firmware_version_message("GW", "GW", "2.0.0");
        assert_eq!(msg.channel, "d2p/firmware_version_update/g/GW/d/GW");
        assert_eq!(msg.as_text(), Some("2.0.0"));
    }
}
