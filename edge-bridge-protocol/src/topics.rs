//! Topic grammar.
//!
//! All channels are slash-delimited. `d2p` is device-to-platform, `p2d`
//! the reverse. Platform-side channels carry a `g/{gatewayKey}` level;
//! device-side channels omit it. `Topics` builds concrete channels and
//! converts between the two conventions.

/// Direction roots
pub const D2P: &str = "d2p";
pub const P2D: &str = "p2d";

/// Path level markers
pub const GATEWAY_PATH_PREFIX: &str = "g";
pub const DEVICE_PATH_PREFIX: &str = "d";
pub const REFERENCE_PATH_PREFIX: &str = "r";

/// Wildcards (MQTT semantics)
pub const SINGLE_LEVEL_WILDCARD: &str = "+";
pub const MULTI_LEVEL_WILDCARD: &str = "#";

pub const CHANNEL_DELIMITER: &str = "/";

/// Message type levels
pub const SENSOR_READING: &str = "sensor_reading";
pub const EVENTS: &str = "events";
pub const ACTUATOR_STATUS: &str = "actuator_status";
pub const ACTUATOR_SET: &str = "actuator_set";
pub const ACTUATOR_GET: &str = "actuator_get";
pub const CONFIGURATION_SET: &str = "configuration_set";
pub const CONFIGURATION_GET: &str = "configuration_get";
pub const CONFIGURATION_CURRENT: &str = "configuration_current";
pub const REGISTER_DEVICE: &str = "register_device";
pub const REREGISTER_DEVICE: &str = "reregister_device";
pub const DELETE_DEVICE: &str = "delete_device";
pub const FIRMWARE_UPDATE_INSTALL: &str = "firmware_update_install";
pub const FIRMWARE_UPDATE_STATUS: &str = "firmware_update_status";
pub const FIRMWARE_VERSION_UPDATE: &str = "firmware_version_update";
pub const FILE_UPLOAD_INITIATE: &str = "file_upload_initiate";
pub const FILE_UPLOAD_STATUS: &str = "file_upload_status";
pub const FILE_UPLOAD_ABORT: &str = "file_upload_abort";
pub const FILE_UPLOAD_BINARY: &str = "file_upload_binary";
pub const FILE_PACKET_REQUEST: &str = "file_upload_packet_request";
pub const FILE_DELETE: &str = "file_delete";
pub const FILE_PURGE: &str = "file_purge";
pub const FILE_LIST_REQUEST: &str = "file_list_request";
pub const FILE_LIST_RESPONSE: &str = "file_list_response";
pub const FILE_LIST_UPDATE: &str = "file_list_update";
pub const FILE_LIST_CONFIRM: &str = "file_list_confirm";
pub const STATUS: &str = "status";
pub const LASTWILL: &str = "lastwill";
pub const PING: &str = "ping";
pub const PONG: &str = "pong";

pub struct Topics;

impl Topics {
    /// Gateway-scoped platform channel: `{direction}/{kind}/g/{gatewayKey}`.
    pub fn gateway(direction: &str, kind: &str, gateway_key: &str) -> String {
        format!("{direction}/{kind}/{GATEWAY_PATH_PREFIX}/{gateway_key}")
    }

    /// Device-scoped platform channel:
    /// `{direction}/{kind}/g/{gatewayKey}/d/{deviceKey}`.
    pub fn gateway_device(direction: &str, kind: &str, gateway_key: &str, device_key: &str) -> String {
        format!(
            "{direction}/{kind}/{GATEWAY_PATH_PREFIX}/{gateway_key}/{DEVICE_PATH_PREFIX}/{device_key}"
        )
    }

    /// Device-side channel: `{direction}/{kind}/d/{deviceKey}`.
    pub fn device(direction: &str, kind: &str, device_key: &str) -> String {
        format!("{direction}/{kind}/{DEVICE_PATH_PREFIX}/{device_key}")
    }

    /// Device key of a channel: the level following the `d` marker.
    pub fn extract_device_key(channel: &str) -> Option<&str> {
        let mut parts = channel.split(CHANNEL_DELIMITER);
        while let Some(part) = parts.next() {
            if part == DEVICE_PATH_PREFIX {
                return parts.next();
            }
        }
        None
    }

    /// Message kind of a channel: the level following the direction root.
    pub fn extract_kind(channel: &str) -> Option<&str> {
        let mut parts = channel.split(CHANNEL_DELIMITER);
        match parts.next() {
            Some(D2P) | Some(P2D) => parts.next(),
            _ => None,
        }
    }

    /// Rewrite a device-side channel to the platform convention by
    /// injecting the `g/{gatewayKey}` level after the kind.
    ///
    /// `d2p/sensor_reading/d/X/r/T` becomes
    /// `d2p/sensor_reading/g/GW/d/X/r/T`.
    pub fn device_to_platform(channel: &str, gateway_key: &str) -> Option<String> {
        let parts: Vec<&str> = channel.split(CHANNEL_DELIMITER).collect();
        if parts.len() < 2 || parts[0] != D2P {
            return None;
        }
        let mut out: Vec<&str> = Vec::with_capacity(parts.len() + 2);
        out.extend_from_slice(&parts[..2]);
        out.push(GATEWAY_PATH_PREFIX);
        out.push(gateway_key);
        out.extend_from_slice(&parts[2..]);
        Some(out.join(CHANNEL_DELIMITER))
    }

    /// Rewrite a platform channel to the device convention by stripping
    /// the `g/{gatewayKey}` level.
    ///
    /// `p2d/actuator_set/g/GW/d/X/r/sw` becomes `p2d/actuator_set/d/X/r/sw`.
    pub fn platform_to_device(channel: &str, gateway_key: &str) -> Option<String> {
        let parts: Vec<&str> = channel.split(CHANNEL_DELIMITER).collect();
        if parts.len() < 4 || parts[0] != P2D {
            return None;
        }
        if parts[2] != GATEWAY_PATH_PREFIX || parts[3] != gateway_key {
            return None;
        }
        let mut out: Vec<&str> = Vec::with_capacity(parts.len() - 2);
        out.extend_from_slice(&parts[..2]);
        out.extend_from_slice(&parts[4..]);
        Some(out.join(CHANNEL_DELIMITER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders() {
        assert_eq!(Topics::gateway(D2P, PING, "GW"), "d2p/ping/g/GW");
        assert_eq!(
            Topics::gateway_device(D2P, SENSOR_READING, "GW", "X"),
            "d2p/sensor_reading/g/GW/d/X"
        );
        assert_eq!(
            Topics::device(P2D, ACTUATOR_SET, "X"),
            "p2d/actuator_set/d/X"
        );
    }

    #[test]
    fn extractors() {
        assert_eq!(
            Topics::extract_device_key("d2p/sensor_reading/g/GW/d/X/r/T"),
            Some("X")
        );
        assert_eq!(Topics::extract_device_key("d2p/ping/g/GW"), None);
        assert_eq!(
            Topics::extract_kind("p2d/actuator_set/g/GW/d/X"),
            Some("actuator_set")
        );
        assert_eq!(Topics::extract_kind("bogus/actuator_set"), None);
    }

    #[test]
    fn direction_rewrites() {
        assert_eq!(
            Topics::device_to_platform("d2p/sensor_reading/d/X/r/T", "GW").as_deref(),
            Some("d2p/sensor_reading/g/GW/d/X/r/T")
        );
        assert_eq!(
            Topics::platform_to_device("p2d/actuator_set/g/GW/d/X/r/sw", "GW").as_deref(),
            Some("p2d/actuator_set/d/X/r/sw")
        );
        // Wrong gateway key is refused
        assert_eq!(
            Topics::platform_to_device("p2d/actuator_set/g/OTHER/d/X", "GW"),
            None
        );
        // Wrong direction is refused
        assert_eq!(Topics::device_to_platform("p2d/actuator_set/d/X", "GW"), None);
    }
}
