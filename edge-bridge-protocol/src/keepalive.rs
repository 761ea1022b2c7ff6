//! Keep-alive sub-protocol: periodic pings and platform time sync.

use crate::codec::parse_json;
use crate::topics::{self, Topics};
use edge_bridge_models::Message;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pong {
    /// Platform clock, seconds since epoch.
    timestamp: u64,
}

pub struct KeepAliveProtocol;

impl KeepAliveProtocol {
    pub fn inbound_platform_channels(gateway_key: &str) -> Vec<String> {
        vec![Topics::gateway(topics::P2D, topics::PONG, gateway_key)]
    }

    pub fn make_ping_message(gateway_key: &str) -> Message {
        Message::new(
            Topics::gateway(topics::D2P, topics::PING, gateway_key),
            &b""[..],
        )
    }

    pub fn is_pong_message(message: &Message, gateway_key: &str) -> bool {
        message.channel == Topics::gateway(topics::P2D, topics::PONG, gateway_key)
    }

    /// Platform timestamp carried by a pong.
    pub fn make_pong_timestamp(message: &Message) -> Option<u64> {
        parse_json::<Pong>(message).map(|pong| pong.timestamp)
    }

    /// Pong message as sent by the platform; used by tests.
    pub fn make_pong_message(gateway_key: &str, timestamp: u64) -> Message {
        let content = format!("{{\"timestamp\":{timestamp}}}");
        Message::new(
            Topics::gateway(topics::P2D, topics::PONG, gateway_key),
            content.into_bytes(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_channel() {
        assert_eq!(
            KeepAliveProtocol::make_ping_message("GW").channel,
            "d2p/ping/g/GW"
        );
    }

    #[test]
    fn pong_roundtrip() {
        let msg = KeepAliveProtocol::make_pong_message("GW", 1_700_000_000);
        assert!(KeepAliveProtocol::is_pong_message(&msg, "GW"));
        assert_eq!(
            KeepAliveProtocol::make_pong_timestamp(&msg),
            Some(1_700_000_000)
        );
    }
}
