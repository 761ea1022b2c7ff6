//! Shared JSON codec helpers.
//!
//! Constructors return `None` on serialization failure, extractors return
//! `None` when the payload does not parse; callers log and drop.

use edge_bridge_models::Message;
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

pub(crate) fn make_json<T: Serialize>(channel: String, value: &T) -> Option<Message> {
    match serde_json::to_vec(value) {
        Ok(content) => Some(Message::new(channel, content)),
        Err(e) => {
            warn!(error = %e, "Failed to serialize outbound payload");
            None
        }
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(message: &Message) -> Option<T> {
    match serde_json::from_slice(&message.content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(channel = %message.channel, error = %e, "Malformed payload");
            None
        }
    }
}
