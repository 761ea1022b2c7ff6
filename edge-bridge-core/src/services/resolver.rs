//! Channel protocol resolver.
//!
//! The single place that maps channel syntax to a logical sub-protocol
//! name. Inbound data messages are matched against every registered
//! protocol's channel grammar and forwarded to that protocol's data
//! service on the correct side. Messages no protocol claims are logged
//! and dropped.

use crate::services::data::DataService;
use edge_bridge_models::Message;
use std::sync::{Arc, RwLock};
use tracing::warn;

type ChannelPredicate = fn(&str) -> bool;

struct ProtocolEntry {
    name: &'static str,
    owns_channel: ChannelPredicate,
    service: Arc<DataService>,
}

pub struct ChannelProtocolResolver {
    protocols: RwLock<Vec<ProtocolEntry>>,
}

impl ChannelProtocolResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            protocols: RwLock::new(Vec::new()),
        })
    }

    /// Register a data protocol with its channel ownership predicate.
    pub fn register(
        &self,
        name: &'static str,
        owns_channel: ChannelPredicate,
        service: Arc<DataService>,
    ) {
        self.protocols.write().unwrap().push(ProtocolEntry {
            name,
            owns_channel,
            service,
        });
    }

    pub async fn platform_message_received(&self, message: &Message) {
        match self.resolve(&message.channel) {
            Some(service) => service.platform_message_received(message).await,
            None => warn!(channel = %message.channel, "Data protocol not found for channel"),
        }
    }

    pub async fn device_message_received(&self, message: &Message) {
        match self.resolve(&message.channel) {
            Some(service) => service.device_message_received(message).await,
            None => warn!(channel = %message.channel, "Data protocol not found for channel"),
        }
    }

    fn resolve(&self, channel: &str) -> Option<Arc<DataService>> {
        let protocols = self.protocols.read().unwrap();
        protocols.iter().find_map(|entry| {
            if (entry.owns_channel)(channel) {
                Some(Arc::clone(&entry.service))
            } else {
                None
            }
        })
    }

    /// Registered protocol names, for diagnostics.
    pub fn protocol_names(&self) -> Vec<&'static str> {
        self.protocols
            .read()
            .unwrap()
            .iter()
            .map(|entry| entry.name)
            .collect()
    }
}
