//! Shared fakes for service tests.

use crate::publish::OutboundMessageHandler;
use async_trait::async_trait;
use edge_bridge_models::Message;
use std::sync::{Arc, Mutex};

/// Outbound handler that records instead of publishing, mirroring how the
/// services are exercised without brokers.
pub struct CollectingOutbound {
    messages: Mutex<Vec<Message>>,
}

impl CollectingOutbound {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
        })
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.messages.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl OutboundMessageHandler for CollectingOutbound {
    async fn add_message(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }
}
