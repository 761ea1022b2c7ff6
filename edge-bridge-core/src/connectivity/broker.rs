//! Broker client contract consumed by the core.
//!
//! The concrete MQTT client lives behind this trait so the supervisor,
//! publisher and tests are independent of the wire library.

use async_trait::async_trait;
use edge_bridge_models::Message;
use tokio::sync::mpsc;

/// Connection-level events delivered by a broker client.
#[derive(Debug)]
pub enum BrokerEvent {
    /// Session established (also signalled by `connect` returning true).
    Connected,
    /// Session lost; the supervisor reconnects.
    Disconnected,
    /// Inbound publish.
    Message(Message),
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Establish a session. Returns false when the broker is unreachable;
    /// the caller owns the retry policy.
    async fn connect(&self) -> bool;

    async fn disconnect(&self);

    /// Hand a message to the broker session. Returns false while
    /// disconnected or when the session rejects it.
    async fn publish(&self, message: &Message) -> bool;

    async fn subscribe(&self, topic: &str) -> bool;

    /// Take the event stream. Yields `None` after the first call; events
    /// are delivered in arrival order on a single consumer.
    fn take_events(&self) -> Option<mpsc::Receiver<BrokerEvent>>;
}
