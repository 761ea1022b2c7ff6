//! Inbound message dispatch.
//!
//! Each side keeps an ordered list of `(subscription, listener)` pairs.
//! A received message goes to the FIRST listener whose subscription topic
//! matches the channel under MQTT wildcard rules; the listener runs on the
//! side's command buffer. Unmatched messages are logged and dropped.

use crate::command::CommandBuffer;
use edge_bridge_models::Message;
use edge_bridge_protocol::topic_matches;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use tracing::{info, trace};

pub type ListenerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Listener callback; typically a closure capturing a `Weak` service
/// reference so deregistration never requires a topology teardown.
pub type MessageListener = Arc<dyn Fn(Message) -> ListenerFuture + Send + Sync>;

pub struct InboundMessageHandler {
    side: &'static str,
    command_buffer: Arc<CommandBuffer>,
    listeners: RwLock<Vec<(String, MessageListener)>>,
}

impl InboundMessageHandler {
    pub fn new(side: &'static str, command_buffer: Arc<CommandBuffer>) -> Self {
        Self {
            side,
            command_buffer,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener. Registration order decides match priority.
    pub fn add_listener(&self, subscription: impl Into<String>, listener: MessageListener) {
        self.listeners
            .write()
            .unwrap()
            .push((subscription.into(), listener));
    }

    /// All subscription topics, for the broker subscribe pass.
    pub fn channels(&self) -> Vec<String> {
        self.listeners
            .read()
            .unwrap()
            .iter()
            .map(|(subscription, _)| subscription.clone())
            .collect()
    }

    /// Match and enqueue an inbound message.
    pub fn message_received(&self, message: Message) {
        trace!(side = self.side, channel = %message.channel, "Message received");

        let listener = {
            let listeners = self.listeners.read().unwrap();
            listeners
                .iter()
                .find(|(subscription, _)| topic_matches(subscription, &message.channel))
                .map(|(_, listener)| Arc::clone(listener))
        };

        match listener {
            Some(listener) => self.command_buffer.push(listener(message)),
            None => {
                info!(side = self.side, channel = %message.channel, "Handler for channel not found")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn recording_listener(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> MessageListener {
        let log = Arc::clone(log);
        Arc::new(move |message: Message| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock()
                    .unwrap()
                    .push(format!("{tag}:{}", message.channel));
            })
        })
    }

    #[tokio::test]
    async fn first_matching_listener_wins() {
        let buffer = Arc::new(CommandBuffer::new("test", CancellationToken::new()));
        let handler = InboundMessageHandler::new("test", buffer);
        let log = Arc::new(Mutex::new(Vec::new()));

        handler.add_listener("d2p/register_device/d/+", recording_listener(&log, "reg"));
        handler.add_listener("d2p/#", recording_listener(&log, "catchall"));

        handler.message_received(Message::new("d2p/register_device/d/X", &b"{}"[..]));
        handler.message_received(Message::new("d2p/sensor_reading/d/X/r/T", &b"{}"[..]));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "reg:d2p/register_device/d/X".to_string(),
                "catchall:d2p/sensor_reading/d/X/r/T".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn unmatched_messages_are_dropped() {
        let buffer = Arc::new(CommandBuffer::new("test", CancellationToken::new()));
        let handler = InboundMessageHandler::new("test", buffer);
        let log = Arc::new(Mutex::new(Vec::new()));

        handler.add_listener("d2p/ping/g/GW", recording_listener(&log, "ping"));
        handler.message_received(Message::new("p2d/pong/g/GW", &b"{}"[..]));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn channels_reflect_registration_order() {
        let buffer = Arc::new(CommandBuffer::new("test", CancellationToken::new()));
        let handler = InboundMessageHandler::new("test", buffer);
        let log = Arc::new(Mutex::new(Vec::new()));

        handler.add_listener("a/#", recording_listener(&log, "a"));
        handler.add_listener("b/+", recording_listener(&log, "b"));

        assert_eq!(handler.channels(), vec!["a/#".to_string(), "b/+".to_string()]);
    }
}
