//! MQTT broker client over rumqttc.
//!
//! `connect` drives the event loop until the broker acknowledges the
//! session, then hands the loop to a background driver task that forwards
//! inbound publishes and signals disconnects. Reconnection is owned by the
//! supervisor, not by this client.

use crate::connectivity::broker::{BrokerEvent, MessageBroker};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use edge_bridge_models::Message;
use rumqttc::{
    AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS, TlsConfiguration, Transport,
};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub struct MqttBrokerConfig {
    /// `tcp://host:port` or `ssl://host:port`.
    pub uri: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    /// PEM bundle trusted for TLS connections.
    pub trust_store: Option<String>,
    /// Retained last-will message registered with the broker.
    pub last_will: Option<(String, Vec<u8>)>,
}

pub struct MqttBroker {
    config: MqttBrokerConfig,
    /// Live session handle; lock-free reads on the publish path, cleared
    /// by the driver task when the session dies.
    client: Arc<ArcSwapOption<AsyncClient>>,
    events_tx: mpsc::Sender<BrokerEvent>,
    events_rx: StdMutex<Option<mpsc::Receiver<BrokerEvent>>>,
}

impl MqttBroker {
    pub fn new(config: MqttBrokerConfig) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            config,
            client: Arc::new(ArcSwapOption::from(None)),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
        })
    }

    fn build_options(&self) -> Option<MqttOptions> {
        let (secure, host, port) = parse_uri(&self.config.uri)?;

        let mut options = MqttOptions::new(&self.config.client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);

        if !self.config.username.is_empty() {
            options.set_credentials(&self.config.username, &self.config.password);
        }

        if let Some((topic, payload)) = &self.config.last_will {
            options.set_last_will(LastWill::new(topic, payload.clone(), QoS::AtLeastOnce, true));
        }

        if secure {
            let ca = match &self.config.trust_store {
                Some(path) => match std::fs::read(path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(path, error = %e, "Failed to read trust store");
                        return None;
                    }
                },
                None => Vec::new(),
            };
            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            }));
        }

        Some(options)
    }

    /// Forward events from the broker session until it dies, then clear
    /// the shared client handle and signal the disconnect.
    async fn drive(
        client: Arc<ArcSwapOption<AsyncClient>>,
        mut event_loop: EventLoop,
        events_tx: mpsc::Sender<BrokerEvent>,
    ) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = Message::new(publish.topic.clone(), publish.payload.clone());
                    if events_tx.send(BrokerEvent::Message(message)).await.is_err() {
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    info!("Broker sent disconnect");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "MQTT event loop error");
                    break;
                }
            }
        }

        client.store(None);
        let _ = events_tx.send(BrokerEvent::Disconnected).await;
    }
}

#[async_trait]
impl MessageBroker for MqttBroker {
    async fn connect(&self) -> bool {
        let Some(options) = self.build_options() else {
            return false;
        };

        let (client, mut event_loop) = AsyncClient::new(options, 100);

        // Wait for the session acknowledgment before declaring success
        let connected = timeout(CONNECT_TIMEOUT, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return true,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "Connect attempt failed");
                        return false;
                    }
                }
            }
        })
        .await
        .unwrap_or(false);

        if !connected {
            return false;
        }

        self.client.store(Some(Arc::new(client)));

        tokio::spawn(Self::drive(
            Arc::clone(&self.client),
            event_loop,
            self.events_tx.clone(),
        ));

        info!(uri = %self.config.uri, "Broker session established");
        true
    }

    async fn disconnect(&self) {
        if let Some(client) = self.client.swap(None) {
            let _ = client.disconnect().await;
        }
    }

    async fn publish(&self, message: &Message) -> bool {
        let Some(client) = self.client.load_full() else {
            return false;
        };
        client
            .publish(
                message.channel.as_str(),
                QoS::AtLeastOnce,
                false,
                message.content.clone(),
            )
            .await
            .is_ok()
    }

    async fn subscribe(&self, topic: &str) -> bool {
        let Some(client) = self.client.load_full() else {
            return false;
        };
        client.subscribe(topic, QoS::AtLeastOnce).await.is_ok()
    }

    fn take_events(&self) -> Option<mpsc::Receiver<BrokerEvent>> {
        self.events_rx.lock().unwrap().take()
    }
}

fn parse_uri(uri: &str) -> Option<(bool, String, u16)> {
    let (scheme, rest) = uri.split_once("://")?;
    let secure = match scheme {
        "tcp" | "mqtt" => false,
        "ssl" | "mqtts" | "tls" => true,
        _ => return None,
    };
    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().ok()?),
        None => (rest.to_string(), if secure { 8883 } else { 1883 }),
    };
    Some((secure, host, port))
}
