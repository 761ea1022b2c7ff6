//! Per-side connection supervisor.
//!
//! Owns the broker session lifecycle for one side: connect, subscribe the
//! registered channels, pump inbound events into the dispatch handler, and
//! on loss reconnect after a fixed delay, watching the cancellation token
//! throughout. Connection-state transitions fan out to registered
//! listeners (publisher, keep-alive, status service).

use crate::connectivity::broker::{BrokerEvent, MessageBroker};
use crate::connectivity::inbound::InboundMessageHandler;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Delay between reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(2000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Hook for services interested in connection-state transitions.
#[async_trait]
pub trait ConnectivityListener: Send + Sync {
    async fn connected(&self);
    async fn disconnected(&self);
}

pub struct ConnectionSupervisor {
    side: &'static str,
    broker: Arc<dyn MessageBroker>,
    inbound: Arc<InboundMessageHandler>,
    listeners: RwLock<Vec<Arc<dyn ConnectivityListener>>>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    pub fn new(
        side: &'static str,
        broker: Arc<dyn MessageBroker>,
        inbound: Arc<InboundMessageHandler>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            side,
            broker,
            inbound,
            listeners: RwLock::new(Vec::new()),
            state_tx,
            cancel,
            worker: std::sync::Mutex::new(None),
        })
    }

    /// Register a state listener. Must happen before `start`.
    pub fn add_listener(&self, listener: Arc<dyn ConnectivityListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Spawn the supervision loop.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *self.worker.lock().unwrap() = Some(handle);
    }

    pub async fn stop(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn run(self: Arc<Self>) {
        let Some(mut events) = self.broker.take_events() else {
            warn!(side = self.side, "Broker event stream already taken");
            return;
        };

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let _ = self.state_tx.send(ConnectionState::Connecting);

            if !self.broker.connect().await {
                warn!(side = self.side, "Connection failed, retrying");
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                }
            }

            for channel in self.inbound.channels() {
                if !self.broker.subscribe(&channel).await {
                    warn!(side = self.side, channel = %channel, "Subscribe failed");
                }
            }

            info!(side = self.side, "Connected");
            let _ = self.state_tx.send(ConnectionState::Connected);
            self.notify_connected().await;

            // Pump events until the session dies
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        self.broker.disconnect().await;
                        return;
                    }
                    event = events.recv() => match event {
                        Some(BrokerEvent::Message(message)) => {
                            self.inbound.message_received(message);
                        }
                        Some(BrokerEvent::Connected) => {}
                        Some(BrokerEvent::Disconnected) | None => break,
                    }
                }
            }

            warn!(side = self.side, "Connection lost");
            let _ = self.state_tx.send(ConnectionState::Disconnected);
            self.notify_disconnected().await;
        }
    }

    async fn notify_connected(&self) {
        let listeners = self.listeners.read().unwrap().clone();
        for listener in listeners {
            listener.connected().await;
        }
    }

    async fn notify_disconnected(&self) {
        let listeners = self.listeners.read().unwrap().clone();
        for listener in listeners {
            listener.disconnected().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandBuffer;
    use edge_bridge_models::Message;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct ScriptedBroker {
        /// Attempts that fail before the first success.
        failures: AtomicU32,
        attempts: AtomicU32,
        events_rx: Mutex<Option<mpsc::Receiver<BrokerEvent>>>,
        pub events_tx: mpsc::Sender<BrokerEvent>,
    }

    impl ScriptedBroker {
        fn new(failures: u32) -> Arc<Self> {
            let (events_tx, events_rx) = mpsc::channel(16);
            Arc::new(Self {
                failures: AtomicU32::new(failures),
                attempts: AtomicU32::new(0),
                events_rx: Mutex::new(Some(events_rx)),
                events_tx,
            })
        }
    }

    #[async_trait]
    impl MessageBroker for ScriptedBroker {
        async fn connect(&self) -> bool {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                false
            } else {
                true
            }
        }
        async fn disconnect(&self) {}
        async fn publish(&self, _message: &Message) -> bool {
            true
        }
        async fn subscribe(&self, _topic: &str) -> bool {
            true
        }
        fn take_events(&self) -> Option<mpsc::Receiver<BrokerEvent>> {
            self.events_rx.lock().unwrap().take()
        }
    }

    struct FlagListener {
        connected: AtomicBool,
    }

    #[async_trait]
    impl ConnectivityListener for FlagListener {
        async fn connected(&self) {
            self.connected.store(true, Ordering::SeqCst);
        }
        async fn disconnected(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_fixed_delay_until_connected() {
        let broker = ScriptedBroker::new(2);
        let buffer = Arc::new(CommandBuffer::new("test", CancellationToken::new()));
        let inbound = Arc::new(InboundMessageHandler::new("test", buffer));
        let cancel = CancellationToken::new();
        let supervisor =
            ConnectionSupervisor::new("test", broker.clone(), inbound, cancel.clone());

        let listener = Arc::new(FlagListener {
            connected: AtomicBool::new(false),
        });
        supervisor.add_listener(listener.clone());

        let mut state = supervisor.state();
        supervisor.start();

        // Two failures, each followed by the 2 s delay, then success
        while *state.borrow() != ConnectionState::Connected {
            state.changed().await.unwrap();
        }
        assert_eq!(broker.attempts.load(Ordering::SeqCst), 3);
        assert!(listener.connected.load(Ordering::SeqCst));

        cancel.cancel();
        supervisor.stop().await;
    }

    #[tokio::test]
    async fn disconnect_event_triggers_reconnect() {
        let broker = ScriptedBroker::new(0);
        let buffer = Arc::new(CommandBuffer::new("test", CancellationToken::new()));
        let inbound = Arc::new(InboundMessageHandler::new("test", buffer));
        let cancel = CancellationToken::new();
        let supervisor =
            ConnectionSupervisor::new("test", broker.clone(), inbound, cancel.clone());

        let mut state = supervisor.state();
        supervisor.start();

        while *state.borrow() != ConnectionState::Connected {
            state.changed().await.unwrap();
        }

        broker
            .events_tx
            .send(BrokerEvent::Disconnected)
            .await
            .unwrap();

        // Supervisor reconnects on its own
        loop {
            state.changed().await.unwrap();
            if *state.borrow() == ConnectionState::Connected {
                break;
            }
        }
        assert!(broker.attempts.load(Ordering::SeqCst) >= 2);

        cancel.cancel();
        supervisor.stop().await;
    }
}
