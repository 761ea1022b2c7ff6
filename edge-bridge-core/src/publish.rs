//! Outbound publishing service.
//!
//! One per broker side. Messages are queued while the broker is down; on
//! the platform side the queue is additionally persisted so pending
//! messages survive restarts. Delivery is strict FIFO: the head stays in
//! the queue until the broker accepts it.

use crate::connectivity::broker::MessageBroker;
use async_trait::async_trait;
use edge_bridge_models::Message;
use edge_bridge_repository::MessagePersistence;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause before retrying a failed head-of-queue publish.
const PUBLISH_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Narrow seam services use to emit messages; tests substitute fakes that
/// collect instead of publishing.
#[async_trait]
pub trait OutboundMessageHandler: Send + Sync {
    async fn add_message(&self, message: Message);
}

#[derive(Clone, Debug)]
struct QueuedMessage {
    persistence_id: Option<i64>,
    message: Message,
}

pub struct PublishingService {
    side: &'static str,
    broker: Arc<dyn MessageBroker>,
    persistence: Option<Arc<dyn MessagePersistence>>,
    queue: Mutex<VecDeque<QueuedMessage>>,
    connected: AtomicBool,
    wake: Notify,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PublishingService {
    pub fn new(
        side: &'static str,
        broker: Arc<dyn MessageBroker>,
        persistence: Option<Arc<dyn MessagePersistence>>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            side,
            broker,
            persistence,
            queue: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(false),
            wake: Notify::new(),
            cancel,
            worker: Mutex::new(None),
        })
    }

    /// Reload persisted messages and start the delivery worker.
    pub async fn start(self: &Arc<Self>) {
        if let Some(persistence) = &self.persistence {
            match persistence.load_all().await {
                Ok(pending) => {
                    if !pending.is_empty() {
                        info!(
                            side = self.side,
                            count = pending.len(),
                            "Restored pending outbound messages"
                        );
                    }
                    let mut queue = self.queue.lock().await;
                    for item in pending {
                        queue.push_back(QueuedMessage {
                            persistence_id: Some(item.id),
                            message: item.message,
                        });
                    }
                }
                Err(e) => error!(side = self.side, error = %e, "Failed to restore outbound queue"),
            }
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *self.worker.lock().await = Some(handle);
    }

    pub fn connected(&self) {
        self.connected.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    pub async fn stop(&self) {
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn run(self: Arc<Self>) {
        debug!(side = self.side, "Publishing worker started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.wake.notified() => {}
            }

            'drain: while self.connected.load(Ordering::Acquire) {
                if self.cancel.is_cancelled() {
                    return;
                }

                let head = { self.queue.lock().await.front().cloned() };
                let Some(item) = head else { break 'drain };

                if self.broker.publish(&item.message).await {
                    self.queue.lock().await.pop_front();
                    if let (Some(persistence), Some(id)) =
                        (&self.persistence, item.persistence_id)
                    {
                        if let Err(e) = persistence.remove(id).await {
                            error!(side = self.side, id, error = %e, "Failed to drop published message");
                        }
                    }
                } else {
                    // Head stays put; pause before retrying
                    warn!(side = self.side, channel = %item.message.channel, "Publish failed, retrying");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(PUBLISH_RETRY_DELAY) => {}
                    }
                }
            }
        }
        debug!(side = self.side, "Publishing worker stopped");
    }
}

#[async_trait]
impl crate::connectivity::supervisor::ConnectivityListener for PublishingService {
    async fn connected(&self) {
        PublishingService::connected(self);
    }

    async fn disconnected(&self) {
        PublishingService::disconnected(self);
    }
}

#[async_trait]
impl OutboundMessageHandler for PublishingService {
    async fn add_message(&self, message: Message) {
        let persistence_id = match &self.persistence {
            Some(persistence) => match persistence.push(&message).await {
                Ok(id) => Some(id),
                Err(e) => {
                    error!(side = self.side, error = %e, "Failed to persist outbound message");
                    None
                }
            },
            None => None,
        };

        self.queue.lock().await.push_back(QueuedMessage {
            persistence_id,
            message,
        });
        self.wake.notify_one();
    }
}
