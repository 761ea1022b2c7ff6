//! Keep-alive service.
//!
//! Publishes a ping on a fixed period while the platform connection is
//! up. Each pong carries the platform clock; the last value is kept for
//! server-stamped readings.

use crate::connectivity::supervisor::ConnectivityListener;
use crate::publish::OutboundMessageHandler;
use async_trait::async_trait;
use edge_bridge_models::Message;
use edge_bridge_protocol::KeepAliveProtocol;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(60);

pub struct KeepAliveService {
    gateway_key: String,
    platform_outbound: Arc<dyn OutboundMessageHandler>,
    interval: Duration,
    online: AtomicBool,
    /// Zero until the first pong arrives.
    last_platform_timestamp: AtomicU64,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl KeepAliveService {
    pub fn new(
        gateway_key: impl Into<String>,
        platform_outbound: Arc<dyn OutboundMessageHandler>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway_key: gateway_key.into(),
            platform_outbound,
            interval,
            online: AtomicBool::new(false),
            last_platform_timestamp: AtomicU64::new(0),
            cancel,
            worker: Mutex::new(None),
        })
    }

    /// Spawn the periodic ping task.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if this.online.load(Ordering::Acquire) {
                            this.send_ping().await;
                        }
                    }
                }
            }
        });
        *self.worker.lock().unwrap() = Some(handle);
    }

    pub async fn stop(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub async fn platform_message_received(&self, message: &Message) {
        if !KeepAliveProtocol::is_pong_message(message, &self.gateway_key) {
            return;
        }
        if let Some(timestamp) = KeepAliveProtocol::make_pong_timestamp(message) {
            debug!(timestamp, "Platform time received");
            self.last_platform_timestamp
                .store(timestamp, Ordering::Release);
        }
    }

    /// Last platform timestamp, if any pong has arrived yet.
    pub fn last_platform_timestamp(&self) -> Option<u64> {
        match self.last_platform_timestamp.load(Ordering::Acquire) {
            0 => None,
            ts => Some(ts),
        }
    }

    async fn send_ping(&self) {
        self.platform_outbound
            .add_message(KeepAliveProtocol::make_ping_message(&self.gateway_key))
            .await;
    }
}

#[async_trait]
impl ConnectivityListener for KeepAliveService {
    async fn connected(&self) {
        self.online.store(true, Ordering::Release);
        // Immediate ping so the platform learns of us without waiting a period
        self.send_ping().await;
    }

    async fn disconnected(&self) {
        self.online.store(false, Ordering::Release);
    }
}
