//! Device status service.
//!
//! Tracks online state of each child device from broker-level presence
//! messages (status reports and last wills) and forwards them to the
//! platform. The gateway's own module status is special-cased: its
//! transitions are surfaced to an optional listener so the data service
//! can refresh actuator state after a module reconnect.

use crate::connectivity::supervisor::ConnectivityListener;
use crate::publish::OutboundMessageHandler;
use async_trait::async_trait;
use dashmap::DashMap;
use edge_bridge_models::{DeviceState, Message};
use edge_bridge_protocol::StatusProtocol;
use edge_bridge_repository::DeviceRepository;
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, info, warn};

/// Hook fired when the gateway's own module comes online.
#[async_trait]
pub trait GatewayModuleConnectionListener: Send + Sync {
    async fn gateway_module_connected(&self);
}

pub struct DeviceStatusService {
    gateway_key: String,
    repository: Arc<DeviceRepository>,
    platform_outbound: Arc<dyn OutboundMessageHandler>,
    device_outbound: Arc<dyn OutboundMessageHandler>,
    statuses: DashMap<String, DeviceState>,
    gateway_module_listener: RwLock<Option<Weak<dyn GatewayModuleConnectionListener>>>,
}

impl DeviceStatusService {
    pub fn new(
        gateway_key: impl Into<String>,
        repository: Arc<DeviceRepository>,
        platform_outbound: Arc<dyn OutboundMessageHandler>,
        device_outbound: Arc<dyn OutboundMessageHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway_key: gateway_key.into(),
            repository,
            platform_outbound,
            device_outbound,
            statuses: DashMap::new(),
            gateway_module_listener: RwLock::new(None),
        })
    }

    pub fn set_gateway_module_connection_listener(
        &self,
        listener: Weak<dyn GatewayModuleConnectionListener>,
    ) {
        *self.gateway_module_listener.write().unwrap() = Some(listener);
    }

    pub fn device_state(&self, device_key: &str) -> Option<DeviceState> {
        self.statuses.get(device_key).map(|entry| *entry.value())
    }

    /// Ask one child device for its current status.
    pub async fn request_device_status(&self, device_key: &str) {
        self.device_outbound
            .add_message(StatusProtocol::make_device_status_request_message(device_key))
            .await;
    }

    /// Status reports and last wills from the device side.
    pub async fn device_message_received(&self, message: &Message) {
        if StatusProtocol::is_lastwill_message(message) {
            let Some(device_key) = StatusProtocol::extract_device_key(&message.channel) else {
                warn!(channel = %message.channel, "Last will without device key");
                return;
            };
            info!(device_key, "Device went offline");
            self.update_and_forward(device_key.to_string(), DeviceState::Offline)
                .await;
            return;
        }

        if StatusProtocol::is_status_message(message) {
            let Some(device_key) = StatusProtocol::extract_device_key(&message.channel) else {
                warn!(channel = %message.channel, "Status report without device key");
                return;
            };
            let Some(status) = StatusProtocol::make_device_status(message) else {
                return;
            };
            self.update_and_forward(device_key.to_string(), status.state)
                .await;
            return;
        }

        warn!(channel = %message.channel, "Unexpected status channel");
    }

    /// Status requests from the platform: answer from the cache, or fan
    /// the request out to the device when nothing is cached yet.
    pub async fn platform_message_received(&self, message: &Message) {
        let Some(device_key) = StatusProtocol::extract_device_key(&message.channel) else {
            warn!(channel = %message.channel, "Status request without device key");
            return;
        };

        match self.device_state(device_key) {
            Some(state) => {
                if let Some(out) =
                    StatusProtocol::make_status_message(&self.gateway_key, device_key, state)
                {
                    self.platform_outbound.add_message(out).await;
                }
            }
            None => {
                self.device_outbound
                    .add_message(StatusProtocol::make_device_status_request_message(device_key))
                    .await;
            }
        }
    }

    async fn update_and_forward(&self, device_key: String, state: DeviceState) {
        let is_gateway_module = device_key == self.gateway_key;
        let previous = self.statuses.insert(device_key.clone(), state);

        if is_gateway_module
            && state == DeviceState::Connected
            && previous != Some(DeviceState::Connected)
        {
            let listener = self
                .gateway_module_listener
                .read()
                .unwrap()
                .as_ref()
                .and_then(Weak::upgrade);
            if let Some(listener) = listener {
                debug!("Gateway module connected, notifying listener");
                listener.gateway_module_connected().await;
            }
        }

        if let Some(out) = StatusProtocol::make_status_message(&self.gateway_key, &device_key, state)
        {
            self.platform_outbound.add_message(out).await;
        }
    }
}

#[async_trait]
impl ConnectivityListener for DeviceStatusService {
    /// Device broker came up: ask every known child for its status.
    async fn connected(&self) {
        let keys = match self.repository.find_all_device_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Cannot list devices for status refresh");
                return;
            }
        };

        for key in keys.iter().filter(|key| *key != &self.gateway_key) {
            self.device_outbound
                .add_message(StatusProtocol::make_device_status_request_message(key))
                .await;
        }
    }

    /// Device broker lost: everything local is unreachable.
    async fn disconnected(&self) {
        let keys: Vec<String> = self
            .statuses
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            self.statuses.insert(key, DeviceState::Offline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::CollectingOutbound;
    use edge_bridge_models::{Device, DeviceTemplate};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixture {
        service: Arc<DeviceStatusService>,
        platform: Arc<CollectingOutbound>,
        device: Arc<CollectingOutbound>,
        repository: Arc<DeviceRepository>,
    }

    async fn fixture() -> Fixture {
        let conn = edge_bridge_storage::open_in_memory().await.unwrap();
        let repository = Arc::new(DeviceRepository::new(conn));
        let platform = CollectingOutbound::new();
        let device = CollectingOutbound::new();
        let service =
            DeviceStatusService::new("GW", repository.clone(), platform.clone(), device.clone());
        Fixture {
            service,
            platform,
            device,
            repository,
        }
    }

    #[tokio::test]
    async fn status_report_is_cached_and_forwarded() {
        let f = fixture().await;

        let msg = StatusProtocol::make_status_message("GW", "X", DeviceState::Connected).unwrap();
        // Rewrite to the device-side channel shape
        let msg = Message::new("d2p/status/d/X", msg.content);
        f.service.device_message_received(&msg).await;

        assert_eq!(f.service.device_state("X"), Some(DeviceState::Connected));
        let out = f.platform.messages();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].channel, "d2p/status/g/GW/d/X");
    }

    #[tokio::test]
    async fn lastwill_marks_device_offline() {
        let f = fixture().await;

        let msg = Message::new("d2p/lastwill/d/X", StatusProtocol::lastwill_payload());
        f.service.device_message_received(&msg).await;

        assert_eq!(f.service.device_state("X"), Some(DeviceState::Offline));
        assert_eq!(f.platform.len(), 1);
    }

    #[tokio::test]
    async fn platform_request_is_served_from_cache_or_fanned_out() {
        let f = fixture().await;

        // Nothing cached: request travels to the device side
        let request = Message::new("p2d/status/g/GW/d/X", &b"{}"[..]);
        f.service.platform_message_received(&request).await;
        assert_eq!(f.device.len(), 1);
        assert!(f.platform.messages().is_empty());

        // Cached: answered directly
        let report = Message::new(
            "d2p/status/d/X",
            StatusProtocol::make_status_message("GW", "X", DeviceState::Connected)
                .unwrap()
                .content,
        );
        f.service.device_message_received(&report).await;
        f.platform.clear();

        f.service.platform_message_received(&request).await;
        assert_eq!(f.platform.len(), 1);
        assert!(f.device.len() == 1);
    }

    #[tokio::test]
    async fn gateway_module_connect_fires_listener_once_per_transition() {
        let f = fixture().await;

        struct Counter(AtomicU32);
        #[async_trait]
        impl GatewayModuleConnectionListener for Counter {
            async fn gateway_module_connected(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counter(AtomicU32::new(0)));
        f.service.set_gateway_module_connection_listener(Arc::downgrade(
            &(counter.clone() as Arc<dyn GatewayModuleConnectionListener>),
        ));

        let connected = Message::new(
            "d2p/status/d/GW",
            StatusProtocol::make_status_message("GW", "GW", DeviceState::Connected)
                .unwrap()
                .content,
        );
        f.service.device_message_received(&connected).await;
        f.service.device_message_received(&connected).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        let offline = Message::new("d2p/lastwill/d/GW", StatusProtocol::lastwill_payload());
        f.service.device_message_received(&offline).await;
        f.service.device_message_received(&connected).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn broker_connect_requests_child_statuses() {
        let f = fixture().await;
        f.repository
            .save(&Device::new(
                "GW",
                "",
                DeviceTemplate::new("GW", "", "json", "dfu"),
            ))
            .await
            .unwrap();
        f.repository
            .save(&Device::new(
                "C",
                "",
                DeviceTemplate::new("C", "", "json", "dfu"),
            ))
            .await
            .unwrap();

        f.service.connected().await;

        let out = f.device.messages();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].channel, "p2d/status/d/C");
    }
}
