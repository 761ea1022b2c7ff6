//! Data service: bidirectional relay of readings, events, actuation and
//! configuration messages for one sub-protocol.
//!
//! Device-to-platform messages are validated against the repository (the
//! declaring device must be known and the referenced slot must belong to
//! its template) and re-routed onto the platform channel convention.
//! Platform-to-device messages are rewritten to the device convention.

use crate::publish::OutboundMessageHandler;
use crate::services::status::GatewayModuleConnectionListener;
use async_trait::async_trait;
use edge_bridge_models::Message;
use edge_bridge_protocol::{topics, DataProtocol};
use edge_bridge_repository::DeviceRepository;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DataService {
    gateway_key: String,
    device_repository: Arc<DeviceRepository>,
    platform_outbound: Arc<dyn OutboundMessageHandler>,
    device_outbound: Arc<dyn OutboundMessageHandler>,
}

impl DataService {
    pub fn new(
        gateway_key: impl Into<String>,
        device_repository: Arc<DeviceRepository>,
        platform_outbound: Arc<dyn OutboundMessageHandler>,
        device_outbound: Arc<dyn OutboundMessageHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway_key: gateway_key.into(),
            device_repository,
            platform_outbound,
            device_outbound,
        })
    }

    /// Command from the platform: rewrite to the device convention and
    /// forward to the local broker.
    pub async fn platform_message_received(&self, message: &Message) {
        let Some(channel) = DataProtocol::route_platform_to_device(&message.channel, &self.gateway_key)
        else {
            warn!(channel = %message.channel, "Cannot route platform message to device");
            return;
        };

        self.device_outbound
            .add_message(Message::new(channel, message.content.clone()))
            .await;
    }

    /// Data from a device: validate and forward to the platform.
    pub async fn device_message_received(&self, message: &Message) {
        let Some(device_key) = DataProtocol::extract_device_key(&message.channel) else {
            warn!(channel = %message.channel, "Device channel carries no device key");
            return;
        };

        let device = match self.device_repository.find_by_device_key(device_key).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                warn!(device_key, channel = %message.channel, "Message from unknown device dropped");
                return;
            }
            Err(e) => {
                warn!(device_key, error = %e, "Repository lookup failed, message dropped");
                return;
            }
        };

        if let Some(reference) = extract_reference(&message.channel) {
            if !device.template.has_reference(reference) {
                warn!(
                    device_key,
                    reference, "Reference not declared by device template, message dropped"
                );
                return;
            }
        }

        let Some(channel) = DataProtocol::route_device_to_platform(&message.channel, &self.gateway_key)
        else {
            warn!(channel = %message.channel, "Cannot route device message to platform");
            return;
        };

        self.platform_outbound
            .add_message(Message::new(channel, message.content.clone()))
            .await;
    }
}

#[async_trait]
impl GatewayModuleConnectionListener for DataService {
    /// The gateway's own module came online: ask it for fresh actuator
    /// values so the platform view converges.
    async fn gateway_module_connected(&self) {
        let gateway = match self
            .device_repository
            .find_by_device_key(&self.gateway_key)
            .await
        {
            Ok(Some(gateway)) => gateway,
            _ => {
                debug!("Gateway not registered yet, skipping actuator refresh");
                return;
            }
        };

        for actuator in &gateway.template.actuators {
            let channel = format!(
                "{}/{}/{}",
                topics::Topics::device(topics::P2D, topics::ACTUATOR_GET, &self.gateway_key),
                topics::REFERENCE_PATH_PREFIX,
                actuator.reference
            );
            self.device_outbound
                .add_message(Message::new(channel, &b"{}"[..]))
                .await;
        }
    }
}

/// Reference level of a channel: the level following the `r` marker.
fn extract_reference(channel: &str) -> Option<&str> {
    let mut parts = channel.split(topics::CHANNEL_DELIMITER);
    while let Some(part) = parts.next() {
        if part == topics::REFERENCE_PATH_PREFIX {
            return parts.next();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::CollectingOutbound;
    use edge_bridge_models::{DataType, Device, DeviceTemplate, SensorManifest};

    fn template_with_sensor(reference: &str) -> DeviceTemplate {
        let mut template = DeviceTemplate::new("Dev", "", "json", "dfu");
        template.sensors.push(SensorManifest {
            reference: reference.to_string(),
            name: "Sensor".to_string(),
            description: String::new(),
            unit: String::new(),
            reading_type: String::new(),
            data_type: DataType::Numeric,
            precision: 0,
            minimum: 0.0,
            maximum: 100.0,
            delimiter: String::new(),
            labels: Vec::new(),
        });
        template
    }

    async fn service() -> (Arc<DataService>, Arc<CollectingOutbound>, Arc<CollectingOutbound>) {
        let conn = edge_bridge_storage::open_in_memory().await.unwrap();
        let repo = Arc::new(DeviceRepository::new(conn));
        repo.save(&Device::new("X", "", template_with_sensor("T")))
            .await
            .unwrap();

        let platform = CollectingOutbound::new();
        let device = CollectingOutbound::new();
        let service = DataService::new("GW", repo, platform.clone(), device.clone());
        (service, platform, device)
    }

    #[tokio::test]
    async fn known_device_reading_is_forwarded_with_gateway_prefix() {
        let (service, platform, _) = service().await;

        let msg = Message::new("d2p/sensor_reading/d/X/r/T", &br#"{"reference":"T","values":["1"]}"#[..]);
        service.device_message_received(&msg).await;

        let out = platform.messages();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].channel, "d2p/sensor_reading/g/GW/d/X/r/T");
        assert_eq!(out[0].content, msg.content);
    }

    #[tokio::test]
    async fn unknown_device_is_dropped() {
        let (service, platform, _) = service().await;

        let msg = Message::new("d2p/sensor_reading/d/ghost/r/T", &b"{}"[..]);
        service.device_message_received(&msg).await;

        assert!(platform.messages().is_empty());
    }

    #[tokio::test]
    async fn undeclared_reference_is_dropped() {
        let (service, platform, _) = service().await;

        let msg = Message::new("d2p/sensor_reading/d/X/r/bogus", &b"{}"[..]);
        service.device_message_received(&msg).await;

        assert!(platform.messages().is_empty());
    }

    #[tokio::test]
    async fn platform_command_is_rewritten_to_device_convention() {
        let (service, _, device) = service().await;

        let msg = Message::new("p2d/actuator_set/g/GW/d/X/r/sw", &br#"{"value":"true"}"#[..]);
        service.platform_message_received(&msg).await;

        let out = device.messages();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].channel, "p2d/actuator_set/d/X/r/sw");
    }

    #[tokio::test]
    async fn foreign_gateway_command_is_dropped() {
        let (service, _, device) = service().await;

        let msg = Message::new("p2d/actuator_set/g/OTHER/d/X/r/sw", &b"{}"[..]);
        service.platform_message_received(&msg).await;

        assert!(device.messages().is_empty());
    }
}
