//! Device registration service.
//!
//! Rules:
//! 1. Child registration requests are forwarded to the platform only once
//!    the gateway itself is registered; earlier requests are postponed and
//!    flushed when the gateway registration succeeds.
//! 2. The gateway's own registration request is always forwarded.
//! 3. A request matching an already-registered device with the same
//!    template digest is dropped; a different digest is forwarded.
//! 4. A successful platform response persists the device and fires the
//!    `on_device_registered` callback.
//! 5. A platform `reregister` request fans out to every child device and
//!    is acknowledged toward the platform.
//! 6. `delete_devices_other_than` removes every non-kept device, sending a
//!    deletion request per removed device; removing the gateway removes
//!    everything.

use crate::publish::OutboundMessageHandler;
use edge_bridge_models::{
    Device, DeviceRegistrationRequest, DeviceRegistrationResponse, Message, RegistrationResult,
    SubdeviceManagement,
};
use edge_bridge_protocol::{topics::Topics, RegistrationProtocol};
use edge_bridge_repository::DeviceRepository;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Invoked after a device lands in the repository; the flag marks the
/// gateway itself.
pub type DeviceRegisteredCallback = Box<dyn Fn(&str, bool) + Send + Sync>;

pub struct DeviceRegistrationService {
    gateway_key: String,
    subdevice_management: SubdeviceManagement,
    repository: Arc<DeviceRepository>,
    platform_outbound: Arc<dyn OutboundMessageHandler>,
    device_outbound: Arc<dyn OutboundMessageHandler>,
    /// Requests forwarded to the platform, awaiting a response.
    pending: Mutex<HashMap<String, DeviceRegistrationRequest>>,
    /// Child requests received before the gateway was registered.
    postponed: Mutex<Vec<DeviceRegistrationRequest>>,
    on_registered: RwLock<Option<DeviceRegisteredCallback>>,
}

impl DeviceRegistrationService {
    pub fn new(
        gateway_key: impl Into<String>,
        subdevice_management: SubdeviceManagement,
        repository: Arc<DeviceRepository>,
        platform_outbound: Arc<dyn OutboundMessageHandler>,
        device_outbound: Arc<dyn OutboundMessageHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway_key: gateway_key.into(),
            subdevice_management,
            repository,
            platform_outbound,
            device_outbound,
            pending: Mutex::new(HashMap::new()),
            postponed: Mutex::new(Vec::new()),
            on_registered: RwLock::new(None),
        })
    }

    pub fn on_device_registered(&self, callback: DeviceRegisteredCallback) {
        *self.on_registered.write().unwrap() = Some(callback);
    }

    /// Registration request arriving on the device side.
    pub async fn device_message_received(&self, message: &Message) {
        let Some(request) = RegistrationProtocol::make_registration_request(message) else {
            warn!(channel = %message.channel, "Malformed registration request");
            return;
        };
        self.handle_registration_request(request).await;
    }

    /// Responses and reregistration requests arriving from the platform.
    pub async fn platform_message_received(&self, message: &Message) {
        if RegistrationProtocol::is_reregistration_request(message, &self.gateway_key) {
            self.handle_reregistration_request().await;
            return;
        }

        if RegistrationProtocol::is_registration_response(message) {
            let Some(device_key) = Topics::extract_device_key(&message.channel) else {
                warn!(channel = %message.channel, "Registration response without device key");
                return;
            };
            let Some(response) = RegistrationProtocol::make_registration_response(message) else {
                warn!(channel = %message.channel, "Malformed registration response");
                return;
            };
            self.handle_registration_response(device_key.to_string(), response)
                .await;
            return;
        }

        warn!(channel = %message.channel, "Unexpected registration channel");
    }

    /// Kick off the gateway's own registration from configuration.
    pub async fn register_gateway(&self, request: DeviceRegistrationRequest) {
        self.handle_registration_request(request).await;
    }

    /// Remove every device not in `keep`, announcing each removal to the
    /// platform. Removing the gateway removes all devices.
    pub async fn delete_devices_other_than(&self, keep: &[String]) {
        let keys = match self.repository.find_all_device_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Cannot list devices for deletion");
                return;
            }
        };

        let mut to_remove: Vec<String> = keys
            .iter()
            .filter(|key| !keep.contains(key))
            .cloned()
            .collect();

        if to_remove.iter().any(|key| key == &self.gateway_key) {
            // The gateway goes, everything goes
            to_remove = keys;
        }

        for key in to_remove {
            if let Err(e) = self.repository.remove(&key).await {
                warn!(device_key = %key, error = %e, "Failed to remove device");
                continue;
            }
            info!(device_key = %key, "Device deleted");
            self.platform_outbound
                .add_message(RegistrationProtocol::make_deletion_request_message(
                    &self.gateway_key,
                    &key,
                ))
                .await;
        }
    }

    async fn handle_registration_request(&self, request: DeviceRegistrationRequest) {
        let is_gateway = request.device_key == self.gateway_key;

        if !is_gateway {
            let gateway = match self.repository.find_by_device_key(&self.gateway_key).await {
                Ok(gateway) => gateway,
                Err(e) => {
                    warn!(error = %e, "Repository lookup failed, request dropped");
                    return;
                }
            };

            let Some(gateway) = gateway else {
                info!(
                    device_key = %request.device_key,
                    "Gateway not registered yet, postponing registration request"
                );
                self.postponed.lock().unwrap().push(request);
                return;
            };

            // A child must speak the gateway's data protocol
            if gateway.template.protocol != request.template.protocol {
                warn!(
                    device_key = %request.device_key,
                    device_protocol = %request.template.protocol,
                    gateway_protocol = %gateway.template.protocol,
                    "Protocol mismatch, registration request dropped"
                );
                return;
            }

            // Idempotence: identical template means nothing to do
            match self.repository.find_by_device_key(&request.device_key).await {
                Ok(Some(existing)) if existing.template.digest() == request.template.digest() => {
                    debug!(
                        device_key = %request.device_key,
                        "Device already registered with identical template"
                    );
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Repository lookup failed, request dropped");
                    return;
                }
            }
        }

        self.forward_to_platform(request).await;
    }

    async fn forward_to_platform(&self, request: DeviceRegistrationRequest) {
        let Some(message) =
            RegistrationProtocol::make_registration_request_message(&self.gateway_key, &request)
        else {
            warn!(device_key = %request.device_key, "Failed to build registration request");
            return;
        };

        info!(device_key = %request.device_key, "Forwarding registration request to platform");
        self.pending
            .lock()
            .unwrap()
            .insert(request.device_key.clone(), request);
        self.platform_outbound.add_message(message).await;
    }

    async fn handle_registration_response(
        &self,
        device_key: String,
        response: DeviceRegistrationResponse,
    ) {
        let request = self.pending.lock().unwrap().remove(&device_key);
        let Some(request) = request else {
            warn!(device_key = %device_key, "Registration response without pending request");
            return;
        };

        if response.result != RegistrationResult::Ok {
            warn!(
                device_key = %device_key,
                result = ?response.result,
                "Registration rejected by platform"
            );
            return;
        }

        let device = Device::new(request.device_key.clone(), String::new(), request.template);
        if let Err(e) = self.repository.save(&device).await {
            warn!(device_key = %device_key, error = %e, "Failed to persist registered device");
            return;
        }

        let is_gateway = device_key == self.gateway_key;
        info!(device_key = %device_key, is_gateway, "Device registered");

        if let Some(callback) = self.on_registered.read().unwrap().as_ref() {
            callback(&device_key, is_gateway);
        }

        if !is_gateway && self.subdevice_management == SubdeviceManagement::Gateway {
            // Tell the child directly instead of waiting for the platform
            if let Some(message) = RegistrationProtocol::make_device_registration_response_message(
                &device_key,
                &DeviceRegistrationResponse::ok(),
            ) {
                self.device_outbound.add_message(message).await;
            }
        }

        if is_gateway {
            self.flush_postponed().await;
        }
    }

    async fn flush_postponed(&self) {
        let postponed: Vec<_> = self.postponed.lock().unwrap().drain(..).collect();
        for request in postponed {
            debug!(device_key = %request.device_key, "Replaying postponed registration request");
            Box::pin(self.handle_registration_request(request)).await;
        }
    }

    async fn handle_reregistration_request(&self) {
        let keys = match self.repository.find_all_device_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Cannot list devices for reregistration");
                return;
            }
        };

        for key in keys.iter().filter(|key| *key != &self.gateway_key) {
            self.device_outbound
                .add_message(RegistrationProtocol::make_device_reregistration_request_message(key))
                .await;
        }

        if let Some(ack) = RegistrationProtocol::make_reregistration_ack_message(&self.gateway_key)
        {
            self.platform_outbound.add_message(ack).await;
        }
        info!(children = keys.len().saturating_sub(1), "Reregistration fan-out completed");
    }
}
