//! Root coordinator.
//!
//! Owns both broker sides and every service, constructed in dependency
//! order: repositories, command buffers, publishers, data services, then
//! the higher services. Services reach each other only through narrow
//! capability traits and weak references; the owning references all live
//! here.

use crate::command::CommandBuffer;
use crate::connectivity::broker::MessageBroker;
use crate::connectivity::inbound::{InboundMessageHandler, ListenerFuture, MessageListener};
use crate::connectivity::supervisor::{ConnectionSupervisor, ConnectivityListener};
use crate::publish::{OutboundMessageHandler, PublishingService};
use crate::services::data::DataService;
use crate::services::file_download::FileDownloadService;
use crate::services::firmware::{FirmwareInstaller, FirmwareUpdateService, UrlFileDownloader};
use crate::services::keepalive::{KeepAliveService, DEFAULT_PING_INTERVAL};
use crate::services::registration::DeviceRegistrationService;
use crate::services::resolver::ChannelProtocolResolver;
use crate::services::status::{DeviceStatusService, GatewayModuleConnectionListener};
use edge_bridge_error::BridgeResult;
use edge_bridge_models::{
    ActuatorState, ActuatorStatus, Alarm, DeviceRegistrationRequest, DeviceTemplate,
    GatewayConfig, Message, Reading,
};
use edge_bridge_protocol::{
    topics, topics::Topics, DataProtocol, DfuProtocol, FileTransferProtocol, KeepAliveProtocol,
    RegistrationProtocol, StatusProtocol,
};
use edge_bridge_repository::{
    DeviceRepository, FileRepository, MessagePersistence, OutboundMessageStore,
};
use sea_orm::DatabaseConnection;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BridgeState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// Wrap a service method as an inbound listener holding a weak reference.
macro_rules! route_to {
    ($service:expr, $method:ident) => {{
        let weak = Arc::downgrade(&$service);
        Arc::new(move |message: Message| -> ListenerFuture {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(service) = weak.upgrade() {
                    service.$method(&message).await;
                }
            })
        }) as MessageListener
    }};
}

pub struct EdgeBridge {
    gateway_key: String,
    manifest: DeviceTemplate,
    state: RwLock<BridgeState>,
    cancel: CancellationToken,

    device_repository: Arc<DeviceRepository>,

    platform_command_buffer: Arc<CommandBuffer>,
    device_command_buffer: Arc<CommandBuffer>,

    platform_publisher: Arc<PublishingService>,
    device_publisher: Arc<PublishingService>,

    platform_supervisor: Arc<ConnectionSupervisor>,
    device_supervisor: Arc<ConnectionSupervisor>,

    platform_broker: Arc<dyn MessageBroker>,
    device_broker: Arc<dyn MessageBroker>,

    /// Kept alive here; the dispatch layer only holds weak references.
    #[allow(dead_code)]
    data_service: Arc<DataService>,
    #[allow(dead_code)]
    resolver: Arc<ChannelProtocolResolver>,
    registration_service: Arc<DeviceRegistrationService>,
    #[allow(dead_code)]
    status_service: Arc<DeviceStatusService>,
    keep_alive_service: Option<Arc<KeepAliveService>>,
    file_download_service: Arc<FileDownloadService>,
    firmware_update_service: Arc<FirmwareUpdateService>,
}

impl EdgeBridge {
    pub async fn init(
        config: &GatewayConfig,
        conn: DatabaseConnection,
        platform_broker: Arc<dyn MessageBroker>,
        device_broker: Arc<dyn MessageBroker>,
        installer: Arc<dyn FirmwareInstaller>,
        url_downloader: Option<Arc<dyn UrlFileDownloader>>,
        firmware_version: impl Into<String>,
    ) -> BridgeResult<Arc<Self>> {
        let gateway_key = config.key.clone();
        let firmware_version = firmware_version.into();
        let cancel = CancellationToken::new();

        // Repositories
        let device_repository = Arc::new(DeviceRepository::new(conn.clone()));
        let file_repository = Arc::new(FileRepository::new(conn.clone()));
        let outbound_store = Arc::new(OutboundMessageStore::new(conn));

        // Command buffers, one consumer per side
        let platform_command_buffer =
            Arc::new(CommandBuffer::new("platform", cancel.child_token()));
        let device_command_buffer = Arc::new(CommandBuffer::new("device", cancel.child_token()));

        // Publishers; only the platform side persists its queue
        let platform_publisher = PublishingService::new(
            "platform",
            Arc::clone(&platform_broker),
            Some(outbound_store as Arc<dyn MessagePersistence>),
            cancel.child_token(),
        );
        let device_publisher = PublishingService::new(
            "device",
            Arc::clone(&device_broker),
            None,
            cancel.child_token(),
        );
        platform_publisher.start().await;
        device_publisher.start().await;

        let platform_outbound: Arc<dyn OutboundMessageHandler> = platform_publisher.clone();
        let device_outbound: Arc<dyn OutboundMessageHandler> = device_publisher.clone();

        // Data plane
        let data_service = DataService::new(
            gateway_key.clone(),
            Arc::clone(&device_repository),
            Arc::clone(&platform_outbound),
            Arc::clone(&device_outbound),
        );
        let resolver = ChannelProtocolResolver::new();
        resolver.register(
            DataProtocol::NAME,
            DataProtocol::owns_channel,
            Arc::clone(&data_service),
        );

        // Higher services
        let registration_service = DeviceRegistrationService::new(
            gateway_key.clone(),
            config.subdevice_management,
            Arc::clone(&device_repository),
            Arc::clone(&platform_outbound),
            Arc::clone(&device_outbound),
        );
        let status_service = DeviceStatusService::new(
            gateway_key.clone(),
            Arc::clone(&device_repository),
            Arc::clone(&platform_outbound),
            Arc::clone(&device_outbound),
        );
        status_service.set_gateway_module_connection_listener(Arc::downgrade(
            &(Arc::clone(&data_service) as Arc<dyn GatewayModuleConnectionListener>),
        ));

        let keep_alive_service = config.keep_alive.then(|| {
            KeepAliveService::new(
                gateway_key.clone(),
                Arc::clone(&platform_outbound),
                DEFAULT_PING_INTERVAL,
                cancel.child_token(),
            )
        });

        let file_download_service = FileDownloadService::new(
            gateway_key.clone(),
            config.max_file_size,
            config.max_packet_size,
            config.file_download_directory.clone(),
            Arc::clone(&platform_outbound),
            Arc::clone(&file_repository),
            cancel.child_token(),
        );
        file_download_service.start();

        let firmware_update_service = FirmwareUpdateService::new(
            gateway_key.clone(),
            firmware_version,
            config.file_download_directory.clone(),
            Arc::clone(&platform_outbound),
            Arc::clone(&device_outbound),
            Arc::clone(&file_repository),
            installer,
            url_downloader,
        );

        // Newly registered children get an immediate status probe
        {
            let status = Arc::downgrade(&status_service);
            registration_service.on_device_registered(Box::new(move |device_key, is_gateway| {
                if is_gateway {
                    return;
                }
                if let Some(status) = status.upgrade() {
                    let device_key = device_key.to_string();
                    tokio::spawn(async move {
                        status.request_device_status(&device_key).await;
                    });
                }
            }));
        }

        // Inbound dispatch: registration order is match priority
        let platform_inbound = Arc::new(InboundMessageHandler::new(
            "platform",
            Arc::clone(&platform_command_buffer),
        ));
        for channel in FileTransferProtocol::inbound_platform_channels(&gateway_key) {
            platform_inbound.add_listener(
                channel,
                route_to!(file_download_service, platform_message_received),
            );
        }
        for channel in DfuProtocol::inbound_platform_channels(&gateway_key) {
            platform_inbound.add_listener(
                channel,
                route_to!(firmware_update_service, platform_message_received),
            );
        }
        for channel in RegistrationProtocol::inbound_platform_channels(&gateway_key) {
            platform_inbound.add_listener(
                channel,
                route_to!(registration_service, platform_message_received),
            );
        }
        if let Some(keep_alive) = &keep_alive_service {
            for channel in KeepAliveProtocol::inbound_platform_channels(&gateway_key) {
                platform_inbound
                    .add_listener(channel, route_to!(keep_alive, platform_message_received));
            }
        }
        for channel in StatusProtocol::inbound_platform_channels(&gateway_key) {
            platform_inbound
                .add_listener(channel, route_to!(status_service, platform_message_received));
        }
        for channel in DataProtocol::inbound_platform_channels(&gateway_key) {
            platform_inbound.add_listener(channel, route_to!(resolver, platform_message_received));
        }

        let device_inbound = Arc::new(InboundMessageHandler::new(
            "device",
            Arc::clone(&device_command_buffer),
        ));
        for channel in RegistrationProtocol::inbound_device_channels() {
            device_inbound.add_listener(
                channel,
                route_to!(registration_service, device_message_received),
            );
        }
        for channel in DfuProtocol::inbound_device_channels() {
            device_inbound.add_listener(
                channel,
                route_to!(firmware_update_service, device_message_received),
            );
        }
        for channel in StatusProtocol::inbound_device_channels() {
            device_inbound
                .add_listener(channel, route_to!(status_service, device_message_received));
        }
        for channel in DataProtocol::inbound_device_channels() {
            device_inbound.add_listener(channel, route_to!(resolver, device_message_received));
        }

        // Supervisors with their connectivity listeners
        let platform_supervisor = ConnectionSupervisor::new(
            "platform",
            Arc::clone(&platform_broker),
            platform_inbound,
            cancel.child_token(),
        );
        platform_supervisor
            .add_listener(Arc::clone(&platform_publisher) as Arc<dyn ConnectivityListener>);
        if let Some(keep_alive) = &keep_alive_service {
            platform_supervisor
                .add_listener(Arc::clone(keep_alive) as Arc<dyn ConnectivityListener>);
        }

        let device_supervisor = ConnectionSupervisor::new(
            "device",
            Arc::clone(&device_broker),
            device_inbound,
            cancel.child_token(),
        );
        device_supervisor
            .add_listener(Arc::clone(&device_publisher) as Arc<dyn ConnectivityListener>);
        device_supervisor
            .add_listener(Arc::clone(&status_service) as Arc<dyn ConnectivityListener>);

        if let Some(keep_alive) = &keep_alive_service {
            keep_alive.start();
        }

        info!(gateway_key = %gateway_key, "EdgeBridge initialized");

        Ok(Arc::new(Self {
            gateway_key,
            manifest: config.manifest.clone(),
            state: RwLock::new(BridgeState::Created),
            cancel,
            device_repository,
            platform_command_buffer,
            device_command_buffer,
            platform_publisher,
            device_publisher,
            platform_supervisor,
            device_supervisor,
            platform_broker,
            device_broker,
            data_service,
            resolver,
            registration_service,
            status_service,
            keep_alive_service,
            file_download_service,
            firmware_update_service,
        }))
    }

    /// Bring both sides up and announce the gateway: registration request,
    /// firmware version, pending-installation verification.
    pub async fn connect(self: &Arc<Self>) {
        {
            let mut state = self.state.write().unwrap();
            if *state == BridgeState::Running {
                warn!("Bridge already running");
                return;
            }
            *state = BridgeState::Running;
        }

        self.platform_supervisor.start();
        self.device_supervisor.start();

        let request = DeviceRegistrationRequest::new(
            self.manifest.name.clone(),
            self.gateway_key.clone(),
            self.manifest.clone(),
        );
        self.registration_service.register_gateway(request).await;

        self.firmware_update_service.report_version().await;
    }

    pub async fn stop(&self) {
        {
            let mut state = self.state.write().unwrap();
            match *state {
                BridgeState::Stopped | BridgeState::Stopping => {
                    warn!("Bridge already stopping");
                    return;
                }
                _ => *state = BridgeState::Stopping,
            }
        }

        self.cancel.cancel();

        self.platform_supervisor.stop().await;
        self.device_supervisor.stop().await;
        self.platform_publisher.stop().await;
        self.device_publisher.stop().await;
        self.platform_command_buffer.stop().await;
        self.device_command_buffer.stop().await;
        self.file_download_service.stop().await;
        if let Some(keep_alive) = &self.keep_alive_service {
            keep_alive.stop().await;
        }

        self.platform_broker.disconnect().await;
        self.device_broker.disconnect().await;

        *self.state.write().unwrap() = BridgeState::Stopped;
        info!("EdgeBridge stopped");
    }

    /// Publish a reading of the gateway's own module. Timestamp zero means
    /// the platform stamps the reading on arrival.
    pub async fn add_sensor_reading(&self, reference: &str, values: Vec<String>, timestamp: u64) {
        let reading = Reading {
            reference: reference.to_string(),
            timestamp,
            values,
        };
        self.publish_own(topics::SENSOR_READING, reference, &reading)
            .await;
    }

    /// Publish an actuator status of the gateway's own module.
    pub async fn add_actuator_status(&self, reference: &str, value: &str, state: ActuatorState) {
        let status = ActuatorStatus {
            reference: reference.to_string(),
            value: value.to_string(),
            state,
        };
        self.publish_own(topics::ACTUATOR_STATUS, reference, &status)
            .await;
    }

    /// Publish an alarm event of the gateway's own module.
    pub async fn add_alarm(&self, reference: &str, active: bool, timestamp: u64) {
        let alarm = Alarm {
            reference: reference.to_string(),
            timestamp,
            active,
        };
        self.publish_own(topics::EVENTS, reference, &alarm).await;
    }

    pub fn device_repository(&self) -> Arc<DeviceRepository> {
        Arc::clone(&self.device_repository)
    }

    pub fn registration_service(&self) -> Arc<DeviceRegistrationService> {
        Arc::clone(&self.registration_service)
    }

    /// Platform clock from the last keep-alive pong, when enabled.
    pub fn platform_timestamp(&self) -> Option<u64> {
        self.keep_alive_service
            .as_ref()
            .and_then(|service| service.last_platform_timestamp())
    }

    async fn publish_own<T: serde::Serialize>(&self, kind: &str, reference: &str, payload: &T) {
        let channel = format!(
            "{}/{}/{}",
            Topics::gateway_device(topics::D2P, kind, &self.gateway_key, &self.gateway_key),
            topics::REFERENCE_PATH_PREFIX,
            reference
        );
        match serde_json::to_vec(payload) {
            Ok(content) => {
                self.platform_publisher
                    .add_message(Message::new(channel, content))
                    .await
            }
            Err(e) => warn!(reference, error = %e, "Failed to serialize payload"),
        }
    }
}
