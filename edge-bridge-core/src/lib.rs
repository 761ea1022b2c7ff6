pub mod bridge;
pub mod command;
pub mod connectivity;
pub mod publish;
pub mod services;

pub use bridge::EdgeBridge;
pub use command::CommandBuffer;
pub use connectivity::broker::{BrokerEvent, MessageBroker};
pub use connectivity::mqtt::{MqttBroker, MqttBrokerConfig};
pub use publish::{OutboundMessageHandler, PublishingService};
pub use services::firmware::{FirmwareInstaller, UrlFileDownloader};
