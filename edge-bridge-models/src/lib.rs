pub mod device;
pub mod entities;
pub mod firmware;
pub mod message;
pub mod registration;
pub mod settings;
pub mod status;
pub mod telemetry;
pub mod transfer;

pub use device::{
    ActuatorManifest, AlarmManifest, AlarmSeverity, ConfigurationManifest, DataType, Device,
    DeviceTemplate, SensorManifest,
};
pub use firmware::{
    FirmwareUpdateCommand, FirmwareUpdateCommandType, FirmwareUpdateState, FirmwareUpdateStatus,
};
pub use message::Message;
pub use registration::{DeviceRegistrationRequest, DeviceRegistrationResponse, RegistrationResult};
pub use settings::{GatewayConfig, SubdeviceManagement, ValueGenerator};
pub use status::DeviceState;
pub use telemetry::{ActuatorState, ActuatorStatus, Alarm, ConfigurationItem, Reading};
pub use transfer::{
    BinaryData, FileDelete, FileInfo, FileList, FilePacketRequest, FileTransferError,
    FileTransferStatus, FileUploadAbort, FileUploadInitiate, FileUploadStatus,
};
