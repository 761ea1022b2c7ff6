pub mod device;
pub mod file;
pub mod outbound;

pub use device::DeviceRepository;
pub use file::FileRepository;
pub use outbound::{MessagePersistence, OutboundMessageStore, PersistedMessage};
