pub mod checksum;
pub mod device;
pub mod host;
pub mod payment;
pub mod shape;

pub use crate::device::decoder::{ChecksumPolicy, MessageDecoder};
pub use crate::device::Message;
pub use crate::host::encoder::CommandEncoder;
pub use crate::host::Command;
pub use crate::payment::{PaymentRecord, RecordError, TollboothId, VehicleClassification};
pub use crate::shape::Kind;

/// Last byte of every frame, in both directions.
pub const TERMINATOR: u8 = 0x0D;
