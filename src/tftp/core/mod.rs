//! TFTP core protocol implementation
//!
//! This module contains the pieces shared by every transfer:
//! - `packet`: Packet serialization and deserialization
//! - `error`: Failure taxonomy surfaced to callers
//! - `socket`: Datagram transport abstraction
//! - `convert`: Byte conversion utilities

mod convert;
mod error;
pub mod packet;
mod socket;

// Public core types
pub use convert::Convert;
pub use error::TftpError;
pub use packet::{ErrorCode, MAX_DATA_LEN, Opcode, Packet, PacketError};
pub use socket::{Datagram, Transport, UdpTransport};
