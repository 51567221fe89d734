//! TFTP client implementation
//!
//! - `client`: File-level get/put over a fresh UDP socket
//! - `transfer`: Lock-step transfer state machine
//! - `config`: Client configuration

#[allow(clippy::module_inception)]
mod client;
mod config;
mod transfer;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_SERVER_PORT};
pub use transfer::{Transfer, TransferOptions, TransferSession, TransferState};
