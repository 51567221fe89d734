//! TFTP (Trivial File Transfer Protocol) client
//!
//! Implements the lock-step transfer of [RFC 1350](https://www.rfc-editor.org/rfc/rfc1350)
//! TFTP Protocol version 2. Option negotiation (RFC 2347 and later) is not
//! supported; every transfer uses 512-byte blocks.
//!
//! ## Module Structure
//!
//! ```text
//! tftp/
//! ├── core/           # Core protocol implementation
//! │   ├── packet      # Packet serialization/deserialization
//! │   ├── error       # Failure taxonomy
//! │   ├── socket      # Datagram transport abstraction
//! │   └── convert     # Data conversion utilities
//! │
//! └── client/         # TFTP client
//!     ├── client      # File-level get/put
//!     ├── transfer    # Transfer state machine
//!     └── config      # Client configuration
//! ```
//!
//! ## Usage Examples
//!
//! ```rust,no_run
//! use tftpc::tftp::client::{Client, ClientConfig};
//! use std::path::Path;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = ClientConfig::new("192.168.1.110").with_mode("octet");
//! let written = Client::new(config)
//!     .put(Path::new("lab3.docx"), "lab3.docx")
//!     .await?;
//! println!("{} bytes written.", written);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod core;

use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use client::{Client, ClientConfig};

/// Download `remote` into `local`, returning the byte count
pub async fn run_get(config: ClientConfig, remote: &str, local: &Path) -> Result<u64> {
    info!(
        "GET {} from {}:{} ({})",
        remote, config.server, config.server_port, config.mode
    );

    let client = Client::new(config);
    let bytes = client
        .get(remote, local)
        .await
        .with_context(|| format!("Failed to retrieve {}", remote))?;
    Ok(bytes)
}

/// Upload `local` as `remote`, returning the byte count
pub async fn run_put(config: ClientConfig, local: &Path, remote: &str) -> Result<u64> {
    info!(
        "PUT {} to {}:{} ({})",
        remote, config.server, config.server_port, config.mode
    );

    let client = Client::new(config);
    let bytes = client
        .put(local, remote)
        .await
        .with_context(|| format!("Failed to send {}", local.display()))?;
    Ok(bytes)
}
