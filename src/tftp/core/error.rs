use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::packet::{ErrorCode, PacketError};

/// Every way a transfer can fail.
///
/// All variants except [`TftpError::Server`] are observed locally; `Server`
/// carries an ERROR packet sent by the remote end.
#[derive(Debug, Error)]
pub enum TftpError {
    #[error("unable to bind socket to port {port}: {source}")]
    Bind { port: u16, source: io::Error },

    #[error("unable to resolve server hostname `{host}`: {source}")]
    Resolve { host: String, source: io::Error },

    #[error("unable to open local file {}: {source}", .path.display())]
    LocalFile { path: PathBuf, source: io::Error },

    #[error("unable to read from data source: {0}")]
    Source(#[source] io::Error),

    #[error("unable to write to data sink: {0}")]
    Sink(#[source] io::Error),

    #[error("unable to close output stream: {0}")]
    Close(#[source] io::Error),

    #[error("malformed reply from server: {0}")]
    Malformed(#[source] PacketError),

    #[error("unable to encode packet: {0}")]
    Encoding(#[source] PacketError),

    #[error("unable to transmit packet: {0}")]
    Transmit(#[source] io::Error),

    #[error("server timeout after {}", timeout_text(.0))]
    Timeout(Duration),

    #[error("protocol violation: expected {expected}, got {got}")]
    ProtocolViolation { expected: String, got: String },

    #[error("error response from server: {}", server_message(.code, .message))]
    Server { code: ErrorCode, message: String },
}

fn timeout_text(timeout: &Duration) -> String {
    humantime_serde::re::humantime::format_duration(*timeout).to_string()
}

fn server_message(code: &ErrorCode, message: &str) -> String {
    if message.is_empty() {
        code.default_message().to_string()
    } else {
        message.to_string()
    }
}

impl TftpError {
    /// The TFTP error code for this failure, `NotDefined` for local ones.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Server { code, .. } => *code,
            _ => ErrorCode::NotDefined,
        }
    }

    /// True when the failure was reported by the server.
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server { .. })
    }
}
