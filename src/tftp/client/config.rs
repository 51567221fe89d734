use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use super::transfer::TransferOptions;

/// Well-known port servers accept requests on.
pub const DEFAULT_SERVER_PORT: u16 = 69;

/// TFTP client configuration
///
/// Can be built in code or loaded from a TOML file:
///
/// ```toml
/// server = "192.168.1.100"
/// mode = "octet"
/// timeout = "10s"
/// retries = 2
/// ```
///
/// # Example
///
/// ```rust
/// use tftpc::tftp::client::ClientConfig;
///
/// let config = ClientConfig::new("192.168.1.100").with_local_port(40000);
/// assert_eq!(config.server_port, 69);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Server hostname or literal IP address
    pub server: String,
    /// Port the initial request is sent to
    pub server_port: u16,
    /// Local TID; the OS picks an ephemeral port when unset
    pub local_port: Option<u16>,
    /// Transfer mode written verbatim into requests
    pub mode: String,
    /// How long to wait for each reply
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Retransmissions of the last packet after a timeout
    pub retries: u32,
    /// Datagrams from foreign TIDs tolerated while waiting for one reply
    pub max_stray: u32,
}

impl ClientConfig {
    /// Create a configuration for `server` with default settings
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            server_port: DEFAULT_SERVER_PORT,
            local_port: None,
            mode: "octet".to_string(),
            timeout: Duration::from_secs(10),
            retries: 0,
            max_stray: 32,
        }
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply command line values on top of this configuration
    pub fn merge_cli(
        mut self,
        server: String,
        server_port: Option<u16>,
        local_port: Option<u16>,
        mode: Option<String>,
        timeout: Option<Duration>,
        retries: Option<u32>,
    ) -> Self {
        self.server = server;
        self.server_port = server_port.unwrap_or(self.server_port);
        self.local_port = local_port.or(self.local_port);
        self.mode = mode.unwrap_or(self.mode);
        self.timeout = timeout.unwrap_or(self.timeout);
        self.retries = retries.unwrap_or(self.retries);
        self
    }

    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = Some(port);
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    /// Set timeout duration
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Settings consumed by the transfer state machine
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            server_port: self.server_port,
            timeout: self.timeout,
            retries: self.retries,
            max_stray: self.max_stray,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_client() {
        let config = ClientConfig::default();
        assert_eq!(config.server_port, 69);
        assert_eq!(config.mode, "octet");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retries, 0);
        assert_eq!(config.local_port, None);
    }

    #[test]
    fn parses_toml_with_humantime_timeout() {
        let config: ClientConfig = toml::from_str(
            r#"
            server = "tftp.example.org"
            local_port = 40123
            mode = "netascii"
            timeout = "1500ms"
            retries = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.server, "tftp.example.org");
        assert_eq!(config.server_port, 69);
        assert_eq!(config.local_port, Some(40123));
        assert_eq!(config.mode, "netascii");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.retries, 3);
        assert_eq!(config.max_stray, 32);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(toml::from_str::<ClientConfig>("blksize = 1024").is_err());
    }

    #[test]
    fn cli_values_override_file_values() {
        let file = ClientConfig::new("10.0.0.1")
            .with_mode("netascii")
            .with_retries(2)
            .with_local_port(5000);

        let merged = file.merge_cli(
            "10.0.0.2".to_string(),
            Some(6969),
            None,
            None,
            Some(Duration::from_secs(1)),
            None,
        );

        assert_eq!(merged.server, "10.0.0.2");
        assert_eq!(merged.server_port, 6969);
        assert_eq!(merged.local_port, Some(5000));
        assert_eq!(merged.mode, "netascii");
        assert_eq!(merged.timeout, Duration::from_secs(1));
        assert_eq!(merged.retries, 2);
    }

    #[test]
    fn loads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tftpc.toml");
        std::fs::write(&path, "server = \"192.168.1.110\"\ntimeout = \"2s\"\n").unwrap();

        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.server, "192.168.1.110");
        assert_eq!(config.timeout, Duration::from_secs(2));

        assert!(ClientConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
