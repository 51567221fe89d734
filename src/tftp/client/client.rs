use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use super::config::ClientConfig;
use super::transfer::Transfer;
use crate::tftp::core::{TftpError, Transport, UdpTransport};

/// TFTP client
///
/// Supports file upload (PUT) and download (GET) operations. Each call binds
/// its own UDP socket and releases it when the transfer ends.
///
/// # Example
///
/// ```rust,no_run
/// use tftpc::tftp::client::{Client, ClientConfig};
/// use std::path::Path;
///
/// # async fn demo() -> Result<(), tftpc::tftp::core::TftpError> {
/// let client = Client::new(ClientConfig::new("192.168.1.100"));
///
/// // Download file
/// client.get("remote.txt", Path::new("local.txt")).await?;
///
/// // Upload file
/// client.put(Path::new("local.txt"), "remote.txt").await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
}

impl Client {
    /// Create a new TFTP client
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Download a file from the server (RRQ - Read Request)
    ///
    /// The local file is removed again if the transfer or closing it fails.
    ///
    /// # Arguments
    ///
    /// * `remote_file` - File name on the server
    /// * `local_file` - Local save path
    pub async fn get(&self, remote_file: &str, local_file: &Path) -> Result<u64, TftpError> {
        log::info!("Downloading {} to {}", remote_file, local_file.display());

        let file = File::create(local_file)
            .await
            .map_err(|source| TftpError::LocalFile {
                path: local_file.to_path_buf(),
                source,
            })?;

        let mut writer = BufWriter::new(file);
        let mut result = self.get_to(remote_file, &mut writer).await;
        if result.is_ok() {
            if let Err(source) = writer.shutdown().await {
                result = Err(TftpError::Close(source));
            }
        }
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(local_file).await {
                log::warn!("Failed to remove partial file {}: {}", local_file.display(), e);
            }
        }
        result
    }

    /// Upload a file to the server (WRQ - Write Request)
    ///
    /// # Arguments
    ///
    /// * `local_file` - Local file path
    /// * `remote_file` - File name on the server
    pub async fn put(&self, local_file: &Path, remote_file: &str) -> Result<u64, TftpError> {
        log::info!("Uploading {} to {}", local_file.display(), remote_file);

        let file = File::open(local_file)
            .await
            .map_err(|source| TftpError::LocalFile {
                path: local_file.to_path_buf(),
                source,
            })?;

        self.put_from(BufReader::new(file), remote_file).await
    }

    /// Download `remote_file` into any async sink
    pub async fn get_to<W>(&self, remote_file: &str, sink: W) -> Result<u64, TftpError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut transfer = Transfer::new(self.open().await?, self.config.transfer_options());
        let result = transfer.get(remote_file, &self.config.mode, sink).await;
        transfer.into_transport().close();
        result
    }

    /// Upload everything `source` yields as `remote_file`
    pub async fn put_from<R>(&self, source: R, remote_file: &str) -> Result<u64, TftpError>
    where
        R: AsyncRead + Unpin,
    {
        let mut transfer = Transfer::new(self.open().await?, self.config.transfer_options());
        let result = transfer.put(remote_file, &self.config.mode, source).await;
        transfer.into_transport().close();
        result
    }

    async fn open(&self) -> Result<UdpTransport, TftpError> {
        let transport =
            UdpTransport::open(&self.config.server, self.config.local_port.unwrap_or(0)).await?;
        log::debug!(
            "Talking to {}:{} from local TID {}",
            transport.server_ip(),
            self.config.server_port,
            transport.local_port()
        );
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_local_file_fails_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.bin");
        // Unresolvable host proves resolution never ran.
        let client = Client::new(ClientConfig::new("no-such-host.invalid"));

        let err = client.put(&missing, "remote.bin").await.unwrap_err();

        assert!(matches!(err, TftpError::LocalFile { ref path, .. } if path == &missing));
    }

    #[tokio::test]
    async fn failed_download_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let client = Client::new(ClientConfig::new("no-such-host.invalid"));

        let err = client.get("remote.bin", &target).await.unwrap_err();

        assert!(matches!(err, TftpError::Resolve { .. }));
        assert!(!target.exists());
    }
}
