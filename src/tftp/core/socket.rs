//! Datagram transport used by the transfer state machine.
//!
//! [`Transport`] is the seam between protocol logic and the network:
//! [`UdpTransport`] speaks real UDP, tests substitute scripted doubles.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};

use super::error::TftpError;
use super::packet::MAX_PACKET_LEN;

/// One received UDP payload and the port (TID) it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub port: u16,
}

/// Send and receive raw datagrams to and from a single server host.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send one datagram to the server at `port`.
    async fn send_to(&mut self, payload: &[u8], port: u16) -> Result<(), TftpError>;

    /// Wait up to `timeout` for the next datagram from the server host.
    async fn recv(&mut self, timeout: Duration) -> Result<Datagram, TftpError>;

    /// Port (TID) this end is bound to.
    fn local_port(&self) -> u16;

    /// Release the endpoint. Calling it again is a no-op.
    fn close(&mut self);
}

/// UDP endpoint bound to the local TID and aimed at one resolved server.
#[derive(Debug)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    server_ip: IpAddr,
    local_port: u16,
}

impl UdpTransport {
    /// Resolve `host` and bind a socket of the matching address family.
    ///
    /// `local_port` of 0 lets the OS choose the local TID.
    pub async fn open(host: &str, local_port: u16) -> Result<Self, TftpError> {
        let server_ip = resolve(host).await?;

        let bind_ip = match server_ip {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let socket = UdpSocket::bind(SocketAddr::new(bind_ip, local_port))
            .await
            .map_err(|source| TftpError::Bind {
                port: local_port,
                source,
            })?;
        let local_port = socket
            .local_addr()
            .map_err(|source| TftpError::Bind {
                port: local_port,
                source,
            })?
            .port();

        log::debug!("Bound local TID {} for server {}", local_port, server_ip);

        Ok(Self {
            socket: Some(socket),
            server_ip,
            local_port,
        })
    }

    pub fn server_ip(&self) -> IpAddr {
        self.server_ip
    }

    fn socket(&self) -> io::Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket closed"))
    }
}

impl Transport for UdpTransport {
    async fn send_to(&mut self, payload: &[u8], port: u16) -> Result<(), TftpError> {
        let dest = SocketAddr::new(self.server_ip, port);
        let socket = self.socket().map_err(TftpError::Transmit)?;
        socket
            .send_to(payload, dest)
            .await
            .map_err(TftpError::Transmit)?;
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Datagram, TftpError> {
        let deadline = Instant::now() + timeout;
        let server_ip = self.server_ip;
        let socket = self.socket().map_err(TftpError::Transmit)?;
        // One spare byte so an oversized DATA packet is seen as such.
        let mut buf = vec![0u8; MAX_PACKET_LEN + 1];

        loop {
            let (amt, src) = timeout_at(deadline, socket.recv_from(&mut buf))
                .await
                .map_err(|_| TftpError::Timeout(timeout))?
                .map_err(TftpError::Transmit)?;

            if src.ip() != server_ip {
                log::warn!("Ignoring datagram from unexpected host {}", src);
                continue;
            }

            return Ok(Datagram {
                payload: buf[..amt].to_vec(),
                port: src.port(),
            });
        }
    }

    fn local_port(&self) -> u16 {
        self.local_port
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            log::debug!("Closed local TID {}", self.local_port);
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn resolve(host: &str) -> Result<IpAddr, TftpError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|source| TftpError::Resolve {
            host: host.to_string(),
            source,
        })?;

    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| TftpError::Resolve {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
        })
}
