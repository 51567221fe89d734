//! Lock-step transfer state machine
//!
//! One [`Transfer`] drives one upload (`put`) or download (`get`) over a
//! [`Transport`]:
//!
//! ```text
//! put: Init -> AwaitAck -> Sending -> Done | Failed
//! get: Init -> AwaitFirstData -> Receiving -> Done | Failed
//! ```
//!
//! Exactly one packet is outstanding at a time. The server TID is learned
//! from the first valid reply, after which datagrams from any other port
//! are dropped without touching the transfer.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::tftp::core::{Datagram, ErrorCode, MAX_DATA_LEN, Packet, TftpError, Transport};

/// Protocol settings for a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Port the request is sent to
    pub server_port: u16,
    /// Wait bound for each reply
    pub timeout: Duration,
    /// Resends of the last packet after a timeout before giving up
    pub retries: u32,
    /// Foreign-TID datagrams tolerated during one wait
    pub max_stray: u32,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            server_port: 69,
            timeout: Duration::from_secs(10),
            retries: 0,
            max_stray: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Init,
    /// WRQ sent, waiting for ACK 0
    AwaitAck,
    Sending,
    /// RRQ sent, waiting for DATA 1
    AwaitFirstData,
    Receiving,
    Done,
    Failed,
}

/// Mutable bookkeeping for the transfer in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSession {
    pub local_tid: u16,
    /// Source port of the first valid reply
    pub server_tid: Option<u16>,
    /// Block being sent (put) or expected next (get)
    pub block: u16,
    /// Payload bytes acknowledged so far
    pub bytes: u64,
}

pub struct Transfer<T: Transport> {
    transport: T,
    options: TransferOptions,
    state: TransferState,
    session: TransferSession,
    last_sent: Option<(Vec<u8>, u16)>,
}

impl<T: Transport> Transfer<T> {
    pub fn new(transport: T, options: TransferOptions) -> Self {
        let session = TransferSession {
            local_tid: transport.local_port(),
            ..Default::default()
        };
        Self {
            transport,
            options,
            state: TransferState::Init,
            session,
            last_sent: None,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Upload everything `source` yields as `filename` on the server.
    ///
    /// Returns the number of payload bytes the server acknowledged.
    pub async fn put<R>(&mut self, filename: &str, mode: &str, source: R) -> Result<u64, TftpError>
    where
        R: AsyncRead + Unpin,
    {
        self.reset();
        let result = self.run_put(filename, mode, source).await;
        self.finish(result)
    }

    /// Download `filename` from the server into `sink`.
    ///
    /// Only acknowledged blocks are written. Returns the payload byte count.
    pub async fn get<W>(&mut self, filename: &str, mode: &str, sink: W) -> Result<u64, TftpError>
    where
        W: AsyncWrite + Unpin,
    {
        self.reset();
        let result = self.run_get(filename, mode, sink).await;
        self.finish(result)
    }

    async fn run_put<R>(
        &mut self,
        filename: &str,
        mode: &str,
        mut source: R,
    ) -> Result<u64, TftpError>
    where
        R: AsyncRead + Unpin,
    {
        let wrq = Packet::Wrq {
            filename: filename.to_string(),
            mode: mode.to_string(),
        };
        self.send(&wrq, self.options.server_port).await?;
        self.state = TransferState::AwaitAck;

        let (reply, port) = self.next_packet(false, Duplicate::None).await?;
        if reply != Packet::Ack(0) {
            return Err(self.reject(reply, "ACK [0]".to_string()).await);
        }
        self.session.server_tid = Some(port);
        log::debug!("Server TID is {}", port);

        self.state = TransferState::Sending;
        self.session.block = 1;
        let mut chunk = vec![0u8; MAX_DATA_LEN];

        loop {
            let block = self.session.block;
            let n = read_chunk(&mut source, &mut chunk)
                .await
                .map_err(TftpError::Source)?;

            let data = Packet::Data {
                block_num: block,
                data: chunk[..n].to_vec(),
            };
            self.send(&data, port).await?;

            let duplicate = self.duplicate_of(Duplicate::Ack(block.wrapping_sub(1)));
            let (reply, _) = self.next_packet(false, duplicate).await?;
            if reply != Packet::Ack(block) {
                return Err(self.reject(reply, format!("ACK [{}]", block)).await);
            }

            self.session.bytes += n as u64;
            self.session.block = block.wrapping_add(1);

            if n < MAX_DATA_LEN {
                break;
            }
        }

        Ok(self.session.bytes)
    }

    async fn run_get<W>(
        &mut self,
        filename: &str,
        mode: &str,
        mut sink: W,
    ) -> Result<u64, TftpError>
    where
        W: AsyncWrite + Unpin,
    {
        let rrq = Packet::Rrq {
            filename: filename.to_string(),
            mode: mode.to_string(),
        };
        self.send(&rrq, self.options.server_port).await?;
        self.state = TransferState::AwaitFirstData;
        self.session.block = 1;

        loop {
            let expected = self.session.block;
            let duplicate = match self.state {
                TransferState::Receiving => {
                    self.duplicate_of(Duplicate::Data(expected.wrapping_sub(1)))
                }
                _ => Duplicate::None,
            };
            let (reply, port) = self.next_packet(true, duplicate).await?;

            let data = match reply {
                Packet::Data { block_num, data } if block_num == expected => data,
                other => return Err(self.reject(other, format!("DATA [{}]", expected)).await),
            };

            self.send(&Packet::Ack(expected), port).await?;
            sink.write_all(&data).await.map_err(TftpError::Sink)?;

            self.state = TransferState::Receiving;
            self.session.bytes += data.len() as u64;
            self.session.block = expected.wrapping_add(1);

            if data.len() < MAX_DATA_LEN {
                break;
            }
        }

        sink.flush().await.map_err(TftpError::Sink)?;
        Ok(self.session.bytes)
    }

    fn reset(&mut self) {
        self.state = TransferState::Init;
        self.session = TransferSession {
            local_tid: self.session.local_tid,
            ..Default::default()
        };
        self.last_sent = None;
    }

    fn finish(&mut self, result: Result<u64, TftpError>) -> Result<u64, TftpError> {
        match &result {
            Ok(bytes) => {
                self.state = TransferState::Done;
                log::info!("Transfer complete. Total bytes: {}", bytes);
            }
            Err(e) => {
                self.state = TransferState::Failed;
                log::debug!("Transfer failed after {} bytes: {}", self.session.bytes, e);
            }
        }
        result
    }

    async fn send(&mut self, packet: &Packet, port: u16) -> Result<(), TftpError> {
        let bytes = packet.serialize().map_err(TftpError::Encoding)?;
        self.transport.send_to(&bytes, port).await?;
        log::debug!("Sent {} to port {}", packet, port);
        self.last_sent = Some((bytes, port));
        Ok(())
    }

    /// Duplicates only show up once retransmission is enabled; without it
    /// they stay protocol violations.
    fn duplicate_of(&self, duplicate: Duplicate) -> Duplicate {
        if self.options.retries > 0 {
            duplicate
        } else {
            Duplicate::None
        }
    }

    /// Receive and decode the next reply, resending the last packet on
    /// timeout while retries remain.
    ///
    /// A reply matching `duplicate` answers an earlier packet and is
    /// skipped within the current deadline.
    async fn next_packet(
        &mut self,
        adopt_tid: bool,
        duplicate: Duplicate,
    ) -> Result<(Packet, u16), TftpError> {
        let mut attempt = 0;
        let mut deadline = Instant::now() + self.options.timeout;
        let mut ignored = 0;

        loop {
            let datagram = match self.await_reply(deadline, &mut ignored).await {
                Ok(datagram) => datagram,
                Err(TftpError::Timeout(_)) if attempt < self.options.retries => {
                    attempt += 1;
                    log::warn!(
                        "Server timeout. Resending last packet (attempt {}/{})",
                        attempt,
                        self.options.retries
                    );
                    self.resend().await?;
                    deadline = Instant::now() + self.options.timeout;
                    ignored = 0;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if adopt_tid && self.session.server_tid.is_none() {
                self.session.server_tid = Some(datagram.port);
                log::debug!("Server TID is {}", datagram.port);
            }

            let packet = match Packet::deserialize(&datagram.payload) {
                Ok(packet) => packet,
                Err(e) => {
                    self.notify_abort("Malformed packet").await;
                    return Err(TftpError::Malformed(e));
                }
            };
            log::debug!("Received {} from port {}", packet, datagram.port);

            if !duplicate.matches(&packet) {
                return Ok((packet, datagram.port));
            }

            ignored += 1;
            log::warn!("Ignoring duplicate {} ({} ignored)", packet, ignored);
            if ignored > self.options.max_stray {
                return Err(TftpError::Timeout(self.options.timeout));
            }
            // A repeated DATA means our ACK was lost.
            if let Duplicate::Data(_) = duplicate {
                self.resend().await?;
            }
        }
    }

    /// Wait until `deadline` for one datagram from the server TID, dropping
    /// strays.
    ///
    /// Strays share the `ignored` budget with duplicates; exceeding
    /// `max_stray` counts as a timeout.
    async fn await_reply(
        &mut self,
        deadline: Instant,
        ignored: &mut u32,
    ) -> Result<Datagram, TftpError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TftpError::Timeout(self.options.timeout));
            }

            let datagram = match self.transport.recv(remaining).await {
                Err(TftpError::Timeout(_)) => return Err(TftpError::Timeout(self.options.timeout)),
                other => other?,
            };

            match self.session.server_tid {
                Some(tid) if tid != datagram.port => {
                    *ignored += 1;
                    log::warn!(
                        "Discarding datagram from port {}, expected TID {} ({} discarded)",
                        datagram.port,
                        tid,
                        ignored
                    );
                    if *ignored > self.options.max_stray {
                        return Err(TftpError::Timeout(self.options.timeout));
                    }
                }
                _ => return Ok(datagram),
            }
        }
    }

    async fn resend(&mut self) -> Result<(), TftpError> {
        if let Some((bytes, port)) = &self.last_sent {
            self.transport.send_to(bytes, *port).await?;
        }
        Ok(())
    }

    /// Turn an unexpected reply into the failure to surface.
    async fn reject(&mut self, reply: Packet, expected: String) -> TftpError {
        match reply {
            Packet::Error { code, msg } => TftpError::Server { code, message: msg },
            other => {
                self.notify_abort("Unexpected packet").await;
                TftpError::ProtocolViolation {
                    expected,
                    got: other.to_string(),
                }
            }
        }
    }

    /// Best-effort ERROR to the server TID when abandoning a transfer.
    async fn notify_abort(&mut self, msg: &str) {
        let Some(port) = self.session.server_tid else {
            return;
        };
        let packet = Packet::Error {
            code: ErrorCode::IllegalOperation,
            msg: msg.to_string(),
        };
        if let Ok(bytes) = packet.serialize() {
            if let Err(e) = self.transport.send_to(&bytes, port).await {
                log::warn!("Failed to notify server of abort: {}", e);
            }
        }
    }
}

/// Reply to the previous step that a retransmission can provoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Duplicate {
    None,
    /// ACK of the block before the one in flight; dropped.
    Ack(u16),
    /// DATA of the block already acked; re-acked.
    Data(u16),
}

impl Duplicate {
    fn matches(&self, packet: &Packet) -> bool {
        match (self, packet) {
            (Self::Ack(block), Packet::Ack(n)) => block == n,
            (Self::Data(block), Packet::Data { block_num, .. }) => block == block_num,
            _ => false,
        }
    }
}

/// Read until `buf` is full or the source is exhausted.
async fn read_chunk<R>(source: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
