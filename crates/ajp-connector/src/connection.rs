//! One backend connection and its frame I/O
//!
//! A [`Connection`] owns its socket and a receive buffer. It is moved between
//! the pool and the exchange that currently uses it and is never shared.

use ajp_wire::command::ajp13;
use ajp_wire::response::encode_command;
use ajp_wire::{Protocol, Reply, WireBuffer};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::{ConnectorError, Result};
use crate::handshake::LoginState;
use crate::transport::BoxedStream;

/// Frame dumps stop after this many bytes
const MAX_DUMP: usize = 1024;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn dump(direction: &str, id: u64, frame: &[u8]) {
    if tracing::enabled!(tracing::Level::TRACE) {
        let shown = &frame[..frame.len().min(MAX_DUMP)];
        trace!(
            connection = id,
            "{direction} {} bytes: {}",
            frame.len(),
            hex::encode(shown)
        );
    }
}

fn closed_on_eof(e: std::io::Error) -> ConnectorError {
    if e.kind() == ErrorKind::UnexpectedEof {
        ConnectorError::ConnectionClosed
    } else {
        ConnectorError::Transport(e)
    }
}

/// Write one frame and flush, giving up after `deadline`
async fn write_frame(
    stream: &mut BoxedStream,
    frame: &[u8],
    deadline: Option<Duration>,
) -> Result<()> {
    let write = async {
        stream.write_all(frame).await?;
        stream.flush().await
    };
    match deadline {
        Some(limit) => tokio::time::timeout(limit, write)
            .await
            .map_err(|_| ConnectorError::Timeout(limit))??,
        None => write.await?,
    }
    Ok(())
}

/// An open stream to the backend plus its frame buffers
pub struct Connection {
    id: u64,
    stream: BoxedStream,
    protocol: Protocol,
    inbound: WireBuffer,
    outbound: WireBuffer,
    last_used: Instant,
    exchanges: u64,
    login: Option<LoginState>,
    send_deadline: Option<Duration>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .field("exchanges", &self.exchanges)
            .field("logged_in", &self.login.is_some())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap an open stream; `packet_size` bounds every frame in both directions
    pub fn new(stream: BoxedStream, protocol: Protocol, packet_size: usize) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            stream,
            protocol,
            inbound: WireBuffer::new(packet_size),
            outbound: WireBuffer::new(packet_size),
            last_used: Instant::now(),
            exchanges: 0,
            login: None,
            send_deadline: None,
        }
    }

    /// Bound every frame write by `deadline`
    #[must_use]
    pub fn with_send_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.send_deadline = deadline;
        self
    }

    /// Process-unique id for logs
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Protocol variant spoken on this connection
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Frame capacity of this connection
    pub fn packet_size(&self) -> usize {
        self.inbound.capacity()
    }

    /// Login result, present once an AJP14 handshake succeeded
    pub fn login(&self) -> Option<&LoginState> {
        self.login.as_ref()
    }

    pub(crate) fn set_login(&mut self, login: LoginState) {
        self.login = Some(login);
    }

    /// Time since the connection last finished an exchange
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Exchanges completed on this connection
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    /// Mark the end of a successful exchange
    pub(crate) fn touch(&mut self) {
        self.last_used = Instant::now();
        self.exchanges += 1;
    }

    /// Send a frame that was finalized elsewhere
    pub async fn send_frame(&mut self, frame: &WireBuffer) -> Result<()> {
        dump("send", self.id, frame.frame());
        write_frame(&mut self.stream, frame.frame(), self.send_deadline).await
    }

    /// Build a payload in the scratch buffer, finalize it and send it
    pub async fn send_message<F>(&mut self, build: F) -> Result<()>
    where
        F: FnOnce(&mut WireBuffer) -> ajp_wire::Result<()>,
    {
        build(&mut self.outbound)?;
        self.outbound.finalize(self.protocol.outbound_magic())?;

        dump("send", self.id, self.outbound.frame());
        write_frame(&mut self.stream, self.outbound.frame(), self.send_deadline).await
    }

    /// Receive one frame, optionally bounded by `deadline`
    ///
    /// The returned buffer has its cursor at the first payload byte.
    pub async fn recv(&mut self, deadline: Option<Duration>) -> Result<&mut WireBuffer> {
        match deadline {
            Some(limit) => tokio::time::timeout(limit, self.read_frame())
                .await
                .map_err(|_| ConnectorError::Timeout(limit))??,
            None => self.read_frame().await?,
        }
        Ok(&mut self.inbound)
    }

    async fn read_frame(&mut self) -> Result<()> {
        self.stream
            .read_exact(self.inbound.header_mut())
            .await
            .map_err(closed_on_eof)?;
        self.inbound.parse_header(self.protocol.inbound_magic())?;
        self.stream
            .read_exact(self.inbound.payload_mut())
            .await
            .map_err(closed_on_eof)?;

        dump("recv", self.id, self.inbound.frame());
        Ok(())
    }

    /// Probe the backend with CPING and wait up to `timeout` for CPONG
    pub async fn cping(&mut self, timeout: Duration) -> Result<()> {
        let id = self.id;
        self.send_message(|buf| encode_command(buf, ajp13::CPING))
            .await?;
        let frame = self.recv(Some(timeout)).await?;
        match Reply::decode(frame)? {
            Reply::CpongReply => {
                debug!(connection = id, "CPONG received");
                Ok(())
            }
            other => Err(ConnectorError::Protocol(format!(
                "expected CPONG_REPLY, got {other:?}"
            ))),
        }
    }
}
