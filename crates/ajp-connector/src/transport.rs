//! Byte streams to the backend
//!
//! The pool opens connections through a [`Connector`]. [`TcpConnector`] is the
//! production implementation; tests can hand in anything that yields an
//! [`AjpStream`].

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::error::{ConnectorError, Result};

/// Full-duplex byte stream carrying AJP frames
pub trait AjpStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> AjpStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Owned, type-erased backend stream
pub type BoxedStream = Box<dyn AjpStream>;

/// Opens new backend streams
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open one stream to the backend
    async fn connect(&self) -> Result<BoxedStream>;

    /// Human-readable backend address for logs
    fn endpoint(&self) -> String;
}

/// TCP connector with connect timeout and connect retries
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    attempts: u32,
    connect_timeout: Duration,
    nodelay: bool,
    keepalive: bool,
}

impl TcpConnector {
    /// Build from the socket settings of a worker configuration
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            attempts: config.connect_retry_attempts.max(1),
            connect_timeout: config.socket_connect_timeout,
            nodelay: config.tcp_nodelay,
            keepalive: config.keepalive,
        }
    }

    async fn connect_addr(&self, addr: SocketAddr) -> Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(self.keepalive)?;

        let stream = tokio::time::timeout(self.connect_timeout, socket.connect(addr))
            .await
            .map_err(|_| ConnectorError::Timeout(self.connect_timeout))??;
        stream.set_nodelay(self.nodelay)?;
        Ok(stream)
    }

    async fn connect_once(&self) -> Result<TcpStream> {
        let mut last = None;
        for addr in lookup_host((self.host.as_str(), self.port)).await? {
            match self.connect_addr(addr).await {
                Ok(stream) => {
                    debug!("Connected to {addr}");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("Connect to {addr} failed: {e}");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| {
            ConnectorError::Transport(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no addresses for {}", self.endpoint()),
            ))
        }))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<BoxedStream> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.connect_once().await {
                Ok(stream) => return Ok(Box::new(stream)),
                Err(e) if attempt >= self.attempts => return Err(e),
                Err(e) => {
                    warn!(
                        "Connect attempt {attempt}/{} to {} failed: {e}",
                        self.attempts,
                        self.endpoint()
                    );
                }
            }
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
