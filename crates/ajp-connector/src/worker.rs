//! Front door for one backend
//!
//! An [`AjpWorker`] owns the pool for its backend and forwards requests
//! through the retry loop. AJP14 workers also expose the connector-initiated
//! management messages: context discovery, context state and shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ajp_wire::command::ajp14;
use ajp_wire::{
    ContextInfo, ContextQuery, ContextStateQuery, ContextStateReply, Protocol, ShutdownReply,
    ShutdownRequest, WireBuffer,
};
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::connection::Connection;
use crate::coordinator::RetryCoordinator;
use crate::error::{ConnectorError, Result};
use crate::exchange::ExchangeOptions;
use crate::pool::ConnectionPool;
use crate::service::ServiceAdapter;
use crate::transport::{Connector, TcpConnector};
use crate::variant;

/// Connector for one backend
#[derive(Debug)]
pub struct AjpWorker {
    config: WorkerConfig,
    options: ExchangeOptions,
    pool: ConnectionPool,
}

impl AjpWorker {
    /// Validate `config` and build a worker that connects over TCP
    pub fn new(config: WorkerConfig) -> Result<Self> {
        let connector = Arc::new(TcpConnector::new(&config));
        Self::with_connector(config, connector)
    }

    /// Validate `config` and build a worker that opens streams through `connector`
    pub fn with_connector(config: WorkerConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let variant = variant::for_config(&config)?;
        let pool = ConnectionPool::new(&config, connector, variant);
        let options = ExchangeOptions::from_config(&config);

        info!(
            worker = %config.name,
            "Worker for {} ({}) with {} pooled connections",
            config.address(),
            config.protocol,
            config.pool_size
        );
        Ok(Self {
            config,
            options,
            pool,
        })
    }

    /// Configuration the worker was built with
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Connection pool of this backend
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Forward one request and stream its response through `adapter`
    pub async fn service(&self, adapter: &mut dyn ServiceAdapter) -> Result<()> {
        RetryCoordinator::new(&self.pool, &self.options, &self.config.retry)
            .service(adapter)
            .await
    }

    /// Probe the backend with CPING; returns the round trip time
    pub async fn cping(&self, timeout: Duration) -> Result<Duration> {
        let mut conn = self.pool.acquire().await?;
        let start = Instant::now();
        conn.cping(timeout).await?;
        let elapsed = start.elapsed();
        self.pool.release(conn, true);
        Ok(elapsed)
    }

    fn require_ajp14(&self, what: &'static str) -> Result<()> {
        if self.config.protocol == Protocol::Ajp14 {
            Ok(())
        } else {
            Err(ConnectorError::Unsupported(what))
        }
    }

    /// Send one management message and decode the answer
    ///
    /// The connection goes back to the pool if the backend answered in
    /// sequence, including an UNKNOWN_PACKET refusal.
    async fn request_reply<T, S, P>(&self, what: &'static str, send: S, parse: P) -> Result<T>
    where
        S: FnOnce(&mut WireBuffer) -> ajp_wire::Result<()> + Send,
        P: FnOnce(&mut WireBuffer) -> ajp_wire::Result<T> + Send,
    {
        self.require_ajp14(what)?;
        let mut conn = self.pool.acquire().await?;
        let result = self.round_trip(&mut conn, what, send, parse).await;

        let reusable = matches!(result, Ok(_) | Err(ConnectorError::Unsupported(_)));
        self.pool.release(conn, reusable);
        result
    }

    async fn round_trip<T, S, P>(
        &self,
        conn: &mut Connection,
        what: &'static str,
        send: S,
        parse: P,
    ) -> Result<T>
    where
        S: FnOnce(&mut WireBuffer) -> ajp_wire::Result<()> + Send,
        P: FnOnce(&mut WireBuffer) -> ajp_wire::Result<T> + Send,
    {
        conn.send_message(send).await?;
        let frame = conn.recv(self.options.reply_timeout).await?;
        if frame.peek_byte()? == ajp14::UNKNOWN_PACKET {
            warn!(worker = %self.config.name, "Backend does not handle {what}");
            return Err(ConnectorError::Unsupported(what));
        }
        Ok(parse(frame)?)
    }

    /// Ask the backend which contexts it serves on `virtual_host` (`*` for all)
    pub async fn discover_contexts(&self, virtual_host: &str) -> Result<ContextInfo> {
        let query = ContextQuery {
            virtual_host: virtual_host.to_string(),
        };
        self.config
            .retry
            .execute(|| {
                self.request_reply(
                    "context query",
                    |buf| query.encode(buf),
                    ContextInfo::decode,
                )
            })
            .await
    }

    /// Ask the backend for the state of `contexts` on `virtual_host`
    pub async fn query_context_state(
        &self,
        virtual_host: &str,
        contexts: &[String],
    ) -> Result<ContextStateReply> {
        let query = ContextStateQuery {
            virtual_host: virtual_host.to_string(),
            contexts: contexts.to_vec(),
        };
        self.config
            .retry
            .execute(|| {
                self.request_reply(
                    "context state",
                    |buf| query.encode(buf),
                    ContextStateReply::decode,
                )
            })
            .await
    }

    /// Ask the backend to stop, authenticated with the connection's login key
    ///
    /// Not retried. The connection used is closed afterwards either way.
    pub async fn shutdown_backend(&self) -> Result<()> {
        self.require_ajp14("shutdown")?;
        let mut conn = self.pool.acquire().await?;
        let key = conn
            .login()
            .map(|login| *login.computed_key.as_bytes())
            .ok_or_else(|| {
                ConnectorError::HandshakeFailed("connection is not logged in".to_string())
            })?;

        let reply = self
            .round_trip(
                &mut conn,
                "shutdown",
                |buf| ShutdownRequest(key).encode(buf),
                ShutdownReply::decode,
            )
            .await?;

        match reply {
            ShutdownReply::Ok => {
                info!(worker = %self.config.name, "Backend accepted shutdown");
                self.pool.close_idle();
                Ok(())
            }
            ShutdownReply::Nok(code) => Err(ConnectorError::ShutdownRejected { code }),
        }
    }
}
