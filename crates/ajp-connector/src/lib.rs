//! AJP13/AJP14 connector
//!
//! Forwards HTTP requests from a web server front end to a backend
//! application server over AJP, streams the response back, and retries on a
//! fresh connection when a failure happened before the backend consumed
//! anything that cannot be replayed.
//!
//! # Architecture
//!
//! - `config`: per-backend [`WorkerConfig`] with env and JSON loading
//! - `transport`: [`Connector`] trait and the TCP implementation
//! - `connection`: one backend socket with frame send/receive and CPING
//! - `handshake` / `variant`: AJP14 login, no-op for AJP13
//! - `pool`: [`ConnectionPool`] of warm connections
//! - `exchange`: the per-request state machine
//! - `coordinator`: [`RetryCoordinator`], the bounded retry loop
//! - `worker`: [`AjpWorker`], tying the above together per backend
//!
//! # Example
//!
//! ```no_run
//! use ajp_connector::{AjpWorker, MemoryService, WorkerConfig};
//! use ajp_wire::ForwardRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     tracing_subscriber::fmt::init();
//!
//!     let worker = AjpWorker::new(WorkerConfig::ajp13("localhost", 8009))?;
//!
//!     let request = ForwardRequest::new("GET", "/examples/").header("host", "localhost");
//!     let mut service = MemoryService::without_body(request);
//!     worker.service(&mut service).await?;
//!
//!     if let Some(head) = service.response() {
//!         println!("{} {}", head.status, head.reason);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod exchange;
pub mod handshake;
pub mod pool;
pub mod retry;
pub mod service;
pub mod transport;
pub mod variant;
pub mod worker;

pub use config::{RecoveryOptions, WorkerConfig};
pub use connection::Connection;
pub use coordinator::RetryCoordinator;
pub use error::{ConnectorError, Result};
pub use exchange::{Exchange, ExchangeOptions, ExchangeOutcome, ExchangeState, RequestState};
pub use handshake::{Handshake, HandshakeState, LoginState};
pub use pool::ConnectionPool;
pub use retry::RetryPolicy;
pub use service::{BodyLength, MemoryService, ServiceAdapter};
pub use transport::{AjpStream, BoxedStream, Connector, TcpConnector};
pub use variant::{Ajp13Variant, Ajp14Variant, ProtocolVariant};
pub use worker::AjpWorker;
