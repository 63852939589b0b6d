//! Worker configuration
//!
//! One [`WorkerConfig`] describes one backend. Values come from defaults,
//! `AJP_*` environment variables, or a JSON file, and are checked with
//! [`WorkerConfig::validate`] before a worker is built.
//!
//! Durations of zero disable the corresponding probe or timeout.

use ajp_wire::{DEFAULT_BUFFER_SIZE, Negotiation, Protocol, max_body_for};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConnectorError, Result};
use crate::retry::RetryPolicy;

/// Smallest accepted frame buffer
pub const MIN_PACKET_SIZE: usize = 1024;

/// Largest accepted frame buffer
pub const MAX_PACKET_SIZE: usize = 65536;

/// When a failed exchange may be retried beyond the default rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecoveryOptions(pub u32);

impl RecoveryOptions {
    /// Do not retry once the request reached the backend
    pub const ABORT_IF_BACKEND_GOT_REQUEST: u32 = 0x1;
    /// Do not retry once response headers went to the client (always in effect)
    pub const ABORT_IF_BACKEND_SENT_HEADERS: u32 = 0x2;

    /// Whether a reply failure after the request was delivered is fatal
    pub const fn abort_if_backend_got_request(self) -> bool {
        self.0 & Self::ABORT_IF_BACKEND_GOT_REQUEST != 0
    }
}

/// Configuration of one backend worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker name used in logs
    pub name: String,

    /// Backend host name or address
    pub host: String,

    /// Backend port
    pub port: u16,

    /// Protocol variant
    pub protocol: Protocol,

    /// Idle connections kept in the pool
    pub pool_size: usize,

    /// TCP connect attempts per new connection
    pub connect_retry_attempts: u32,

    /// Bound on a single TCP connect
    pub socket_connect_timeout: Duration,

    /// Disable Nagle on backend sockets
    pub tcp_nodelay: bool,

    /// Enable TCP keepalive on backend sockets
    pub keepalive: bool,

    /// Attempts per request and backoff between them
    pub retry: RetryPolicy,

    /// Frame buffer capacity, header included
    pub max_packet_size: usize,

    /// Most request body bytes sent unsolicited with the request
    pub eager_body_cap: usize,

    /// Pooled connection idle longer than this is closed when handed out
    pub socket_timeout: Duration,

    /// Other pooled connections idle longer than this are evicted on acquire
    pub cache_timeout: Duration,

    /// CPING probe bound after a new connection is opened
    pub connect_timeout: Duration,

    /// CPING probe bound before reusing a pooled connection
    pub prepost_timeout: Duration,

    /// Bound on each backend frame while awaiting the reply
    pub reply_timeout: Duration,

    /// Bound on each backend frame during the AJP14 login
    pub login_timeout: Duration,

    /// Bound on writing one frame to the backend
    pub send_timeout: Duration,

    /// Extra recovery restrictions
    pub recovery_options: RecoveryOptions,

    /// AJP13 request secret, sent with every request
    pub secret: Option<String>,

    /// AJP14 login secret
    pub secret_key: Option<String>,

    /// Name sent in AJP14 LOGIN_INIT
    pub web_server_name: String,

    /// Capabilities requested in AJP14 LOGIN_INIT
    pub negotiation: u32,

    /// Forward the TLS key size attribute
    pub forward_key_size: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "ajp13".to_string(),
            host: "localhost".to_string(),
            port: Protocol::Ajp13.default_port(),
            protocol: Protocol::Ajp13,
            pool_size: 1,
            connect_retry_attempts: 1,
            socket_connect_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
            keepalive: false,
            retry: RetryPolicy::default(),
            max_packet_size: DEFAULT_BUFFER_SIZE,
            eager_body_cap: max_body_for(DEFAULT_BUFFER_SIZE),
            socket_timeout: Duration::ZERO,
            cache_timeout: Duration::from_secs(15),
            connect_timeout: Duration::ZERO,
            prepost_timeout: Duration::ZERO,
            reply_timeout: Duration::ZERO,
            login_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
            recovery_options: RecoveryOptions::default(),
            secret: None,
            secret_key: None,
            web_server_name: concat!("ajp-connector/", env!("CARGO_PKG_VERSION")).to_string(),
            negotiation: Negotiation::DEFAULT_REQUEST.bits(),
            forward_key_size: false,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Zero means disabled
const fn enabled(duration: Duration) -> Option<Duration> {
    if duration.is_zero() {
        None
    } else {
        Some(duration)
    }
}

impl WorkerConfig {
    /// AJP13 worker for `host:port`
    pub fn ajp13(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// AJP14 worker for `host:port` logging in with `secret_key`
    pub fn ajp14(host: impl Into<String>, port: u16, secret_key: impl Into<String>) -> Self {
        Self {
            name: "ajp14".to_string(),
            host: host.into(),
            port,
            protocol: Protocol::Ajp14,
            secret_key: Some(secret_key.into()),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// Socket and cache timeouts are read in seconds; probe, reply, login
    /// and send timeouts in milliseconds.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let protocol = env_or("AJP_PROTOCOL", defaults.protocol);
        let max_packet_size = env_or("AJP_MAX_PACKET_SIZE", defaults.max_packet_size);

        Ok(Self {
            name: env_or("AJP_WORKER_NAME", protocol.to_string()),
            host: env_or("AJP_HOST", defaults.host),
            port: env_or("AJP_PORT", protocol.default_port()),
            protocol,
            pool_size: env_or("AJP_POOL_SIZE", defaults.pool_size),
            connect_retry_attempts: env_or(
                "AJP_CONNECT_RETRIES",
                defaults.connect_retry_attempts,
            ),
            socket_connect_timeout: Duration::from_secs(env_or("AJP_SOCKET_CONNECT_TIMEOUT", 10)),
            tcp_nodelay: env_or("AJP_TCP_NODELAY", defaults.tcp_nodelay),
            keepalive: env_or("AJP_KEEPALIVE", defaults.keepalive),
            retry: RetryPolicy::from_env()?,
            max_packet_size,
            eager_body_cap: env_or("AJP_EAGER_BODY_CAP", max_body_for(max_packet_size)),
            socket_timeout: Duration::from_secs(env_or("AJP_SOCKET_TIMEOUT", 0)),
            cache_timeout: Duration::from_secs(env_or("AJP_CACHE_TIMEOUT", 15)),
            connect_timeout: Duration::from_millis(env_or("AJP_CONNECT_TIMEOUT", 0)),
            prepost_timeout: Duration::from_millis(env_or("AJP_PREPOST_TIMEOUT", 0)),
            reply_timeout: Duration::from_millis(env_or("AJP_REPLY_TIMEOUT", 0)),
            login_timeout: Duration::from_millis(env_or("AJP_LOGIN_TIMEOUT", 10_000)),
            send_timeout: Duration::from_millis(env_or("AJP_SEND_TIMEOUT", 10_000)),
            recovery_options: RecoveryOptions(env_or("AJP_RECOVERY_OPTIONS", 0)),
            secret: std::env::var("AJP_SECRET").ok(),
            secret_key: std::env::var("AJP_SECRET_KEY").ok(),
            web_server_name: env_or("AJP_WEB_SERVER_NAME", defaults.web_server_name),
            negotiation: env_or("AJP_NEGOTIATION", defaults.negotiation),
            forward_key_size: env_or("AJP_FORWARD_KEY_SIZE", defaults.forward_key_size),
        })
    }

    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| ConnectorError::Config(format!("invalid JSON in {}: {e}", path.display())))
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Config` if:
    /// - Host is empty or port is zero
    /// - Pool size or request attempts are zero
    /// - Frame size is outside 1024..=65536
    /// - Eager body cap is zero or larger than a body frame can carry
    /// - AJP14 is selected without a login secret
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ConnectorError::Config("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConnectorError::Config("port is zero".to_string()));
        }
        if self.pool_size == 0 {
            return Err(ConnectorError::Config("pool size must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConnectorError::Config(
                "request attempts must be at least 1".to_string(),
            ));
        }
        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&self.max_packet_size) {
            return Err(ConnectorError::Config(format!(
                "max packet size {} outside {MIN_PACKET_SIZE}..={MAX_PACKET_SIZE}",
                self.max_packet_size
            )));
        }
        let body_room = max_body_for(self.max_packet_size);
        if self.eager_body_cap == 0 || self.eager_body_cap > body_room {
            return Err(ConnectorError::Config(format!(
                "eager body cap {} outside 1..={body_room}",
                self.eager_body_cap
            )));
        }
        if self.protocol == Protocol::Ajp14
            && self.secret_key.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConnectorError::Config(
                "ajp14 requires a secret key".to_string(),
            ));
        }
        Ok(())
    }

    /// `host:port` of the backend
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// CPING bound after connect, if enabled
    pub const fn connect_probe(&self) -> Option<Duration> {
        enabled(self.connect_timeout)
    }

    /// CPING bound before reuse, if enabled
    pub const fn prepost_probe(&self) -> Option<Duration> {
        enabled(self.prepost_timeout)
    }

    /// Per-frame reply bound, if enabled
    pub const fn reply_deadline(&self) -> Option<Duration> {
        enabled(self.reply_timeout)
    }

    /// Per-frame login bound, if enabled
    pub const fn login_deadline(&self) -> Option<Duration> {
        enabled(self.login_timeout)
    }

    /// Per-frame write bound, if enabled
    pub const fn send_deadline(&self) -> Option<Duration> {
        enabled(self.send_timeout)
    }

    /// Idle bound for a handed-out connection, if enabled
    pub const fn socket_idle_limit(&self) -> Option<Duration> {
        enabled(self.socket_timeout)
    }

    /// Idle bound for pooled connections, if enabled
    pub const fn cache_idle_limit(&self) -> Option<Duration> {
        enabled(self.cache_timeout)
    }
}
