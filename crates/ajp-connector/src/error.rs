//! Error types for connector operations

use ajp_crypto::CryptoError;
use ajp_wire::{LoginFailure, WireError};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by connections, exchanges and workers
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Frame could not be built or decoded
    #[error("Malformed message: {0}")]
    Wire(#[from] WireError),

    /// Socket connect, read or write failed
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Backend closed the connection mid-exchange
    #[error("Connection closed by backend")]
    ConnectionClosed,

    /// Socket operation did not finish in time
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// The client stopped supplying request body, or stopped accepting the response
    #[error("Client aborted: {0}")]
    ClientAbort(#[source] std::io::Error),

    /// AJP14 login refused by the backend
    #[error("Handshake rejected: {code}")]
    HandshakeRejected {
        /// Failure code from LOGIN_NOK
        code: LoginFailure,
    },

    /// AJP14 login broke off or went out of sequence
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Backend sent a frame that is valid but not allowed at this point
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// AJP14 shutdown refused by the backend
    #[error("Shutdown refused: {code}")]
    ShutdownRejected {
        /// Failure code from SHUTDOWN_NOK
        code: LoginFailure,
    },

    /// Backend answered with UNKNOWN_PACKET
    #[error("Backend does not support {0}")]
    Unsupported(&'static str),

    /// Failure after the backend consumed request data; not retried
    #[error("Non-recoverable failure: {0}")]
    NonRecoverable(#[source] Box<ConnectorError>),

    /// Every attempt failed recoverably
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        #[source]
        last: Box<ConnectorError>,
    },

    /// Login key material could not be derived
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Invalid worker configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request cannot be forwarded as given
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ConnectorError {
    /// Whether the failure is confined to one connection, so the same request
    /// may be tried again on another
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Wire(_)
                | Self::Transport(_)
                | Self::ConnectionClosed
                | Self::Timeout(_)
                | Self::HandshakeRejected { .. }
                | Self::HandshakeFailed(_)
                | Self::Protocol(_)
        )
    }

    /// Whether the client side caused the failure
    pub fn is_client_abort(&self) -> bool {
        match self {
            Self::ClientAbort(_) => true,
            Self::NonRecoverable(inner) => inner.is_client_abort(),
            _ => false,
        }
    }
}

/// Result alias for connector operations
pub type Result<T> = std::result::Result<T, ConnectorError>;
