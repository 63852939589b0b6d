//! AJP14 login handshake
//!
//! ```text
//! connector                         backend
//!     LOGIN_INIT(negotiation, name) →
//!                                   ← LOGIN_SEED(32 bytes)
//!     LOGIN_COMPLETE(MD5 key)       →
//!                                   ← LOGIN_OK(negotiated, engine) | LOGIN_NOK(code)
//! ```
//!
//! A rejected or broken handshake poisons the connection; the pool drops it
//! and never retries the login on the same socket.

use std::time::Duration;

use ajp_crypto::{ComputedKey, EntropySeed};
use ajp_wire::{LoginComplete, LoginFailure, LoginInit, LoginReply, LoginSeed, Negotiation};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{ConnectorError, Result};

/// Where a handshake stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet
    Init,
    /// LOGIN_OK received
    LoggedIn,
    /// LOGIN_NOK received
    Rejected(LoginFailure),
    /// Transport error, malformed frame or out-of-sequence message
    Failed,
}

/// Key material and capabilities of a logged-in connection
#[derive(Debug, Clone)]
pub struct LoginState {
    /// Seed the backend challenged with
    pub seed: EntropySeed,
    /// Proof derived from the seed and the shared secret
    pub computed_key: ComputedKey,
    /// Capabilities both sides agreed on
    pub negotiated: Negotiation,
    /// Name the backend reported
    pub servlet_engine: String,
}

/// Drives one login on one connection
#[derive(Debug)]
pub struct Handshake<'a> {
    secret_key: &'a str,
    web_server_name: &'a str,
    negotiation: Negotiation,
    deadline: Option<Duration>,
    state: HandshakeState,
}

impl<'a> Handshake<'a> {
    /// Prepare a login with the shared secret and the capabilities to request
    pub fn new(secret_key: &'a str, web_server_name: &'a str, negotiation: Negotiation) -> Self {
        Self {
            secret_key,
            web_server_name,
            negotiation,
            deadline: None,
            state: HandshakeState::Init,
        }
    }

    /// Bound each backend reply of the login; an expiry fails the handshake
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run the login on `conn`
    ///
    /// Only valid from [`HandshakeState::Init`]. On success the login state is
    /// also recorded on the connection.
    pub async fn run(&mut self, conn: &mut Connection) -> Result<LoginState> {
        if self.state != HandshakeState::Init {
            return Err(ConnectorError::HandshakeFailed(format!(
                "handshake already ran ({:?})",
                self.state
            )));
        }

        match self.exchange(conn).await {
            Ok(login) => {
                self.state = HandshakeState::LoggedIn;
                debug!(
                    connection = conn.id(),
                    "Logged in to {} with negotiation {}",
                    login.servlet_engine,
                    login.negotiated
                );
                conn.set_login(login.clone());
                Ok(login)
            }
            Err(ConnectorError::HandshakeRejected { code }) => {
                self.state = HandshakeState::Rejected(code);
                warn!(connection = conn.id(), "Login rejected: {code}");
                Err(ConnectorError::HandshakeRejected { code })
            }
            Err(e) => {
                self.state = HandshakeState::Failed;
                warn!(connection = conn.id(), "Login failed: {e}");
                Err(match e {
                    e @ (ConnectorError::HandshakeFailed(_) | ConnectorError::Crypto(_)) => e,
                    other => ConnectorError::HandshakeFailed(other.to_string()),
                })
            }
        }
    }

    async fn exchange(&self, conn: &mut Connection) -> Result<LoginState> {
        let init = LoginInit {
            negotiation: self.negotiation,
            web_server_name: self.web_server_name.to_string(),
        };
        conn.send_message(|buf| init.encode(buf)).await?;

        let frame = conn.recv(self.deadline).await?;
        let seed = EntropySeed::from_bytes(LoginSeed::decode(frame)?.0);

        let computed_key = ComputedKey::compute(&seed, self.secret_key)?;
        let complete = LoginComplete(*computed_key.as_bytes());
        conn.send_message(|buf| complete.encode(buf)).await?;

        let frame = conn.recv(self.deadline).await?;
        match LoginReply::decode(frame)? {
            LoginReply::Ok {
                negotiated,
                servlet_engine,
            } => Ok(LoginState {
                seed,
                computed_key,
                negotiated,
                servlet_engine,
            }),
            LoginReply::Nok(code) => Err(ConnectorError::HandshakeRejected { code }),
        }
    }
}
