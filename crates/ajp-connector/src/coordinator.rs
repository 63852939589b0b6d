//! Bounded retry loop around [`Exchange`]

use tracing::{error, warn};

use crate::error::{ConnectorError, Result};
use crate::exchange::{Exchange, ExchangeOptions, ExchangeOutcome, RequestState};
use crate::pool::ConnectionPool;
use crate::retry::RetryPolicy;
use crate::service::ServiceAdapter;

/// Runs a request against a pool until it succeeds, fails for good, or the
/// attempt budget is spent
///
/// A recoverable failure closes the connection it happened on and the next
/// attempt runs on a different one, replaying the same marshaled request and
/// eager body chunk.
#[derive(Debug, Clone, Copy)]
pub struct RetryCoordinator<'a> {
    pool: &'a ConnectionPool,
    options: &'a ExchangeOptions,
    policy: &'a RetryPolicy,
}

impl<'a> RetryCoordinator<'a> {
    /// Coordinator over `pool`
    pub fn new(
        pool: &'a ConnectionPool,
        options: &'a ExchangeOptions,
        policy: &'a RetryPolicy,
    ) -> Self {
        Self {
            pool,
            options,
            policy,
        }
    }

    /// Forward one request
    ///
    /// # Errors
    ///
    /// - `NonRecoverable` when the request could not be marshaled, or when a
    ///   failure happened after the backend consumed body data or the client
    ///   saw response headers
    /// - `ClientAbort` when the client stopped sending or receiving
    /// - `RetriesExhausted` when every attempt failed recoverably
    pub async fn service(&self, adapter: &mut dyn ServiceAdapter) -> Result<()> {
        let mut request = RequestState::new(adapter.request(), adapter.body_length(), self.options)
            .map_err(|e| {
                error!("Cannot marshal request: {e}");
                ConnectorError::NonRecoverable(Box::new(e))
            })?;

        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.initial_backoff;
        let mut attempts = 0;

        let last = loop {
            attempts += 1;

            let err = match self.pool.acquire().await {
                Ok(mut conn) => {
                    let outcome = Exchange::new(&mut conn, self.options)
                        .run(&mut request, &mut *adapter)
                        .await;
                    match outcome {
                        ExchangeOutcome::Completed { reuse } => {
                            self.pool.release(conn, reuse);
                            return Ok(());
                        }
                        ExchangeOutcome::RecoverableFailure(e) => {
                            warn!(connection = conn.id(), "Closing connection after failure: {e}");
                            e
                        }
                        ExchangeOutcome::FatalFailure(e) => {
                            error!(
                                connection = conn.id(),
                                "Request failed after the backend consumed it: {e}"
                            );
                            return Err(ConnectorError::NonRecoverable(Box::new(e)));
                        }
                        ExchangeOutcome::ClientAbort(e) => {
                            warn!(connection = conn.id(), "Client aborted request: {e}");
                            return Err(e);
                        }
                    }
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Cannot obtain backend connection: {e}");
                    e
                }
                Err(e) => return Err(e),
            };

            if attempts >= max_attempts {
                break err;
            }
            warn!("Attempt {attempts}/{max_attempts} failed, retrying: {err}");
            self.policy.pause(&mut backoff).await;
        };

        error!("Giving up after {attempts} attempts: {last}");
        Err(ConnectorError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        })
    }
}
