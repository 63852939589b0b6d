//! Request attempt budget with exponential backoff

use rand::{RngExt, rng};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// How many times a request is attempted and how long to wait in between
///
/// `max_attempts` counts every attempt, the first one included. The default
/// backoff is zero: a failed attempt is retried on another connection
/// immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per request
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier
    pub multiplier: f64,

    /// Add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create retry policy from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            max_attempts: std::env::var("AJP_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            initial_backoff: Duration::from_millis(
                std::env::var("AJP_RETRY_BACKOFF")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
            ),
            max_backoff: Duration::from_millis(
                std::env::var("AJP_MAX_BACKOFF")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            multiplier: std::env::var("AJP_BACKOFF_MULTIPLIER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2.0),
            jitter: std::env::var("AJP_RETRY_JITTER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
        })
    }

    /// Sleep for the current backoff, then grow it for the next round
    pub(crate) async fn pause(&self, backoff: &mut Duration) {
        if backoff.is_zero() {
            return;
        }

        let mut delay = *backoff;
        if self.jitter {
            let jitter = rng().random_range(0.0..0.3);
            #[allow(clippy::cast_precision_loss)]
            let jitter_ms = (delay.as_millis() as f64 * jitter) as u64;
            delay += Duration::from_millis(jitter_ms);
        }

        tokio::time::sleep(delay).await;

        *backoff = Duration::from_secs_f64(
            (backoff.as_secs_f64() * self.multiplier).min(self.max_backoff.as_secs_f64()),
        );
    }

    /// Execute a function, retrying recoverable failures
    ///
    /// The error of the last attempt is returned unchanged.
    pub async fn execute<F, Fut, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            attempt += 1;
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_recoverable() || attempt >= self.max_attempts => {
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Attempt {} failed: {}", attempt, e);
                    self.pause(&mut backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(
    unsafe_code,
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::significant_drop_tightening
)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::ZERO);
        assert_eq!(policy.max_backoff, Duration::from_secs(1));
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
        assert!(policy.jitter);
    }

    #[test]
    fn test_from_env_custom_values() {
        unsafe {
            std::env::set_var("AJP_MAX_RETRIES", "5");
            std::env::set_var("AJP_RETRY_BACKOFF", "200");
            std::env::set_var("AJP_MAX_BACKOFF", "2000");
            std::env::set_var("AJP_BACKOFF_MULTIPLIER", "1.5");
            std::env::set_var("AJP_RETRY_JITTER", "false");
        }

        let policy = RetryPolicy::from_env().expect("Operation should succeed");
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(200));
        assert_eq!(policy.max_backoff, Duration::from_secs(2));
        assert!((policy.multiplier - 1.5).abs() < f64::EPSILON);
        assert!(!policy.jitter);

        for var in [
            "AJP_MAX_RETRIES",
            "AJP_RETRY_BACKOFF",
            "AJP_MAX_BACKOFF",
            "AJP_BACKOFF_MULTIPLIER",
            "AJP_RETRY_JITTER",
        ] {
            unsafe {
                std::env::remove_var(var);
            }
        }
    }

    #[tokio::test]
    async fn test_execute_retry_on_recoverable_error() {
        let policy = fast_policy(3);
        let call_count = Arc::new(Mutex::new(0));
        let call_count_clone = Arc::clone(&call_count);

        let start = Instant::now();
        let result = policy
            .execute(|| async {
                let mut count = call_count_clone.lock().expect("Operation should succeed");
                *count += 1;
                if *count < 3 {
                    Err(ConnectorError::ConnectionClosed)
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.expect("Operation should succeed"), 42);
        assert_eq!(*call_count.lock().expect("Operation should succeed"), 3);
        // 1ms + 2ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(3));
    }

    #[tokio::test]
    async fn test_execute_fail_on_non_recoverable_error() {
        let policy = fast_policy(3);
        let call_count = Arc::new(Mutex::new(0));
        let call_count_clone = Arc::clone(&call_count);

        let result = policy
            .execute(|| async {
                let mut count = call_count_clone.lock().expect("Operation should succeed");
                *count += 1;
                Err::<i32, _>(ConnectorError::Config("invalid".to_string()))
            })
            .await;

        assert!(matches!(
            result.expect_err("Test operation should fail"),
            ConnectorError::Config(_)
        ));
        assert_eq!(*call_count.lock().expect("Operation should succeed"), 1);
    }

    #[tokio::test]
    async fn test_execute_stops_at_max_attempts() {
        let policy = fast_policy(2);
        let call_count = Arc::new(Mutex::new(0));
        let call_count_clone = Arc::clone(&call_count);

        let result = policy
            .execute(|| async {
                let mut count = call_count_clone.lock().expect("Operation should succeed");
                *count += 1;
                Err::<i32, _>(ConnectorError::Timeout(Duration::from_millis(5)))
            })
            .await;

        assert!(matches!(
            result.expect_err("Test operation should fail"),
            ConnectorError::Timeout(_)
        ));
        assert_eq!(*call_count.lock().expect("Operation should succeed"), 2);
    }

    #[tokio::test]
    async fn test_backoff_progression() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(25),
            multiplier: 2.0,
            jitter: false,
        };

        let mut backoff = policy.initial_backoff;
        let start = Instant::now();
        policy.pause(&mut backoff).await;
        assert_eq!(backoff, Duration::from_millis(20));
        policy.pause(&mut backoff).await;
        assert_eq!(backoff, Duration::from_millis(25));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_zero_backoff_does_not_sleep() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        let mut backoff = policy.initial_backoff;
        policy.pause(&mut backoff).await;
        assert_eq!(backoff, Duration::ZERO);
    }
}
