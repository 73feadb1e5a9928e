//! Retry logic with exponential backoff
//!
//! Navigation on a client-rendered site fails transiently: a page load times
//! out, the connection resets. This module retries such operations with
//! exponential backoff and optional jitter. Element waits are *not* retried
//! here; they already poll inside their bound (see [`crate::wait`]).
//!
//! # Example
//!
//! ```no_run
//! use episode_harvest::retry::{IsRetryable, with_retry};
//! use episode_harvest::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (navigation timeouts, connection resets) should return `true`.
/// Permanent failures (missing elements, malformed attributes, dead browser) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Slow page loads are the common transient case
            Error::NavigationTimeout { .. } => true,
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            // The page rendered but lacks what we need; reloading won't help
            Error::ElementNotFound { .. }
            | Error::MalformedAttribute { .. }
            | Error::UnexpectedPageShape(_) => false,
            Error::SurfaceUnavailable(_) | Error::Cancelled => false,
            Error::CorruptPersistedState { .. }
            | Error::Config { .. }
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }
}

/// Run `operation`, retrying transient failures with exponential backoff
///
/// At most `config.max_attempts` retries follow the first attempt. The pause
/// starts at `initial_delay`, grows by `backoff_multiplier` per retry and never
/// exceeds `max_delay`. Permanent errors are returned immediately.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut retries = 0;
    let mut delay = config.initial_delay.min(config.max_delay);

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::debug!(retries, "Recovered after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let retryable = err.is_retryable();
        if !retryable || retries >= config.max_attempts {
            tracing::debug!(error = %err, retries, retryable, "Giving up");
            return Err(err);
        }
        retries += 1;

        let pause = if config.jitter { add_jitter(delay) } else { delay };
        tracing::warn!(
            error = %err,
            retry = retries,
            max_attempts = config.max_attempts,
            pause_ms = pause.as_millis() as u64,
            "Transient failure, retrying"
        );
        tokio::time::sleep(pause).await;

        delay = Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
            .unwrap_or(config.max_delay)
            .min(config.max_delay);
    }
}

/// Add random jitter to a delay
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
