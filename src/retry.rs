//! Retry logic with exponential backoff
//!
//! HTTP calls (session refresh, backup archive, leaf exports) are retried on
//! transient failures with exponential backoff and optional jitter. Node
//! subscriptions are not retried here: a subscription that never loads is
//! bounded by the resolver's timeout instead.
//!
//! # Example
//!
//! ```no_run
//! use brain_mirror::retry::{IsRetryable, with_retry};
//! use brain_mirror::config::RetryConfig;
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
//! with_retry(&config, || async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{ArchiveError, AuthError, Error, FetchError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused or reset connections, 5xx) return `true`.
/// Permanent failures (bad credential, missing document, bad config) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { transient, .. } => *transient,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::NotFound { .. } | FetchError::Unauthorized { .. } => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Fetch(e) => e.is_retryable(),
            Error::Auth(AuthError::Rejected { status }) => *status >= 500,
            Error::Archive(ArchiveError::DownloadFailed { status }) => *status >= 500,
            Error::Auth(_)
            | Error::Archive(_)
            | Error::Config { .. }
            | Error::Serialization(_)
            | Error::Channel(_)
            | Error::IncompleteResolution { .. }
            | Error::Cancelled
            | Error::Other(_) => false,
        }
    }
}

/// Delay schedule for one retried operation
///
/// Starts at `initial_delay`, grows by `backoff_multiplier` per attempt and
/// is capped at `max_delay`. With jitter each delay lands in `[d, 2d]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Duration,
    remaining: u32,
    multiplier: f64,
    cap: Duration,
    jitter: bool,
}

impl Backoff {
    /// Schedule for `config`
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            delay: config.initial_delay,
            remaining: config.max_attempts,
            multiplier: config.backoff_multiplier,
            cap: config.max_delay,
            jitter: config.jitter,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let base = self.delay;
        self.delay = Duration::from_secs_f64(base.as_secs_f64() * self.multiplier).min(self.cap);
        Some(if self.jitter { add_jitter(base) } else { base })
    }
}

/// Run `operation`, retrying transient failures on a [`Backoff`] schedule
///
/// `max_attempts` counts retries, so the operation runs at most
/// `max_attempts + 1` times. A non-retryable error is returned at once.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);
    let mut retries = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(retries, "request succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            tracing::debug!(error = %err, "request failed permanently");
            return Err(err);
        }
        let Some(delay) = backoff.next() else {
            tracing::error!(error = %err, retries, "request failed, retries exhausted");
            return Err(err);
        };

        retries += 1;
        tracing::warn!(
            error = %err,
            retry = retries,
            delay_ms = delay.as_millis() as u64,
            "transient request failure, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Stretch `delay` by a random factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    delay.mul_f64(factor)
}
