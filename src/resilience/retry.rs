//! Retry with exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Default total number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network-level failure or server-side (5xx) error.
    Transient,
    /// Client-side (4xx) error or an unusable response.
    Permanent,
}

/// Failure of a single call to an external dependency.
#[derive(Debug, Clone, Error)]
pub enum ExternalCallError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    #[error("Client error: HTTP {0}")]
    ClientError(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ExternalCallError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) | Self::Connect(_) | Self::ServerError(_) => FailureKind::Transient,
            Self::ClientError(_) | Self::InvalidResponse(_) => FailureKind::Permanent,
        }
    }

    /// Classify an HTTP status code that was not a success.
    pub fn from_status(status: u16) -> Self {
        if status >= 500 {
            Self::ServerError(status)
        } else {
            Self::ClientError(status)
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each retry after.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `failed_attempts` attempts have failed (1-based).
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, ExternalCallError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ExternalCallError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match err.kind() {
                FailureKind::Permanent => {
                    debug!(attempt, "Not retrying permanent failure: {}", err);
                    return Err(err);
                }
                FailureKind::Transient if attempt >= max_attempts => {
                    warn!(attempts = attempt, "Giving up after transient failures: {}", err);
                    return Err(err);
                }
                FailureKind::Transient => {
                    let delay = self.backoff(attempt);
                    debug!(attempt, "Transient failure, retrying in {:?}: {}", delay, err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
