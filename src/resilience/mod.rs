//! Resilient calls to an external dependency.
//!
//! Each logical call passes through a [`CircuitBreaker`]; beneath it the
//! [`RetryPolicy`] retries transient failures with exponential backoff. The
//! breaker records one outcome per logical call, after retries.
//!
//! Callers only see [`ExternalServiceUnavailable`]; whether the breaker
//! refused the call or retries ran out is logged, not returned.

mod breaker;
mod http;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub use breaker::{BreakerCall, BreakerConfig, BreakerOpen, BreakerState, CircuitBreaker};
pub use http::{HttpExternalService, DEFAULT_TIMEOUT};
pub use retry::{ExternalCallError, FailureKind, RetryPolicy};

/// A dependency that can be asked for its current data.
#[async_trait]
pub trait ExternalService: Send + Sync {
    /// Name used in logs and health output.
    fn name(&self) -> &str;

    /// Perform a single attempt.
    async fn fetch(&self) -> Result<Value, ExternalCallError>;
}

/// Why a resilient call failed.
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    CircuitOpen(#[from] BreakerOpen),

    #[error("Retries exhausted: {0}")]
    Failed(#[from] ExternalCallError),
}

/// The external dependency could not be reached.
#[derive(Debug, Clone, Error)]
#[error("External service is unavailable")]
pub struct ExternalServiceUnavailable;

/// Retry + circuit breaker wrapper around an [`ExternalService`].
pub struct ResilientClient {
    service: Arc<dyn ExternalService>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl ResilientClient {
    pub fn new(service: Arc<dyn ExternalService>, retry: RetryPolicy, breaker: BreakerConfig) -> Self {
        Self {
            service,
            retry,
            breaker: CircuitBreaker::new(breaker),
        }
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Fetch from the dependency, hiding the failure cause.
    pub async fn call(&self) -> Result<Value, ExternalServiceUnavailable> {
        self.call_detailed().await.map_err(|e| {
            warn!(service = self.service.name(), "External call failed: {}", e);
            ExternalServiceUnavailable
        })
    }

    /// Fetch from the dependency, reporting why it failed.
    pub async fn call_detailed(&self) -> Result<Value, CallError> {
        let permit = self.breaker.acquire()?;
        let service = &self.service;

        let result = self
            .retry
            .run(move |attempt| {
                debug!(service = service.name(), attempt, "Calling external service");
                service.fetch()
            })
            .await;

        match result {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(err) => {
                permit.fail();
                Err(err.into())
            }
        }
    }
}

/// Total worst-case time a call may take before giving up, for logging.
pub fn worst_case_duration(retry: &RetryPolicy, per_attempt: Duration) -> Duration {
    let attempts = retry.max_attempts.max(1);
    let waits: Duration = (1..attempts).map(|n| retry.backoff(n)).sum();
    per_attempt * attempts + waits
}
