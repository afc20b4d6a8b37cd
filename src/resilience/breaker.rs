//! Circuit breaker guarding an external dependency.
//!
//! ```text
//! Closed   -> Open     : failure rate in the rolling window exceeds the threshold
//! Open     -> HalfOpen : reset deadline passed (checked on the next call)
//! HalfOpen -> Closed   : the single trial call succeeds
//! HalfOpen -> Open     : the trial call fails (fresh deadline)
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Open when the failure percentage in the window is strictly above this.
    pub error_threshold_percent: f64,
    /// How long the breaker stays open before allowing a trial call.
    pub reset_timeout: Duration,
    /// Length of the rolling window outcomes are counted over.
    pub window: Duration,
    /// Minimum outcomes in the window before the breaker may open.
    pub minimum_calls: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold_percent: 50.0,
            reset_timeout: Duration::from_secs(30),
            window: Duration::from_secs(10),
            minimum_calls: 1,
        }
    }
}

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// A call was refused because the breaker is open.
#[derive(Debug, Clone, Error)]
#[error("Circuit breaker is open, retry in {retry_in:?}")]
pub struct BreakerOpen {
    pub retry_in: Duration,
}

#[derive(Debug)]
enum Phase {
    Closed,
    Open { reset_deadline: Instant },
    HalfOpen { trial_in_flight: bool },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    /// (completed_at, succeeded), oldest first.
    outcomes: VecDeque<(Instant, bool)>,
}

impl Inner {
    fn prune(&mut self, now: Instant, window: Duration) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        // Outcomes are appended in completion order, so the list is sorted.
        let cutoff_idx = self.outcomes.partition_point(|(at, _)| *at < cutoff);
        if cutoff_idx > 0 {
            self.outcomes.drain(0..cutoff_idx);
        }
    }

    fn failure_stats(&self) -> (usize, f64) {
        let total = self.outcomes.len();
        if total == 0 {
            return (0, 0.0);
        }
        let failures = self.outcomes.iter().filter(|(_, ok)| !ok).count();
        (total, failures as f64 / total as f64 * 100.0)
    }
}

/// Rolling-window circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                phase: Phase::Closed,
                outcomes: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, promoting an expired `Open` to `HalfOpen` for display.
    pub fn state(&self) -> BreakerState {
        match self.lock().phase {
            Phase::Closed => BreakerState::Closed,
            Phase::Open { reset_deadline } if Instant::now() >= reset_deadline => {
                BreakerState::HalfOpen
            }
            Phase::Open { .. } => BreakerState::Open,
            Phase::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    /// Ask permission for one call.
    ///
    /// The returned guard must be settled with [`BreakerCall::succeed`] or
    /// [`BreakerCall::fail`]. Dropping an unsettled trial guard lets the next
    /// caller attempt the trial instead.
    pub fn acquire(&self) -> Result<BreakerCall<'_>, BreakerOpen> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let now = Instant::now();

        let trial = match inner.phase {
            Phase::Closed => false,
            Phase::Open { reset_deadline } if now >= reset_deadline => {
                info!("Circuit breaker half-open, allowing a trial call");
                inner.phase = Phase::HalfOpen {
                    trial_in_flight: true,
                };
                true
            }
            Phase::Open { reset_deadline } => {
                return Err(BreakerOpen {
                    retry_in: reset_deadline - now,
                });
            }
            Phase::HalfOpen {
                trial_in_flight: true,
            } => {
                return Err(BreakerOpen {
                    retry_in: Duration::ZERO,
                });
            }
            Phase::HalfOpen {
                trial_in_flight: false,
            } => {
                inner.phase = Phase::HalfOpen {
                    trial_in_flight: true,
                };
                true
            }
        };

        Ok(BreakerCall {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn trip(&self, inner: &mut Inner, now: Instant) {
        let reset_deadline = now + self.config.reset_timeout;
        inner.phase = Phase::Open { reset_deadline };
        inner.outcomes.clear();
        warn!(
            "Circuit breaker opened for {:?}",
            self.config.reset_timeout
        );
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();

        if trial {
            inner.phase = Phase::Closed;
            inner.outcomes.clear();
            info!("Circuit breaker closed after successful trial call");
            return;
        }

        if matches!(inner.phase, Phase::Closed) {
            inner.outcomes.push_back((now, true));
            inner.prune(now, self.config.window);
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();

        if trial {
            self.trip(&mut inner, now);
            return;
        }

        if !matches!(inner.phase, Phase::Closed) {
            return;
        }

        inner.outcomes.push_back((now, false));
        inner.prune(now, self.config.window);

        let (total, failure_percent) = inner.failure_stats();
        debug!(total, failure_percent, "Recorded external call failure");
        if total >= self.config.minimum_calls
            && failure_percent > self.config.error_threshold_percent
        {
            self.trip(&mut inner, now);
        }
    }

    fn on_abandon(&self, trial: bool) {
        if !trial {
            return;
        }
        let mut inner = self.lock();
        if matches!(inner.phase, Phase::HalfOpen { .. }) {
            inner.phase = Phase::HalfOpen {
                trial_in_flight: false,
            };
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

/// Permission for one call through the breaker.
#[must_use = "settle the call with succeed() or fail()"]
pub struct BreakerCall<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl BreakerCall<'_> {
    /// Whether this is the half-open trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for BreakerCall<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandon(self.trial);
        }
    }
}
