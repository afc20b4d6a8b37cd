//! Bounded-concurrency FIFO execution.
//!
//! At most `capacity` work items run at once; the rest wait in arrival
//! order. A finishing item (success, error, or panic) always hands its slot
//! to the oldest waiter still interested in it.
//!
//! Queued callers may give up at any time: dropping the `submit` future, or
//! hitting the configured queue timeout, removes the caller from contention
//! without disturbing the order of the others. Work that has started keeps
//! running to completion on its own task.

mod slot;
mod work_item;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use slot::{Admission, SlotPool};
pub use work_item::WorkItem;

/// Default number of simultaneously executing items.
pub const DEFAULT_CAPACITY: usize = 5;

/// Limiter configuration.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Maximum number of items executing at once (at least 1).
    pub capacity: usize,
    /// Maximum number of items allowed to wait. `None` means unbounded.
    pub max_queued: Option<usize>,
    /// How long a caller waits for a slot before giving up.
    pub queue_timeout: Option<Duration>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_queued: None,
            queue_timeout: None,
        }
    }
}

/// Errors surfaced by [`ConcurrencyLimiter::submit`].
#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("Queue is full ({0} items waiting)")]
    QueueFull(usize),

    #[error("Timed out after {0:?} waiting for a free slot")]
    QueueTimeout(Duration),

    #[error("Limiter closed before a slot was granted")]
    Closed,

    #[error("Work item {id} did not complete: {reason}")]
    WorkerFailed { id: Uuid, reason: String },
}

/// Point-in-time view of limiter occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    pub capacity: usize,
    pub in_flight: usize,
    pub queued: usize,
}

/// Owned FIFO concurrency limiter. Clones share the same slots and queue.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    slots: Arc<SlotPool>,
    config: LimiterConfig,
}

impl ConcurrencyLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            slots: Arc::new(SlotPool::new(capacity)),
            config,
        }
    }

    /// Create an unbounded-queue limiter with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(LimiterConfig {
            capacity,
            ..Default::default()
        })
    }

    /// Current occupancy.
    pub fn stats(&self) -> LimiterStats {
        let (in_flight, queued) = self.slots.counts();
        LimiterStats {
            capacity: self.slots.capacity(),
            in_flight,
            queued,
        }
    }

    /// Run `item` once a slot is available and resolve with its output.
    ///
    /// The work runs on its own task, so a panic inside it is reported as
    /// [`LimiterError::WorkerFailed`] and its slot is still released.
    pub async fn submit<F, T>(&self, item: WorkItem<F>) -> Result<T, LimiterError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (id, arrived_at, work) = item.into_parts();

        let permit = match self.slots.admit(self.config.max_queued)? {
            Admission::Ready(permit) => permit,
            Admission::Queued(rx) => {
                debug!(work_id = %id, queued = self.stats().queued, "All slots busy, queueing work item");
                match self.config.queue_timeout {
                    Some(limit) => match tokio::time::timeout(limit, rx).await {
                        Ok(granted) => granted.map_err(|_| LimiterError::Closed)?,
                        Err(_) => {
                            warn!(work_id = %id, "Gave up waiting for a slot after {:?}", limit);
                            return Err(LimiterError::QueueTimeout(limit));
                        }
                    },
                    None => rx.await.map_err(|_| LimiterError::Closed)?,
                }
            }
        };

        debug!(
            work_id = %id,
            queued_for_ms = arrived_at.elapsed().as_millis() as u64,
            "Starting work item"
        );

        let handle = tokio::spawn(async move {
            let _permit = permit;
            work.await
        });

        handle.await.map_err(|e| {
            warn!(work_id = %id, "Work item failed: {}", e);
            LimiterError::WorkerFailed {
                id,
                reason: e.to_string(),
            }
        })
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(LimiterConfig::default())
    }
}
