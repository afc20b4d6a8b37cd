//! A single unit of deferred work submitted to the limiter.

use tokio::time::Instant;
use uuid::Uuid;

/// Deferred computation plus the bookkeeping the limiter logs against.
///
/// The future is not polled until the limiter grants it a slot.
pub struct WorkItem<F> {
    id: Uuid,
    arrived_at: Instant,
    work: F,
}

impl<F> WorkItem<F> {
    /// Wrap `work`, stamping it with a fresh id and the current time.
    pub fn new(work: F) -> Self {
        Self::with_id(Uuid::new_v4(), work)
    }

    pub fn with_id(id: Uuid, work: F) -> Self {
        Self {
            id,
            arrived_at: Instant::now(),
            work,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn arrived_at(&self) -> Instant {
        self.arrived_at
    }

    pub(super) fn into_parts(self) -> (Uuid, Instant, F) {
        (self.id, self.arrived_at, self.work)
    }
}
