//! Slot accounting shared by every clone of a limiter.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use super::LimiterError;

/// Outcome of asking the pool for a slot.
pub(super) enum Admission {
    /// A slot was free; work may start now.
    Ready(SlotPermit),
    /// No slot was free; the permit arrives on this channel in FIFO order.
    Queued(oneshot::Receiver<SlotPermit>),
}

struct PoolState {
    in_flight: usize,
    pending: VecDeque<oneshot::Sender<SlotPermit>>,
}

/// Fixed-capacity slot pool with a FIFO wait list.
///
/// Invariants: `in_flight <= capacity`, and `pending` is only non-empty
/// while every slot is taken. A freed slot is handed straight to the oldest
/// live waiter without passing through `in_flight`.
pub(super) struct SlotPool {
    capacity: usize,
    state: Mutex<PoolState>,
}

impl SlotPool {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(PoolState {
                in_flight: 0,
                pending: VecDeque::new(),
            }),
        }
    }

    // Critical sections never panic mid-update, so a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take a slot if one is free, otherwise join the tail of the wait list.
    pub(super) fn admit(
        self: &Arc<Self>,
        max_queued: Option<usize>,
    ) -> Result<Admission, LimiterError> {
        let mut state = self.lock();

        if state.in_flight < self.capacity {
            state.in_flight += 1;
            return Ok(Admission::Ready(SlotPermit::new(Arc::clone(self))));
        }

        if let Some(max) = max_queued {
            if state.pending.len() >= max {
                // Callers that gave up still occupy the list until a slot frees.
                state.pending.retain(|tx| !tx.is_closed());
                if state.pending.len() >= max {
                    return Err(LimiterError::QueueFull(state.pending.len()));
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        state.pending.push_back(tx);
        Ok(Admission::Queued(rx))
    }

    /// Return a slot: hand it to the oldest waiter still listening, or free it.
    fn release(self: &Arc<Self>) {
        let mut state = self.lock();

        while let Some(tx) = state.pending.pop_front() {
            match tx.send(SlotPermit::new(Arc::clone(self))) {
                Ok(()) => return,
                Err(permit) => permit.disarm(),
            }
        }

        state.in_flight = state.in_flight.saturating_sub(1);
    }

    /// (in_flight, live waiters)
    pub(super) fn counts(&self) -> (usize, usize) {
        let state = self.lock();
        let queued = state.pending.iter().filter(|tx| !tx.is_closed()).count();
        (state.in_flight, queued)
    }
}

/// Ownership of one execution slot. Dropping it releases the slot.
pub(super) struct SlotPermit {
    pool: Option<Arc<SlotPool>>,
}

impl SlotPermit {
    fn new(pool: Arc<SlotPool>) -> Self {
        Self { pool: Some(pool) }
    }

    /// Drop without releasing; used when the permit never reached a holder.
    fn disarm(mut self) {
        self.pool = None;
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release();
        }
    }
}
