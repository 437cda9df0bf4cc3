//! FIFO admission gate bounding requests in flight.
//!
//! A caller that finds every slot taken queues a one-shot waiter. Releasing a
//! slot hands it straight to the oldest live waiter, so the held count never
//! dips between release and re-acquire and later callers cannot overtake.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

/// Error returned by [`AdmissionGate::acquire_timeout`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum GateError {
    /// The wait for a slot exceeded the given duration.
    #[error("timed out waiting for a request slot")]
    Timeout,
}

#[derive(Default)]
struct GateState {
    held: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Bounds the number of logical requests in flight.
pub struct AdmissionGate {
    max_concurrent: usize,
    state: Mutex<GateState>,
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("max_concurrent", &self.max_concurrent)
            .field("in_flight", &self.in_flight())
            .field("waiting", &self.waiting())
            .finish()
    }
}

impl AdmissionGate {
    /// Creates a gate with `max_concurrent` slots. Zero is treated as one.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of slots currently held.
    pub fn in_flight(&self) -> usize {
        self.lock().held
    }

    /// Number of callers queued for a slot.
    pub fn waiting(&self) -> usize {
        self.lock()
            .waiters
            .iter()
            .filter(|waiter| !waiter.is_closed())
            .count()
    }

    /// Waits for a slot. Never fails; callers are served in arrival order.
    pub async fn acquire(&self) -> RequestSlot<'_> {
        let receiver = {
            let mut state = self.lock();
            if state.held < self.max_concurrent {
                state.held += 1;
                return RequestSlot { gate: self };
            }
            // Drop entries left behind by cancelled or timed-out waiters.
            state.waiters.retain(|waiter| !waiter.is_closed());
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);

            #[cfg(feature = "tracing")]
            tracing::debug!(
                queued = state.waiters.len(),
                max_concurrent = self.max_concurrent,
                "all request slots busy, queueing"
            );

            receiver
        };

        let mut waiter = PendingWaiter {
            gate: self,
            receiver: Some(receiver),
        };
        waiter.granted().await;
        RequestSlot { gate: self }
    }

    /// Waits for a slot for at most `limit`.
    pub async fn acquire_timeout(&self, limit: Duration) -> Result<RequestSlot<'_>, GateError> {
        tokio::time::timeout(limit, self.acquire())
            .await
            .map_err(|_| GateError::Timeout)
    }

    fn release(&self) {
        let mut state = self.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            // A failed send means the waiter gave up; try the next one.
            if waiter.send(()).is_ok() {
                #[cfg(feature = "tracing")]
                tracing::debug!(queued = state.waiters.len(), "request slot handed to waiter");
                return;
            }
        }
        state.held = state.held.saturating_sub(1);
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Permission for one logical request to be in flight.
///
/// Dropping the slot releases it.
#[must_use = "the slot is released as soon as it is dropped"]
pub struct RequestSlot<'a> {
    gate: &'a AdmissionGate,
}

impl fmt::Debug for RequestSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSlot").finish_non_exhaustive()
    }
}

impl Drop for RequestSlot<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// Queue entry owned by a suspended `acquire` call.
struct PendingWaiter<'a> {
    gate: &'a AdmissionGate,
    receiver: Option<oneshot::Receiver<()>>,
}

impl PendingWaiter<'_> {
    async fn granted(&mut self) {
        if let Some(receiver) = self.receiver.as_mut() {
            // Senders live in the gate's queue and are only consumed by
            // `release`, which always sends before dropping them.
            let _ = receiver.await;
        }
        self.receiver = None;
    }
}

impl Drop for PendingWaiter<'_> {
    fn drop(&mut self) {
        let Some(mut receiver) = self.receiver.take() else {
            return;
        };
        receiver.close();
        // The slot may have been handed over just before cancellation.
        if receiver.try_recv().is_ok() {
            self.gate.release();
        }
    }
}
