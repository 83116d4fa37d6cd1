//! External stop requests for the producer and consumer drivers.
//!
//! A [`CancelToken`] interrupts two kinds of waits:
//!
//! - a `produce`/`consume` call blocked inside a [`BoundedBuffer`](crate::BoundedBuffer)
//! - a pacing delay taken through [`CancelToken::sleep`]
//!
//! Blocked buffer calls register their buffer with the token for the duration
//! of the wait. `cancel()` then takes each registered buffer's lock before
//! notifying, so a waiter that saw the flag unset just before sleeping still
//! receives the wakeup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use crate::buffer::lock;
use crate::error::Cancelled;

/// Something a blocked call can be woken from.
pub(crate) trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    sleep_lock: Mutex<()>,
    sleep_cv: Condvar,
    waiters: Mutex<Vec<Weak<dyn Interrupt>>>,
}

/// Shared stop request. Clones observe and trigger the same cancellation.
#[derive(Clone, Default)]
pub struct CancelToken {
    state: Arc<TokenState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Requests cancellation. Idempotent.
    ///
    /// Wakes every sleeper and every buffer call currently blocked on behalf
    /// of this token; those calls return their cancellation error.
    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("cancellation requested");

        {
            let _guard = lock(&self.state.sleep_lock);
            self.state.sleep_cv.notify_all();
        }

        // Release the registry before touching any buffer lock: waiters take
        // the registry lock while holding their buffer lock.
        let waiters = std::mem::take(&mut *lock(&self.state.waiters));
        for waiter in waiters.iter().filter_map(Weak::upgrade) {
            waiter.interrupt();
        }
    }

    /// Sleeps for `duration`, returning early with [`Cancelled`] if the token
    /// fires first.
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        let deadline = Instant::now().checked_add(duration);
        let mut guard = lock(&self.state.sleep_lock);
        loop {
            if self.is_cancelled() {
                return Err(Cancelled);
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(());
                    }
                    guard = self
                        .state
                        .sleep_cv
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                None => {
                    guard = self
                        .state
                        .sleep_cv
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Registers `target` to be interrupted on cancellation until the
    /// returned guard is dropped.
    ///
    /// Callers must check [`is_cancelled`](Self::is_cancelled) *after*
    /// registering, under the lock that `target.interrupt()` acquires.
    pub(crate) fn register(&self, target: Weak<dyn Interrupt>) -> Registration<'_> {
        lock(&self.state.waiters).push(target.clone());
        Registration {
            token: self,
            target,
        }
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        lock(&self.state.waiters).len()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
    target: Weak<dyn Interrupt>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        // Both sides may register the same buffer with one token; drop only
        // this call's entry.
        let mut waiters = lock(&self.token.state.waiters);
        if let Some(index) = waiters.iter().position(|w| Weak::ptr_eq(w, &self.target)) {
            waiters.swap_remove(index);
        }
    }
}
