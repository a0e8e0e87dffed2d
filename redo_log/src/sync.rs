//! Locking primitives for the log.
//!
//! The design calls for two mutexes with a fixed main-then-commit
//! acquisition order, each with its own broadcast-capable condition
//! variable, so a state transition can wake every waiter class parked on
//! that lock (admission-waiters and flush-starters on the main lock; the
//! worker on the commit lock) at once. This crate runs hosted, so the
//! shape is built directly on `std::sync::{Mutex, Condvar}` rather than a
//! bare-metal spinlock and sleep/wakeup primitive.

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A mutex protecting `T`.
pub struct Lock<T> {
    mutex: Mutex<T>,
}

impl<T> Lock<T> {
    pub fn new(value: T) -> Self {
        Self {
            mutex: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> LockGuard<'_, T> {
        LockGuard(self.mutex.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// A held [`Lock`].
pub struct LockGuard<'a, T>(MutexGuard<'a, T>);

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// A wait channel for every class of waiter parked on one particular
/// [`Lock`]. A `std::sync::Condvar` may only be used with one mutex at a
/// time, so each `Lock` that needs waiters gets its own `CondVar` rather
/// than sharing one across locks.
///
/// Every wakeup is a broadcast, never a single-waiter signal: more than
/// one class of waiter may be parked here at once, and a targeted signal
/// could wake the wrong one and strand the others.
pub struct CondVar {
    inner: Condvar,
}

impl CondVar {
    pub fn new() -> Self {
        Self {
            inner: Condvar::new(),
        }
    }

    /// Atomically releases `guard`'s lock and parks the caller until
    /// [`CondVar::notify_all`] is called, then re-acquires the lock.
    ///
    /// Like any condition variable wait, this can wake spuriously; callers
    /// must re-check their predicate in a loop.
    pub fn wait<'a, T>(&self, guard: LockGuard<'a, T>) -> LockGuard<'a, T> {
        LockGuard(
            self.inner
                .wait(guard.0)
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Wakes every thread waiting on this channel.
    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}
