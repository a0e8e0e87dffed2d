//! A simple mutex API.
#![cfg_attr(not(feature = "std"), no_std)]

use core::ops::DerefMut;

/// A mutex.
pub trait Mutex {
    /// The type of the data that the mutex protects.
    type Data;

    /// The type of the guard that the `lock` method returns.
    type Guard<'a>: DerefMut<Target = Self::Data>
    where
        Self: 'a;

    /// Creates a new mutex.
    fn new(data: Self::Data) -> Self;

    /// Locks the mutex.
    fn lock(&self) -> Self::Guard<'_>;
}

#[cfg(feature = "std")]
mod std_impl {
    use std::ops::{Deref, DerefMut};

    use super::Mutex;

    /// A [`Mutex`] backed by [`std::sync::Mutex`].
    ///
    /// Used wherever a lock is needed outside a bare-metal kernel, e.g. by
    /// `block_io`'s buffer list lock and by `redo_log`'s own main/commit
    /// locks.
    pub struct StdMutex<T>(std::sync::Mutex<T>);

    /// Guard returned by [`StdMutex::lock`].
    pub struct StdMutexGuard<'a, T>(std::sync::MutexGuard<'a, T>);

    impl<T> Mutex for StdMutex<T> {
        type Data = T;
        type Guard<'a>
            = StdMutexGuard<'a, T>
        where
            T: 'a;

        fn new(data: Self::Data) -> Self {
            Self(std::sync::Mutex::new(data))
        }

        fn lock(&self) -> Self::Guard<'_> {
            // A poisoned mutex means a prior holder panicked mid-update;
            // there is no well-defined recovery, so propagate the panic.
            StdMutexGuard(self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner))
        }
    }

    impl<T> Deref for StdMutexGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            &self.0
        }
    }

    impl<T> DerefMut for StdMutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut Self::Target {
            &mut self.0
        }
    }
}

#[cfg(feature = "std")]
pub use std_impl::{StdMutex, StdMutexGuard};
