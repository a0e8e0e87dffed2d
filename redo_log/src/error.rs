//! Errors surfaced by the log.
//!
//! Most failure modes described in the design (an op writing outside a
//! transaction, a transaction group overflowing its reservation, a copy
//! starting while a commit is still installing) are invariant violations,
//! not recoverable conditions, and are raised as panics at the point of
//! violation rather than through this type — see the `assert!`s in
//! [`crate::log`]. [`LogError`] only covers what a caller can reasonably
//! be asked to handle.

/// Errors that can be returned from [`crate::log::Log::new`] and the
/// commit path.
#[derive(Debug, thiserror::Error)]
pub enum LogError<E> {
    /// The log header does not fit in a single device block.
    #[error("log header is {0} bytes, which does not fit in a single block")]
    HeaderTooLarge(usize),

    /// The buffer cache's underlying device reported a read or write failure.
    #[error("device I/O failed")]
    DeviceIo(#[source] E),
}
