//! A crash-safe, concurrent write-ahead redo log for a block-addressed
//! device, with a background commit worker.
//!
//! An FS call wraps its writes in [`log::Log::begin_op`] /
//! [`log::Log::end_op`] (or [`log::Log::do_op`]) and records each modified
//! buffer with [`log::Log::write`]. The log batches a group of such writes
//! into one on-disk transaction: the group's blocks are copied into a
//! reserved log region, a single header write commits the whole group
//! atomically, and a background worker then installs the committed blocks
//! to their home locations and erases the header. A crash at any point
//! leaves either no trace of the group, or a fully committed header that
//! [`log::Log::new`] replays on the next open.
//!
//! There is no process-wide singleton: construct a [`log::Log`] behind an
//! `Arc`, share it with whatever threads call into the filesystem, and
//! spawn its worker with [`log::Log::spawn_worker`].

pub mod device;
pub mod error;
pub mod header;
pub mod log;
pub mod param;
mod sync;
mod trace;

pub use device::{BlockDevice, BlockNo, DeviceNo, SuperBlock};
pub use error::LogError;
pub use log::Log;
