//! Types shared with the buffer-cache and device collaborators. The cache
//! itself, the block device, and the scheduler's sleep/wakeup primitive are
//! external collaborators this crate does not implement; [`crate::sync`]
//! stands in for sleep/wakeup and `block_io` (a separate workspace crate)
//! stands in for the buffer cache.

use core::num::NonZeroU32;

use dataview::Pod;

use crate::param::BLOCK_SIZE;

/// Identifies a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct DeviceNo(NonZeroU32);

impl DeviceNo {
    #[must_use]
    pub const fn new(n: u32) -> Option<Self> {
        match NonZeroU32::new(n) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }

    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0.get()
    }
}

/// A block number within a device's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Pod)]
#[repr(transparent)]
pub struct BlockNo(u32);

impl BlockNo {
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn as_index(&self) -> usize {
        usize::try_from(self.0).unwrap()
    }
}

/// The superblock fields the log cares about: where the log region starts
/// and how long it is.
#[derive(Debug, Clone, Copy)]
pub struct SuperBlock {
    /// Block number of the first log block (the header).
    pub log_start: u32,
    /// Length of the log region in blocks, including the header.
    pub log_len: u32,
}

/// A block device that reads and writes fixed-size blocks.
///
/// Mirrors `block_io::BlockDevice`; re-exported here so downstream crates
/// only need to depend on `redo_log` to implement one.
pub use block_io::BlockDevice;

pub(crate) type BlockDataMutex = mutex_api::StdMutex<block_io::BlockData<BLOCK_SIZE>>;
pub(crate) type BufferListMutex = mutex_api::StdMutex<block_io::BufferList<BlockDataMutex>>;

/// The buffer cache type a [`crate::log::Log`] is built on.
pub type Cache<Device> = block_io::BlockIoCache<Device, BufferListMutex>;

/// A handle to a cached block, not yet locked for access.
pub type BlockHandle<'a, Device> = block_io::BlockHandle<'a, Device, BufferListMutex, BlockDataMutex>;

/// A locked, possibly-not-yet-read block buffer.
pub type BlockGuard<'a, 'b, Device, const VALID: bool> =
    block_io::BlockGuard<'a, 'b, Device, BufferListMutex, BlockDataMutex, BLOCK_SIZE, VALID>;
