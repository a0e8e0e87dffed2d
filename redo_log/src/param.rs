//! Compile-time sizing for the log.

/// Device block size in bytes.
pub const BLOCK_SIZE: usize = 1024;

/// Max number of blocks any single FS operation may log.
pub const MAX_OP_BLOCKS: usize = 10;

/// Max number of distinct blocks held by one transaction group.
pub const LOG_SIZE: usize = MAX_OP_BLOCKS * 3;

const _: () = const {
    assert!(MAX_OP_BLOCKS <= LOG_SIZE, "MAX_OP_BLOCKS must fit within LOG_SIZE");
    assert!(
        LOG_SIZE >= MAX_OP_BLOCKS * 2,
        "LOG_SIZE must leave room for at least one concurrent op beyond the one being admitted"
    );
};
