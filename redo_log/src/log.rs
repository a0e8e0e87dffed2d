//! The log itself: admission, append, op termination, the flush/commit
//! state machine, the commit worker, and recovery.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::device::{BlockDevice, BlockNo, Cache, DeviceNo, SuperBlock};
use crate::error::LogError;
use crate::header::LogHeader;
use crate::param::{BLOCK_SIZE, LOG_SIZE, MAX_OP_BLOCKS};
use crate::sync::{CondVar, Lock};
use crate::trace::trace;

/// The three states of the flush/commit state machine, encoded as a single
/// tagged enum rather than independent booleans so that copying and
/// committing can never both hold at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitState {
    /// No transaction group is being flushed or installed.
    Idle,
    /// A thread is writing the group's payload and header to the log
    /// region.
    Copying,
    /// A committed header is on disk; the worker has not finished
    /// installing it.
    Committing,
}

struct MainData {
    /// Number of ops that have passed admission and not yet called `end_op`.
    outstanding: usize,
    /// The header of the transaction group currently being assembled.
    header: LogHeader,
}

struct CommitData {
    state: CommitState,
    /// The header of the group mid-flight between the copy phase and the
    /// worker's install phase. Populated when `state` becomes `Committing`,
    /// taken by the worker before it drops the lock to do I/O.
    pending: Option<LogHeader>,
    /// Set by [`Log::shutdown`] to stop the worker's loop.
    shutdown: bool,
}

/// A write-ahead redo log for a block-addressed device, with a background
/// commit worker.
///
/// `Log` owns its buffer cache and is meant to be held behind an `Arc` and
/// shared between the FS call threads and the worker thread spawned by
/// [`Log::spawn_worker`] — there is no process-wide singleton.
pub struct Log<Device> {
    cache: Cache<Device>,
    dev: DeviceNo,
    /// Block number of the header block.
    start: u32,
    /// Length of the log region in blocks, including the header.
    size: u32,
    main: Lock<MainData>,
    /// Wait channel for threads parked on `main`: admission blocked on
    /// space or a pending copy, and any `begin_op`/`end_op` waiting to
    /// re-check the space-reservation predicate.
    main_cond: CondVar,
    commit: Lock<CommitData>,
    /// Wait channel for threads parked on `commit`: the worker waiting for
    /// a transaction to install, and copiers waiting for a prior commit to
    /// finish before starting a new one. Kept separate from `main_cond`
    /// because a `std::sync::Condvar` may only be waited on against one
    /// mutex at a time, and `main` and `commit` are two different mutexes.
    commit_cond: CondVar,
}

/// Checks that a header of `header_size` bytes fits in a block of
/// `block_size` bytes, independent of this crate's own compile-time
/// constants.
pub(crate) fn check_header_fits(header_size: usize, block_size: usize) -> Result<(), usize> {
    if header_size < block_size {
        Ok(())
    } else {
        Err(header_size)
    }
}

impl<Device> Log<Device>
where
    Device: BlockDevice<BLOCK_SIZE>,
{
    /// Creates a log over `start..start+size` on `dev`, backed by `device`,
    /// and replays any committed-but-not-installed transaction before
    /// returning.
    ///
    /// `cache_blocks` is the number of buffers in the backing cache; it must
    /// be at least `MAX_OP_BLOCKS + 1` for a single op to make progress.
    pub fn new(
        dev: DeviceNo,
        sb: SuperBlock,
        device: Device,
        cache_blocks: usize,
    ) -> Result<Arc<Self>, LogError<Device::Error>> {
        check_header_fits(size_of::<LogHeader>(), BLOCK_SIZE).map_err(LogError::HeaderTooLarge)?;

        let cache = Cache::new(device);
        cache.init(cache_blocks);

        let log = Arc::new(Self {
            cache,
            dev,
            start: sb.log_start,
            size: sb.log_len,
            main: Lock::new(MainData {
                outstanding: 0,
                header: LogHeader::empty(),
            }),
            main_cond: CondVar::new(),
            commit: Lock::new(CommitData {
                state: CommitState::Idle,
                pending: None,
                shutdown: false,
            }),
            commit_cond: CondVar::new(),
        });
        log.recover_from_log()?;
        Ok(log)
    }

    /// Starts an FS transaction.
    ///
    /// Blocks until the op has reserved `MAX_OP_BLOCKS` worth of log space.
    /// May itself perform a flush (copy phase) if the log is close to full
    /// and no other thread has already started one.
    pub fn begin_op(&self) -> Result<(), LogError<Device::Error>> {
        let mut data = self.main.lock();
        loop {
            if self.commit.lock().state == CommitState::Copying {
                data = self.main_cond.wait(data);
                continue;
            }

            if data.header.len() + (data.outstanding + 1) * MAX_OP_BLOCKS > LOG_SIZE {
                // A flush only helps if there is something to flush; an empty
                // header means the congestion can only be relieved by another
                // thread's `end_op`, so just wait for it instead of spinning
                // through a pointless Idle -> Copying -> Idle cycle.
                let elected = if data.header.is_empty() {
                    None
                } else {
                    self.try_elect_copier()
                };
                match elected {
                    Some(to_flush) => {
                        let captured = std::mem::replace(&mut data.header, to_flush);
                        drop(data);
                        self.run_copy_phase(captured)?;
                        data = self.main.lock();
                        continue;
                    }
                    None => {
                        data = self.main_cond.wait(data);
                        continue;
                    }
                }
            }

            data.outstanding += 1;
            break;
        }
        Ok(())
    }

    /// Ends an FS transaction.
    ///
    /// If the group is close to full, initiates a flush so the next
    /// `begin_op` is not starved; otherwise just wakes space-waiters.
    pub fn end_op(&self) -> Result<(), LogError<Device::Error>> {
        let mut data = self.main.lock();
        assert!(data.outstanding > 0, "end_op called without a matching begin_op");
        data.outstanding -= 1;

        if !data.header.is_empty() && data.header.len() > LOG_SIZE - MAX_OP_BLOCKS {
            if let Some(to_flush) = self.try_elect_copier() {
                let captured = std::mem::replace(&mut data.header, to_flush);
                drop(data);
                self.run_copy_phase(captured)?;
                self.notify_all_waiters();
                return Ok(());
            }
        }

        drop(data);
        self.notify_all_waiters();
        Ok(())
    }

    /// Wakes every thread parked on either wait channel.
    ///
    /// A single state transition (the header emptying, the commit state
    /// changing) can matter to admission waiters parked on `main` and to
    /// the worker or a flush-starter parked on `commit` at the same time,
    /// so every broadcast point wakes both channels rather than picking
    /// one.
    fn notify_all_waiters(&self) {
        self.main_cond.notify_all();
        self.commit_cond.notify_all();
    }

    /// Fetches a handle to a cached block for the caller to read or modify
    /// directly.
    ///
    /// Callers must not call the guard's own `write` to push a modified home
    /// block straight to the device — that bypasses the log entirely. Modify
    /// the buffer, hand it to [`Log::write`] to record it in the current
    /// transaction, and let the worker's install phase perform the eventual
    /// device write.
    pub fn get(&self, block_no: BlockNo) -> crate::device::BlockHandle<'_, Device> {
        self.cache.get(block_no.as_index())
    }

    /// Runs `f` inside a transaction: `begin_op`, then `f`, then `end_op`.
    pub fn do_op<T>(&self, f: impl FnOnce() -> T) -> Result<T, LogError<Device::Error>> {
        self.begin_op()?;
        let result = f();
        self.end_op()?;
        Ok(result)
    }

    /// Records that `buf` (already holding valid, caller-modified data) is
    /// part of the current transaction group.
    ///
    /// Must be called between a `begin_op`/`end_op` pair for the same op.
    /// Repeated calls for the same block absorb into one slot. Pins `buf` in
    /// the cache on first record; the pin is released by the worker once the
    /// block has been installed.
    ///
    /// # Panics
    ///
    /// Panics if called with no op outstanding, or if the group is already
    /// at its reserved capacity — both are programmer errors, not
    /// recoverable conditions.
    pub fn write(&self, buf: &mut crate::device::BlockGuard<'_, '_, Device, true>) {
        let mut data = self.main.lock();
        assert!(data.outstanding > 0, "log_write called outside a transaction");
        assert!(
            data.header.len() < LOG_SIZE && data.header.len() < self.size as usize - 1,
            "transaction group exceeded reserved log space"
        );

        let block_no = BlockNo::new(u32::try_from(buf.index()).expect("block number must fit in u32"));
        if data.header.record(block_no) {
            // SAFETY: the buffer was just read/written through `buf`, so it
            // is a live, valid cache entry; pinning keeps it resident until
            // the worker installs and unpins it.
            unsafe { buf.pin() };
        }
    }

    /// Spawns the background commit worker as a dedicated thread holding its
    /// own handle to this log.
    pub fn spawn_worker(self: &Arc<Self>) -> JoinHandle<()>
    where
        Device: Send + Sync + 'static,
        Device::Error: Send + std::fmt::Debug,
    {
        let log = Arc::clone(self);
        std::thread::Builder::new()
            .name("redo-log-commit".into())
            .spawn(move || log.commit_loop())
            .expect("failed to spawn commit worker thread")
    }

    /// Stops the worker loop after its current iteration. Used by tests (and
    /// any orderly shutdown path) to join the worker thread.
    pub fn shutdown(&self) {
        self.commit.lock().shutdown = true;
        self.commit_cond.notify_all();
    }

    /// The background worker's entry point. Installs each committed
    /// transaction to its home blocks and erases the on-disk header, then
    /// goes back to sleep until the next commit.
    fn commit_loop(&self)
    where
        Device::Error: std::fmt::Debug,
    {
        loop {
            let mut commit = self.commit.lock();
            loop {
                if commit.shutdown {
                    return;
                }
                if commit.state == CommitState::Committing {
                    break;
                }
                // Idle: nothing to do. Copying: a copier is mid-flush; the
                // worker must not race it (committing and copying are never
                // both true), so it waits for the handoff too.
                commit = self.commit_cond.wait(commit);
            }
            let header = commit
                .pending
                .take()
                .expect("Committing state always carries a pending header");
            drop(commit);

            trace!("worker installing {} block(s) on dev {}", header.len(), self.dev.value());
            self.install_trans(&header, false)
                .expect("device I/O failure during install is fatal");
            self.write_head(&LogHeader::empty())
                .expect("device I/O failure erasing the log header is fatal");
            trace!("worker finished install, log idle");

            let mut commit = self.commit.lock();
            commit.state = CommitState::Idle;
            drop(commit);
            self.notify_all_waiters();
        }
    }

    /// Attempts to become the designated copier for the current group.
    ///
    /// On success, returns a fresh empty header that the caller must
    /// immediately swap into `main.header` in place of the live one (while
    /// still holding the main lock), and the live one becomes the header to
    /// flush. Returns `None` if a flush is already in progress or pending
    /// installation — the caller should wait instead.
    fn try_elect_copier(&self) -> Option<LogHeader> {
        let mut commit = self.commit.lock();
        if commit.state != CommitState::Idle {
            return None;
        }
        commit.state = CommitState::Copying;
        Some(LogHeader::empty())
    }

    /// Performs the copy phase for a group that has just been swapped out of
    /// `main.header`. Holds no lock during the device I/O. On return, the
    /// group is fully committed: on-disk header written, state
    /// `Committing`, worker notified.
    fn run_copy_phase(&self, to_flush: LogHeader) -> Result<(), LogError<Device::Error>> {
        debug_assert!(!to_flush.is_empty(), "callers only elect a copier when there is something to flush");

        trace!("copying {} block(s) to log region", to_flush.len());
        self.write_body(&to_flush)?;
        self.write_head(&to_flush)?; // the commit point
        trace!("commit point reached, handing off to worker");

        let mut commit = self.commit.lock();
        commit.pending = Some(to_flush);
        commit.state = CommitState::Committing;
        drop(commit);
        self.notify_all_waiters();
        Ok(())
    }

    /// Reads the on-disk header into `out`.
    fn read_head(&self, out: &mut LogHeader) -> Result<(), LogError<Device::Error>> {
        let mut handle = self.cache.get(self.start as usize);
        let guard = handle.lock().read().map_err(|(_, e)| LogError::DeviceIo(e))?;
        out.copy_from(guard.data::<LogHeader>());
        Ok(())
    }

    /// Writes `header` to the on-disk header block. This is the commit
    /// point: once this returns, recovery will replay the transaction.
    fn write_head(&self, header: &LogHeader) -> Result<(), LogError<Device::Error>> {
        let mut handle = self.cache.get(self.start as usize);
        let mut guard = handle.lock().zeroed();
        guard.data_mut::<LogHeader>().copy_from(header);
        guard.write().map_err(LogError::DeviceIo)
    }

    /// Copies each home block named by `header` into its log payload slot.
    fn write_body(&self, header: &LogHeader) -> Result<(), LogError<Device::Error>> {
        for (tail, block_no) in header.block_indices().iter().enumerate() {
            let mut from = self.cache.get(block_no.as_index());
            let from_guard = from.lock().read().map_err(|(_, e)| LogError::DeviceIo(e))?;
            let log_slot = self.start as usize + 1 + tail;
            let mut to = self.cache.get(log_slot);
            let mut to_guard = to.lock().set_data(from_guard.bytes());
            to_guard.write().map_err(LogError::DeviceIo)?;
        }
        Ok(())
    }

    /// Copies each payload block named by `header` back to its home block.
    /// When `recovering` is false, the buffer is unpinned — it is no longer
    /// needed in cache. When `recovering` is true, the cache is untouched
    /// (it is empty at boot, so there is nothing to unpin).
    fn install_trans(&self, header: &LogHeader, recovering: bool) -> Result<(), LogError<Device::Error>> {
        for (tail, block_no) in header.block_indices().iter().enumerate() {
            let log_slot = self.start as usize + 1 + tail;
            let mut from = self.cache.get(log_slot);
            let from_guard = from.lock().read().map_err(|(_, e)| LogError::DeviceIo(e))?;
            let mut to = self.cache.get(block_no.as_index());
            let mut to_guard = to.lock().set_data(from_guard.bytes());
            to_guard.write().map_err(LogError::DeviceIo)?;
            if !recovering {
                // SAFETY: every block installed here was pinned exactly once
                // by `Log::write` and has now been durably installed, so the
                // matching unpin is due.
                unsafe { to_guard.unpin() };
            }
        }
        Ok(())
    }

    /// Replays a committed-but-not-installed transaction and clears the
    /// on-disk header. Idempotent: safe to run against the same on-disk
    /// state any number of times.
    fn recover_from_log(&self) -> Result<(), LogError<Device::Error>> {
        let mut header = LogHeader::empty();
        self.read_head(&mut header)?;
        trace!("recovery found {} committed block(s)", header.len());
        self.install_trans(&header, true)?;
        header.clear();
        self.write_head(&header)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::check_header_fits;

    #[test]
    fn header_fits_when_strictly_smaller_than_block() {
        assert!(check_header_fits(16, 1024).is_ok());
    }

    #[test]
    fn header_rejected_when_block_sized_or_larger() {
        assert_eq!(check_header_fits(1024, 1024), Err(1024));
        assert_eq!(check_header_fits(2000, 1024), Err(2000));
    }
}
