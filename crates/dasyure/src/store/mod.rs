//! The event store: bounded input queue, background flush task, file
//! rotation, retention, and range queries.
//!
//! # Architecture
//!
//! ```text
//! callers ──add()──► bounded queue(100) ──► flush task ──► hour-rotated files
//!                                             │
//!                                             ├─ block builder + LZ4
//!                                             └─ retention sweep
//! callers ──list()────────────────────────────────────────► read-only scan
//! ```
//!
//! One background task owns all write-side file I/O. Callers interact with
//! it only through the bounded queue; `add` is non-blocking and surfaces
//! backpressure as [`StoreError::QueueOverflow`]. The flush task drains the
//! queue into compressed blocks, sweeps old files, then sleeps for
//! `maximum_flush_interval`, bounding ingest-to-disk latency by one interval
//! plus one block's worth of work. `list` reads the directory on the calling
//! thread and tolerates the writer and sweeper running concurrently.

mod list;
mod writer;

use crate::discr::{Discriminator, DiscriminatorFactory, SingleSceneDiscriminator};
use crate::error::{Result, StoreError};
use crate::format::EventBlocks;
use crate::timeutil::{Clock, SystemClock, Timestamp};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};
use writer::StoreWriter;

/// Default maximum number of entries per block.
pub const DEFAULT_BLOCK_ENTRIES_COUNT_LIMIT: u16 = u16::MAX - 1;

/// Default maximum block body size before the block is closed (1 MiB).
pub const DEFAULT_BLOCK_SIZE_LIMIT: usize = 1024 * 1024;

/// Default pause between flush ticks.
pub const DEFAULT_MAXIMUM_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of most recent event files kept by retention.
pub const DEFAULT_KEEP_FILES_COUNT: usize = 24;

/// Depth of the bounded input queue between callers and the flush task.
pub const INPUT_QUEUE_DEPTH: usize = 100;

/// Configuration for store behavior.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of entries in one block. A block is closed once its
    /// count exceeds this limit. Must stay below `u16::MAX` so the count
    /// fits the block header.
    pub block_entries_count_limit: u16,

    /// Maximum block body size in bytes. A block is closed once its body
    /// exceeds this limit. Default: 1 MiB.
    pub block_size_limit: usize,

    /// Pause between flush ticks. Default: 1 second.
    pub maximum_flush_interval: Duration,

    /// Number of most recent event files retained; older files are deleted
    /// oldest-first on each tick. Default: 24 (one day of hour windows).
    pub keep_files_count: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            block_entries_count_limit: DEFAULT_BLOCK_ENTRIES_COUNT_LIMIT,
            block_size_limit: DEFAULT_BLOCK_SIZE_LIMIT,
            maximum_flush_interval: DEFAULT_MAXIMUM_FLUSH_INTERVAL,
            keep_files_count: DEFAULT_KEEP_FILES_COUNT,
        }
    }
}

impl StoreConfig {
    /// Sets the per-block entry count limit.
    pub fn with_block_entries_count_limit(mut self, limit: u16) -> Self {
        self.block_entries_count_limit = limit;
        self
    }

    /// Sets the per-block body size limit.
    pub fn with_block_size_limit(mut self, limit: usize) -> Self {
        self.block_size_limit = limit;
        self
    }

    /// Sets the pause between flush ticks.
    pub fn with_maximum_flush_interval(mut self, interval: Duration) -> Self {
        self.maximum_flush_interval = interval;
        self
    }

    /// Sets the number of event files retained.
    pub fn with_keep_files_count(mut self, count: usize) -> Self {
        self.keep_files_count = count;
        self
    }
}

pub(crate) struct EventInput {
    pub(crate) ts: Timestamp,
    pub(crate) body: Vec<u8>,
}

struct FlushTask {
    stop_tx: SyncSender<()>,
    handle: JoinHandle<()>,
}

/// Append-only event store bound to one root directory.
pub struct EventStore {
    config: StoreConfig,
    root_dir: PathBuf,
    clock: Arc<dyn Clock>,
    input_tx: SyncSender<EventInput>,
    writer: Arc<Mutex<StoreWriter>>,
    flush_task: Mutex<Option<FlushTask>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EventStore {
    /// Creates a store over `root_dir` with default configuration, the
    /// system clock, and the catch-all discriminator.
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self::with_config(root_dir, StoreConfig::default())
    }

    /// Creates a store over `root_dir` with the given configuration.
    pub fn with_config(root_dir: impl AsRef<Path>, config: StoreConfig) -> Self {
        let root_dir = root_dir.as_ref().to_path_buf();
        let (input_tx, input_rx) = mpsc::sync_channel(INPUT_QUEUE_DEPTH);
        let writer = StoreWriter::new(
            root_dir.clone(),
            config.clone(),
            input_rx,
            Box::new(|| Box::new(SingleSceneDiscriminator) as Box<dyn Discriminator>),
        );
        Self {
            config,
            root_dir,
            clock: Arc::new(SystemClock),
            input_tx,
            writer: Arc::new(Mutex::new(writer)),
            flush_task: Mutex::new(None),
        }
    }

    /// Replaces the clock used to stamp incoming events.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the discriminator factory. A fresh discriminator is built
    /// immediately and again on every file rotation.
    pub fn with_discriminator(self, factory: DiscriminatorFactory) -> Self {
        lock(&self.writer).set_discriminator(factory);
        self
    }

    /// Returns the store's root directory.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Returns the store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Creates the root directory and spawns the background flush task.
    ///
    /// Calling `start` on a running store is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the task
    /// cannot be spawned.
    pub fn start(&self) -> Result<()> {
        fs::create_dir_all(&self.root_dir).map_err(|err| {
            error!(
                "failed to create store dir {}: {err}",
                self.root_dir.display()
            );
            err
        })?;
        let mut task = lock(&self.flush_task);
        if task.is_some() {
            return Ok(());
        }
        let (stop_tx, stop_rx) = mpsc::sync_channel(1);
        let writer = Arc::clone(&self.writer);
        let interval = self.config.maximum_flush_interval;
        let handle = std::thread::Builder::new()
            .name("event-store-flush".into())
            .spawn(move || {
                loop {
                    {
                        let mut writer = lock(&writer);
                        writer.flush_input_queue();
                        writer.sweep_retention();
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                }
                // final drain so shutdown loses nothing already enqueued
                lock(&writer).flush_input_queue();
            })?;
        *task = Some(FlushTask { stop_tx, handle });
        debug!("event store started at {}", self.root_dir.display());
        Ok(())
    }

    /// Stamps the current time onto `body` and enqueues it for the flush
    /// task. Non-blocking.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QueueOverflow`] when the queue is saturated;
    /// the caller may retry after backing off.
    pub fn add(&self, body: Vec<u8>) -> Result<()> {
        let input = EventInput {
            ts: self.clock.now_unix(),
            body,
        };
        self.input_tx
            .try_send(input)
            .map_err(|_| StoreError::QueueOverflow)
    }

    /// Collects every block overlapping `[start, end]` into one buffer,
    /// after skipping roughly `skip` entries and stopping past
    /// `skip + limit`. Skip and limit are best-effort relative to block
    /// boundaries: a selected block is always returned in full.
    ///
    /// # Errors
    ///
    /// Returns the first unrecoverable I/O error hit during the scan.
    pub fn list(
        &self,
        start: Timestamp,
        end: Timestamp,
        skip: usize,
        limit: usize,
    ) -> Result<EventBlocks> {
        list::list_blocks(&self.root_dir, start, end, skip, limit)
    }

    /// Signals the flush task to stop and waits for its final drain.
    ///
    /// A stopped store can be started again.
    pub fn stop(&self) {
        let task = lock(&self.flush_task).take();
        if let Some(task) = task {
            let _ = task.stop_tx.send(());
            if task.handle.join().is_err() {
                error!("flush task panicked during shutdown");
            }
            debug!("event store stopped");
        }
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        self.stop();
    }
}
