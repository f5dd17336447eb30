//! The store's writer: drains the input queue into compressed blocks,
//! rotates event files on hour windows, and sweeps files past the keep
//! count.
//!
//! All file I/O happens here, on the single flush task. Errors inside one
//! flush round are logged and end the round; the task retries on its next
//! tick. A failed block write loses the block's events, which were already
//! consumed from the queue.

use crate::block::BlockBuilder;
use crate::discr::{Discriminator, DiscriminatorFactory};
use crate::error::{Result, StoreError};
use crate::format::{BlockHeader, FileHeader};
use crate::store::list::event_file_names;
use crate::store::{EventInput, StoreConfig};
use crate::timeutil::{self, Timestamp, WINDOW_SECS};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Instant;
use tracing::{debug, error, warn};

pub(crate) struct StoreWriter {
    config: StoreConfig,
    root_dir: PathBuf,
    input_rx: Receiver<EventInput>,
    discr_factory: DiscriminatorFactory,
    discr: Box<dyn Discriminator>,
    builder: BlockBuilder,
    compression_buf: Vec<u8>,
    current_file: Option<File>,
    current_window: Option<i64>,
    current_base_time: Timestamp,
}

impl StoreWriter {
    pub(crate) fn new(
        root_dir: PathBuf,
        config: StoreConfig,
        input_rx: Receiver<EventInput>,
        discr_factory: DiscriminatorFactory,
    ) -> Self {
        let discr = discr_factory();
        Self {
            config,
            root_dir,
            input_rx,
            discr_factory,
            discr,
            builder: BlockBuilder::new(),
            compression_buf: Vec::new(),
            current_file: None,
            current_window: None,
            current_base_time: 0,
        }
    }

    pub(crate) fn set_discriminator(&mut self, factory: DiscriminatorFactory) {
        self.discr = factory();
        self.discr_factory = factory;
    }

    /// Drains the input queue, writing one block per inner pass, until the
    /// queue reports no more work.
    pub(crate) fn flush_input_queue(&mut self) {
        let started = Instant::now();
        let mut total_entries: u64 = 0;
        loop {
            match self.flush_once() {
                Ok(Some(count)) => total_entries += u64::from(count),
                Ok(None) => break,
                Err(err) => {
                    error!("failed to flush event block: {err}");
                    self.builder.reset();
                    break;
                }
            }
        }
        if total_entries > 0 {
            debug!(
                "flushed {} entries in {:?}",
                total_entries,
                started.elapsed()
            );
        }
    }

    /// Builds and persists at most one block.
    ///
    /// Consumes queued events until the block hits a count or size limit or
    /// the queue runs dry. Returns the persisted entry count, or `None` when
    /// there was nothing to do.
    fn flush_once(&mut self) -> Result<Option<u16>> {
        loop {
            match self.input_rx.try_recv() {
                Ok(input) => {
                    // An event past the current window's end must not share a
                    // block with earlier entries: persist the pending block
                    // to the old file before rotating.
                    if !self.builder.is_empty()
                        && input.ts - self.current_base_time > WINDOW_SECS
                    {
                        self.save_block()?;
                    }
                    self.switch_file(input.ts)?;
                    if self.discr.scene_of(&input.body).is_none() {
                        continue;
                    }
                    let cts = timeutil::compress(self.current_base_time, input.ts);
                    self.builder.push(cts, &input.body);
                    if self.builder.over_limit(
                        self.config.block_entries_count_limit,
                        self.config.block_size_limit,
                    ) {
                        break;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    if self.builder.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
            }
        }
        let count = self.builder.entries_count();
        self.save_block()?;
        Ok(Some(count))
    }

    /// Compresses the pending block body and appends header plus payload to
    /// the current file.
    fn save_block(&mut self) -> Result<()> {
        let body = self.builder.body();
        let bound = lz4_flex::block::get_maximum_output_size(body.len());
        if self.compression_buf.len() < bound {
            self.compression_buf.resize(bound, 0);
        }
        let compressed_size = lz4_flex::block::compress_into(body, &mut self.compression_buf)
            .map_err(|err| StoreError::Compression(err.to_string()))?;
        let header = BlockHeader {
            compressed_size: compressed_size as u32,
            uncompressed_size: body.len() as u32,
            entries_count: self.builder.entries_count(),
            min_cts: self.builder.min_cts(),
            max_cts: self.builder.max_cts(),
        };
        let file = self.current_file.as_mut().ok_or_else(|| {
            StoreError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no open event file",
            ))
        })?;
        file.write_all(&header.to_bytes())?;
        file.write_all(&self.compression_buf[..compressed_size])?;
        debug!(
            "persisted block: {} entries, {} -> {} bytes",
            header.entries_count, header.uncompressed_size, header.compressed_size
        );
        self.builder.reset();
        Ok(())
    }

    /// Rotates to the file covering `ts`'s hour window.
    ///
    /// A newly created file gets the 7-byte header; a file that already
    /// exists (restart mid-hour) is appended to as-is. The discriminator is
    /// rebuilt because its state is per file.
    fn switch_file(&mut self, ts: Timestamp) -> Result<()> {
        let window = timeutil::window_of(ts);
        if self.current_window == Some(window) {
            return Ok(());
        }
        self.discr = (self.discr_factory)();
        self.current_file = None;
        let base_time = timeutil::base_time_of(window);
        let file_name = timeutil::file_name_for(base_time);
        let path = self.root_dir.join(&file_name);
        let file = match OpenOptions::new().append(true).create_new(true).open(&path) {
            Ok(mut file) => {
                FileHeader::new(base_time as u32).write_to(&mut file)?;
                debug!("created event file {}", path.display());
                file
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                OpenOptions::new().append(true).open(&path)?
            }
            Err(err) => return Err(err.into()),
        };
        self.current_window = Some(window);
        self.current_base_time = base_time;
        self.current_file = Some(file);
        Ok(())
    }

    /// Deletes the oldest event files beyond `keep_files_count`. Per-file
    /// failures are logged and never abort the sweep.
    pub(crate) fn sweep_retention(&mut self) {
        let mut names = match event_file_names(&self.root_dir) {
            Ok(names) => names,
            Err(err) => {
                error!(
                    "failed to read store dir {}: {err}",
                    self.root_dir.display()
                );
                return;
            }
        };
        if names.len() <= self.config.keep_files_count {
            return;
        }
        names.sort();
        let excess = names.len() - self.config.keep_files_count;
        for name in &names[..excess] {
            let path = self.root_dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => debug!("removed old event file {}", path.display()),
                Err(err) => warn!("failed to remove old event file {}: {err}", path.display()),
            }
        }
    }
}
