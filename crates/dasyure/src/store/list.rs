//! Range query over the on-disk block sequence.
//!
//! The scan walks files in name order (which is time order), prunes whole
//! files by their name-derived window, prunes blocks by the min/max
//! compressed timestamps in their headers, and copies selected blocks
//! verbatim into one contiguous result buffer. Skip and limit count entries;
//! a block is emitted in full once selected, so their granularity is the
//! block, not the entry.
//!
//! The scan runs concurrently with the writer and the retention sweeper:
//! names that don't parse are ignored, files deleted between enumeration and
//! open are skipped, and a short read of a block header is treated as end of
//! file.

use crate::error::Result;
use crate::format::{BlockHeader, BlockId, EventBlocks, BLOCK_HEADER_SIZE};
use crate::timeutil::{self, Timestamp, FILE_NAME_LEN, WINDOW_SECS};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Names of the event files in `root`, unordered. Entries that don't parse
/// as the 12-digit pattern are not event files and are left alone.
pub(crate) fn event_file_names(root: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if timeutil::parse_file_name(name).is_some() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Collects every block overlapping `[start, end]` into one buffer, after
/// skipping roughly `skip` entries and stopping past `skip + limit`.
pub(crate) fn list_blocks(
    root: &Path,
    start: Timestamp,
    end: Timestamp,
    skip: usize,
    limit: usize,
) -> Result<EventBlocks> {
    let mut names = event_file_names(root)?;
    names.sort();

    let mut out: Vec<u8> = Vec::new();
    let mut read_entries: usize = 0;
    for name in &names {
        let Some(file_time) = timeutil::parse_file_name(name) else {
            continue;
        };
        if file_time + WINDOW_SECS < start {
            debug!("skipping {name}: window ends before range start");
            continue;
        }
        if file_time > end {
            debug!("skipping {name}: window starts after range end");
            continue;
        }
        let mut file = match File::open(root.join(name)) {
            Ok(file) => file,
            // deleted by retention since enumeration
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };
        file.seek(SeekFrom::Start(3))?;
        let mut base_buf = [0u8; 4];
        file.read_exact(&mut base_buf)?;
        let base_time = i64::from(u32::from_le_bytes(base_buf));

        let mut header_buf = [0u8; BLOCK_HEADER_SIZE];
        loop {
            match file.read_exact(&mut header_buf) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }
            let header = BlockHeader::from_bytes(&header_buf)?;
            let mut should_skip = read_entries < skip;
            if should_skip {
                read_entries += usize::from(header.entries_count);
            }
            if timeutil::decompress(base_time, header.min_cts) > end {
                should_skip = true;
            }
            if timeutil::decompress(base_time, header.max_cts) < start {
                should_skip = true;
            }
            if should_skip {
                file.seek(SeekFrom::Current(i64::from(header.compressed_size)))?;
                continue;
            }
            let offset = file.stream_position()?;
            let mut id_name = [0u8; FILE_NAME_LEN];
            id_name.copy_from_slice(name.as_bytes());
            out.extend_from_slice(&BlockId::new(id_name, offset).to_bytes());
            out.extend_from_slice(&header_buf);
            let payload_start = out.len();
            out.resize(payload_start + header.compressed_size as usize, 0);
            file.read_exact(&mut out[payload_start..])?;
            read_entries += usize::from(header.entries_count);
            if read_entries > skip.saturating_add(limit) {
                return Ok(EventBlocks::new(out));
            }
        }
    }
    Ok(EventBlocks::new(out))
}
