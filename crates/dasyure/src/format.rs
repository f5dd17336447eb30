//! On-disk framing for event files and the decoded views over query results.
//!
//! All multi-byte integers are little-endian; headers are fixed-size with no
//! padding.
//!
//! ## File structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  File Header (7 bytes)                                       │
//! │  - Magic: 0xD1 0xD1 (2 bytes)                                │
//! │  - Version: u8 (1 byte) = 1                                  │
//! │  - Base Time: u32 (4 bytes, window-start Unix seconds)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Event Block (repeated)                                      │
//! │  - Header (18 bytes): compressed size, uncompressed size,    │
//! │    entry count, min/max compressed timestamp                 │
//! │  - LZ4-compressed payload: concatenated event entries        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each entry inside a decompressed payload is
//! `size:u32 | cts:u32 | body[size]`.
//!
//! A query result buffer is a concatenation of
//! `block_id(20) | block_header(18) | compressed_payload` triples, where the
//! block id pairs the source file name with the payload's byte offset inside
//! that file. Block ids exist only in query results, never on disk.

use crate::error::{Result, StoreError};
use crate::timeutil::FILE_NAME_LEN;
use std::io::Write;

/// Magic bytes at the start of every event file.
pub const FILE_MAGIC: [u8; 2] = [0xD1, 0xD1];

/// Current event file format version.
pub const FILE_VERSION: u8 = 1;

/// File header size in bytes.
pub const FILE_HEADER_SIZE: usize = 7;

/// Block header size in bytes.
pub const BLOCK_HEADER_SIZE: usize = 18;

/// Block id size in bytes.
pub const BLOCK_ID_SIZE: usize = FILE_NAME_LEN + 8;

/// Entry header size in bytes.
pub const ENTRY_HEADER_SIZE: usize = 8;

/// Event file header (7 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Unix second at the start of the file's hour window.
    pub base_time: u32,
}

impl FileHeader {
    /// Creates a header for the window starting at `base_time`.
    pub fn new(base_time: u32) -> Self {
        Self { base_time }
    }

    /// Encodes the header into its 7-byte on-disk form.
    pub fn to_bytes(self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0..2].copy_from_slice(&FILE_MAGIC);
        buf[2] = FILE_VERSION;
        buf[3..7].copy_from_slice(&self.base_time.to_le_bytes());
        buf
    }

    /// Writes the encoded header to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Decodes a header from the start of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidMagic` if the magic bytes don't match and
    /// `StoreError::UnsupportedVersion` if the version is unknown.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < FILE_HEADER_SIZE {
            return Err(StoreError::MalformedFrame("file header truncated"));
        }
        let magic: [u8; 2] = buf[0..2].try_into().unwrap();
        if magic != FILE_MAGIC {
            return Err(StoreError::InvalidMagic(magic));
        }
        if buf[2] != FILE_VERSION {
            return Err(StoreError::UnsupportedVersion(buf[2]));
        }
        Ok(Self {
            base_time: u32::from_le_bytes(buf[3..7].try_into().unwrap()),
        })
    }
}

/// Event block header (18 bytes).
///
/// Carries both payload sizes so readers can skip a block without
/// decompressing it, and the min/max compressed timestamps so range queries
/// can filter blocks on the header alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Size of the LZ4-compressed payload in bytes.
    pub compressed_size: u32,
    /// Size of the payload after decompression in bytes.
    pub uncompressed_size: u32,
    /// Number of event entries in the decompressed payload. Always at least 1.
    pub entries_count: u16,
    /// Smallest compressed timestamp across the block's entries.
    pub min_cts: u32,
    /// Largest compressed timestamp across the block's entries.
    pub max_cts: u32,
}

impl BlockHeader {
    /// Encodes the header into its 18-byte on-disk form.
    pub fn to_bytes(self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf[8..10].copy_from_slice(&self.entries_count.to_le_bytes());
        buf[10..14].copy_from_slice(&self.min_cts.to_le_bytes());
        buf[14..18].copy_from_slice(&self.max_cts.to_le_bytes());
        buf
    }

    /// Decodes a header from the start of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MalformedFrame` if `buf` is shorter than 18 bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < BLOCK_HEADER_SIZE {
            return Err(StoreError::MalformedFrame("block header truncated"));
        }
        Ok(Self {
            compressed_size: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            uncompressed_size: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            entries_count: u16::from_le_bytes(buf[8..10].try_into().unwrap()),
            min_cts: u32::from_le_bytes(buf[10..14].try_into().unwrap()),
            max_cts: u32::from_le_bytes(buf[14..18].try_into().unwrap()),
        })
    }
}

/// Locates a block within the store: source file name plus the byte offset
/// at which the block's compressed payload begins.
///
/// Synthesized while answering queries; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId {
    file_name: [u8; FILE_NAME_LEN],
    offset: u64,
}

impl BlockId {
    /// Creates a block id from a file name and payload offset.
    pub fn new(file_name: [u8; FILE_NAME_LEN], offset: u64) -> Self {
        Self { file_name, offset }
    }

    /// Returns the name of the file containing the block.
    pub fn file_name(&self) -> &str {
        std::str::from_utf8(&self.file_name).unwrap_or("")
    }

    /// Returns the byte offset of the block's compressed payload inside its
    /// file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Encodes the id into its 20-byte wire form.
    pub fn to_bytes(self) -> [u8; BLOCK_ID_SIZE] {
        let mut buf = [0u8; BLOCK_ID_SIZE];
        buf[..FILE_NAME_LEN].copy_from_slice(&self.file_name);
        buf[FILE_NAME_LEN..].copy_from_slice(&self.offset.to_le_bytes());
        buf
    }

    /// Decodes an id from the start of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MalformedFrame` if `buf` is shorter than 20 bytes
    /// or the embedded file name is not ASCII.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < BLOCK_ID_SIZE {
            return Err(StoreError::MalformedFrame("block id truncated"));
        }
        let file_name: [u8; FILE_NAME_LEN] = buf[..FILE_NAME_LEN].try_into().unwrap();
        if !file_name.is_ascii() {
            return Err(StoreError::MalformedFrame("block id file name not ASCII"));
        }
        Ok(Self {
            file_name,
            offset: u64::from_le_bytes(buf[FILE_NAME_LEN..BLOCK_ID_SIZE].try_into().unwrap()),
        })
    }
}

/// A contiguous buffer of `block_id | block_header | payload` triples, as
/// returned by a range query.
///
/// The buffer re-parses on the consuming side: [`EventBlocks::iter`] walks it
/// without copying payloads.
#[derive(Debug, Default)]
pub struct EventBlocks {
    buf: Vec<u8>,
}

impl EventBlocks {
    /// Wraps a raw result buffer, e.g. one received over the wire.
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    /// Returns the raw bytes of the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the view, returning the raw buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Returns true if the buffer holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Walks the buffer block by block.
    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter { rest: &self.buf }
    }
}

/// Iterator over the blocks of an [`EventBlocks`] buffer.
///
/// Yields `Err(MalformedFrame)` once and then fuses if the buffer is
/// truncated mid-block.
#[derive(Debug)]
pub struct BlockIter<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = Result<(BlockId, BlockRef<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let result = Self::split_first(self.rest);
        match result {
            Ok((item, rest)) => {
                self.rest = rest;
                Some(Ok(item))
            }
            Err(err) => {
                self.rest = &[];
                Some(Err(err))
            }
        }
    }
}

impl<'a> BlockIter<'a> {
    fn split_first(buf: &'a [u8]) -> Result<((BlockId, BlockRef<'a>), &'a [u8])> {
        if buf.len() < BLOCK_ID_SIZE + BLOCK_HEADER_SIZE {
            return Err(StoreError::MalformedFrame("block frame truncated"));
        }
        let id = BlockId::from_bytes(&buf[..BLOCK_ID_SIZE])?;
        let header = BlockHeader::from_bytes(&buf[BLOCK_ID_SIZE..BLOCK_ID_SIZE + BLOCK_HEADER_SIZE])?;
        let payload_start = BLOCK_ID_SIZE + BLOCK_HEADER_SIZE;
        let payload_end = payload_start + header.compressed_size as usize;
        if buf.len() < payload_end {
            return Err(StoreError::MalformedFrame("block payload truncated"));
        }
        let block = BlockRef {
            header,
            payload: &buf[payload_start..payload_end],
        };
        Ok(((id, block), &buf[payload_end..]))
    }
}

/// Borrowed view of one block inside an [`EventBlocks`] buffer.
#[derive(Debug, Clone, Copy)]
pub struct BlockRef<'a> {
    header: BlockHeader,
    payload: &'a [u8],
}

impl<'a> BlockRef<'a> {
    /// Returns the block's header.
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// Returns the number of entries in the block.
    pub fn entries_count(&self) -> u16 {
        self.header.entries_count
    }

    /// Returns the smallest compressed timestamp in the block.
    pub fn min_cts(&self) -> u32 {
        self.header.min_cts
    }

    /// Returns the largest compressed timestamp in the block.
    pub fn max_cts(&self) -> u32 {
        self.header.max_cts
    }

    /// Returns the still-compressed payload bytes.
    pub fn compressed_payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Decompresses the payload into a fresh buffer sized to
    /// `uncompressed_size` and returns the decoded entry sequence.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Decompression` if the payload is not valid LZ4 or
    /// expands to a different size than the header declares.
    pub fn entries(&self) -> Result<EventEntries> {
        let mut buf = vec![0u8; self.header.uncompressed_size as usize];
        let written = lz4_flex::block::decompress_into(self.payload, &mut buf)
            .map_err(|err| StoreError::Decompression(err.to_string()))?;
        if written != buf.len() {
            return Err(StoreError::Decompression(format!(
                "expected {} decompressed bytes, got {}",
                buf.len(),
                written
            )));
        }
        Ok(EventEntries { buf })
    }
}

/// Owned, decompressed concatenation of event entries.
#[derive(Debug)]
pub struct EventEntries {
    buf: Vec<u8>,
}

impl EventEntries {
    /// Returns the raw decompressed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Walks the entries in order.
    pub fn iter(&self) -> EntryIter<'_> {
        EntryIter { rest: &self.buf }
    }
}

/// Iterator over the entries of an [`EventEntries`] buffer.
#[derive(Debug)]
pub struct EntryIter<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for EntryIter<'a> {
    type Item = Result<EventEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        if self.rest.len() < ENTRY_HEADER_SIZE {
            self.rest = &[];
            return Some(Err(StoreError::MalformedFrame("entry header truncated")));
        }
        let size = u32::from_le_bytes(self.rest[0..4].try_into().unwrap()) as usize;
        let cts = u32::from_le_bytes(self.rest[4..8].try_into().unwrap());
        let end = ENTRY_HEADER_SIZE + size;
        if self.rest.len() < end {
            self.rest = &[];
            return Some(Err(StoreError::MalformedFrame("entry body truncated")));
        }
        let body = &self.rest[ENTRY_HEADER_SIZE..end];
        self.rest = &self.rest[end..];
        Some(Ok(EventEntry { cts, body }))
    }
}

/// One decoded event entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventEntry<'a> {
    /// Compressed timestamp: seconds since the source file's base time.
    pub cts: u32,
    /// The event body, borrowed from the decompressed payload.
    pub body: &'a [u8],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_header_roundtrip() {
        let header = FileHeader::new(1483228800);
        let bytes = header.to_bytes();
        assert_eq!(bytes[0..3], [0xD1, 0xD1, 0x01]);
        assert_eq!(FileHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_file_header_rejects_bad_magic() {
        let mut bytes = FileHeader::new(0).to_bytes();
        bytes[0] = 0xAA;
        assert!(matches!(
            FileHeader::from_bytes(&bytes),
            Err(StoreError::InvalidMagic([0xAA, 0xD1]))
        ));
    }

    #[test]
    fn test_file_header_rejects_bad_version() {
        let mut bytes = FileHeader::new(0).to_bytes();
        bytes[2] = 9;
        assert!(matches!(
            FileHeader::from_bytes(&bytes),
            Err(StoreError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_file_header_rejects_short_input() {
        assert!(matches!(
            FileHeader::from_bytes(&[0xD1, 0xD1, 0x01]),
            Err(StoreError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_block_header_roundtrip() {
        let header = BlockHeader {
            compressed_size: 27,
            uncompressed_size: 25,
            entries_count: 1,
            min_cts: 100,
            max_cts: 220,
        };
        let decoded = BlockHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_block_header_layout() {
        let header = BlockHeader {
            compressed_size: 0x01020304,
            uncompressed_size: 0x05060708,
            entries_count: 0x090A,
            min_cts: 1,
            max_cts: 2,
        };
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[8..10], &[0x0A, 0x09]);
    }

    #[test]
    fn test_block_id_roundtrip() {
        let id = BlockId::new(*b"201701010800", 0x46);
        assert_eq!(id.file_name(), "201701010800");
        assert_eq!(id.offset(), 0x46);
        let decoded = BlockId::from_bytes(&id.to_bytes()).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn test_block_id_rejects_non_ascii_name() {
        let mut bytes = BlockId::new(*b"201701010800", 0).to_bytes();
        bytes[0] = 0xFF;
        assert!(matches!(
            BlockId::from_bytes(&bytes),
            Err(StoreError::MalformedFrame(_))
        ));
    }

    /// Builds a result-buffer frame for one block of raw entries.
    fn frame_block(file_name: &[u8; FILE_NAME_LEN], offset: u64, entries: &[(u32, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        let mut min_cts = u32::MAX;
        let mut max_cts = 0;
        for (cts, payload) in entries {
            min_cts = min_cts.min(*cts);
            max_cts = max_cts.max(*cts);
            body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            body.extend_from_slice(&cts.to_le_bytes());
            body.extend_from_slice(payload);
        }
        let compressed = lz4_flex::block::compress(&body);
        let header = BlockHeader {
            compressed_size: compressed.len() as u32,
            uncompressed_size: body.len() as u32,
            entries_count: entries.len() as u16,
            min_cts,
            max_cts,
        };
        let mut frame = Vec::new();
        frame.extend_from_slice(&BlockId::new(*file_name, offset).to_bytes());
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(&compressed);
        frame
    }

    #[test]
    fn test_walk_blocks_and_entries() {
        let mut buf = frame_block(b"201701010800", 0x19, &[(100, b"first"), (160, b"second")]);
        buf.extend(frame_block(b"201701010900", 0x19, &[(5, b"third")]));

        let blocks = EventBlocks::new(buf);
        let mut iter = blocks.iter();

        let (id, block) = iter.next().unwrap().unwrap();
        assert_eq!(id.file_name(), "201701010800");
        assert_eq!(block.entries_count(), 2);
        assert_eq!(block.min_cts(), 100);
        assert_eq!(block.max_cts(), 160);
        let entries = block.entries().unwrap();
        let decoded: Vec<_> = entries.iter().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].cts, 100);
        assert_eq!(decoded[0].body, b"first");
        assert_eq!(decoded[1].body, b"second");

        let (id, block) = iter.next().unwrap().unwrap();
        assert_eq!(id.file_name(), "201701010900");
        assert_eq!(block.entries_count(), 1);

        assert!(iter.next().is_none());
    }

    #[test]
    fn test_walk_truncated_buffer_errors_once() {
        let frame = frame_block(b"201701010800", 0x19, &[(1, b"body")]);
        let blocks = EventBlocks::new(frame[..frame.len() - 1].to_vec());
        let mut iter = blocks.iter();
        assert!(matches!(
            iter.next(),
            Some(Err(StoreError::MalformedFrame(_)))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_entries_truncated_header_errors() {
        let entries = EventEntries {
            buf: vec![1, 2, 3],
        };
        let mut iter = entries.iter();
        assert!(matches!(
            iter.next(),
            Some(Err(StoreError::MalformedFrame(_)))
        ));
        assert!(iter.next().is_none());
    }
}
