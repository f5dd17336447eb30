//! Block builder: coalesces event entries into a bounded in-memory block
//! body.
//!
//! The builder accumulates `size | cts | body` entries and tracks the entry
//! count and the min/max compressed timestamp, which later land in the block
//! header. The byte buffer is reused across blocks; `reset` clears state
//! without releasing capacity.

/// Accumulates event entries into one block body.
#[derive(Debug)]
pub struct BlockBuilder {
    count: u16,
    min_cts: u32,
    max_cts: u32,
    body: Vec<u8>,
}

impl BlockBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            count: 0,
            min_cts: u32::MAX,
            max_cts: 0,
            body: Vec::new(),
        }
    }

    /// Appends one entry and updates the count and timestamp bounds.
    pub fn push(&mut self, cts: u32, body: &[u8]) {
        self.min_cts = self.min_cts.min(cts);
        self.max_cts = self.max_cts.max(cts);
        self.body.extend_from_slice(&(body.len() as u32).to_le_bytes());
        self.body.extend_from_slice(&cts.to_le_bytes());
        self.body.extend_from_slice(body);
        self.count += 1;
    }

    /// Returns true if no entries have been appended since the last reset.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true once the builder exceeds either bound. Checked after each
    /// push; a single oversized entry still forms a (one-entry) block.
    pub fn over_limit(&self, entries_limit: u16, size_limit: usize) -> bool {
        self.count > entries_limit || self.body.len() > size_limit
    }

    /// Number of entries appended since the last reset.
    pub fn entries_count(&self) -> u16 {
        self.count
    }

    /// Smallest compressed timestamp appended since the last reset.
    pub fn min_cts(&self) -> u32 {
        self.min_cts
    }

    /// Largest compressed timestamp appended since the last reset.
    pub fn max_cts(&self) -> u32 {
        self.max_cts
    }

    /// The accumulated block body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Clears the builder for the next block, keeping the buffer capacity.
    pub fn reset(&mut self) {
        self.count = 0;
        self.min_cts = u32::MAX;
        self.max_cts = 0;
        self.body.clear();
    }
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}
