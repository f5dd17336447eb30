//! Error and Result types for event store operations.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for event store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The error type for event store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The bounded input queue is saturated. The caller may retry after
    /// backing off.
    #[error("input queue overflow")]
    QueueOverflow,

    /// Invalid magic bytes in an event file header.
    #[error("Invalid magic bytes: expected D1 D1, got {0:?}")]
    InvalidMagic([u8; 2]),

    /// Unsupported event file format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// A frame was shorter than its declared size or otherwise inconsistent.
    /// The affected file should be treated as corrupt past the bad offset.
    #[error("Malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// Error during block compression.
    #[error("Compression error: {0}")]
    Compression(String),

    /// Error during block decompression.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
