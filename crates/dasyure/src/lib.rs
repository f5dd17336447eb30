//! Dasyure - append-only event store with hour-rotated block files.
//!
//! Incoming event bodies are buffered through a bounded queue, coalesced
//! into size/count-bounded blocks, LZ4-compressed, and appended to a flat
//! directory of files rotated on UTC hour windows. Range queries stream
//! matching blocks back as one contiguous buffer that decodes without
//! copying event bodies.
//!
//! # Components
//!
//! - [`EventStore`]: the store handle (`add` / `list` / `start` / `stop`)
//! - [`BlockBuilder`]: coalesces entries into bounded block bodies
//! - [`EventBlocks`]: decoded walker over query results
//! - [`Discriminator`]: per-file classifier deciding which events persist
//!
//! # Example
//!
//! ```rust,ignore
//! use dasyure::EventStore;
//!
//! let store = EventStore::new("/var/lib/events");
//! store.start()?;
//! store.add(br#"{"url":"/hello"}"#.to_vec())?;
//!
//! let blocks = store.list(start, end, 0, 100)?;
//! for item in blocks.iter() {
//!     let (id, block) = item?;
//!     for entry in block.entries()?.iter() {
//!         let entry = entry?;
//!         println!("{} {} {:?}", id.file_name(), entry.cts, entry.body);
//!     }
//! }
//! ```

#![deny(missing_docs)]

pub mod block;
pub mod discr;
pub mod error;
pub mod format;
pub mod store;
pub mod timeutil;

pub use block::BlockBuilder;
pub use discr::{Discriminator, DiscriminatorFactory, Scene, SingleSceneDiscriminator};
pub use error::{Result, StoreError};
pub use format::{
    BlockHeader, BlockId, BlockRef, EventBlocks, EventEntries, EventEntry, FileHeader,
};
pub use store::{EventStore, StoreConfig};
pub use timeutil::{Clock, ManualClock, SystemClock, Timestamp};
