//! In-memory index over an atop rawlog archive.
//!
//! Two levels are kept consistent by the rawlog engine (see the
//! `atophttpd-rawlog` crate), not by this crate: a per-file ordered
//! sequence of `(timestamp, offset)` pairs ([`FileIndex`]), and a
//! cross-file ordered list of those files by earliest timestamp
//! ([`GlobalIndex`]). Neither level is incrementally maintained; both
//! rely on an explicit sort pass after a batch of mutations.

mod error;
mod file_index;
mod global_index;

pub use error::{IndexError, Result};
pub use file_index::{FileIndex, RecordIndexEntry};
pub use global_index::GlobalIndex;
