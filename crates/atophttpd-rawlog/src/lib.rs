//! Scans an atop-style rawlog archive, validates file headers,
//! maintains the on-disk index (via `atophttpd-index`), and decodes
//! individual samples for the JSON emitter.

pub mod codec;
pub mod devtstat;
mod engine;
mod error;
pub mod header;
pub mod stat;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use devtstat::Devtstat;
pub use engine::{DecodedRecord, RawlogEngine};
pub use error::{RawlogError, Result};
