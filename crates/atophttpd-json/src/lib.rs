//! Projects a decoded rawlog sample (`atophttpd_rawlog::DecodedRecord`)
//! into a label-selected JSON object, written through an
//! `atophttpd_output::OutputSink`. See SPEC_FULL.md §4.4 and §6.3.

mod derived;
mod emitter;
mod error;
pub mod label;

pub use emitter::emit;
pub use error::{JsonError, Result};
