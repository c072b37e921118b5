//! Library surface behind the `atophttpd` binary, split out so the
//! integration tests in `tests/` can drive the HTTP front directly
//! over an in-process loopback connection instead of spawning a real
//! process.

pub mod config;
pub mod context;
pub mod error;
pub mod http;

pub use config::Config;
pub use context::AtopHttpd;
pub use error::{AtopHttpdError, Result};
