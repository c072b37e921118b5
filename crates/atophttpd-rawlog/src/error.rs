use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RawlogError {
    #[error("{path}: not an atop rawlog file")]
    BadMagic { path: PathBuf },

    #[error("{path}: incompatible rawlog version {found} (expected {expected})")]
    IncompatibleVersion {
        path: PathBuf,
        found: u16,
        expected: u16,
    },

    #[error("{path}: header size mismatch")]
    HeaderSizeMismatch { path: PathBuf },

    #[error("{path}: truncated record at offset {offset}")]
    TruncatedRecord { path: PathBuf, offset: u64 },

    #[error("decompression failed: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("malformed sample payload: {0}")]
    Decode(String),

    #[error(transparent)]
    Index(#[from] atophttpd_index::IndexError),

    #[error("no sample")]
    NoSample,
}

pub type Result<T> = std::result::Result<T, RawlogError>;
