use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("file index already exists for {0}")]
    AlreadyExists(PathBuf),

    #[error("no file index for {0}")]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, IndexError>;
