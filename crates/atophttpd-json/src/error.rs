use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonError {
    #[error("json lables not supported: {0}")]
    UnknownLabel(String),
    #[error("missing sample")]
    EmptySelector,
    #[error("write to output sink failed: {0}")]
    Sink(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JsonError>;
