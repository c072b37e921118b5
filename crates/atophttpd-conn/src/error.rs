#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("no connection type registered for {0:?}")]
    UnknownType(String),

    #[error("connection registry is full (capacity {0})")]
    RegistryFull(usize),

    #[error("{0} requires configure() before use")]
    NotConfigured(&'static str),

    #[error("tls setup failed: {0}")]
    Tls(#[from] openssl::error::ErrorStack),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConnError>;
