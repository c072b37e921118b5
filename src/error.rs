#[derive(Debug, thiserror::Error)]
pub enum AtopHttpdError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Conn(#[from] atophttpd_conn::ConnError),

    #[error("tls requested without --ca-cert-file/--cert-file/--key-file")]
    TlsNotConfigured,
}

pub type Result<T> = std::result::Result<T, AtopHttpdError>;
