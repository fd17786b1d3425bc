use thiserror::Error;

/// Error taxonomy for the device memory protocol core.
///
/// `IOError` is never retried by the transfer layer; `TimeoutError` and
/// `ProtocolError` are retried up to [`crate::transfer::MAX_RETRIES`] times.
/// `DataFormatError` means the bytes were structurally readable but
/// semantically invalid (bad pointer, broken chain, oversized dive).
#[derive(Debug, Error)]
pub enum DcError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("allocation failed")]
    NoMemory,

    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("timed out waiting for response")]
    TimeoutError,

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("data format error: {0}")]
    DataFormatError(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, DcError>;
