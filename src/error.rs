use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

/// Unified error type for store, stream, builder and view operations.
///
/// [`StreamError::Io`] carries a message only; this layer never inspects
/// `std::io::ErrorKind`.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("out of bounds: offset={offset} len={len} capacity={capacity}")]
    OutOfBounds {
        offset: u64,
        len: usize,
        capacity: u64,
    },

    #[error("integer overflow while computing byte offsets")]
    OffsetOverflow,

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("stream has been disposed")]
    Disposed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StreamError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
