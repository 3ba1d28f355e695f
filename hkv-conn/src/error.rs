use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Result type for connection operations.
pub type ConnResult<T> = Result<T, ConnError>;

/// Fatal connection errors.
///
/// Server error replies are not errors at this layer; they arrive as
/// `Value::Error`. Anything here means the connection can no longer be
/// trusted. The type is `Clone` so a connection can keep its first failure
/// and report it again on every later call.
#[derive(Debug, Clone, Error)]
pub enum ConnError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(Arc<io::Error>),
    /// RESP2 framing or parse error.
    #[error("protocol error: {0}")]
    Protocol(&'static str),
    /// Address could not be resolved into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// The connection was closed locally.
    #[error("connection closed")]
    Closed,
}

impl From<io::Error> for ConnError {
    fn from(err: io::Error) -> Self {
        ConnError::Io(Arc::new(err))
    }
}
