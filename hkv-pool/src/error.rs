use std::io;

use hkv_conn::ConnError;
use thiserror::Error;

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by the pool.
///
/// Only terminal conditions show up here. Dead idle connections found during
/// acquisition are discarded and replaced without the caller noticing.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool was closed; permanent.
    #[error("pool closed")]
    Closed,
    /// The active ceiling was reached and no connection came back in time.
    #[error("pool get timeout")]
    Timeout,
    /// The dial callback failed. Not retried by the pool.
    #[error("dial failed: {0}")]
    Dial(#[source] ConnError),
    /// A checked-out connection failed; the handle is now unusable.
    #[error(transparent)]
    Conn(#[from] ConnError),
    /// Rejected configuration value.
    #[error("invalid pool config: {0}")]
    Config(String),
    /// The maintenance thread could not be started.
    #[error("failed to start maintenance thread: {0}")]
    Spawn(#[source] io::Error),
}
