//! Error types for lock store operations

use std::time::Duration;

/// Errors that can occur while talking to the lock store.
///
/// A lock that is held by someone else is not an error: `try_acquire`
/// reports it as `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The store could not be reached or the connection broke
    #[error("lock store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer in time
    #[error("lock store request timed out after {0:?}")]
    Timeout(Duration),

    /// The reply could not be understood
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The store rejected the command
    #[error("lock store returned error: {0}")]
    Server(String),
}

impl LockError {
    /// Whether the failure leaves the lock state unknown to the caller
    pub fn is_connectivity(&self) -> bool {
        matches!(self, LockError::Unavailable(_) | LockError::Timeout(_))
    }
}

impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            LockError::Unavailable(err.to_string())
        } else if err.kind() == redis::ErrorKind::TypeError {
            LockError::Protocol(err.to_string())
        } else {
            LockError::Server(err.to_string())
        }
    }
}

/// Result type for lock store operations
pub type Result<T> = std::result::Result<T, LockError>;
