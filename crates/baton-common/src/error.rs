//! Error types for Baton
//!
//! `BatonError` covers failures that are not tied to a particular store
//! backend: invalid settings and malformed identifiers.

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum BatonError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid lock key '{0}'")]
    InvalidLockKey(String),

    #[error("safety margin {margin_ms}ms must be greater than zero and smaller than lock ttl {ttl_ms}ms")]
    InvalidSafetyMargin { margin_ms: u64, ttl_ms: u64 },
}

/// Result type for Baton operations
pub type Result<T> = std::result::Result<T, BatonError>;
