//! Lock store capability trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// The two-operation capability the election needs from the coordination store.
///
/// Implementations must make `try_acquire` a single atomic operation at the
/// store; there is no read-then-write window.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create `key` with `marker` and expiry `ttl` only if `key` is absent.
    ///
    /// Returns `Ok(true)` iff this call created the key, `Ok(false)` if the
    /// key already exists.
    async fn try_acquire(&self, key: &str, marker: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` without checking who holds it.
    ///
    /// Returns `Ok(false)` if the key did not exist, so a repeated release is
    /// a no-op.
    async fn release(&self, key: &str) -> Result<bool>;

    /// Delete `key` only if its current value equals `marker`.
    async fn release_if_held(&self, key: &str, marker: &str) -> Result<bool>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<()>;

    /// Short backend name for log output
    fn backend(&self) -> &'static str;
}
