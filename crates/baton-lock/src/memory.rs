// In-memory lock store
// Provides conditional create with automatic expiry inside one process

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{LockError, Result};
use crate::store::LockStore;

/// A live lock entry
pub(crate) struct LockEntry {
    marker: String,
    acquired_at: Instant,
    ttl: Duration,
}

impl LockEntry {
    fn new(marker: &str, ttl: Duration) -> Self {
        Self {
            marker: marker.to_string(),
            acquired_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.acquired_at.elapsed() >= self.ttl
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Successful conditional creates
    pub acquisitions: u64,
    /// Conditional creates refused because the key was live
    pub denied: u64,
    /// Deletes that removed a live key
    pub releases: u64,
    /// Keys removed because their TTL elapsed
    pub expired: u64,
}

#[derive(Default)]
struct StatsCollector {
    acquisitions: AtomicU64,
    denied: AtomicU64,
    releases: AtomicU64,
    expired: AtomicU64,
}

/// In-memory lock store using DashMap.
///
/// The conditional create runs under the map's entry lock, so it is atomic
/// with respect to concurrent callers sharing the same store.
pub struct MemoryLockStore {
    locks: Arc<DashMap<String, LockEntry>>,
    stats: Arc<StatsCollector>,
    available: AtomicBool,
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Default for MemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLockStore {
    /// Create a store that expires entries lazily on access
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            stats: Arc::new(StatsCollector::default()),
            available: AtomicBool::new(true),
            cleanup_handle: None,
        }
    }

    /// Start a background task removing expired entries.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_cleanup(mut self, interval: Duration) -> Self {
        let locks = self.locks.clone();
        let stats = self.stats.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                Self::cleanup_expired(&locks, &stats);
            }
        });

        info!(interval = ?interval, "MemoryLockStore initialized with background expiry task");
        self.cleanup_handle = Some(handle);
        self
    }

    fn cleanup_expired(locks: &DashMap<String, LockEntry>, stats: &StatsCollector) {
        let before = locks.len();
        locks.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(locks.len());

        if removed > 0 {
            stats.expired.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(count = removed, "Cleaned up expired lock entries");
        }
    }

    /// Simulate the store going offline or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether `key` is currently held
    pub fn is_locked(&self, key: &str) -> bool {
        self.locks.get(key).is_some_and(|entry| !entry.is_expired())
    }

    /// Current value of `key`, if live
    pub fn marker(&self, key: &str) -> Option<String> {
        self.locks
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.marker.clone())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            acquisitions: self.stats.acquisitions.load(Ordering::Relaxed),
            denied: self.stats.denied.load(Ordering::Relaxed),
            releases: self.stats.releases.load(Ordering::Relaxed),
            expired: self.stats.expired.load(Ordering::Relaxed),
        }
    }

    /// Remove `key` if it is live and `matches` accepts it.
    ///
    /// An expired entry is dropped and counted as expired, never as released.
    fn remove_live(&self, key: &str, matches: impl Fn(&LockEntry) -> bool) -> bool {
        match self.locks.entry(key.to_string()) {
            Entry::Occupied(occupied) if occupied.get().is_expired() => {
                occupied.remove();
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
                false
            }
            Entry::Occupied(occupied) if matches(occupied.get()) => {
                occupied.remove();
                self.stats.releases.fetch_add(1, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LockError::Unavailable(
                "memory lock store is offline".to_string(),
            ))
        }
    }
}

impl Drop for MemoryLockStore {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_acquire(&self, key: &str, marker: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;

        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired() {
                    self.stats.denied.fetch_add(1, Ordering::Relaxed);
                    return Ok(false);
                }
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
                occupied.insert(LockEntry::new(marker, ttl));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LockEntry::new(marker, ttl));
            }
        }

        self.stats.acquisitions.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, marker = %marker, ttl = ?ttl, "Lock acquired");
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<bool> {
        self.check_available()?;

        let released = self.remove_live(key, |_| true);
        if released {
            debug!(key = %key, "Lock released");
        }
        Ok(released)
    }

    async fn release_if_held(&self, key: &str, marker: &str) -> Result<bool> {
        self.check_available()?;

        let released = self.remove_live(key, |entry| entry.marker == marker);
        if released {
            debug!(key = %key, marker = %marker, "Lock released by holder");
        }
        Ok(released)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
