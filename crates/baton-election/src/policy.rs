//! Leader election policy.
//!
//! One atomic conditional create per attempt; whoever creates the lock key
//! first is the leader until it releases the key or the key expires. A store
//! failure never yields leadership.

use std::sync::Arc;
use std::time::Duration;

use baton_common::InstanceId;
use baton_lock::{LockError, LockStore};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{ElectionConfig, ReleaseMode};
use crate::metrics;

/// A won election: which key was created, with what value, and when
#[derive(Debug, Clone)]
pub struct Leadership {
    key: String,
    marker: String,
    acquired_at: Instant,
    deadline: Instant,
}

impl Leadership {
    /// Build a leadership record for a lock created at `acquired_at`
    pub fn new(
        key: impl Into<String>,
        marker: impl Into<String>,
        acquired_at: Instant,
        window: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            marker: marker.into(),
            acquired_at,
            deadline: acquired_at + window,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// Point after which no new work may start
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Result of one election attempt
#[derive(Debug)]
pub enum ElectionOutcome {
    /// This instance created the lock
    Elected(Leadership),
    /// Another instance holds the lock
    Denied,
    /// The store could not be asked; treated as not leader
    Unavailable(LockError),
}

impl ElectionOutcome {
    pub fn is_leader(&self) -> bool {
        matches!(self, ElectionOutcome::Elected(_))
    }
}

/// Decides whether this instance leads the current window
pub struct LeaderElector {
    store: Arc<dyn LockStore>,
    config: ElectionConfig,
    instance: InstanceId,
}

impl LeaderElector {
    pub fn new(store: Arc<dyn LockStore>, config: ElectionConfig, instance: InstanceId) -> Self {
        Self {
            store,
            config,
            instance,
        }
    }

    /// Value written into the lock for the next acquisition
    fn next_marker(&self) -> String {
        match self.config.release_mode {
            ReleaseMode::Unconditional => self.config.leader_marker.clone(),
            ReleaseMode::OwnerChecked => format!(
                "{}:{}:{}",
                self.config.leader_marker,
                self.instance,
                uuid::Uuid::new_v4().simple()
            ),
        }
    }

    /// Attempt to become leader. No retries; the trigger calls again later.
    pub async fn elect(&self) -> ElectionOutcome {
        let marker = self.next_marker();
        // Sampled before the round trip so the local deadline never trails the store-side expiry
        let acquired_at = Instant::now();

        match self
            .store
            .try_acquire(&self.config.lock_key, &marker, self.config.lock_ttl)
            .await
        {
            Ok(true) => {
                metrics::record_election("elected");
                let leadership = Leadership::new(
                    self.config.lock_key.clone(),
                    marker,
                    acquired_at,
                    self.config.leadership_window(),
                );
                info!(
                    instance = %self.instance,
                    key = %self.config.lock_key,
                    window_ms = self.config.leadership_window().as_millis() as u64,
                    "Instance elected leader"
                );
                ElectionOutcome::Elected(leadership)
            }
            Ok(false) => {
                metrics::record_election("denied");
                info!(instance = %self.instance, "Skipping instance: lock held by another leader");
                ElectionOutcome::Denied
            }
            Err(e) => {
                metrics::record_election("unavailable");
                warn!(
                    instance = %self.instance,
                    backend = self.store.backend(),
                    error = %e,
                    "Lock store unavailable during election, not leading"
                );
                ElectionOutcome::Unavailable(e)
            }
        }
    }
}
