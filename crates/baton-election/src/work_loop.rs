//! Bounded work loop run by the elected leader.
//!
//! The loop paces units of work on a fixed interval and stops at the
//! leadership deadline (lock TTL minus safety margin), on shutdown, or when a
//! unit of work fails under the abort policy. Whatever the exit reason, the
//! lock is released exactly once before `run` returns. If the `run` future is
//! dropped before that point, a guard hands the release to a spawned task.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use baton_common::InstanceId;
use baton_lock::LockStore;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::{ElectionConfig, ReleaseMode, WorkFailurePolicy};
use crate::metrics;
use crate::policy::Leadership;
use crate::shutdown::ShutdownSignal;
use crate::work::WorkUnit;

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExit {
    /// The safety deadline was reached
    DeadlineReached,
    /// Shutdown was requested
    Cancelled,
    /// A unit of work failed or panicked under the abort policy
    WorkFailed(String),
}

/// Outcome of the release step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    /// The lock was deleted by this call
    Released,
    /// The lock was gone (expired) or, in owner-checked mode, held by someone else
    AlreadyReleased,
    /// The store could not be reached; the lock stays until its TTL expires
    Failed(String),
}

/// Summary of one leadership window
#[derive(Debug, Clone, Serialize)]
pub struct LoopReport {
    /// Completed units of work
    pub iterations: u64,
    pub exit: LoopExit,
    pub release: ReleaseStatus,
    /// Time from acquisition to the end of the release step
    pub held_ms: u64,
    pub finished_at: DateTime<Utc>,
}

/// Releases the lock exactly once.
///
/// `release` is the normal path. Dropping an unreleased guard spawns the
/// release on the current runtime.
struct LeaseGuard {
    store: Arc<dyn LockStore>,
    key: String,
    marker: String,
    mode: ReleaseMode,
    released: bool,
}

impl LeaseGuard {
    fn new(store: Arc<dyn LockStore>, leadership: &Leadership, mode: ReleaseMode) -> Self {
        Self {
            store,
            key: leadership.key().to_string(),
            marker: leadership.marker().to_string(),
            mode,
            released: false,
        }
    }

    /// Marks the guard released only once the store call has returned, so a
    /// drop during the call still triggers the background release.
    async fn release(&mut self) -> ReleaseStatus {
        let status = release_lock(self.store.as_ref(), &self.key, &self.marker, self.mode).await;
        self.released = true;
        status
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                let key = std::mem::take(&mut self.key);
                let marker = std::mem::take(&mut self.marker);
                let mode = self.mode;
                warn!(key = %key, "Work loop dropped before release, releasing in background");
                handle.spawn(async move {
                    release_lock(store.as_ref(), &key, &marker, mode).await;
                });
            }
            Err(_) => {
                error!(
                    key = %self.key,
                    "Work loop dropped outside a runtime, lock left to expire by TTL"
                );
            }
        }
    }
}

async fn release_lock(
    store: &dyn LockStore,
    key: &str,
    marker: &str,
    mode: ReleaseMode,
) -> ReleaseStatus {
    let result = match mode {
        ReleaseMode::OwnerChecked => store.release_if_held(key, marker).await,
        ReleaseMode::Unconditional => store.release(key).await,
    };

    match result {
        Ok(true) => {
            metrics::record_release("released");
            ReleaseStatus::Released
        }
        Ok(false) => {
            metrics::record_release("already_released");
            warn!(key = %key, mode = %mode, "Lock was no longer held at release");
            ReleaseStatus::AlreadyReleased
        }
        Err(e) => {
            metrics::record_release("failed");
            error!(
                key = %key,
                backend = store.backend(),
                error = %e,
                "Failed to release lock, it will be held until TTL expiry"
            );
            ReleaseStatus::Failed(e.to_string())
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("work unit panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("work unit panicked: {}", s)
    } else {
        "work unit panicked".to_string()
    }
}

/// Runs units of work for one leadership window
pub struct BoundedWorkLoop {
    store: Arc<dyn LockStore>,
    config: ElectionConfig,
    instance: InstanceId,
}

impl BoundedWorkLoop {
    pub fn new(store: Arc<dyn LockStore>, config: ElectionConfig, instance: InstanceId) -> Self {
        Self {
            store,
            config,
            instance,
        }
    }

    /// Work until the deadline, shutdown or failure, then release the lock.
    pub async fn run<W>(
        &self,
        leadership: Leadership,
        work: &mut W,
        shutdown: &ShutdownSignal,
    ) -> LoopReport
    where
        W: WorkUnit + ?Sized,
    {
        let mut guard = LeaseGuard::new(self.store.clone(), &leadership, self.config.release_mode);
        metrics::set_leader(true);

        let (iterations, exit) = self.drive(&leadership, work, shutdown).await;

        let release = guard.release().await;
        metrics::set_leader(false);

        let held = leadership.acquired_at().elapsed();
        metrics::record_leadership_duration(held.as_secs_f64());

        info!(
            instance = %self.instance,
            iterations,
            exit = ?exit,
            release = ?release,
            held_ms = held.as_millis() as u64,
            "Run count: {}",
            iterations
        );

        LoopReport {
            iterations,
            exit,
            release,
            held_ms: held.as_millis() as u64,
            finished_at: Utc::now(),
        }
    }

    /// The paced loop body. Returns the completed count and the exit reason.
    async fn drive<W>(
        &self,
        leadership: &Leadership,
        work: &mut W,
        shutdown: &ShutdownSignal,
    ) -> (u64, LoopExit)
    where
        W: WorkUnit + ?Sized,
    {
        let deadline = tokio::time::sleep_until(leadership.deadline());
        tokio::pin!(deadline);

        // Delay: an overrunning unit pushes the schedule back instead of bursting
        let mut ticker = tokio::time::interval(self.config.work_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut iterations = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return (iterations, LoopExit::Cancelled),
                _ = &mut deadline => return (iterations, LoopExit::DeadlineReached),
                _ = ticker.tick() => {}
            }

            if Instant::now() >= leadership.deadline() {
                return (iterations, LoopExit::DeadlineReached);
            }

            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return (iterations, LoopExit::Cancelled),
                _ = &mut deadline => return (iterations, LoopExit::DeadlineReached),
                outcome = AssertUnwindSafe(work.perform(iterations + 1)).catch_unwind() => outcome,
            };

            match outcome {
                Ok(Ok(())) => {
                    iterations += 1;
                    metrics::record_iteration();
                }
                Ok(Err(e)) => {
                    metrics::record_work_failure();
                    match self.config.failure_policy {
                        WorkFailurePolicy::Abort => {
                            warn!(
                                instance = %self.instance,
                                iteration = iterations + 1,
                                error = %e,
                                "Work unit failed, stopping loop"
                            );
                            return (iterations, LoopExit::WorkFailed(e.to_string()));
                        }
                        WorkFailurePolicy::Continue => {
                            warn!(
                                instance = %self.instance,
                                iteration = iterations + 1,
                                error = %e,
                                "Work unit failed, continuing"
                            );
                        }
                    }
                }
                Err(payload) => {
                    metrics::record_work_failure();
                    let message = panic_message(payload);
                    error!(instance = %self.instance, "{}", message);
                    return (iterations, LoopExit::WorkFailed(message));
                }
            }
        }
    }
}
