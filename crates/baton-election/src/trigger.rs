//! Fixed-delay trigger.
//!
//! Each firing attempts one election and, if elected, runs the bounded work
//! loop to completion. The next firing is scheduled a fixed delay after the
//! previous one finished, so firings of one trigger never overlap.

use std::sync::Arc;
use std::time::Duration;

use baton_common::InstanceId;
use baton_lock::LockStore;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ElectionConfig;
use crate::policy::{ElectionOutcome, LeaderElector};
use crate::shutdown::ShutdownSignal;
use crate::work::WorkUnit;
use crate::work_loop::{BoundedWorkLoop, LoopReport, ReleaseStatus};

/// What a single firing did
#[derive(Debug, Clone)]
pub enum FiringOutcome {
    /// Elected and ran a work loop
    Led(LoopReport),
    /// Another instance holds the lock
    NotElected,
    /// The lock store could not be reached
    StoreUnavailable(String),
    /// A previous firing of this trigger is still running
    Busy,
    /// Shutdown had already been requested
    Skipped,
}

/// Totals over the lifetime of `PeriodicTrigger::run`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriggerSummary {
    pub firings: u64,
    pub terms_led: u64,
    pub denied: u64,
    pub unavailable: u64,
    pub iterations: u64,
    pub release_failures: u64,
}

impl TriggerSummary {
    fn record(&mut self, outcome: &FiringOutcome) {
        match outcome {
            FiringOutcome::Led(report) => {
                self.firings += 1;
                self.terms_led += 1;
                self.iterations += report.iterations;
                if matches!(report.release, ReleaseStatus::Failed(_)) {
                    self.release_failures += 1;
                }
            }
            FiringOutcome::NotElected => {
                self.firings += 1;
                self.denied += 1;
            }
            FiringOutcome::StoreUnavailable(_) => {
                self.firings += 1;
                self.unavailable += 1;
            }
            FiringOutcome::Busy | FiringOutcome::Skipped => {}
        }
    }
}

/// Drives election attempts on a fixed delay
pub struct PeriodicTrigger {
    elector: LeaderElector,
    work_loop: BoundedWorkLoop,
    delay: Duration,
    instance: InstanceId,
    busy: Mutex<()>,
}

impl PeriodicTrigger {
    pub fn new(store: Arc<dyn LockStore>, config: ElectionConfig, instance: InstanceId) -> Self {
        let delay = config.trigger_delay;
        Self {
            elector: LeaderElector::new(store.clone(), config.clone(), instance.clone()),
            work_loop: BoundedWorkLoop::new(store, config, instance.clone()),
            delay,
            instance,
            busy: Mutex::new(()),
        }
    }

    /// Run one firing: elect, and lead if elected.
    ///
    /// Returns `Busy` without touching the store if another firing of this
    /// trigger is in progress. Shutdown abandons an election that is still
    /// waiting on the store and reports `Skipped`.
    pub async fn fire<W>(&self, work: &mut W, shutdown: &ShutdownSignal) -> FiringOutcome
    where
        W: WorkUnit + ?Sized,
    {
        if shutdown.is_shutdown() {
            return FiringOutcome::Skipped;
        }

        let Ok(_running) = self.busy.try_lock() else {
            debug!(instance = %self.instance, "Previous firing still running, skipping");
            return FiringOutcome::Busy;
        };

        let outcome = tokio::select! {
            biased;
            outcome = self.elector.elect() => outcome,
            _ = shutdown.cancelled() => {
                info!(
                    instance = %self.instance,
                    "Shutdown requested during election, abandoning it"
                );
                return FiringOutcome::Skipped;
            }
        };

        match outcome {
            ElectionOutcome::Elected(leadership) => {
                let report = self.work_loop.run(leadership, work, shutdown).await;
                FiringOutcome::Led(report)
            }
            ElectionOutcome::Denied => FiringOutcome::NotElected,
            ElectionOutcome::Unavailable(e) => FiringOutcome::StoreUnavailable(e.to_string()),
        }
    }

    /// Fire repeatedly until shutdown, waiting `trigger_delay` after each firing.
    pub async fn run<W>(&self, work: &mut W, shutdown: &ShutdownSignal) -> TriggerSummary
    where
        W: WorkUnit + ?Sized,
    {
        let mut summary = TriggerSummary::default();
        info!(
            instance = %self.instance,
            delay_ms = self.delay.as_millis() as u64,
            "Periodic trigger started"
        );

        while !shutdown.is_shutdown() {
            let outcome = self.fire(work, shutdown).await;
            summary.record(&outcome);

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        info!(
            instance = %self.instance,
            firings = summary.firings,
            terms_led = summary.terms_led,
            iterations = summary.iterations,
            "Periodic trigger stopped"
        );
        summary
    }
}
