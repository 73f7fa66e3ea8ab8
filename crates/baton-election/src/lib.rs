//! Baton Election - leader election over a shared lock store
//!
//! This crate provides:
//! - The election policy: one atomic conditional create per attempt, first writer wins
//! - The bounded work loop run by the leader until a safety deadline
//! - The fixed-delay trigger driving election and work loop
//! - The cancellation signal shared by all of the above
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use baton_common::InstanceId;
//! use baton_election::{ElectionConfig, PeriodicTrigger, ShutdownSignal, SimulatedWork};
//! use baton_lock::MemoryLockStore;
//!
//! let config = ElectionConfig::default();
//! let instance = InstanceId::resolve(None);
//! let trigger = PeriodicTrigger::new(Arc::new(MemoryLockStore::new()), config.clone(), instance.clone());
//! let mut work = SimulatedWork::new(instance, config.max_work_duration);
//!
//! let shutdown = ShutdownSignal::new();
//! let summary = trigger.run(&mut work, &shutdown).await;
//! ```

pub mod config;
pub mod metrics;
pub mod policy;
pub mod shutdown;
pub mod trigger;
pub mod work;
pub mod work_loop;

pub use config::{ElectionConfig, ReleaseMode, WorkFailurePolicy};
pub use policy::{ElectionOutcome, LeaderElector, Leadership};
pub use shutdown::ShutdownSignal;
pub use trigger::{FiringOutcome, PeriodicTrigger, TriggerSummary};
pub use work::{FnWork, SimulatedWork, WorkUnit, work_fn};
pub use work_loop::{BoundedWorkLoop, LoopExit, LoopReport, ReleaseStatus};
