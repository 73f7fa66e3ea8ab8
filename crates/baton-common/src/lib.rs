//! Baton Common - Shared types, constants, and utilities
//!
//! This crate provides the foundational pieces used across all Baton components:
//! - Error types
//! - Default values for the lock and the work loop
//! - Instance identity
//! - Utility functions

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{BatonError, Result};
pub use utils::{InstanceId, is_valid};

/// Key of the shared leader lock
pub const DEFAULT_LOCK_KEY: &str = "lock";

/// Value written into the lock by the leader
pub const DEFAULT_LEADER_MARKER: &str = "locked-by-leader";

/// Lock time-to-live in milliseconds
pub const DEFAULT_LOCK_TTL_MS: u64 = 10_000;

/// Time subtracted from the TTL to obtain the work deadline
pub const DEFAULT_SAFETY_MARGIN_MS: u64 = 500;

/// Target period of one work iteration
pub const DEFAULT_WORK_INTERVAL_MS: u64 = 500;

/// Upper bound of the simulated work duration
pub const DEFAULT_MAX_WORK_DURATION_MS: u64 = 500;

/// Delay between the end of one trigger firing and the start of the next
pub const DEFAULT_TRIGGER_DELAY_MS: u64 = 1_000;

/// Environment variable holding the instance name
pub const INSTANCE_NAME_ENV: &str = "INSTANCE_NAME";
