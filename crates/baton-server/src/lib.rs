//! Baton Server - process bootstrap for the leader-elected work loop
//!
//! Loads configuration, sets up logging, metrics and signal handling, builds
//! the lock store and runs the periodic trigger until shutdown.

pub mod metrics;
pub mod model;
pub mod startup;
