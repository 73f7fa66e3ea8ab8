//! Baton Lock - clients for the shared coordination store
//!
//! This crate provides:
//! - The `LockStore` capability trait (conditional create with TTL, delete)
//! - A Redis implementation on the `redis` crate's connection manager
//! - An in-memory implementation for single-host runs and tests

pub mod error;
pub mod memory;
pub mod redis;
pub mod store;

pub use error::{LockError, Result};
pub use memory::{MemoryLockStore, StoreStats};
pub use self::redis::{RedisConfig, RedisLockStore};
pub use store::LockStore;
