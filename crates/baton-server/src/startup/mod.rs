//! Application startup utilities module.

mod logging;
mod shutdown;
mod store;

pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::wait_for_shutdown_signal;
pub use store::{build_lock_store, check_lock_store};
