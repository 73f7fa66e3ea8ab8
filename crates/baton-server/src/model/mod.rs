pub mod config;

pub use config::{Cli, Configuration, StoreType};
