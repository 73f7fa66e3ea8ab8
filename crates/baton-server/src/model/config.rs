//! Configuration management for Baton server
//!
//! Values are layered, lowest precedence first: the YAML file
//! (`conf/application.yml` unless `--config` says otherwise), `BATON__*`
//! environment variables (`BATON__REDIS__HOST` maps to `baton.redis.host`),
//! then command line flags.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use baton_common::{
    BatonError, DEFAULT_LEADER_MARKER, DEFAULT_LOCK_KEY, DEFAULT_LOCK_TTL_MS,
    DEFAULT_MAX_WORK_DURATION_MS, DEFAULT_SAFETY_MARGIN_MS, DEFAULT_TRIGGER_DELAY_MS,
    DEFAULT_WORK_INTERVAL_MS, InstanceId, Result,
};
use baton_election::{ElectionConfig, ReleaseMode, WorkFailurePolicy};
use baton_lock::RedisConfig;
use clap::Parser;
use config::{Config, ConfigError, Environment};
use serde::de::DeserializeOwned;

use crate::metrics::MetricsConfig;
use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "baton-server", version, about)]
pub struct Cli {
    /// Path of the YAML configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    config: String,
    /// Instance name used in logs and lock markers
    #[arg(short = 'n', long = "instance-name")]
    instance_name: Option<String>,
    /// Lock store backend: redis or memory
    #[arg(short = 's', long = "store")]
    store: Option<String>,
    #[arg(long = "redis-host", env = "REDIS_HOST")]
    redis_host: Option<String>,
    #[arg(long = "redis-port", env = "REDIS_PORT")]
    redis_port: Option<u16>,
}

/// Lock store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Redis,
    /// In-process store; only coordinates triggers inside one process
    Memory,
}

impl Display for StoreType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreType::Redis => write!(f, "redis"),
            StoreType::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StoreType {
    type Err = BatonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(StoreType::Redis),
            "memory" | "mem" => Ok(StoreType::Memory),
            other => Err(BatonError::ConfigError(format!(
                "unknown store type '{}'",
                other
            ))),
        }
    }
}

fn config_error(e: ConfigError) -> BatonError {
    BatonError::ConfigError(e.to_string())
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration for the current process arguments
    pub fn new() -> Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> Result<Self> {
        let mut config_builder = Config::builder()
            .add_source(config::File::with_name(&args.config).required(false))
            .add_source(
                Environment::with_prefix("BATON")
                    .separator("__")
                    .keep_prefix(true)
                    .try_parsing(true),
            );

        if let Some(v) = args.instance_name {
            config_builder = config_builder
                .set_override("baton.instance.name", v)
                .map_err(config_error)?;
        }
        if let Some(v) = args.store {
            config_builder = config_builder
                .set_override("baton.store.type", v)
                .map_err(config_error)?;
        }
        if let Some(v) = args.redis_host {
            config_builder = config_builder
                .set_override("baton.redis.host", v)
                .map_err(config_error)?;
        }
        if let Some(v) = args.redis_port {
            config_builder = config_builder
                .set_override("baton.redis.port", i64::from(v))
                .map_err(config_error)?;
        }

        let app_config = config_builder.build().map_err(|e| {
            BatonError::ConfigError(format!(
                "failed to build configuration from {}: {}",
                args.config, e
            ))
        })?;

        Ok(Configuration { config: app_config })
    }

    /// Typed lookup; a missing key yields `default`, a malformed one an error
    fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.config.get::<T>(key) {
            Ok(v) => Ok(v),
            Err(ConfigError::NotFound(_)) => Ok(default),
            Err(e) => Err(BatonError::ConfigError(format!("{}: {}", key, e))),
        }
    }

    fn millis_or(&self, key: &str, default_ms: u64) -> Result<Duration> {
        self.get_or::<u64>(key, default_ms).map(Duration::from_millis)
    }

    // ========================================================================
    // Instance and Store
    // ========================================================================

    pub fn instance_id(&self) -> InstanceId {
        InstanceId::resolve(self.config.get_string("baton.instance.name").ok())
    }

    pub fn store_type(&self) -> Result<StoreType> {
        self.get_or("baton.store.type", "redis".to_string())?.parse()
    }

    pub fn redis_config(&self) -> Result<RedisConfig> {
        let defaults = RedisConfig::default();
        let password = self
            .config
            .get_string("baton.redis.password")
            .ok()
            .filter(|p| !p.is_empty());

        Ok(RedisConfig {
            host: self.get_or("baton.redis.host", defaults.host)?,
            port: self.get_or("baton.redis.port", defaults.port)?,
            password,
            database: self.get_or("baton.redis.database", defaults.database)?,
            connect_timeout: self.millis_or(
                "baton.redis.connect_timeout_ms",
                defaults.connect_timeout.as_millis() as u64,
            )?,
            command_timeout: self.millis_or(
                "baton.redis.command_timeout_ms",
                defaults.command_timeout.as_millis() as u64,
            )?,
        })
    }

    // ========================================================================
    // Election Configuration
    // ========================================================================

    /// Election settings, validated
    pub fn election_config(&self) -> Result<ElectionConfig> {
        let release_mode: ReleaseMode = self
            .get_or(
                "baton.lock.release_mode",
                ReleaseMode::default().as_str().to_string(),
            )?
            .parse()?;
        let failure_policy: WorkFailurePolicy = self
            .get_or(
                "baton.work.failure_policy",
                WorkFailurePolicy::default().as_str().to_string(),
            )?
            .parse()?;

        let election = ElectionConfig {
            lock_key: self.get_or("baton.lock.key", DEFAULT_LOCK_KEY.to_string())?,
            leader_marker: self
                .get_or("baton.lock.marker", DEFAULT_LEADER_MARKER.to_string())?,
            lock_ttl: self.millis_or("baton.lock.ttl_ms", DEFAULT_LOCK_TTL_MS)?,
            safety_margin: self
                .millis_or("baton.lock.safety_margin_ms", DEFAULT_SAFETY_MARGIN_MS)?,
            work_interval: self.millis_or("baton.work.interval_ms", DEFAULT_WORK_INTERVAL_MS)?,
            max_work_duration: self
                .millis_or("baton.work.max_duration_ms", DEFAULT_MAX_WORK_DURATION_MS)?,
            trigger_delay: self.millis_or("baton.trigger.delay_ms", DEFAULT_TRIGGER_DELAY_MS)?,
            release_mode,
            failure_policy,
        };
        election.validate()?;

        Ok(election)
    }

    // ========================================================================
    // Logging and Metrics
    // ========================================================================

    pub fn logging_config(&self) -> Result<LoggingConfig> {
        let rotation = self
            .get_or("baton.logging.rotation", "daily".to_string())?
            .parse()?;

        Ok(LoggingConfig::from_config(
            self.config.get_string("baton.logging.dir").ok(),
            self.get_or("baton.logging.console", true)?,
            self.get_or("baton.logging.file", true)?,
            self.get_or("baton.logging.level", "info".to_string())?,
            rotation,
        ))
    }

    pub fn metrics_config(&self) -> Result<MetricsConfig> {
        let defaults = MetricsConfig::default();
        Ok(MetricsConfig {
            enabled: self.get_or("baton.metrics.enabled", defaults.enabled)?,
            address: self.get_or("baton.metrics.address", defaults.address)?,
            port: self.get_or("baton.metrics.port", defaults.port)?,
        })
    }
}
