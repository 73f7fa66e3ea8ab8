//! Election and work loop settings

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use baton_common::{
    BatonError, DEFAULT_LEADER_MARKER, DEFAULT_LOCK_KEY, DEFAULT_LOCK_TTL_MS,
    DEFAULT_MAX_WORK_DURATION_MS, DEFAULT_SAFETY_MARGIN_MS, DEFAULT_TRIGGER_DELAY_MS,
    DEFAULT_WORK_INTERVAL_MS, is_valid,
};
use serde::{Deserialize, Serialize};

/// How the leader deletes the lock when its window ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseMode {
    /// Write a unique marker per acquisition and delete only if it still matches
    #[default]
    OwnerChecked,
    /// Delete the key whoever holds it
    Unconditional,
}

impl ReleaseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseMode::OwnerChecked => "owner-checked",
            ReleaseMode::Unconditional => "unconditional",
        }
    }
}

impl Display for ReleaseMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReleaseMode {
    type Err = BatonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "owner-checked" | "owner_checked" | "checked" => Ok(ReleaseMode::OwnerChecked),
            "unconditional" => Ok(ReleaseMode::Unconditional),
            other => Err(BatonError::ConfigError(format!(
                "unknown release mode '{}'",
                other
            ))),
        }
    }
}

/// What the work loop does when one unit of work returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkFailurePolicy {
    /// Stop the loop and release the lock
    #[default]
    Abort,
    /// Log the failure and keep iterating
    Continue,
}

impl WorkFailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkFailurePolicy::Abort => "abort",
            WorkFailurePolicy::Continue => "continue",
        }
    }
}

impl Display for WorkFailurePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkFailurePolicy {
    type Err = BatonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(WorkFailurePolicy::Abort),
            "continue" | "skip" => Ok(WorkFailurePolicy::Continue),
            other => Err(BatonError::ConfigError(format!(
                "unknown work failure policy '{}'",
                other
            ))),
        }
    }
}

/// Settings shared by the elector, the work loop and the trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionConfig {
    /// Key of the shared lock
    pub lock_key: String,
    /// Lock value; prefix of the per-acquisition marker in owner-checked mode
    pub leader_marker: String,
    /// Store-side expiry of the lock
    pub lock_ttl: Duration,
    /// Time before expiry at which the leader stops working
    pub safety_margin: Duration,
    /// Target period of one work iteration
    pub work_interval: Duration,
    /// Upper bound of the simulated work duration
    pub max_work_duration: Duration,
    /// Delay between the end of one firing and the next
    pub trigger_delay: Duration,
    pub release_mode: ReleaseMode,
    pub failure_policy: WorkFailurePolicy,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            lock_key: DEFAULT_LOCK_KEY.to_string(),
            leader_marker: DEFAULT_LEADER_MARKER.to_string(),
            lock_ttl: Duration::from_millis(DEFAULT_LOCK_TTL_MS),
            safety_margin: Duration::from_millis(DEFAULT_SAFETY_MARGIN_MS),
            work_interval: Duration::from_millis(DEFAULT_WORK_INTERVAL_MS),
            max_work_duration: Duration::from_millis(DEFAULT_MAX_WORK_DURATION_MS),
            trigger_delay: Duration::from_millis(DEFAULT_TRIGGER_DELAY_MS),
            release_mode: ReleaseMode::default(),
            failure_policy: WorkFailurePolicy::default(),
        }
    }
}

impl ElectionConfig {
    /// Time from acquisition to the safety deadline (TTL minus margin)
    pub fn leadership_window(&self) -> Duration {
        self.lock_ttl.saturating_sub(self.safety_margin)
    }

    /// Reject settings under which the deadline would not precede expiry
    pub fn validate(&self) -> baton_common::Result<()> {
        if self.lock_key.is_empty() || !is_valid(&self.lock_key) {
            return Err(BatonError::InvalidLockKey(self.lock_key.clone()));
        }
        if self.leader_marker.is_empty() {
            return Err(BatonError::ConfigError(
                "leader marker must not be empty".to_string(),
            ));
        }
        if self.safety_margin.is_zero() || self.safety_margin >= self.lock_ttl {
            return Err(BatonError::InvalidSafetyMargin {
                margin_ms: self.safety_margin.as_millis() as u64,
                ttl_ms: self.lock_ttl.as_millis() as u64,
            });
        }
        if self.work_interval.is_zero() {
            return Err(BatonError::ConfigError(
                "work interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_reference_constants() {
        let config = ElectionConfig::default();
        assert_eq!(config.lock_key, "lock");
        assert_eq!(config.leader_marker, "locked-by-leader");
        assert_eq!(config.lock_ttl, Duration::from_millis(10_000));
        assert_eq!(config.leadership_window(), Duration::from_millis(9_500));
        assert_eq!(config.work_interval, Duration::from_millis(500));
        assert_eq!(config.trigger_delay, Duration::from_millis(1_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_margin() {
        let mut config = ElectionConfig {
            safety_margin: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BatonError::InvalidSafetyMargin { .. })
        ));

        config.safety_margin = config.lock_ttl;
        assert!(matches!(
            config.validate(),
            Err(BatonError::InvalidSafetyMargin { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_key_and_interval() {
        let config = ElectionConfig {
            lock_key: "bad key".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BatonError::InvalidLockKey(_))
        ));

        let config = ElectionConfig {
            work_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_release_mode_parse() {
        assert_eq!(
            "owner-checked".parse::<ReleaseMode>().unwrap(),
            ReleaseMode::OwnerChecked
        );
        assert_eq!(
            "Unconditional".parse::<ReleaseMode>().unwrap(),
            ReleaseMode::Unconditional
        );
        assert!("sometimes".parse::<ReleaseMode>().is_err());
        assert_eq!(ReleaseMode::OwnerChecked.to_string(), "owner-checked");
    }

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!(
            "abort".parse::<WorkFailurePolicy>().unwrap(),
            WorkFailurePolicy::Abort
        );
        assert_eq!(
            "continue".parse::<WorkFailurePolicy>().unwrap(),
            WorkFailurePolicy::Continue
        );
        assert!("retry".parse::<WorkFailurePolicy>().is_err());
    }
}
