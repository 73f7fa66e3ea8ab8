//! Utility functions for Baton
//!
//! Common helper functions used across the codebase.

use std::fmt::{Display, Formatter};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::INSTANCE_NAME_ENV;

/// Regex pattern for validating identifiers (lock keys, instance names)
static VALID_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new("^[a-zA-Z0-9_.:-]*$").expect("Invalid regex pattern"));

/// Validate a string contains only allowed characters
///
/// Allowed characters: alphanumeric, underscore, dot, colon, hyphen
///
/// # Examples
///
/// ```
/// use baton_common::is_valid;
///
/// assert!(is_valid("lock"));
/// assert!(is_valid("jobs:leader-lock"));
/// assert!(!is_valid("with spaces"));
/// ```
pub fn is_valid(str: &str) -> bool {
    VALID_PATTERN.is_match(str)
}

/// Process-scoped label of this instance, used in log output and lock markers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Resolve the identity once at startup.
    ///
    /// Order: explicit value, `INSTANCE_NAME`, host name, `"unknown"`.
    pub fn resolve(explicit: Option<String>) -> Self {
        explicit
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                std::env::var(INSTANCE_NAME_ENV)
                    .ok()
                    .filter(|v| !v.trim().is_empty())
            })
            .or_else(|| {
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .filter(|v| !v.is_empty())
            })
            .map(Self)
            .unwrap_or_else(|| Self("unknown".to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
