//! Action classes and their limits

use crate::RateLimitError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Category of operation with its own limit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionClass {
    /// Sign-in attempts
    Login,
    /// Account creation
    Registration,
    /// Password reset requests
    PasswordReset,
    /// AI assistant messages
    AiChat,
    /// Generic API traffic
    ApiGeneral,
    /// Any other class name
    Custom(String),
}

impl ActionClass {
    /// Wire name, also used in the bucket key
    pub fn as_str(&self) -> &str {
        match self {
            Self::Login => "login",
            Self::Registration => "registration",
            Self::PasswordReset => "password_reset",
            Self::AiChat => "ai_chat",
            Self::ApiGeneral => "api_general",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for ActionClass {
    fn from(s: &str) -> Self {
        match s {
            "login" => Self::Login,
            "registration" | "register" => Self::Registration,
            "password_reset" => Self::PasswordReset,
            "ai_chat" => Self::AiChat,
            "api_general" => Self::ApiGeneral,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl FromStr for ActionClass {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when the counter store cannot answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Deny the request
    #[default]
    Closed,
    /// Admit the request
    Open,
}

/// Limit for one action class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLimit {
    /// Admissions allowed per window
    pub max_attempts: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Store failure policy
    #[serde(default)]
    pub on_store_failure: FailurePolicy,
}

impl ActionLimit {
    /// Limit that fails closed
    pub const fn closed(max_attempts: u32, window_ms: u64) -> Self {
        Self { max_attempts, window_ms, on_store_failure: FailurePolicy::Closed }
    }

    /// Limit that fails open
    pub const fn open(max_attempts: u32, window_ms: u64) -> Self {
        Self { max_attempts, window_ms, on_store_failure: FailurePolicy::Open }
    }

    fn validate(&self, class: &str) -> Result<(), RateLimitError> {
        if self.max_attempts == 0 {
            return Err(RateLimitError::InvalidLimit {
                class: class.to_string(),
                reason: "max_attempts must be at least 1".into(),
            });
        }
        if self.window_ms == 0 {
            return Err(RateLimitError::InvalidLimit {
                class: class.to_string(),
                reason: "window_ms must be at least 1".into(),
            });
        }
        if self.window_ms > MAX_WINDOW_MS {
            return Err(RateLimitError::InvalidLimit {
                class: class.to_string(),
                reason: format!("window_ms must not exceed {} (31 days)", MAX_WINDOW_MS),
            });
        }
        Ok(())
    }
}

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

/// Longest accepted window
pub const MAX_WINDOW_MS: u64 = 31 * 24 * HOUR_MS;

/// Limit applied to a class with no entry of its own
pub const DEFAULT_LIMIT: ActionLimit = ActionLimit::closed(10, MINUTE_MS);

/// Per-class limits plus the fallback for unknown classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitTable {
    classes: BTreeMap<String, ActionLimit>,
    default: ActionLimit,
}

impl Default for LimitTable {
    fn default() -> Self {
        let classes = [
            (ActionClass::Login, ActionLimit::closed(5, MINUTE_MS)),
            (ActionClass::Registration, ActionLimit::closed(3, HOUR_MS)),
            (ActionClass::PasswordReset, ActionLimit::closed(3, HOUR_MS)),
            (ActionClass::AiChat, ActionLimit::open(50, HOUR_MS)),
            (ActionClass::ApiGeneral, ActionLimit::open(100, MINUTE_MS)),
        ]
        .into_iter()
        .map(|(class, limit)| (class.as_str().to_string(), limit))
        .collect();

        Self { classes, default: DEFAULT_LIMIT }
    }
}

impl LimitTable {
    /// Table with only a fallback limit
    pub fn empty(default: ActionLimit) -> Result<Self, RateLimitError> {
        default.validate("default")?;
        Ok(Self { classes: BTreeMap::new(), default })
    }

    /// Set or replace a class limit
    pub fn with_class(mut self, class: &ActionClass, limit: ActionLimit) -> Result<Self, RateLimitError> {
        limit.validate(class.as_str())?;
        self.classes.insert(class.as_str().to_string(), limit);
        Ok(self)
    }

    /// Replace the fallback limit
    pub fn with_default(mut self, limit: ActionLimit) -> Result<Self, RateLimitError> {
        limit.validate("default")?;
        self.default = limit;
        Ok(self)
    }

    /// Limit for a class, falling back to the default
    pub fn limit_for(&self, class: &ActionClass) -> &ActionLimit {
        self.classes.get(class.as_str()).unwrap_or(&self.default)
    }

    /// Whether the class has its own entry
    pub fn is_configured(&self, class: &ActionClass) -> bool {
        self.classes.contains_key(class.as_str())
    }

    /// Fallback limit
    pub fn default_limit(&self) -> &ActionLimit {
        &self.default
    }

    /// Configured classes in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ActionLimit)> {
        self.classes.iter().map(|(name, limit)| (name.as_str(), limit))
    }
}
