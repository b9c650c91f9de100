//! Configuration
//!
//! Layers, lowest first:
//! 1. Built-in defaults
//! 2. Optional TOML file (`CRM_TRUST_CONFIG`, default `crm-trust.toml`)
//! 3. Environment variables `CRM_TRUST__SECTION__KEY`
//!
//! The master secret additionally falls back to `ENCRYPTION_KEY` and then
//! `NEXTAUTH_SECRET`.

use crm_authz::AuthzError;
use crm_common::{Environment, TrustError};
use crm_crypto::{EncryptionError, DEFAULT_KDF_ITERATIONS};
use crm_ratelimit::{ActionLimit, FailurePolicy, RateLimitError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Variable naming the config file
pub const CONFIG_PATH_VAR: &str = "CRM_TRUST_CONFIG";
/// Config file used when [`CONFIG_PATH_VAR`] is unset
pub const DEFAULT_CONFIG_PATH: &str = "crm-trust.toml";
/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "CRM_TRUST";
/// Secret variables consulted when no master secret is configured
pub const SECRET_FALLBACK_VARS: [&str; 2] = ["ENCRYPTION_KEY", "NEXTAUTH_SECRET"];

const MIN_PRODUCTION_ITERATIONS: u32 = 10_000;

/// Configuration errors. All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Sources could not be read or deserialized
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// No master secret in any source
    #[error("master secret is not configured (set encryption.master_secret, ENCRYPTION_KEY or NEXTAUTH_SECRET)")]
    MissingSecret,

    /// Permission table or permission tokens rejected
    #[error(transparent)]
    Authz(#[from] AuthzError),

    /// Rate limit table or deployment rejected
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    /// Encryptor rejected its parameters
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}

impl From<ConfigError> for TrustError {
    fn from(err: ConfigError) -> Self {
        TrustError::Configuration(err.to_string())
    }
}

/// Trust core configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Deployment mode
    pub environment: Environment,
    /// Field encryption
    pub encryption: EncryptionConfig,
    /// Rate limiting
    pub rate_limit: RateLimitConfig,
    /// Identity resolution
    pub identity: IdentityConfig,
    /// Authorization
    pub authorization: AuthorizationConfig,
}

/// Field encryption settings
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Master secret
    pub master_secret: Option<String>,
    /// PBKDF2 iterations
    pub kdf_iterations: u32,
    /// Bound on async key derivation
    pub kdf_timeout_ms: u64,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self { master_secret: None, kdf_iterations: DEFAULT_KDF_ITERATIONS, kdf_timeout_ms: 5_000 }
    }
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("master_secret", &self.master_secret.as_ref().map(|_| "<redacted>"))
            .field("kdf_iterations", &self.kdf_iterations)
            .field("kdf_timeout_ms", &self.kdf_timeout_ms)
            .finish()
    }
}

impl EncryptionConfig {
    /// Async key derivation bound
    pub fn kdf_timeout(&self) -> Duration {
        Duration::from_millis(self.kdf_timeout_ms)
    }
}

/// Rate limiting settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bound on counter store calls
    pub store_timeout_ms: u64,
    /// Per-class overrides, keyed by class name
    pub classes: BTreeMap<String, ActionLimit>,
    /// Limit for classes without an entry
    pub default_class: Option<ActionLimit>,
    /// Permit the in-process counter store in production
    pub allow_in_process_store: bool,
    /// Monthly AI quota policy for limited plans when the store cannot answer
    pub ai_quota_on_store_failure: FailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: 250,
            classes: BTreeMap::new(),
            default_class: None,
            allow_in_process_store: false,
            ai_quota_on_store_failure: FailurePolicy::Open,
        }
    }
}

impl RateLimitConfig {
    /// Counter store call bound
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Identity resolution settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Bound on the identity collaborator
    pub resolve_timeout_ms: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { resolve_timeout_ms: 1_000 }
    }
}

impl IdentityConfig {
    /// Identity collaborator bound
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

/// Authorization settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Permission tokens whose successful checks are audited too
    pub audited_allows: Vec<String>,
}

impl TrustConfig {
    /// Load from the file named by `CRM_TRUST_CONFIG` and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load from an optional file at `path` and the environment
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: TrustConfig = settings.try_deserialize()?;
        config.apply_secret_fallback(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(document, ::config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Fill an absent or blank master secret from the fallback variables
    pub fn apply_secret_fallback<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.master_secret().is_some() {
            return;
        }
        self.encryption.master_secret = SECRET_FALLBACK_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|value| !value.trim().is_empty());
    }

    /// Non-blank master secret
    pub fn master_secret(&self) -> Option<&str> {
        self.encryption.master_secret.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Range checks
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.master_secret().is_none() {
            return Err(ConfigError::MissingSecret);
        }
        if self.encryption.kdf_iterations == 0 {
            return Err(ConfigError::Invalid("encryption.kdf_iterations must be positive".into()));
        }
        if self.environment.is_production() && self.encryption.kdf_iterations < MIN_PRODUCTION_ITERATIONS {
            return Err(ConfigError::Invalid(format!(
                "encryption.kdf_iterations must be at least {} in production",
                MIN_PRODUCTION_ITERATIONS
            )));
        }
        for (name, value) in [
            ("encryption.kdf_timeout_ms", self.encryption.kdf_timeout_ms),
            ("rate_limit.store_timeout_ms", self.rate_limit.store_timeout_ms),
            ("identity.resolve_timeout_ms", self.identity.resolve_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}
