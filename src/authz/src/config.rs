//! Engine configuration
//!
//! Configuration comes from defaults, a JSON file, or `BASTION_*`
//! environment variables layered over either:
//!
//! - `BASTION_ABAC_ENABLED` / `BASTION_RBAC_ENABLED` - strategy switches
//! - `BASTION_CACHE_ENABLED` - decision cache switch
//! - `BASTION_CACHE_TTL_SECS` - decision TTL (default: 60)
//! - `BASTION_CACHE_CAPACITY` - entries per cache (default: 10000)
//! - `BASTION_MFA_RISK_THRESHOLD` - risk score requiring MFA (default: 70)

use crate::cache::{CacheConfig, MAX_CACHE_TTL};
use crate::conditions::ConditionPolicy;
use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "BASTION_";

/// Simple permission-list strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleConfig {
    /// Use the flat permission check when neither ABAC nor RBAC applies
    pub enabled: bool,

    /// Honor `domain:*` and `*` entries in the flat list
    pub allow_wildcards: bool,

    /// Grant any action to the resource owner
    pub owner_bypass: bool,
}

impl Default for SimpleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_wildcards: true,
            owner_bypass: false,
        }
    }
}

/// Access decision engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluate ABAC rules when any are enabled
    pub abac_enabled: bool,

    /// Fall back to role-based evaluation
    pub rbac_enabled: bool,

    pub simple: SimpleConfig,

    pub cache: CacheConfig,

    pub conditions: ConditionPolicy,

    /// Buffer size of the sink created by `AccessDecisionEngine::subscribe_channel`
    pub audit_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            abac_enabled: true,
            rbac_enabled: true,
            simple: SimpleConfig::default(),
            cache: CacheConfig::default(),
            conditions: ConditionPolicy::default(),
            audit_channel_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `BASTION_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Load a JSON config file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        debug!("Loaded engine config from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup, then validate
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));

        if let Some(v) = var("ABAC_ENABLED") {
            self.abac_enabled = parse_bool("ABAC_ENABLED", &v)?;
        }
        if let Some(v) = var("RBAC_ENABLED") {
            self.rbac_enabled = parse_bool("RBAC_ENABLED", &v)?;
        }
        if let Some(v) = var("CACHE_ENABLED") {
            self.cache.enabled = parse_bool("CACHE_ENABLED", &v)?;
        }
        if let Some(v) = var("CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_num("CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = var("CACHE_CAPACITY") {
            self.cache.capacity = parse_num("CACHE_CAPACITY", &v)?;
        }
        if let Some(v) = var("MFA_RISK_THRESHOLD") {
            self.conditions.risk.mfa_threshold = parse_num("MFA_RISK_THRESHOLD", &v)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject configurations the engine cannot run safely
    pub fn validate(&self) -> Result<()> {
        if !self.abac_enabled && !self.rbac_enabled && !self.simple.enabled {
            return Err(AuthzError::Configuration(
                "at least one evaluation strategy must be enabled".to_string(),
            ));
        }

        if self.cache.ttl() >= MAX_CACHE_TTL || self.cache.grants_ttl() >= MAX_CACHE_TTL {
            return Err(AuthzError::Configuration(format!(
                "cache TTLs must stay below {}s",
                MAX_CACHE_TTL.as_secs()
            )));
        }

        if self.cache.capacity == 0 {
            return Err(AuthzError::Configuration(
                "cache capacity must be positive".to_string(),
            ));
        }

        if self.audit_channel_capacity == 0 {
            return Err(AuthzError::Configuration(
                "audit channel capacity must be positive".to_string(),
            ));
        }

        self.conditions.validate()
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AuthzError::Configuration(format!(
            "{}{}: expected a boolean, got '{}'",
            ENV_PREFIX, name, other
        ))),
    }
}

fn parse_num<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        AuthzError::Configuration(format!("{}{}: {} ('{}')", ENV_PREFIX, name, e, value))
    })
}
