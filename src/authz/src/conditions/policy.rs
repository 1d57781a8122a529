//! Condition policy configuration

use crate::error::{AuthzError, Result};
use crate::types::Classification;
use chrono::{Duration as ChronoDuration, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Risk score above which a grant requires a second factor
pub const DEFAULT_MFA_THRESHOLD: u8 = 70;

/// Default validity of an MFA requirement
pub const DEFAULT_MFA_VALIDITY_SECS: u64 = 300;

/// Upper bound on MFA requirement validity (one day)
pub const MAX_MFA_VALIDITY_SECS: u64 = 86_400;

/// Post-grant condition rules; absent rules never fire
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindowRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceRule>,

    #[serde(default)]
    pub risk: RiskRule,
}

impl ConditionPolicy {
    pub fn with_time_window(mut self, rule: TimeWindowRule) -> Self {
        self.time_window = Some(rule);
        self
    }

    pub fn with_location(mut self, rule: LocationRule) -> Self {
        self.location = Some(rule);
        self
    }

    pub fn with_device(mut self, rule: DeviceRule) -> Self {
        self.device = Some(rule);
        self
    }

    pub fn with_risk(mut self, rule: RiskRule) -> Self {
        self.risk = rule;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.risk.mfa_threshold > 100 {
            return Err(AuthzError::Configuration(format!(
                "MFA risk threshold {} outside [0, 100]",
                self.risk.mfa_threshold
            )));
        }
        if self.risk.mfa_validity_secs == 0 || self.risk.mfa_validity_secs > MAX_MFA_VALIDITY_SECS {
            return Err(AuthzError::Configuration(format!(
                "MFA validity {}s outside (0, {}]",
                self.risk.mfa_validity_secs, MAX_MFA_VALIDITY_SECS
            )));
        }
        if let Some(window) = &self.time_window {
            if window.start == window.end {
                return Err(AuthzError::Configuration(
                    "time window start and end must differ".to_string(),
                ));
            }
            if window.utc_offset_minutes.abs() >= 24 * 60 {
                return Err(AuthzError::Configuration(format!(
                    "time window offset {} minutes is out of range",
                    window.utc_offset_minutes
                )));
            }
        }
        Ok(())
    }
}

/// Allowed daily window; wraps past midnight when `end < start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindowRule {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,

    #[serde(with = "hhmm")]
    pub end: NaiveTime,

    /// Allowed weekdays; empty allows every day
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days: Vec<Weekday>,

    /// Offset of the window's local time from UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_classification: Option<Classification>,
}

impl TimeWindowRule {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start,
            end,
            days: Vec::new(),
            utc_offset_minutes: 0,
            min_classification: None,
        }
    }

    pub fn on_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.days = days.into_iter().collect();
        self
    }

    pub fn with_utc_offset_minutes(mut self, offset: i32) -> Self {
        self.utc_offset_minutes = offset;
        self
    }

    pub fn scoped_to(mut self, classification: Classification) -> Self {
        self.min_classification = Some(classification);
        self
    }

    pub(crate) fn offset(&self) -> ChronoDuration {
        ChronoDuration::minutes(i64::from(self.utc_offset_minutes))
    }
}

/// Location allow-list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRule {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Allowed locations, compared case-insensitively
    pub allowed: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_classification: Option<Classification>,
}

impl LocationRule {
    pub fn allow(locations: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            enabled: true,
            allowed: locations.into_iter().map(Into::into).collect(),
            min_classification: None,
        }
    }

    pub fn scoped_to(mut self, classification: Classification) -> Self {
        self.min_classification = Some(classification);
        self
    }

    pub(crate) fn permits(&self, location: &str) -> bool {
        self.allowed.iter().any(|l| l.eq_ignore_ascii_case(location))
    }
}

/// Device trust policy
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceRule {
    /// Device ids registered as trusted
    #[serde(default)]
    pub trusted_devices: BTreeSet<String>,

    /// Admit devices that are not in the trusted set
    #[serde(default)]
    pub allow_unknown: bool,

    /// Device types rejected outright (e.g. "emulator")
    #[serde(default)]
    pub blocked_device_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_classification: Option<Classification>,
}

impl DeviceRule {
    pub fn trusting(devices: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            trusted_devices: devices.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn blocking_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.blocked_device_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn allowing_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn scoped_to(mut self, classification: Classification) -> Self {
        self.min_classification = Some(classification);
        self
    }
}

/// Risk-triggered MFA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRule {
    #[serde(default = "default_mfa_threshold")]
    pub mfa_threshold: u8,

    #[serde(default = "default_mfa_validity")]
    pub mfa_validity_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_classification: Option<Classification>,
}

impl Default for RiskRule {
    fn default() -> Self {
        Self {
            mfa_threshold: DEFAULT_MFA_THRESHOLD,
            mfa_validity_secs: DEFAULT_MFA_VALIDITY_SECS,
            min_classification: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_mfa_threshold() -> u8 {
    DEFAULT_MFA_THRESHOLD
}

fn default_mfa_validity() -> u64 {
    DEFAULT_MFA_VALIDITY_SECS
}

/// `HH:MM` (or `HH:MM:SS`) time of day
mod hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|e| de::Error::custom(format!("invalid time '{}': {}", raw, e)))
    }
}
