//! Post-grant conditions
//!
//! The condition engine sees a decision only after a strategy granted it.
//! Rules run in a fixed order (time, location, device, risk); the first
//! hard failure converts the grant into a deny, and the risk rule only
//! annotates. A deny is never upgraded.

pub mod policy;

pub use policy::{ConditionPolicy, DeviceRule, LocationRule, RiskRule, TimeWindowRule};

use crate::types::{
    AccessCondition, AccessDecision, AccessRequest, Classification, ConditionType, DenyReason,
};
use chrono::{Datelike, Duration as ChronoDuration};
use tracing::debug;

/// Outcome of one condition rule
enum Check {
    Pass,
    Deny { condition: ConditionType, reason: String, detail: String },
}

/// Applies a [`ConditionPolicy`] to granted decisions
#[derive(Debug, Clone, Default)]
pub struct ConditionEngine {
    policy: ConditionPolicy,
}

impl ConditionEngine {
    pub fn new(policy: ConditionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ConditionPolicy {
        &self.policy
    }

    /// Apply conditions to a decision
    pub fn apply(&self, request: &AccessRequest, decision: AccessDecision) -> AccessDecision {
        if !decision.granted {
            return decision;
        }

        let classification = request.resource.classification;
        let checks: [fn(&Self, &AccessRequest, Classification) -> Check; 3] =
            [Self::check_time, Self::check_location, Self::check_device];

        for check in checks {
            if let Check::Deny {
                condition,
                reason,
                detail,
            } = check(self, request, classification)
            {
                debug!(
                    "Condition {} vetoed grant for {}: {}",
                    condition, request.subject.user_id, detail
                );
                return AccessDecision::deny(
                    decision.strategy,
                    reason,
                    DenyReason::ConditionFailed { condition, detail },
                );
            }
        }

        self.apply_risk(request, classification, decision)
    }

    fn check_time(&self, request: &AccessRequest, classification: Classification) -> Check {
        let Some(window) = &self.policy.time_window else {
            return Check::Pass;
        };
        if !in_scope(window.min_classification, classification) {
            return Check::Pass;
        }

        let local = request.environment.timestamp.naive_utc() + window.offset();
        let time = local.time();
        let day_allowed = window.days.is_empty() || window.days.contains(&local.weekday());
        let in_window = if window.start < window.end {
            window.start <= time && time < window.end
        } else {
            time >= window.start || time < window.end
        };

        if day_allowed && in_window {
            Check::Pass
        } else {
            Check::Deny {
                condition: ConditionType::TimeWindow,
                reason: "access outside permitted time window".to_string(),
                detail: format!(
                    "{} is outside {}-{}",
                    local.format("%a %H:%M"),
                    window.start.format("%H:%M"),
                    window.end.format("%H:%M")
                ),
            }
        }
    }

    fn check_location(&self, request: &AccessRequest, classification: Classification) -> Check {
        let Some(rule) = &self.policy.location else {
            return Check::Pass;
        };
        if !rule.enabled || !in_scope(rule.min_classification, classification) {
            return Check::Pass;
        }

        let location = request
            .environment
            .location
            .as_deref()
            .or(request.subject.location.as_deref());

        match location {
            Some(location) if rule.permits(location) => Check::Pass,
            Some(location) => Check::Deny {
                condition: ConditionType::Location,
                reason: "location not permitted".to_string(),
                detail: format!("location '{}' is not on the allow-list", location),
            },
            None => Check::Deny {
                condition: ConditionType::Location,
                reason: "location not permitted".to_string(),
                detail: "request carries no location".to_string(),
            },
        }
    }

    fn check_device(&self, request: &AccessRequest, classification: Classification) -> Check {
        let Some(rule) = &self.policy.device else {
            return Check::Pass;
        };
        if !in_scope(rule.min_classification, classification) {
            return Check::Pass;
        }

        if let Some(device_type) = &request.environment.device_type {
            if rule
                .blocked_device_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(device_type))
            {
                return Check::Deny {
                    condition: ConditionType::Device,
                    reason: "untrusted device".to_string(),
                    detail: format!("device type '{}' is blocked", device_type),
                };
            }
        }

        if rule.allow_unknown {
            return Check::Pass;
        }

        match request.subject.device_id.as_deref() {
            Some(device) if rule.trusted_devices.contains(device) => Check::Pass,
            Some(device) => Check::Deny {
                condition: ConditionType::Device,
                reason: "untrusted device".to_string(),
                detail: format!("device '{}' is not trusted", device),
            },
            None => Check::Deny {
                condition: ConditionType::Device,
                reason: "untrusted device".to_string(),
                detail: "request carries no device id".to_string(),
            },
        }
    }

    fn apply_risk(
        &self,
        request: &AccessRequest,
        classification: Classification,
        decision: AccessDecision,
    ) -> AccessDecision {
        let rule = &self.policy.risk;
        if !in_scope(rule.min_classification, classification) || request.environment.mfa_verified {
            return decision;
        }

        let risk = request.effective_risk_score();
        if risk <= rule.mfa_threshold || decision.has_condition(ConditionType::Mfa) {
            return decision;
        }

        debug!(
            "Risk {} above {} for {}, requiring MFA",
            risk, rule.mfa_threshold, request.subject.user_id
        );
        let validity = rule.mfa_validity_secs.min(policy::MAX_MFA_VALIDITY_SECS) as i64;
        decision.with_condition(AccessCondition {
            condition_type: ConditionType::Mfa,
            requirement: format!("verify a second factor (risk score {})", risk),
            expires_at: request
                .environment
                .timestamp
                .checked_add_signed(ChronoDuration::seconds(validity)),
        })
    }
}

fn in_scope(min: Option<Classification>, classification: Classification) -> bool {
    min.map_or(true, |min| classification >= min)
}
