//! Policy rule definition

use super::attributes::{Scope, ScopeUsage};
use super::condition::PolicyCondition;
use super::pattern::{MatchPattern, RegexCache};
use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};

/// Rule effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyEffect {
    /// Grant access
    Permit,
    /// Deny access
    Deny,
}

/// ABAC rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Unique rule identifier
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub effect: PolicyEffect,

    /// Matched against the subject's user id (attribute patterns use the subject bag)
    #[serde(default)]
    pub subject: MatchPattern,

    /// Matched against `type:id` (attribute patterns use the resource bag)
    #[serde(default)]
    pub resource: MatchPattern,

    /// Matched against the raw action or the qualified permission
    #[serde(default)]
    pub action: MatchPattern,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<PolicyCondition>,

    /// Higher tiers are decided first
    #[serde(default)]
    pub priority: i32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PolicyRule {
    /// Rule matching everything, to be narrowed with the builder methods
    pub fn new(id: impl Into<String>, effect: PolicyEffect) -> Self {
        Self {
            id: id.into(),
            description: None,
            effect,
            subject: MatchPattern::Any,
            resource: MatchPattern::Any,
            action: MatchPattern::Any,
            condition: None,
            priority: 0,
            enabled: true,
        }
    }

    pub fn permit(id: impl Into<String>) -> Self {
        Self::new(id, PolicyEffect::Permit)
    }

    pub fn deny(id: impl Into<String>) -> Self {
        Self::new(id, PolicyEffect::Deny)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_subject(mut self, pattern: MatchPattern) -> Self {
        self.subject = pattern;
        self
    }

    pub fn with_resource(mut self, pattern: MatchPattern) -> Self {
        self.resource = pattern;
        self
    }

    pub fn with_action(mut self, pattern: MatchPattern) -> Self {
        self.action = pattern;
        self
    }

    pub fn with_condition(mut self, condition: PolicyCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Attribute bags the rule reads beyond the request identifiers
    pub fn scope_usage(&self) -> ScopeUsage {
        let mut usage = ScopeUsage::default();
        // Attribute patterns consult the bag paired with each target
        for (pattern, scope) in [
            (&self.subject, Scope::Subject),
            (&self.resource, Scope::Resource),
            (&self.action, Scope::Environment),
        ] {
            if matches!(pattern, MatchPattern::Attribute { .. }) {
                usage.add(scope);
            }
        }
        if let Some(condition) = &self.condition {
            condition.collect_scopes(&mut usage);
        }
        usage
    }

    /// Reject malformed rules before they reach the store
    pub fn validate(&self, regexes: &RegexCache) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AuthzError::InvalidPolicy("rule id cannot be empty".to_string()));
        }

        for pattern in [&self.subject, &self.resource, &self.action] {
            pattern
                .validate(regexes)
                .map_err(|e| AuthzError::InvalidPolicy(format!("rule '{}': {}", self.id, e)))?;
        }

        if let Some(condition) = &self.condition {
            condition
                .validate(regexes)
                .map_err(|e| AuthzError::InvalidPolicy(format!("rule '{}': {}", self.id, e)))?;
        }

        Ok(())
    }
}
