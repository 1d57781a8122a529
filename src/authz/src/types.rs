//! Core request and decision types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AuthzError, Result};

/// Typed attribute value
///
/// Attribute bags only carry this closed set of kinds so that policy
/// comparisons stay well defined and serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<String>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Name of the value kind, used in evaluation error messages
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Number(_) => "number",
            AttributeValue::String(_) => "string",
            AttributeValue::List(_) => "list",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::String(s) => write!(f, "{}", s),
            AttributeValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value as f64)
    }
}

impl From<u8> for AttributeValue {
    fn from(value: u8) -> Self {
        AttributeValue::Number(f64::from(value))
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        AttributeValue::List(value)
    }
}

/// Free-form attribute map
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Subject of an access request, supplied by the session subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationContext {
    /// User identifier
    pub user_id: String,

    /// Roles carried by the session
    #[serde(default)]
    pub roles: Vec<String>,

    /// Flat permission list issued with the session
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Team memberships
    #[serde(default)]
    pub teams: Vec<String>,

    /// Organization memberships
    #[serde(default)]
    pub organizations: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Baseline risk score in [0, 100]
    #[serde(default)]
    pub risk_score: u8,

    #[serde(default)]
    pub attributes: Attributes,
}

impl AuthorizationContext {
    /// Create a context for a user with no roles or attributes
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: Vec::new(),
            permissions: Vec::new(),
            teams: Vec::new(),
            organizations: Vec::new(),
            device_id: None,
            ip_address: None,
            location: None,
            risk_score: 0,
            attributes: Attributes::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.teams.push(team.into());
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organizations.push(organization.into());
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_risk_score(mut self, risk_score: u8) -> Self {
        self.risk_score = risk_score;
        self
    }

    /// Add a custom attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Resource classification level, ordered from least to most sensitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Public => "public",
            Classification::Internal => "internal",
            Classification::Confidential => "confidential",
            Classification::Restricted => "restricted",
        }
    }

    /// Numeric level (0 = public, 3 = restricted)
    pub fn level(&self) -> u8 {
        match self {
            Classification::Public => 0,
            Classification::Internal => 1,
            Classification::Confidential => 2,
            Classification::Restricted => 3,
        }
    }
}

impl Default for Classification {
    fn default() -> Self {
        Classification::Internal
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource being accessed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceContext {
    /// Resource identifier (e.g., "doc-123")
    pub id: String,

    /// Resource type (document, user, project, ...)
    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    #[serde(default)]
    pub classification: Classification,

    #[serde(default)]
    pub attributes: Attributes,
}

impl ResourceContext {
    /// Create a new resource of the given type
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            owner_id: None,
            team_id: None,
            organization_id: None,
            classification: Classification::default(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }

    /// Add a custom attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// `type:id` form, matched by policy resource patterns
    pub fn qualified_id(&self) -> String {
        format!("{}:{}", self.resource_type, self.id)
    }
}

/// Request-time facts, distinct from the subject's baseline profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Risk reading for this request, if the session layer computed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u8>,

    /// Whether a second factor was already verified for this request
    #[serde(default)]
    pub mfa_verified: bool,
}

impl Environment {
    /// Environment stamped with the current time
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Environment stamped with a fixed time
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            ip_address: None,
            device_type: None,
            location: None,
            risk_score: None,
            mfa_verified: false,
        }
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_risk_score(mut self, risk_score: u8) -> Self {
        self.risk_score = Some(risk_score);
        self
    }

    pub fn with_mfa_verified(mut self, verified: bool) -> Self {
        self.mfa_verified = verified;
        self
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::now()
    }
}

/// Access request: who wants to do what to which resource, and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub subject: AuthorizationContext,
    pub resource: ResourceContext,
    /// Requested action, either bare ("read") or qualified ("document:read")
    pub action: String,
    #[serde(default)]
    pub environment: Environment,
}

impl AccessRequest {
    /// Create a request evaluated at the current time
    pub fn new(
        subject: AuthorizationContext,
        resource: ResourceContext,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject,
            resource,
            action: action.into(),
            environment: Environment::now(),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Permission string this request needs
    ///
    /// A bare action is qualified with the resource type.
    pub fn requested_permission(&self) -> String {
        if self.action.contains(':') {
            self.action.clone()
        } else {
            format!("{}:{}", self.resource.resource_type, self.action)
        }
    }

    /// Highest of the subject's baseline risk and the request-time reading
    pub fn effective_risk_score(&self) -> u8 {
        self.environment
            .risk_score
            .map_or(self.subject.risk_score, |r| r.max(self.subject.risk_score))
    }

    /// Reject requests that cannot be evaluated
    pub fn validate(&self) -> Result<()> {
        if self.subject.user_id.is_empty() {
            return Err(AuthzError::InvalidInput("user id cannot be empty".to_string()));
        }
        if self.resource.resource_type.is_empty() || self.resource.id.is_empty() {
            return Err(AuthzError::InvalidInput(
                "resource type and id cannot be empty".to_string(),
            ));
        }
        if self.action.is_empty() {
            return Err(AuthzError::InvalidInput("action cannot be empty".to_string()));
        }
        if self.subject.risk_score > 100 {
            return Err(AuthzError::InvalidInput(format!(
                "subject risk score {} outside [0, 100]",
                self.subject.risk_score
            )));
        }
        if let Some(risk) = self.environment.risk_score {
            if risk > 100 {
                return Err(AuthzError::InvalidInput(format!(
                    "environment risk score {} outside [0, 100]",
                    risk
                )));
            }
        }
        Ok(())
    }
}

/// Kind of requirement attached to, or failed by, a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    Mfa,
    TimeWindow,
    Location,
    Device,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConditionType::Mfa => "mfa",
            ConditionType::TimeWindow => "time_window",
            ConditionType::Location => "location",
            ConditionType::Device => "device",
        };
        f.write_str(name)
    }
}

/// Non-blocking requirement the caller must satisfy before honoring a grant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub requirement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Evaluation strategy that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Abac,
    Rbac,
    Simple,
    /// No strategy produced the decision (evaluation failed)
    None,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Abac => "abac",
            Strategy::Rbac => "rbac",
            Strategy::Simple => "simple",
            Strategy::None => "none",
        };
        f.write_str(name)
    }
}

/// Machine-readable reason for a denial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DenyReason {
    /// ABAC is configured but no rule matched
    NoMatchingPolicy,

    /// A deny rule won the highest matching priority tier
    PolicyDenied { rule_id: String },

    /// Neither a role nor a direct grant carries the permission
    NoMatchingGrant,

    /// A post-grant condition vetoed the decision
    ConditionFailed { condition: ConditionType, detail: String },

    /// Evaluation failed; the engine failed closed
    SystemError { error: String },
}

/// Reason string used for every fail-closed system error
pub const SYSTEM_ERROR_REASON: &str = "authorization system error";

/// Authorization decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Unique decision identifier
    pub decision_id: String,

    /// Whether access is granted
    pub granted: bool,

    /// Human-readable reason
    pub reason: String,

    /// Requirements attached to a grant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<AccessCondition>,

    /// How long this decision may be cached
    #[serde(default, with = "opt_duration_secs", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<DenyReason>,

    /// Strategy that decided the request
    pub strategy: Strategy,

    pub evaluated_at: DateTime<Utc>,
}

impl AccessDecision {
    fn new(granted: bool, strategy: Strategy, reason: impl Into<String>) -> Self {
        Self {
            decision_id: Uuid::new_v4().to_string(),
            granted,
            reason: reason.into(),
            conditions: Vec::new(),
            ttl: None,
            deny_reason: None,
            strategy,
            evaluated_at: Utc::now(),
        }
    }

    /// Grant decision
    pub fn grant(strategy: Strategy, reason: impl Into<String>) -> Self {
        Self::new(true, strategy, reason)
    }

    /// Deny decision
    pub fn deny(strategy: Strategy, reason: impl Into<String>, deny_reason: DenyReason) -> Self {
        let mut decision = Self::new(false, strategy, reason);
        decision.deny_reason = Some(deny_reason);
        decision
    }

    /// Fail-closed decision for an evaluation failure
    pub fn system_error(strategy: Strategy, error: impl Into<String>) -> Self {
        Self::deny(
            strategy,
            SYSTEM_ERROR_REASON,
            DenyReason::SystemError { error: error.into() },
        )
    }

    pub fn with_condition(mut self, condition: AccessCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Whether a condition of the given type is attached
    pub fn has_condition(&self, condition_type: ConditionType) -> bool {
        self.conditions.iter().any(|c| c.condition_type == condition_type)
    }
}

/// Serialize `Option<Duration>` as whole seconds
mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
