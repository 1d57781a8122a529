//! Attribute bags for ABAC evaluation
//!
//! Three bags are built per request: `subject`, `resource` and
//! `environment`. Rules address attributes by path, e.g.
//! `subject.risk_score`, `resource.classification_level` or
//! `environment.hour`. Caller-supplied custom attributes are reachable both
//! as `<scope>.attributes.<key>` and, when the name does not shadow a
//! built-in, as `<scope>.<key>`.

use crate::types::{AccessRequest, AttributeValue, Attributes};
use chrono::{Datelike, Timelike, Weekday};

/// Attribute scope addressed by the first path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Subject,
    Resource,
    Environment,
}

impl Scope {
    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "subject" => Some(Scope::Subject),
            "resource" => Some(Scope::Resource),
            "environment" => Some(Scope::Environment),
            _ => None,
        }
    }
}

/// Which bags a rule set reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeUsage {
    pub subject: bool,
    pub resource: bool,
    pub environment: bool,
}

impl ScopeUsage {
    pub fn add(&mut self, scope: Scope) {
        match scope {
            Scope::Subject => self.subject = true,
            Scope::Resource => self.resource = true,
            Scope::Environment => self.environment = true,
        }
    }

    /// Record the scope named by a dotted attribute path
    pub fn add_path(&mut self, path: &str) {
        if let Some(scope) = path.split_once('.').and_then(|(scope, _)| Scope::parse(scope)) {
            self.add(scope);
        }
    }

    pub fn merge(&mut self, other: ScopeUsage) {
        self.subject |= other.subject;
        self.resource |= other.resource;
        self.environment |= other.environment;
    }

    pub fn is_empty(&self) -> bool {
        !(self.subject || self.resource || self.environment)
    }
}

/// The three attribute bags of one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeBags {
    pub subject: Attributes,
    pub resource: Attributes,
    pub environment: Attributes,
}

impl AttributeBags {
    /// Build bags for a request; `roles` is the subject's effective role set
    pub fn build(request: &AccessRequest, roles: &[String]) -> Self {
        let subject_ctx = &request.subject;
        let resource_ctx = &request.resource;
        let env = &request.environment;

        let mut subject = Attributes::new();
        subject.insert("id".into(), subject_ctx.user_id.as_str().into());
        subject.insert("roles".into(), roles.to_vec().into());
        subject.insert("teams".into(), subject_ctx.teams.clone().into());
        subject.insert("organizations".into(), subject_ctx.organizations.clone().into());
        subject.insert("risk_score".into(), subject_ctx.risk_score.into());
        insert_opt(&mut subject, "device_id", &subject_ctx.device_id);
        insert_opt(&mut subject, "ip_address", &subject_ctx.ip_address);
        insert_opt(&mut subject, "location", &subject_ctx.location);
        merge_custom(&mut subject, &subject_ctx.attributes);

        let mut resource = Attributes::new();
        resource.insert("id".into(), resource_ctx.id.as_str().into());
        resource.insert("type".into(), resource_ctx.resource_type.as_str().into());
        resource.insert("classification".into(), resource_ctx.classification.as_str().into());
        resource.insert(
            "classification_level".into(),
            resource_ctx.classification.level().into(),
        );
        insert_opt(&mut resource, "owner", &resource_ctx.owner_id);
        insert_opt(&mut resource, "team", &resource_ctx.team_id);
        insert_opt(&mut resource, "organization", &resource_ctx.organization_id);
        merge_custom(&mut resource, &resource_ctx.attributes);

        let mut environment = Attributes::new();
        environment.insert("timestamp".into(), env.timestamp.to_rfc3339().into());
        environment.insert("hour".into(), i64::from(env.timestamp.hour()).into());
        environment.insert("weekday".into(), weekday_name(env.timestamp.weekday()).into());
        environment.insert("mfa_verified".into(), env.mfa_verified.into());
        environment.insert("risk_score".into(), request.effective_risk_score().into());
        insert_opt(&mut environment, "ip_address", &env.ip_address);
        insert_opt(&mut environment, "device_type", &env.device_type);
        insert_opt(&mut environment, "location", &env.location);

        Self {
            subject,
            resource,
            environment,
        }
    }

    /// Look up an attribute by dotted path; `None` when absent
    pub fn lookup(&self, path: &str) -> Option<&AttributeValue> {
        let (scope, key) = path.split_once('.')?;
        self.bag(Scope::parse(scope)?).get(key)
    }

    pub fn bag(&self, scope: Scope) -> &Attributes {
        match scope {
            Scope::Subject => &self.subject,
            Scope::Resource => &self.resource,
            Scope::Environment => &self.environment,
        }
    }

    /// Whether a path names a known scope and a non-empty key
    pub fn is_valid_path(path: &str) -> bool {
        matches!(
            path.split_once('.'),
            Some((scope, key)) if Scope::parse(scope).is_some() && !key.is_empty()
        )
    }
}

/// Lowercase three-letter weekday name, as exposed in `environment.weekday`
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

fn insert_opt(bag: &mut Attributes, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        bag.insert(key.to_string(), value.as_str().into());
    }
}

fn merge_custom(bag: &mut Attributes, custom: &Attributes) {
    for (key, value) in custom {
        bag.insert(format!("attributes.{}", key), value.clone());
        // Built-ins win over custom attributes of the same name
        bag.entry(key.clone()).or_insert_with(|| value.clone());
    }
}
