//! Flat permission-list check
//!
//! Used when neither ABAC nor RBAC decides a request. The subject's
//! session-issued permissions and any direct grants on the resource are
//! checked for the requested permission; no role expansion happens here.

use crate::cache::DecisionInputs;
use crate::config::SimpleConfig;
use crate::roles::{Permission, SubjectGrants};
use crate::types::{AccessDecision, AccessRequest, DenyReason, Strategy};
use tracing::{debug, warn};

pub const NO_PERMISSION_REASON: &str = "no matching permission";

/// Simple permission evaluator
#[derive(Debug, Clone)]
pub struct SimplePermissionEvaluator {
    config: SimpleConfig,
}

impl SimplePermissionEvaluator {
    pub fn new(config: SimpleConfig) -> Self {
        Self { config }
    }

    fn matches(&self, permission: &Permission, requested: &str) -> bool {
        if self.config.allow_wildcards {
            permission.grants(requested)
        } else {
            permission.as_str() == requested
        }
    }

    /// Request data a simple decision depends on besides the stores
    pub fn inputs(&self, request: &AccessRequest) -> DecisionInputs {
        let inputs = DecisionInputs::new().with_session_permissions(request);
        if self.config.owner_bypass {
            inputs.with_owner(request)
        } else {
            inputs
        }
    }

    pub fn evaluate(&self, request: &AccessRequest, grants: &SubjectGrants) -> AccessDecision {
        let subject = &request.subject;
        let resource = &request.resource;

        if self.config.owner_bypass && resource.owner_id.as_deref() == Some(subject.user_id.as_str()) {
            debug!("Simple: {} owns {}", subject.user_id, resource.qualified_id());
            return AccessDecision::grant(Strategy::Simple, "granted via resource ownership");
        }

        let requested = request.requested_permission();

        for raw in &subject.permissions {
            match Permission::parse(raw.as_str()) {
                Ok(permission) if self.matches(&permission, &requested) => {
                    return AccessDecision::grant(Strategy::Simple, format!("granted via permission:{}", permission));
                }
                Ok(_) => {}
                Err(_) => warn!("Ignoring malformed session permission '{}' for {}", raw, subject.user_id),
            }
        }

        let direct = grants.direct_grants.iter().find(|grant| {
            grant.resource_type == resource.resource_type
                && grant.resource_id.as_deref().map_or(true, |id| id == resource.id)
                && self.matches(&grant.permission, &requested)
        });
        if let Some(grant) = direct {
            return AccessDecision::grant(Strategy::Simple, format!("granted via permission:{}", grant.permission));
        }

        debug!("Simple: no permission {} for {}", requested, subject.user_id);
        AccessDecision::deny(Strategy::Simple, NO_PERMISSION_REASON, DenyReason::NoMatchingGrant)
    }
}
