//! RBAC evaluation path
//!
//! Membership checks only: direct grants first, then each held role with
//! its inherited permissions. Resource attributes beyond identity and type
//! are never examined.

use super::grants::SubjectGrants;
use super::resolver::PermissionResolver;
use crate::types::{AccessDecision, AccessRequest, DenyReason, Strategy};
use tracing::debug;

/// Reason given when neither a role nor a direct grant matches
pub const NO_GRANT_REASON: &str = "no matching role or direct permission";

/// Role-based evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleEvaluator;

impl RoleEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Decide a request from the subject's grants; first match wins
    pub fn evaluate(&self, request: &AccessRequest, grants: &SubjectGrants) -> AccessDecision {
        let requested = request.requested_permission();
        let resource = &request.resource;

        if grants
            .direct_grants
            .iter()
            .any(|g| g.covers(&resource.resource_type, &resource.id, &requested))
        {
            debug!("RBAC: {} granted {} by direct grant", grants.user_id, requested);
            return AccessDecision::grant(Strategy::Rbac, "granted via direct grant");
        }

        for entry in &grants.by_role {
            if PermissionResolver::grants(&entry.permissions, &requested) {
                debug!("RBAC: {} granted {} via role {}", grants.user_id, requested, entry.role);
                return AccessDecision::grant(Strategy::Rbac, format!("granted via role:{}", entry.role));
            }
        }

        debug!("RBAC: no grant for {} on {}", grants.user_id, requested);
        AccessDecision::deny(Strategy::Rbac, NO_GRANT_REASON, DenyReason::NoMatchingGrant)
    }
}
