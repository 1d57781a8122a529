//! Materialized role and permission view of one subject

use super::resolver::{PermissionResolver, RolePermissions};
use super::store::RoleStore;
use super::types::{DirectGrant, Permission, Role};
use crate::error::Result;
use std::collections::BTreeSet;
use tracing::debug;

/// Everything the evaluators need to know about a subject's grants
///
/// Loaded from the role store once and cached per subject. Role
/// assignments recorded in the store are authoritative; the session's
/// role list is used only for users the store has no record of.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectGrants {
    pub user_id: String,

    /// Held role definitions, in assignment order
    pub held: Vec<Role>,

    /// Held roles plus every inherited ancestor
    pub effective_roles: Vec<String>,

    /// Effective permissions attributed to each held role
    pub by_role: Vec<RolePermissions>,

    pub direct_grants: Vec<DirectGrant>,

    /// Roles came from the request because the store has no record of the user
    pub from_session: bool,
}

impl SubjectGrants {
    /// Load a subject's grants from the store
    pub async fn load(
        store: &dyn RoleStore,
        resolver: &PermissionResolver,
        user_id: &str,
        session_roles: &[String],
    ) -> Result<Self> {
        let (assigned, from_session) = match store.user_roles(user_id).await? {
            Some(roles) => (roles, false),
            None => {
                debug!("User '{}' unknown to role store, using session roles", user_id);
                (session_roles.to_vec(), true)
            }
        };

        let catalog = store.role_catalog().await?;
        let direct_grants = store.direct_grants(user_id).await?;

        let held = assigned
            .iter()
            .filter_map(|name| catalog.get(name).cloned())
            .collect();

        Ok(Self {
            user_id: user_id.to_string(),
            held,
            effective_roles: resolver.expand_roles(&assigned, &catalog),
            by_role: resolver.resolve_by_role(&assigned, &catalog),
            direct_grants,
            from_session,
        })
    }

    /// Cache key for a subject's grants under a given session role list
    ///
    /// Role order is kept since it decides which role a grant is attributed to.
    pub fn cache_key(session_roles: &[String]) -> String {
        let encoded = serde_json::to_string(session_roles).unwrap_or_default();
        format!("grants:{}", encoded)
    }

    /// Names of the held roles
    pub fn role_names(&self) -> Vec<String> {
        self.held.iter().map(|r| r.name.clone()).collect()
    }

    /// Union of all role-derived permissions
    pub fn permissions(&self) -> BTreeSet<Permission> {
        self.by_role
            .iter()
            .flat_map(|entry| entry.permissions.iter().cloned())
            .collect()
    }
}
