//! Role storage
//!
//! `RoleStore` is the boundary to the durable store that owns role
//! definitions, user→role assignments and direct grants. Reads may be
//! cached by the engine; writes always go straight to the store.

use super::graph::RoleGraph;
use super::types::{DirectGrant, Role};
use crate::error::{AuthzError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Role store trait
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Get a role definition by name
    async fn get_role(&self, name: &str) -> Result<Option<Role>>;

    /// List all role definitions
    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// Create or replace a role definition
    ///
    /// Implementations must reject definitions that reference unknown
    /// parents or close an inheritance cycle.
    async fn put_role(&self, role: Role) -> Result<()>;

    /// Delete a role definition; returns whether it existed
    async fn delete_role(&self, name: &str) -> Result<bool>;

    /// Roles assigned to a user, or `None` if the store has no record of them
    async fn user_roles(&self, user_id: &str) -> Result<Option<Vec<String>>>;

    /// Assign a role; returns whether the assignment is new
    async fn assign_role(&self, user_id: &str, role: &str) -> Result<bool>;

    /// Remove a role assignment; returns whether it existed
    async fn unassign_role(&self, user_id: &str, role: &str) -> Result<bool>;

    /// Direct grants held by a user
    async fn direct_grants(&self, user_id: &str) -> Result<Vec<DirectGrant>>;

    /// Add a direct grant; returns whether it is new
    async fn add_direct_grant(&self, user_id: &str, grant: DirectGrant) -> Result<bool>;

    /// Remove a direct grant; returns whether it existed
    async fn remove_direct_grant(&self, user_id: &str, grant: &DirectGrant) -> Result<bool>;

    /// Snapshot of all role definitions keyed by name
    async fn role_catalog(&self) -> Result<HashMap<String, Role>> {
        Ok(self
            .list_roles()
            .await?
            .into_iter()
            .map(|role| (role.name.clone(), role))
            .collect())
    }
}

#[derive(Default)]
struct StoreState {
    roles: HashMap<String, Role>,
    assignments: HashMap<String, Vec<String>>,
    grants: HashMap<String, Vec<DirectGrant>>,
}

/// In-memory role store implementation
pub struct InMemoryRoleStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryRoleStore {
    /// Create an empty in-memory role store
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }
}

impl Default for InMemoryRoleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn get_role(&self, name: &str) -> Result<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.get(name).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().cloned().collect())
    }

    async fn put_role(&self, role: Role) -> Result<()> {
        let mut state = self.state.write().await;
        RoleGraph::check_definition(&state.roles, &role)?;
        state.roles.insert(role.name.clone(), role);
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        if let Some(child) = state.roles.values().find(|r| r.parents.iter().any(|p| p == name)) {
            return Err(AuthzError::InvalidRole(format!(
                "role '{}' is inherited by '{}'",
                name, child.name
            )));
        }
        Ok(state.roles.remove(name).is_some())
    }

    async fn user_roles(&self, user_id: &str) -> Result<Option<Vec<String>>> {
        let state = self.state.read().await;
        Ok(state.assignments.get(user_id).cloned())
    }

    async fn assign_role(&self, user_id: &str, role: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(role) {
            return Err(AuthzError::RoleNotFound(role.to_string()));
        }
        let assigned = state.assignments.entry(user_id.to_string()).or_default();
        if assigned.iter().any(|r| r == role) {
            return Ok(false);
        }
        assigned.push(role.to_string());
        Ok(true)
    }

    async fn unassign_role(&self, user_id: &str, role: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        // Keep the (possibly empty) entry: the user is still known to the store
        let assigned = state.assignments.entry(user_id.to_string()).or_default();
        let before = assigned.len();
        assigned.retain(|r| r != role);
        Ok(assigned.len() != before)
    }

    async fn direct_grants(&self, user_id: &str) -> Result<Vec<DirectGrant>> {
        let state = self.state.read().await;
        Ok(state.grants.get(user_id).cloned().unwrap_or_default())
    }

    async fn add_direct_grant(&self, user_id: &str, grant: DirectGrant) -> Result<bool> {
        let mut state = self.state.write().await;
        let grants = state.grants.entry(user_id.to_string()).or_default();
        if grants.contains(&grant) {
            return Ok(false);
        }
        grants.push(grant);
        Ok(true)
    }

    async fn remove_direct_grant(&self, user_id: &str, grant: &DirectGrant) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(grants) = state.grants.get_mut(user_id) else {
            return Ok(false);
        };
        let before = grants.len();
        grants.retain(|g| g != grant);
        Ok(grants.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_role_crud() {
        let store = InMemoryRoleStore::new();
        store.put_role(Role::new("viewer", ["document:read"]).unwrap()).await.unwrap();

        let role = store.get_role("viewer").await.unwrap();
        assert!(role.is_some());
        assert_eq!(store.list_roles().await.unwrap().len(), 1);

        assert!(store.delete_role("viewer").await.unwrap());
        assert!(!store.delete_role("viewer").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_role_rejects_cycle() {
        let store = InMemoryRoleStore::new();
        store.put_role(Role::new("viewer", ["document:read"]).unwrap()).await.unwrap();
        store
            .put_role(Role::new("editor", ["document:write"]).unwrap().with_parent("viewer"))
            .await
            .unwrap();

        let cyclic = Role::new("viewer", ["document:read"]).unwrap().with_parent("editor");
        let result = store.put_role(cyclic).await;
        assert!(matches!(result, Err(AuthzError::CircularInheritance(_))));

        // The original definition is untouched
        let viewer = store.get_role("viewer").await.unwrap().unwrap();
        assert!(viewer.parents.is_empty());
    }

    #[tokio::test]
    async fn test_delete_inherited_role_rejected() {
        let store = InMemoryRoleStore::new();
        store.put_role(Role::new("viewer", ["document:read"]).unwrap()).await.unwrap();
        store
            .put_role(Role::new("editor", ["document:write"]).unwrap().with_parent("viewer"))
            .await
            .unwrap();

        assert!(matches!(
            store.delete_role("viewer").await,
            Err(AuthzError::InvalidRole(_))
        ));
    }

    #[tokio::test]
    async fn test_assignments() {
        let store = InMemoryRoleStore::new();
        store.put_role(Role::new("viewer", ["document:read"]).unwrap()).await.unwrap();

        assert_eq!(store.user_roles("alice").await.unwrap(), None);
        assert!(store.assign_role("alice", "viewer").await.unwrap());
        assert!(!store.assign_role("alice", "viewer").await.unwrap());
        assert_eq!(
            store.user_roles("alice").await.unwrap(),
            Some(vec!["viewer".to_string()])
        );

        assert!(store.unassign_role("alice", "viewer").await.unwrap());
        assert_eq!(store.user_roles("alice").await.unwrap(), Some(vec![]));

        assert!(matches!(
            store.assign_role("alice", "ghost").await,
            Err(AuthzError::RoleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_direct_grants() {
        let store = InMemoryRoleStore::new();
        let grant = DirectGrant::new("document", Some("doc1".to_string()), "document:read").unwrap();

        assert!(store.add_direct_grant("alice", grant.clone()).await.unwrap());
        assert!(!store.add_direct_grant("alice", grant.clone()).await.unwrap());
        assert_eq!(store.direct_grants("alice").await.unwrap().len(), 1);

        assert!(store.remove_direct_grant("alice", &grant).await.unwrap());
        assert!(store.direct_grants("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_role_catalog_snapshot() {
        let store = InMemoryRoleStore::new();
        store.put_role(Role::new("viewer", ["document:read"]).unwrap()).await.unwrap();
        store.put_role(Role::new("auditor", ["report:*"]).unwrap()).await.unwrap();

        let catalog = store.role_catalog().await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains_key("auditor"));
    }
}
