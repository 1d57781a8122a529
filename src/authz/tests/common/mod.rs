//! Shared fixtures: instrumented stores and request helpers

#![allow(dead_code)]

use async_trait::async_trait;
use bastion_authz::policy::InMemoryPolicyStore;
use bastion_authz::roles::InMemoryRoleStore;
use bastion_authz::{
    AccessRequest, AuthorizationContext, AuthzError, DirectGrant, PolicyRule, PolicyStore, ResourceContext,
    Result, Role, RoleStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn request(user: &str, resource_type: &str, resource_id: &str, action: &str) -> AccessRequest {
    AccessRequest::new(
        AuthorizationContext::new(user),
        ResourceContext::new(resource_type, resource_id),
        action,
    )
}

pub fn read_doc(user: &str) -> AccessRequest {
    request(user, "document", "doc1", "read")
}

/// Policy store that counts full listings (one per strategy evaluation)
#[derive(Default)]
pub struct CountingPolicyStore {
    inner: InMemoryPolicyStore,
    lists: AtomicUsize,
}

impl CountingPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyStore for CountingPolicyStore {
    async fn get(&self, id: &str) -> Result<Option<PolicyRule>> {
        self.inner.get(id).await
    }

    async fn put(&self, rule: PolicyRule) -> Result<()> {
        self.inner.put(rule).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.inner.remove(id).await
    }

    async fn list(&self) -> Result<Vec<PolicyRule>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list().await
    }
}

/// How a [`FaultyRoleStore`] misbehaves on assignment reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    Error,
    Panic,
}

/// Role store whose `user_roles` can fail or panic on demand
pub struct FaultyRoleStore {
    inner: InMemoryRoleStore,
    erroring: AtomicBool,
    panicking: AtomicBool,
}

impl FaultyRoleStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRoleStore::new(),
            erroring: AtomicBool::new(false),
            panicking: AtomicBool::new(false),
        }
    }

    pub fn set_fault(&self, fault: Fault) {
        self.erroring.store(fault == Fault::Error, Ordering::SeqCst);
        self.panicking.store(fault == Fault::Panic, Ordering::SeqCst);
    }
}

#[async_trait]
impl RoleStore for FaultyRoleStore {
    async fn get_role(&self, name: &str) -> Result<Option<Role>> {
        self.inner.get_role(name).await
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        self.inner.list_roles().await
    }

    async fn put_role(&self, role: Role) -> Result<()> {
        self.inner.put_role(role).await
    }

    async fn delete_role(&self, name: &str) -> Result<bool> {
        self.inner.delete_role(name).await
    }

    async fn user_roles(&self, user_id: &str) -> Result<Option<Vec<String>>> {
        if self.panicking.load(Ordering::SeqCst) {
            panic!("role store corrupted");
        }
        if self.erroring.load(Ordering::SeqCst) {
            return Err(AuthzError::Store("role store offline".to_string()));
        }
        self.inner.user_roles(user_id).await
    }

    async fn assign_role(&self, user_id: &str, role: &str) -> Result<bool> {
        self.inner.assign_role(user_id, role).await
    }

    async fn unassign_role(&self, user_id: &str, role: &str) -> Result<bool> {
        self.inner.unassign_role(user_id, role).await
    }

    async fn direct_grants(&self, user_id: &str) -> Result<Vec<DirectGrant>> {
        self.inner.direct_grants(user_id).await
    }

    async fn add_direct_grant(&self, user_id: &str, grant: DirectGrant) -> Result<bool> {
        self.inner.add_direct_grant(user_id, grant).await
    }

    async fn remove_direct_grant(&self, user_id: &str, grant: &DirectGrant) -> Result<bool> {
        self.inner.remove_direct_grant(user_id, grant).await
    }

    async fn role_catalog(&self) -> Result<HashMap<String, Role>> {
        self.inner.role_catalog().await
    }
}
