//! Permission resolution over the role inheritance graph
//!
//! Expands a set of held roles into the effective permission set by walking
//! parents depth-first. The walk keeps a visited set, so it terminates even
//! on a catalog whose cycle check was skipped.

use super::types::{Permission, Role};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Read-only lookup of role definitions
pub trait RoleCatalog {
    fn role(&self, name: &str) -> Option<&Role>;
}

impl RoleCatalog for HashMap<String, Role> {
    fn role(&self, name: &str) -> Option<&Role> {
        self.get(name)
    }
}

/// Permissions reachable from one held role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissions {
    /// The held role the permissions are attributed to
    pub role: String,
    pub permissions: BTreeSet<Permission>,
}

/// Expands roles into permissions; pure over its inputs
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionResolver;

impl PermissionResolver {
    pub fn new() -> Self {
        Self
    }

    /// Held roles plus every inherited ancestor, in depth-first order
    pub fn expand_roles<C: RoleCatalog + ?Sized>(&self, roles: &[String], catalog: &C) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for role in roles {
            self.walk(role, catalog, &mut visited, &mut order);
        }
        order
    }

    /// Union of all directly and transitively granted permissions
    pub fn resolve<C: RoleCatalog + ?Sized>(&self, roles: &[String], catalog: &C) -> BTreeSet<Permission> {
        self.expand_roles(roles, catalog)
            .iter()
            .filter_map(|name| catalog.role(name))
            .flat_map(|role| role.permissions.iter().cloned())
            .collect()
    }

    /// Effective permissions grouped by the held role they come through
    ///
    /// Order follows `roles`, so the first matching entry is the first held
    /// role that carries a permission.
    pub fn resolve_by_role<C: RoleCatalog + ?Sized>(
        &self,
        roles: &[String],
        catalog: &C,
    ) -> Vec<RolePermissions> {
        let mut seen = HashSet::new();
        roles
            .iter()
            .filter(|role| seen.insert(role.as_str()))
            .map(|role| RolePermissions {
                role: role.clone(),
                permissions: self.resolve(std::slice::from_ref(role), catalog),
            })
            .collect()
    }

    /// Whether any permission in the set grants `requested`
    pub fn grants<'a>(permissions: impl IntoIterator<Item = &'a Permission>, requested: &str) -> bool {
        permissions.into_iter().any(|p| p.grants(requested))
    }

    fn walk<C: RoleCatalog + ?Sized>(
        &self,
        start: &str,
        catalog: &C,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        let mut stack = vec![start.to_string()];

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }

            let Some(role) = catalog.role(&name) else {
                debug!("Role '{}' is not defined, skipping", name);
                continue;
            };
            order.push(name);

            // Reverse so the first listed parent is visited first
            for parent in role.parents.iter().rev() {
                if !visited.contains(parent) {
                    stack.push(parent.clone());
                }
            }
        }
    }
}
