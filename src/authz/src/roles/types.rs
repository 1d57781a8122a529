//! Permission and role definitions

use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment separator inside a permission string
const SEPARATOR: char = ':';

/// Wildcard marker; only valid as a whole trailing segment
const WILDCARD: &str = "*";

/// Permission identifier in `domain:action` form
///
/// A permission ending in a `*` segment (`document:*`) grants every
/// permission under that prefix; a bare `*` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(String);

impl Permission {
    /// Parse and validate a permission string
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(AuthzError::InvalidPermission(value));
        }

        let segments: Vec<&str> = value.split(SEPARATOR).collect();
        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(AuthzError::InvalidPermission(value));
            }
            // `*` may only appear as the complete final segment
            if segment.contains('*') && (i != last || *segment != WILDCARD) {
                return Err(AuthzError::InvalidPermission(value));
            }
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this permission ends in a wildcard segment
    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD || self.0.ends_with(":*")
    }

    /// Literal prefix a wildcard permission matches, including the separator
    fn wildcard_prefix(&self) -> Option<&str> {
        if self.0 == WILDCARD {
            Some("")
        } else {
            self.0.strip_suffix(WILDCARD).filter(|p| p.ends_with(SEPARATOR))
        }
    }

    /// Check whether this permission grants `requested`
    ///
    /// Exact match, or, for a wildcard, a case-sensitive prefix match that
    /// stops at a segment boundary: `document:*` grants `document:read`
    /// but not `documents:read`.
    pub fn grants(&self, requested: &str) -> bool {
        if self.0 == requested {
            return true;
        }
        match self.wildcard_prefix() {
            Some(prefix) => requested.len() > prefix.len() && requested.starts_with(prefix),
            None => false,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Permission {
    type Error = AuthzError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Permission> for String {
    fn from(permission: Permission) -> Self {
        permission.0
    }
}

/// Role definition
///
/// Parents are other roles whose permissions this role inherits; the
/// inheritance graph must stay acyclic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role name (e.g., "viewer")
    pub name: String,

    /// Directly granted permissions, in definition order
    #[serde(default)]
    pub permissions: Vec<Permission>,

    /// Roles this role inherits from
    #[serde(default)]
    pub parents: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Role {
    /// Create a role from raw permission strings
    pub fn new<I, S>(name: impl Into<String>, permissions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut role = Self {
            name: name.into(),
            permissions: Vec::new(),
            parents: Vec::new(),
            description: None,
        };
        for permission in permissions {
            let permission = Permission::parse(permission)?;
            if !role.permissions.contains(&permission) {
                role.permissions.push(permission);
            }
        }
        Ok(role)
    }

    /// Add a parent role
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        let parent = parent.into();
        if !self.parents.contains(&parent) {
            self.parents.push(parent);
        }
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validate the role definition in isolation
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AuthzError::InvalidRole("role name cannot be empty".to_string()));
        }

        for parent in &self.parents {
            if parent.is_empty() {
                return Err(AuthzError::InvalidRole(format!(
                    "role '{}' has an empty parent role",
                    self.name
                )));
            }
            if parent == &self.name {
                return Err(AuthzError::CircularInheritance(format!(
                    "{} -> {}",
                    self.name, self.name
                )));
            }
        }

        Ok(())
    }
}

/// Direct subject → resource → permission grant, bypassing roles
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectGrant {
    pub resource_type: String,

    /// Specific resource, or every resource of the type when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    pub permission: Permission,
}

impl DirectGrant {
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: Option<String>,
        permission: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            resource_type: resource_type.into(),
            resource_id,
            permission: Permission::parse(permission)?,
        })
    }

    /// Whether this grant covers the resource and permission
    pub fn covers(&self, resource_type: &str, resource_id: &str, requested: &str) -> bool {
        self.resource_type == resource_type
            && self.resource_id.as_deref().map_or(true, |id| id == resource_id)
            && self.permission.grants(requested)
    }
}
