//! Roles, permissions and the RBAC path
//!
//! - **Permissions**: `domain:action` strings with trailing-segment wildcards
//! - **Inheritance**: roles form a DAG validated at definition time
//! - **Resolution**: depth-first expansion with a visited-set guard
//! - **Evaluation**: direct grants, then held roles, first match wins
//!
//! # Example
//!
//! ```rust
//! use bastion_authz::roles::{PermissionResolver, Role};
//! use std::collections::HashMap;
//!
//! let viewer = Role::new("viewer", ["document:read"]).unwrap();
//! let editor = Role::new("editor", ["document:*"]).unwrap().with_parent("viewer");
//!
//! let catalog: HashMap<String, Role> = [viewer, editor]
//!     .into_iter()
//!     .map(|r| (r.name.clone(), r))
//!     .collect();
//!
//! let permissions = PermissionResolver::new().resolve(&["editor".to_string()], &catalog);
//! assert!(PermissionResolver::grants(&permissions, "document:create"));
//! assert!(!PermissionResolver::grants(&permissions, "documents:read"));
//! ```

pub mod evaluator;
pub mod grants;
pub mod graph;
pub mod resolver;
pub mod store;
pub mod types;

pub use evaluator::RoleEvaluator;
pub use grants::SubjectGrants;
pub use graph::RoleGraph;
pub use resolver::{PermissionResolver, RoleCatalog, RolePermissions};
pub use store::{InMemoryRoleStore, RoleStore};
pub use types::{DirectGrant, Permission, Role};
