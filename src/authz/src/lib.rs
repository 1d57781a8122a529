//! # Bastion Authorization Engine
//!
//! Access-decision engine combining attribute-based and role-based
//! evaluation with post-grant conditions and a revocation-safe decision
//! cache.
//!
//! ## Features
//!
//! - **ABAC** rules with match patterns, boolean conditions and priority tiers
//! - **RBAC** with inherited roles, wildcard permissions and direct grants
//! - **Conditions** on grants: time windows, locations, devices, risk-based MFA
//! - **Decision cache** with synchronous per-subject invalidation
//! - **Audit** fan-out to pluggable sinks, plus in-process metrics
//!
//! ## Example
//!
//! ```rust
//! use bastion_authz::{
//!     AccessDecisionEngine, AccessRequest, AuthorizationContext, EngineConfig, ResourceContext, Role,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = AccessDecisionEngine::new(EngineConfig::default())?;
//!     engine.define_role(Role::new("viewer", ["document:read"])?).await?;
//!     engine.grant_role("alice", "viewer", None).await?;
//!
//!     let request = AccessRequest::new(
//!         AuthorizationContext::new("alice"),
//!         ResourceContext::new("document", "doc1"),
//!         "read",
//!     );
//!
//!     let decision = engine.check_permission(&request).await;
//!     assert!(decision.granted);
//!     assert_eq!(decision.reason, "granted via role:viewer");
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod cache;
pub mod conditions;
pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod roles;
pub mod types;

// Re-export commonly used types
pub use audit::{AuditEvent, AuditHub, AuditSink, ChannelAuditSink, MemoryAuditSink, TracingAuditSink};
pub use cache::{
    CacheBackend, CacheConfig, CacheKey, CacheStats, CachedDecision, DecisionCache, DecisionInputs, MemoryCache,
};
pub use conditions::{ConditionEngine, ConditionPolicy};
pub use config::{EngineConfig, SimpleConfig};
pub use engine::{AccessDecisionEngine, EngineBuilder, EngineMetrics};
pub use error::{AuthzError, Result};
pub use policy::{MatchPattern, PolicyCondition, PolicyEffect, PolicyRule, PolicyStore};
pub use roles::{DirectGrant, Permission, Role, RoleStore};
pub use types::{
    AccessCondition, AccessDecision, AccessRequest, AttributeValue, Attributes, AuthorizationContext,
    Classification, ConditionType, DenyReason, Environment, ResourceContext, Strategy,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
