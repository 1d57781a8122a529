//! Access decision engine
//!
//! Orchestrates strategy selection, condition application, decision
//! caching, metrics and audit fan-out.
//!
//! ```text
//! request → [decision cache] ─hit──────────────────────────→ conditions → audit
//!               │ miss
//!               ↓
//!          grants (cached) → ABAC | RBAC | simple → conditions → [cache grant] → audit
//! ```
//!
//! `check_permission` never returns an error: any failure or panic inside
//! the pipeline becomes a fail-closed deny that is still audited.

pub mod metrics;
pub mod simple;

pub use metrics::{EngineMetrics, MetricsCollector};
pub use simple::SimplePermissionEvaluator;

use crate::audit::{AuditEvent, AuditHub, AuditSink, ChannelAuditSink};
use crate::cache::{
    CacheBackend, CacheKey, CacheStats, CachedDecision, DecisionCache, DecisionInputs, MemoryCache, SubjectCache,
};
use crate::conditions::ConditionEngine;
use crate::config::EngineConfig;
use crate::error::{AuthzError, Result};
use crate::policy::{AttributeBags, InMemoryPolicyStore, PolicyEvaluator, PolicyRule, PolicyStore, ScopeUsage};
use crate::roles::{
    DirectGrant, InMemoryRoleStore, Permission, PermissionResolver, Role, RoleEvaluator, RoleGraph,
    RoleStore, SubjectGrants,
};
use crate::types::{AccessDecision, AccessRequest, AuthorizationContext, ResourceContext, Strategy};

use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Permission an actor needs to change another user's role assignments
pub const MANAGE_ROLES_PERMISSION: &str = "user:manage_roles";

/// Permission an actor needs to change another user's direct grants
pub const MANAGE_PERMISSIONS_PERMISSION: &str = "user:manage_permissions";

/// Builder for [`AccessDecisionEngine`]
///
/// Stores default to in-memory implementations and the decision cache to
/// an in-process LRU sized from the configuration.
pub struct EngineBuilder {
    config: EngineConfig,
    role_store: Option<Arc<dyn RoleStore>>,
    policy_store: Option<Arc<dyn PolicyStore>>,
    decision_backend: Option<Arc<dyn CacheBackend<CachedDecision>>>,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            role_store: None,
            policy_store: None,
            decision_backend: None,
            sinks: Vec::new(),
        }
    }

    pub fn role_store(mut self, store: Arc<dyn RoleStore>) -> Self {
        self.role_store = Some(store);
        self
    }

    pub fn policy_store(mut self, store: Arc<dyn PolicyStore>) -> Self {
        self.policy_store = Some(store);
        self
    }

    /// Replace the in-process decision cache storage
    pub fn decision_backend(mut self, backend: Arc<dyn CacheBackend<CachedDecision>>) -> Self {
        self.decision_backend = Some(backend);
        self
    }

    /// Register an audit sink at construction
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Validate the configuration and assemble the engine
    pub fn build(self) -> Result<AccessDecisionEngine> {
        let config = self.config;
        config.validate()?;

        let decisions = match self.decision_backend {
            Some(backend) => DecisionCache::with_backend(backend, &config.cache),
            None => DecisionCache::new(&config.cache)?,
        };

        let grants_backend: Arc<MemoryCache<SubjectGrants>> = Arc::new(MemoryCache::new(config.cache.capacity)?);
        let grants = SubjectCache::new("grants", grants_backend, config.cache.grants_ttl(), config.cache.enabled);

        info!(
            "AccessDecisionEngine initialized with abac={}, rbac={}, simple={}, cache={} (ttl {}s)",
            config.abac_enabled,
            config.rbac_enabled,
            config.simple.enabled,
            config.cache.enabled,
            config.cache.ttl_secs
        );

        Ok(AccessDecisionEngine {
            role_store: self.role_store.unwrap_or_else(|| Arc::new(InMemoryRoleStore::new())),
            policy_store: self.policy_store.unwrap_or_else(|| Arc::new(InMemoryPolicyStore::new())),
            resolver: PermissionResolver::new(),
            role_evaluator: RoleEvaluator::new(),
            policy_evaluator: PolicyEvaluator::new(),
            simple: SimplePermissionEvaluator::new(config.simple.clone()),
            conditions: ConditionEngine::new(config.conditions.clone()),
            decisions,
            grants,
            metrics: Arc::new(MetricsCollector::new()),
            audit: AuditHub::with_sinks(self.sinks),
            config,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Access decision engine
///
/// Shareable across tasks behind an `Arc`; every method takes `&self`.
pub struct AccessDecisionEngine {
    role_store: Arc<dyn RoleStore>,
    policy_store: Arc<dyn PolicyStore>,
    resolver: PermissionResolver,
    role_evaluator: RoleEvaluator,
    policy_evaluator: PolicyEvaluator,
    simple: SimplePermissionEvaluator,
    conditions: ConditionEngine,
    decisions: DecisionCache,
    grants: SubjectCache<SubjectGrants>,
    metrics: Arc<MetricsCollector>,
    audit: AuditHub,
    config: EngineConfig,
}

impl AccessDecisionEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Engine over in-memory stores
    pub fn new(config: EngineConfig) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn role_store(&self) -> &Arc<dyn RoleStore> {
        &self.role_store
    }

    pub fn policy_store(&self) -> &Arc<dyn PolicyStore> {
        &self.policy_store
    }

    /// Decide an access request
    ///
    /// Never fails: errors and panics inside evaluation produce a deny with
    /// reason "authorization system error".
    pub async fn check_permission(&self, request: &AccessRequest) -> AccessDecision {
        let start = Instant::now();

        let outcome = AssertUnwindSafe(self.decide(request)).catch_unwind().await;
        let decision = match outcome {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                error!(
                    "Access check for {} on {} failed: {}",
                    request.subject.user_id,
                    request.resource.qualified_id(),
                    e
                );
                self.metrics.record_error().await;
                AccessDecision::system_error(Strategy::None, e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    "Access check for {} on {} panicked: {}",
                    request.subject.user_id,
                    request.resource.qualified_id(),
                    message
                );
                self.metrics.record_error().await;
                AccessDecision::system_error(Strategy::None, format!("panic: {}", message))
            }
        };

        self.metrics.record_decision(&decision).await;
        self.metrics.record_latency(start.elapsed()).await;
        self.audit.emit(&AuditEvent::from_decision(request, &decision));

        decision
    }

    async fn decide(&self, request: &AccessRequest) -> Result<AccessDecision> {
        request.validate()?;

        let user_id = request.subject.user_id.as_str();
        let key = CacheKey::from_request(request);

        // Observed before any store read so a concurrent invalidation fences our write
        let observed = self.decisions.generation(user_id);

        if observed.is_some() {
            if let Some(cached) = self.decisions.get(&key, request) {
                debug!("Decision cache hit for {}", key);
                self.metrics.record_cache_hit().await;
                return Ok(self.conditions.apply(request, cached));
            }
            debug!("Decision cache miss for {}", key);
            self.metrics.record_cache_miss().await;
        }

        let (mut decision, inputs) = self.evaluate_strategy(request).await?;
        self.metrics.record_evaluation(decision.strategy).await;
        debug!(
            "Strategy {} decided {} for {}: {}",
            decision.strategy,
            if decision.granted { "grant" } else { "deny" },
            key,
            decision.reason
        );

        if decision.granted && self.decisions.is_active() {
            decision = decision.with_ttl(self.decisions.ttl());
        }

        let finalized = self.conditions.apply(request, decision.clone());

        // The pre-condition grant is cached; conditions re-run on every hit
        if finalized.granted {
            if let Some(observed) = observed {
                if !self.decisions.put(&key, &decision, inputs, observed) {
                    debug!("Decision for {} not cached (invalidated during evaluation)", key);
                }
            }
        }

        Ok(finalized)
    }

    /// Run exactly one strategy: ABAC when it has rules, then RBAC, then simple
    ///
    /// Also reports which request-supplied data the decision was derived from.
    async fn evaluate_strategy(&self, request: &AccessRequest) -> Result<(AccessDecision, DecisionInputs)> {
        let subject = &request.subject;

        if self.config.abac_enabled {
            let rules = self.policy_store.list_enabled().await?;
            if !rules.is_empty() {
                let grants = self.load_grants(&subject.user_id, &subject.roles).await?;
                let bags = AttributeBags::build(request, &grants.effective_roles);
                debug!("Evaluating {} ABAC rules for {}", rules.len(), subject.user_id);
                let decision = self.policy_evaluator.evaluate(request, &rules, &bags)?;
                return Ok((decision, abac_inputs(request, &rules)));
            }
        }

        if self.config.rbac_enabled {
            let grants = self.load_grants(&subject.user_id, &subject.roles).await?;
            let inputs = if grants.from_session {
                DecisionInputs::new().with_session_roles(request)
            } else {
                DecisionInputs::new()
            };
            return Ok((self.role_evaluator.evaluate(request, &grants), inputs));
        }

        if self.config.simple.enabled {
            let grants = self.load_grants(&subject.user_id, &subject.roles).await?;
            return Ok((self.simple.evaluate(request, &grants), self.simple.inputs(request)));
        }

        Err(AuthzError::Configuration(
            "no evaluation strategy enabled".to_string(),
        ))
    }

    /// Subject grants through the per-subject grants cache
    async fn load_grants(&self, user_id: &str, session_roles: &[String]) -> Result<SubjectGrants> {
        let key = format!("{}:{}", user_id, SubjectGrants::cache_key(session_roles));
        let observed = self.grants.generation(user_id);

        if observed.is_some() {
            if let Some(grants) = self.grants.get(user_id, &key) {
                return Ok(grants);
            }
        }

        let grants = SubjectGrants::load(self.role_store.as_ref(), &self.resolver, user_id, session_roles).await?;
        if let Some(observed) = observed {
            self.grants.put(user_id, &key, grants.clone(), observed);
        }
        Ok(grants)
    }

    /// Require `permission` on `user:<user_id>` from the acting subject
    async fn authorize_admin(
        &self,
        actor: Option<&AuthorizationContext>,
        user_id: &str,
        permission: &str,
    ) -> Result<()> {
        let Some(actor) = actor else {
            return Ok(());
        };

        let request = AccessRequest::new(actor.clone(), ResourceContext::new("user", user_id), permission);
        let decision = self.check_permission(&request).await;

        // Administrative changes cannot wait on a second factor
        if decision.granted && decision.conditions.is_empty() {
            return Ok(());
        }

        warn!(
            "{} denied {} on user:{}: {}",
            actor.user_id, permission, user_id, decision.reason
        );
        Err(AuthzError::PermissionDenied(format!(
            "{} may not {} on user:{}",
            actor.user_id, permission, user_id
        )))
    }

    /// Assign a role; the user's cached decisions are purged before returning
    pub async fn grant_role(&self, user_id: &str, role: &str, actor: Option<&AuthorizationContext>) -> Result<()> {
        self.authorize_admin(actor, user_id, MANAGE_ROLES_PERMISSION).await?;

        let added = self.role_store.assign_role(user_id, role).await?;
        self.invalidate_user(user_id)?;

        info!("Granted role '{}' to {} (new: {})", role, user_id, added);
        Ok(())
    }

    /// Remove a role assignment; the user's cached decisions are purged before returning
    pub async fn revoke_role(&self, user_id: &str, role: &str, actor: Option<&AuthorizationContext>) -> Result<()> {
        self.authorize_admin(actor, user_id, MANAGE_ROLES_PERMISSION).await?;

        let removed = self.role_store.unassign_role(user_id, role).await?;
        if !removed && self.role_store.get_role(role).await?.is_none() {
            return Err(AuthzError::RoleNotFound(role.to_string()));
        }
        self.invalidate_user(user_id)?;

        info!("Revoked role '{}' from {} (was held: {})", role, user_id, removed);
        Ok(())
    }

    /// Define or replace a role; every subject's caches are purged
    pub async fn define_role(&self, role: Role) -> Result<()> {
        let name = role.name.clone();
        self.role_store.put_role(role).await?;
        self.clear_caches()?;

        info!("Defined role '{}'", name);
        Ok(())
    }

    /// Define a batch of roles, parents before children
    pub async fn define_roles(&self, roles: Vec<Role>) -> Result<()> {
        for role in &roles {
            role.validate()?;
        }

        let order = RoleGraph::from_roles(&roles).resolve_order()?;
        let mut by_name: std::collections::HashMap<String, Role> =
            roles.into_iter().map(|r| (r.name.clone(), r)).collect();

        for name in order {
            if let Some(role) = by_name.remove(&name) {
                self.role_store.put_role(role).await?;
            }
        }
        self.clear_caches()?;

        info!("Defined role batch");
        Ok(())
    }

    /// Delete a role definition; every subject's caches are purged
    pub async fn remove_role(&self, name: &str) -> Result<()> {
        if !self.role_store.delete_role(name).await? {
            return Err(AuthzError::RoleNotFound(name.to_string()));
        }
        self.clear_caches()?;

        info!("Removed role '{}'", name);
        Ok(())
    }

    /// Add a direct grant; the user's cached decisions are purged before returning
    pub async fn grant_direct(
        &self,
        user_id: &str,
        grant: DirectGrant,
        actor: Option<&AuthorizationContext>,
    ) -> Result<()> {
        self.authorize_admin(actor, user_id, MANAGE_PERMISSIONS_PERMISSION).await?;

        let description = format!("{} on {}", grant.permission, grant.resource_type);
        self.role_store.add_direct_grant(user_id, grant).await?;
        self.invalidate_user(user_id)?;

        info!("Granted {} directly to {}", description, user_id);
        Ok(())
    }

    /// Remove a direct grant; returns whether it existed
    pub async fn revoke_direct(
        &self,
        user_id: &str,
        grant: &DirectGrant,
        actor: Option<&AuthorizationContext>,
    ) -> Result<bool> {
        self.authorize_admin(actor, user_id, MANAGE_PERMISSIONS_PERMISSION).await?;

        let removed = self.role_store.remove_direct_grant(user_id, grant).await?;
        self.invalidate_user(user_id)?;

        info!("Revoked direct grant {} from {} (existed: {})", grant.permission, user_id, removed);
        Ok(removed)
    }

    /// Insert or replace a policy rule; all cached decisions are purged
    pub async fn put_policy(&self, rule: PolicyRule) -> Result<()> {
        rule.validate(self.policy_evaluator.regex_cache())?;
        let id = rule.id.clone();
        self.policy_store.put(rule).await?;
        self.decisions.clear()?;

        info!("Stored policy '{}'", id);
        Ok(())
    }

    /// Remove a policy rule; all cached decisions are purged
    pub async fn remove_policy(&self, id: &str) -> Result<()> {
        if !self.policy_store.remove(id).await? {
            return Err(AuthzError::PolicyNotFound(id.to_string()));
        }
        self.decisions.clear()?;

        info!("Removed policy '{}'", id);
        Ok(())
    }

    /// Purge every cached decision and grant set of one user
    ///
    /// Grants go first: a check that observes the decision generation
    /// after the grants purge can only load fresh grants.
    pub fn invalidate_user(&self, user_id: &str) -> Result<()> {
        let grants = self.grants.invalidate(user_id);
        let decisions = self.decisions.invalidate(user_id);
        debug!("Invalidated caches for {}", user_id);
        grants.and(decisions)
    }

    fn clear_caches(&self) -> Result<()> {
        let grants = self.grants.clear();
        let decisions = self.decisions.clear();
        info!("Cleared decision and grants caches");
        grants.and(decisions)
    }

    /// Roles held by a user according to the store
    pub async fn get_user_roles(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self.load_grants(user_id, &[]).await?.role_names())
    }

    /// Role-derived permissions of a user, inheritance included
    pub async fn get_user_permissions(&self, user_id: &str) -> Result<BTreeSet<Permission>> {
        Ok(self.load_grants(user_id, &[]).await?.permissions())
    }

    /// Register an audit sink at runtime
    pub fn subscribe(&self, sink: Arc<dyn AuditSink>) {
        self.audit.subscribe(sink);
    }

    /// Stream audit events through a channel of `audit_channel_capacity`
    pub fn subscribe_channel(&self) -> (Arc<ChannelAuditSink>, mpsc::Receiver<AuditEvent>) {
        let (sink, rx) = ChannelAuditSink::new(self.config.audit_channel_capacity);
        let sink = Arc::new(sink);
        self.audit.subscribe(sink.clone());
        (sink, rx)
    }

    pub async fn metrics(&self) -> EngineMetrics {
        self.metrics.get_metrics().await
    }

    pub async fn export_prometheus(&self) -> String {
        self.metrics.export_prometheus().await
    }

    /// Decision cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.decisions.stats()
    }

    /// Whether a failed purge forced the decision cache out of service
    pub fn cache_bypassed(&self) -> bool {
        self.decisions.is_bypassed()
    }
}

/// Request data an ABAC decision depends on, from the bags its rules read
fn abac_inputs(request: &AccessRequest, rules: &[PolicyRule]) -> DecisionInputs {
    let usage = rules.iter().fold(ScopeUsage::default(), |mut usage, rule| {
        usage.merge(rule.scope_usage());
        usage
    });

    let mut inputs = DecisionInputs::new();
    // environment.risk_score folds in the subject's baseline
    if usage.subject || usage.environment {
        inputs = inputs.with_subject(request);
    }
    if usage.resource {
        inputs = inputs.with_resource(request);
    }
    if usage.environment {
        inputs = inputs.with_environment(request);
    }
    inputs
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
