//! Decision cache
//!
//! Keys are `user_id:resource_type:resource_id:action`. Only grants are
//! stored; denials are always recomputed. Each entry records the
//! request-supplied data the grant was derived from and is only served to
//! requests that carry the same data.

use super::memory::MemoryCache;
use super::subject::SubjectCache;
use super::{CacheBackend, CacheConfig, CacheStats, Generation};
use crate::error::Result;
use crate::types::{AccessDecision, AccessRequest, AuthorizationContext, Environment, ResourceContext};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Cache key for one (subject, resource, action) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
}

impl CacheKey {
    pub fn from_request(request: &AccessRequest) -> Self {
        Self {
            user_id: request.subject.user_id.clone(),
            resource_type: request.resource.resource_type.clone(),
            resource_id: request.resource.id.clone(),
            action: request.action.clone(),
        }
    }

    /// Backend key with `%` and `:` escaped inside each part
    ///
    /// Identical to the display form unless a part contains a separator.
    pub fn storage_key(&self) -> String {
        [&self.user_id, &self.resource_type, &self.resource_id, &self.action]
            .iter()
            .map(|part| escape(part))
            .collect::<Vec<_>>()
            .join(":")
    }
}

fn escape(part: &str) -> String {
    if !part.contains(|c: char| c == ':' || c == '%') {
        return part.to_string();
    }
    part.replace('%', "%25").replace(':', "%3A")
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.user_id, self.resource_type, self.resource_id, self.action
        )
    }
}

/// Request-supplied data a grant was derived from
///
/// Store state is covered by invalidation; everything the caller put into
/// the request is recorded here instead. Empty means the grant follows from
/// the cache key and the stores alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecisionInputs {
    session_roles: Option<Vec<String>>,
    session_permissions: Option<Vec<String>>,
    owner: Option<Option<String>>,
    subject: Option<AuthorizationContext>,
    resource: Option<ResourceContext>,
    environment: Option<Environment>,
}

impl DecisionInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_roles(mut self, request: &AccessRequest) -> Self {
        self.session_roles = Some(request.subject.roles.clone());
        self
    }

    pub fn with_session_permissions(mut self, request: &AccessRequest) -> Self {
        self.session_permissions = Some(request.subject.permissions.clone());
        self
    }

    pub fn with_owner(mut self, request: &AccessRequest) -> Self {
        self.owner = Some(request.resource.owner_id.clone());
        self
    }

    /// The whole subject context
    pub fn with_subject(mut self, request: &AccessRequest) -> Self {
        self.subject = Some(request.subject.clone());
        self
    }

    /// The whole resource context
    pub fn with_resource(mut self, request: &AccessRequest) -> Self {
        self.resource = Some(request.resource.clone());
        self
    }

    /// The whole environment, timestamp included
    pub fn with_environment(mut self, request: &AccessRequest) -> Self {
        self.environment = Some(request.environment.clone());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether `request` carries the recorded values
    pub fn matches(&self, request: &AccessRequest) -> bool {
        fn same<T: PartialEq>(recorded: &Option<T>, current: &T) -> bool {
            recorded.as_ref().map_or(true, |recorded| recorded == current)
        }

        same(&self.session_roles, &request.subject.roles)
            && same(&self.session_permissions, &request.subject.permissions)
            && same(&self.owner, &request.resource.owner_id)
            && same(&self.subject, &request.subject)
            && same(&self.resource, &request.resource)
            && same(&self.environment, &request.environment)
    }
}

/// A cached grant and the request data it depends on
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDecision {
    pub decision: AccessDecision,
    pub inputs: DecisionInputs,
}

/// Positive-decision cache
pub struct DecisionCache {
    inner: SubjectCache<CachedDecision>,
}

impl DecisionCache {
    /// In-memory decision cache
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let backend: Arc<MemoryCache<CachedDecision>> = Arc::new(MemoryCache::new(config.capacity)?);
        Ok(Self::with_backend(backend, config))
    }

    /// Decision cache over a caller-supplied backend
    pub fn with_backend(backend: Arc<dyn CacheBackend<CachedDecision>>, config: &CacheConfig) -> Self {
        Self {
            inner: SubjectCache::new("decision", backend, config.ttl(), config.enabled),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn is_bypassed(&self) -> bool {
        self.inner.is_bypassed()
    }

    pub fn generation(&self, user_id: &str) -> Option<Generation> {
        self.inner.generation(user_id)
    }

    /// Cached grant for `request`, if one was derived from the same inputs
    pub fn get(&self, key: &CacheKey, request: &AccessRequest) -> Option<AccessDecision> {
        let cached = self.inner.get(&key.user_id, &key.storage_key())?;
        if !cached.inputs.matches(request) {
            debug!("Cached grant for {} was derived from different request data", key);
            return None;
        }
        Some(cached.decision)
    }

    /// Store a grant; denials are ignored
    pub fn put(&self, key: &CacheKey, decision: &AccessDecision, inputs: DecisionInputs, observed: Generation) -> bool {
        if !decision.granted {
            return false;
        }
        let cached = CachedDecision {
            decision: decision.clone(),
            inputs,
        };
        let stored = self.inner.put(&key.user_id, &key.storage_key(), cached, observed);
        trace!("Decision cache put {} stored={}", key, stored);
        stored
    }

    pub fn invalidate(&self, user_id: &str) -> Result<()> {
        self.inner.invalidate(user_id)
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}
