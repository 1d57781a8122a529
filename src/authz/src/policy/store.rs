//! Policy rule storage

use super::pattern::RegexCache;
use super::rule::PolicyRule;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Policy store trait
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Get a rule by ID
    async fn get(&self, id: &str) -> Result<Option<PolicyRule>>;

    /// Insert or replace a rule
    async fn put(&self, rule: PolicyRule) -> Result<()>;

    /// Remove a rule; returns whether it existed
    async fn remove(&self, id: &str) -> Result<bool>;

    /// List all rules
    async fn list(&self) -> Result<Vec<PolicyRule>>;

    /// Enabled rules ordered by priority (descending), then id
    async fn list_enabled(&self) -> Result<Vec<PolicyRule>> {
        let mut rules: Vec<PolicyRule> = self.list().await?.into_iter().filter(|r| r.enabled).collect();
        sort_rules(&mut rules);
        Ok(rules)
    }
}

/// Evaluation order: highest priority first, ties broken by id
pub fn sort_rules(rules: &mut [PolicyRule]) {
    rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
}

/// In-memory policy store implementation
pub struct InMemoryPolicyStore {
    rules: Arc<RwLock<HashMap<String, PolicyRule>>>,
    regexes: RegexCache,
}

impl InMemoryPolicyStore {
    /// Create a new in-memory policy store
    pub fn new() -> Self {
        Self {
            rules: Arc::new(RwLock::new(HashMap::new())),
            regexes: RegexCache::new(),
        }
    }

    /// Store seeded with rules; fails on the first invalid one
    pub async fn with_rules(rules: impl IntoIterator<Item = PolicyRule>) -> Result<Self> {
        let store = Self::new();
        for rule in rules {
            store.put(rule).await?;
        }
        Ok(store)
    }
}

impl Default for InMemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get(&self, id: &str) -> Result<Option<PolicyRule>> {
        let rules = self.rules.read().await;
        Ok(rules.get(id).cloned())
    }

    async fn put(&self, rule: PolicyRule) -> Result<()> {
        rule.validate(&self.regexes)?;
        let mut rules = self.rules.write().await;
        rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut rules = self.rules.write().await;
        Ok(rules.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<PolicyRule>> {
        let rules = self.rules.read().await;
        Ok(rules.values().cloned().collect())
    }
}
