//! Decision metrics with Prometheus text export

use crate::types::{AccessDecision, Strategy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Engine metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Total number of access checks
    pub total_requests: u64,

    pub granted_decisions: u64,
    pub denied_decisions: u64,

    /// Grants that carry a condition (e.g. MFA)
    pub conditional_grants: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,

    /// Strategy evaluations actually run (cache misses that reached an evaluator)
    pub evaluations: u64,

    pub abac_decisions: u64,
    pub rbac_decisions: u64,
    pub simple_decisions: u64,

    /// Checks that failed closed
    pub error_count: u64,

    /// Latency percentiles
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,

    pub avg_latency_ms: f64,
}

impl EngineMetrics {
    /// Calculate cache hit rate
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Calculate grant rate
    pub fn grant_rate(&self) -> f64 {
        let total = self.granted_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.granted_decisions as f64 / total as f64
        }
    }
}

/// Metrics collector
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,

    /// Latency samples for percentile calculation
    latency_samples: Arc<RwLock<Vec<f64>>>,

    max_samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(10_000))),
            max_samples: 10_000,
        }
    }

    pub async fn record_cache_hit(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.cache_hits += 1;
    }

    pub async fn record_cache_miss(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.cache_misses += 1;
    }

    /// Record a strategy evaluation
    pub async fn record_evaluation(&self, strategy: Strategy) {
        let mut metrics = self.metrics.write().await;
        metrics.evaluations += 1;
        match strategy {
            Strategy::Abac => metrics.abac_decisions += 1,
            Strategy::Rbac => metrics.rbac_decisions += 1,
            Strategy::Simple => metrics.simple_decisions += 1,
            Strategy::None => {}
        }
    }

    /// Record a returned decision
    pub async fn record_decision(&self, decision: &AccessDecision) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;

        if decision.granted {
            metrics.granted_decisions += 1;
            if !decision.conditions.is_empty() {
                metrics.conditional_grants += 1;
            }
        } else {
            metrics.denied_decisions += 1;
        }
    }

    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);

        // Keep only recent samples
        if samples.len() > self.max_samples {
            samples.drain(0..1_000);
        }

        let mut metrics = self.metrics.write().await;

        let sum: f64 = samples.iter().sum();
        metrics.avg_latency_ms = sum / samples.len() as f64;

        let mut sorted = samples.clone();
        sorted.sort_by(f64::total_cmp);

        metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
        metrics.latency_p90_ms = Self::percentile(&sorted, 0.90);
        metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
    }

    pub async fn record_error(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.error_count += 1;
    }

    /// Get current metrics snapshot
    pub async fn get_metrics(&self) -> EngineMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset(&self) {
        let mut metrics = self.metrics.write().await;
        *metrics = EngineMetrics::default();

        let mut samples = self.latency_samples.write().await;
        samples.clear();
    }

    /// Export metrics in Prometheus format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.metrics.read().await;

        format!(
            r#"# HELP bastion_requests_total Total number of access checks
# TYPE bastion_requests_total counter
bastion_requests_total {}

# HELP bastion_decisions_total Decisions by outcome
# TYPE bastion_decisions_total counter
bastion_decisions_total{{outcome="granted"}} {}
bastion_decisions_total{{outcome="denied"}} {}
bastion_decisions_total{{outcome="conditional"}} {}

# HELP bastion_evaluations_total Strategy evaluations by strategy
# TYPE bastion_evaluations_total counter
bastion_evaluations_total{{strategy="abac"}} {}
bastion_evaluations_total{{strategy="rbac"}} {}
bastion_evaluations_total{{strategy="simple"}} {}

# HELP bastion_cache_hits_total Decision cache hits
# TYPE bastion_cache_hits_total counter
bastion_cache_hits_total {}

# HELP bastion_cache_misses_total Decision cache misses
# TYPE bastion_cache_misses_total counter
bastion_cache_misses_total {}

# HELP bastion_latency_seconds Check latency percentiles
# TYPE bastion_latency_seconds summary
bastion_latency_seconds{{quantile="0.5"}} {}
bastion_latency_seconds{{quantile="0.9"}} {}
bastion_latency_seconds{{quantile="0.99"}} {}

# HELP bastion_errors_total Checks that failed closed
# TYPE bastion_errors_total counter
bastion_errors_total {}
"#,
            metrics.total_requests,
            metrics.granted_decisions,
            metrics.denied_decisions,
            metrics.conditional_grants,
            metrics.abac_decisions,
            metrics.rbac_decisions,
            metrics.simple_decisions,
            metrics.cache_hits,
            metrics.cache_misses,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p90_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
            metrics.error_count,
        )
    }

    /// Percentile from sorted data
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        let idx = idx.min(sorted.len() - 1);
        sorted[idx]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccessCondition, ConditionType, DenyReason};

    #[tokio::test]
    async fn test_record_decision() {
        let collector = MetricsCollector::new();

        collector
            .record_decision(&AccessDecision::grant(Strategy::Rbac, "granted via role:viewer"))
            .await;
        collector
            .record_decision(&AccessDecision::deny(Strategy::Rbac, "no", DenyReason::NoMatchingGrant))
            .await;
        collector
            .record_decision(
                &AccessDecision::grant(Strategy::Abac, "permitted by policy p").with_condition(AccessCondition {
                    condition_type: ConditionType::Mfa,
                    requirement: "verify a second factor".to_string(),
                    expires_at: None,
                }),
            )
            .await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.granted_decisions, 2);
        assert_eq!(metrics.denied_decisions, 1);
        assert_eq!(metrics.conditional_grants, 1);
    }

    #[tokio::test]
    async fn test_record_evaluation_by_strategy() {
        let collector = MetricsCollector::new();

        collector.record_evaluation(Strategy::Abac).await;
        collector.record_evaluation(Strategy::Rbac).await;
        collector.record_evaluation(Strategy::Rbac).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.evaluations, 3);
        assert_eq!(metrics.abac_decisions, 1);
        assert_eq!(metrics.rbac_decisions, 2);
        assert_eq!(metrics.simple_decisions, 0);
    }

    #[tokio::test]
    async fn test_record_cache() {
        let collector = MetricsCollector::new();

        collector.record_cache_hit().await;
        collector.record_cache_hit().await;
        collector.record_cache_miss().await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.cache_hits, 2);
        assert_eq!(metrics.cache_misses, 1);
        assert!((metrics.cache_hit_rate() - 0.666).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_record_latency() {
        let collector = MetricsCollector::new();

        collector.record_latency(Duration::from_millis(5)).await;
        collector.record_latency(Duration::from_millis(10)).await;
        collector.record_latency(Duration::from_millis(15)).await;

        let metrics = collector.get_metrics().await;
        assert!((metrics.avg_latency_ms - 10.0).abs() < 1.0);
        assert!(metrics.latency_p50_ms > 0.0);
        assert!(metrics.latency_p99_ms >= metrics.latency_p50_ms);
    }

    #[tokio::test]
    async fn test_prometheus_export() {
        let collector = MetricsCollector::new();

        collector
            .record_decision(&AccessDecision::grant(Strategy::Simple, "granted via permission:document:read"))
            .await;
        collector.record_evaluation(Strategy::Simple).await;

        let prometheus = collector.export_prometheus().await;
        assert!(prometheus.contains("bastion_requests_total 1"));
        assert!(prometheus.contains(r#"bastion_decisions_total{outcome="granted"} 1"#));
        assert!(prometheus.contains(r#"bastion_evaluations_total{strategy="simple"} 1"#));
    }

    #[tokio::test]
    async fn test_reset() {
        let collector = MetricsCollector::new();

        collector.record_error().await;
        collector.record_cache_hit().await;
        collector.reset().await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.error_count, 0);
        assert_eq!(metrics.cache_hits, 0);
    }
}
