//! ABAC rule evaluation
//!
//! Every enabled rule whose subject, resource and action patterns match and
//! whose condition holds is a candidate. Among candidates only the highest
//! priority tier counts; within that tier a deny beats any permit.

use super::attributes::AttributeBags;
use super::pattern::RegexCache;
use super::rule::{PolicyEffect, PolicyRule};
use crate::error::Result;
use crate::types::{AccessDecision, AccessRequest, DenyReason, Strategy};
use tracing::{debug, trace};

/// Reason given when ABAC is active but nothing matched
pub const NO_POLICY_REASON: &str = "no matching policy";

/// Attribute-based evaluator
#[derive(Debug, Clone, Default)]
pub struct PolicyEvaluator {
    regexes: RegexCache,
}

impl PolicyEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluator sharing an existing regex cache
    pub fn with_regex_cache(regexes: RegexCache) -> Self {
        Self { regexes }
    }

    pub fn regex_cache(&self) -> &RegexCache {
        &self.regexes
    }

    /// Decide a request against `rules`
    ///
    /// `rules` must be ordered by priority descending (see
    /// [`super::store::sort_rules`]); disabled rules are skipped.
    pub fn evaluate(
        &self,
        request: &AccessRequest,
        rules: &[PolicyRule],
        bags: &AttributeBags,
    ) -> Result<AccessDecision> {
        let mut tier: Option<i32> = None;
        let mut permit: Option<&PolicyRule> = None;

        for rule in rules.iter().filter(|r| r.enabled) {
            if tier.map_or(false, |top| rule.priority < top) {
                break;
            }
            if !self.rule_matches(rule, request, bags)? {
                continue;
            }

            trace!("ABAC: rule '{}' matched ({:?})", rule.id, rule.effect);
            tier = Some(rule.priority);

            match rule.effect {
                PolicyEffect::Deny => {
                    debug!("ABAC: denied by rule '{}'", rule.id);
                    return Ok(AccessDecision::deny(
                        Strategy::Abac,
                        format!("denied by policy {}", rule.id),
                        DenyReason::PolicyDenied {
                            rule_id: rule.id.clone(),
                        },
                    ));
                }
                PolicyEffect::Permit => {
                    permit.get_or_insert(rule);
                }
            }
        }

        Ok(match permit {
            Some(rule) => {
                debug!("ABAC: permitted by rule '{}'", rule.id);
                AccessDecision::grant(Strategy::Abac, format!("permitted by policy {}", rule.id))
            }
            None => AccessDecision::deny(Strategy::Abac, NO_POLICY_REASON, DenyReason::NoMatchingPolicy),
        })
    }

    fn rule_matches(&self, rule: &PolicyRule, request: &AccessRequest, bags: &AttributeBags) -> Result<bool> {
        if !rule
            .subject
            .matches(&request.subject.user_id, &bags.subject, &self.regexes)?
        {
            return Ok(false);
        }

        if !rule
            .resource
            .matches(&request.resource.qualified_id(), &bags.resource, &self.regexes)?
        {
            return Ok(false);
        }

        let action_matches = rule
            .action
            .matches(&request.action, &bags.environment, &self.regexes)?
            || rule
                .action
                .matches(&request.requested_permission(), &bags.environment, &self.regexes)?;
        if !action_matches {
            return Ok(false);
        }

        match &rule.condition {
            Some(condition) => condition.evaluate(bags, &self.regexes),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use crate::policy::condition::{Operator, PolicyCondition};
    use crate::policy::pattern::MatchPattern;
    use crate::policy::store::sort_rules;
    use crate::types::{AuthorizationContext, ResourceContext};

    fn request(user: &str, risk: u8) -> AccessRequest {
        AccessRequest::new(
            AuthorizationContext::new(user)
                .with_risk_score(risk)
                .with_attribute("department", "finance"),
            ResourceContext::new("report", "q3").with_attribute("department", "finance"),
            "read",
        )
    }

    fn decide(request: &AccessRequest, mut rules: Vec<PolicyRule>) -> Result<AccessDecision> {
        sort_rules(&mut rules);
        let bags = AttributeBags::build(request, &[]);
        PolicyEvaluator::new().evaluate(request, &rules, &bags)
    }

    fn same_department() -> PolicyCondition {
        PolicyCondition::compare_ref("subject.department", Operator::Eq, "resource.department")
    }

    // ========================================================================
    // Matching
    // ========================================================================

    #[test]
    fn test_permit_by_matching_rule() {
        let rules = vec![PolicyRule::permit("dept-read")
            .with_resource(MatchPattern::wildcard("report:*"))
            .with_action(MatchPattern::exact("read"))
            .with_condition(same_department())];

        let decision = decide(&request("alice", 10), rules).unwrap();
        assert!(decision.granted);
        assert_eq!(decision.reason, "permitted by policy dept-read");
        assert_eq!(decision.strategy, Strategy::Abac);
    }

    #[test]
    fn test_action_matches_qualified_permission() {
        let rules = vec![PolicyRule::permit("qualified").with_action(MatchPattern::exact("report:read"))];
        assert!(decide(&request("alice", 10), rules).unwrap().granted);
    }

    #[test]
    fn test_no_matching_policy() {
        let rules = vec![PolicyRule::permit("docs-only").with_resource(MatchPattern::wildcard("document:*"))];

        let decision = decide(&request("alice", 10), rules).unwrap();
        assert!(!decision.granted);
        assert_eq!(decision.reason, NO_POLICY_REASON);
        assert_eq!(decision.deny_reason, Some(DenyReason::NoMatchingPolicy));
    }

    #[test]
    fn test_disabled_rules_ignored() {
        let rules = vec![PolicyRule::permit("off").disabled()];
        assert!(!decide(&request("alice", 10), rules).unwrap().granted);
    }

    // ========================================================================
    // Precedence
    // ========================================================================

    #[test]
    fn test_deny_beats_permit_at_same_priority() {
        let rules = vec![
            PolicyRule::permit("allow-dept")
                .with_priority(5)
                .with_condition(same_department()),
            PolicyRule::deny("block-risky")
                .with_priority(5)
                .with_condition(PolicyCondition::compare("subject.risk_score", Operator::Gt, 60.0)),
        ];

        let decision = decide(&request("alice", 80), rules.clone()).unwrap();
        assert!(!decision.granted);
        assert_eq!(
            decision.deny_reason,
            Some(DenyReason::PolicyDenied {
                rule_id: "block-risky".to_string()
            })
        );

        assert!(decide(&request("alice", 20), rules).unwrap().granted);
    }

    #[test]
    fn test_higher_priority_permit_overrides_lower_deny() {
        let rules = vec![
            PolicyRule::deny("deny-all").with_priority(0),
            PolicyRule::permit("break-glass")
                .with_priority(100)
                .with_subject(MatchPattern::exact("oncall")),
        ];

        assert!(decide(&request("oncall", 10), rules.clone()).unwrap().granted);
        assert!(!decide(&request("alice", 10), rules).unwrap().granted);
    }

    #[test]
    fn test_evaluation_error_propagates() {
        let rules = vec![PolicyRule::permit("broken")
            .with_condition(PolicyCondition::compare("subject.department", Operator::Gt, 3.0))];

        assert!(matches!(
            decide(&request("alice", 10), rules),
            Err(AuthzError::Evaluation(_))
        ));
    }
}
