//! Access decision engine integration tests
//!
//! End-to-end scenarios through `check_permission` and the mutation API:
//! strategy cascade, RBAC and ABAC outcomes, conditions, cache behavior
//! and fail-closed handling.

mod common;

use bastion_authz::conditions::{DeviceRule, LocationRule, TimeWindowRule};
use bastion_authz::policy::Operator;
use bastion_authz::{
    AccessDecisionEngine, AuthorizationContext, AuthzError, Classification, ConditionPolicy, ConditionType,
    DenyReason, DirectGrant, EngineConfig, Environment, MatchPattern, MemoryAuditSink, PolicyCondition,
    PolicyRule, ResourceContext, Role, Strategy,
};
use chrono::{NaiveTime, TimeZone, Utc};
use common::{read_doc, request, CountingPolicyStore, Fault, FaultyRoleStore};
use proptest::prelude::*;
use std::sync::Arc;

/// alice holds viewer in the store; carol is only known through her session
async fn session_engine(cache_enabled: bool) -> AccessDecisionEngine {
    let mut config = EngineConfig::default();
    config.cache.enabled = cache_enabled;
    let engine = AccessDecisionEngine::new(config).unwrap();
    engine
        .define_role(Role::new("viewer", ["doc:read"]).unwrap())
        .await
        .unwrap();
    engine
        .define_role(Role::new("editor", ["doc:*"]).unwrap())
        .await
        .unwrap();
    engine.grant_role("alice", "viewer", None).await.unwrap();
    engine
}

async fn viewer_engine(config: EngineConfig) -> AccessDecisionEngine {
    let engine = AccessDecisionEngine::new(config).unwrap();
    engine
        .define_role(Role::new("viewer", ["document:read"]).unwrap())
        .await
        .unwrap();
    engine
}

// ============================================================================
// RBAC
// ============================================================================

#[tokio::test]
async fn test_viewer_scenario() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();

    let read = engine.check_permission(&read_doc("alice")).await;
    assert!(read.granted);
    assert_eq!(read.reason, "granted via role:viewer");
    assert_eq!(read.strategy, Strategy::Rbac);

    let write = engine
        .check_permission(&request("alice", "document", "doc1", "write"))
        .await;
    assert!(!write.granted);
    assert_eq!(write.reason, "no matching role or direct permission");
    assert_eq!(write.deny_reason, Some(DenyReason::NoMatchingGrant));
}

#[tokio::test]
async fn test_inherited_and_qualified_permissions() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine
        .define_role(Role::new("editor", ["document:write"]).unwrap().with_parent("viewer"))
        .await
        .unwrap();
    engine.grant_role("alice", "editor", None).await.unwrap();

    // Inherited permission is attributed to the held role
    let read = engine.check_permission(&read_doc("alice")).await;
    assert!(read.granted);
    assert_eq!(read.reason, "granted via role:editor");

    // A qualified action is used as-is
    let qualified = engine
        .check_permission(&request("alice", "document", "doc1", "document:write"))
        .await;
    assert!(qualified.granted);
}

#[tokio::test]
async fn test_direct_grant_checked_before_roles() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();

    let grant = DirectGrant::new("document", Some("doc1".to_string()), "document:read").unwrap();
    engine.grant_direct("alice", grant.clone(), None).await.unwrap();

    let decision = engine.check_permission(&read_doc("alice")).await;
    assert_eq!(decision.reason, "granted via direct grant");

    // Other documents still go through the role
    let other = engine
        .check_permission(&request("alice", "document", "doc2", "read"))
        .await;
    assert_eq!(other.reason, "granted via role:viewer");

    assert!(engine.revoke_direct("alice", &grant, None).await.unwrap());
    let after = engine.check_permission(&read_doc("alice")).await;
    assert_eq!(after.reason, "granted via role:viewer");
}

#[tokio::test]
async fn test_store_assignments_override_session_roles() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine
        .define_role(Role::new("admin", ["*"]).unwrap())
        .await
        .unwrap();
    engine.grant_role("alice", "viewer", None).await.unwrap();

    // The session claims admin but the store only knows viewer
    let mut req = request("alice", "document", "doc1", "delete");
    req.subject = AuthorizationContext::new("alice").with_role("admin");
    assert!(!engine.check_permission(&req).await.granted);

    // Users the store has never seen fall back to their session roles
    let mut guest = request("guest", "document", "doc1", "read");
    guest.subject = AuthorizationContext::new("guest").with_role("viewer");
    assert!(engine.check_permission(&guest).await.granted);
}

// ============================================================================
// REVOCATION AND INVALIDATION
// ============================================================================

#[tokio::test]
async fn test_revocation_is_immediate() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();

    assert!(engine.check_permission(&read_doc("alice")).await.granted);
    assert!(engine.check_permission(&read_doc("alice")).await.granted);
    assert_eq!(engine.cache_stats().hits, 1);

    engine.revoke_role("alice", "viewer", None).await.unwrap();

    let after = engine.check_permission(&read_doc("alice")).await;
    assert!(!after.granted);
    assert!(engine.get_user_roles("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_role_redefinition_purges_every_subject() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();
    engine.grant_role("bob", "viewer", None).await.unwrap();

    assert!(engine.check_permission(&read_doc("alice")).await.granted);
    assert!(engine.check_permission(&read_doc("bob")).await.granted);

    engine
        .define_role(Role::new("viewer", ["report:read"]).unwrap())
        .await
        .unwrap();

    assert!(!engine.check_permission(&read_doc("alice")).await.granted);
    assert!(!engine.check_permission(&read_doc("bob")).await.granted);
}

#[tokio::test]
async fn test_invalidate_user_only_touches_that_user() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();
    engine.grant_role("bob", "viewer", None).await.unwrap();

    engine.check_permission(&read_doc("alice")).await;
    engine.check_permission(&read_doc("bob")).await;
    assert_eq!(engine.cache_stats().entries, 2);

    engine.invalidate_user("alice").unwrap();
    assert_eq!(engine.cache_stats().entries, 1);
}

// ============================================================================
// NON-CACHING OF DENIALS
// ============================================================================

#[tokio::test]
async fn test_denials_are_never_cached() {
    let store = Arc::new(CountingPolicyStore::new());
    let engine = AccessDecisionEngine::builder(EngineConfig::default())
        .policy_store(store.clone())
        .build()
        .unwrap();
    engine
        .define_role(Role::new("viewer", ["document:read"]).unwrap())
        .await
        .unwrap();
    engine.grant_role("alice", "viewer", None).await.unwrap();

    // Every denial re-runs strategy selection
    assert!(!engine.check_permission(&read_doc("bob")).await.granted);
    assert!(!engine.check_permission(&read_doc("bob")).await.granted);
    assert_eq!(store.lists(), 2);

    // A grant is evaluated once and then served from cache
    assert!(engine.check_permission(&read_doc("alice")).await.granted);
    assert!(engine.check_permission(&read_doc("alice")).await.granted);
    assert_eq!(store.lists(), 3);

    let metrics = engine.metrics().await;
    assert_eq!(metrics.evaluations, 3);
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(engine.cache_stats().entries, 1);
}

#[tokio::test]
async fn test_condition_denial_is_not_cached() {
    let config = EngineConfig {
        conditions: ConditionPolicy::default().with_location(LocationRule::allow(["US"])),
        ..EngineConfig::default()
    };
    let engine = viewer_engine(config).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();

    let abroad = read_doc("alice").with_environment(Environment::now().with_location("FR"));
    let denied = engine.check_permission(&abroad).await;
    assert!(!denied.granted);
    assert_eq!(denied.reason, "location not permitted");
    assert_eq!(engine.cache_stats().entries, 0);

    // Allow-list comparison ignores case
    let home = read_doc("alice").with_environment(Environment::now().with_location("us"));
    assert!(engine.check_permission(&home).await.granted);
}

// ============================================================================
// CACHE HIT AND MISS AGREE
// ============================================================================

#[tokio::test]
async fn test_separators_in_resource_parts_do_not_share_entries() {
    let engine = AccessDecisionEngine::new(EngineConfig::default()).unwrap();
    engine
        .define_role(Role::new("viewer", ["doc:read"]).unwrap())
        .await
        .unwrap();
    engine.grant_role("alice", "viewer", None).await.unwrap();

    assert!(engine.check_permission(&request("alice", "doc", "a:b", "read")).await.granted);

    // Displays as the same key but asks for doc:a:read
    let other = engine.check_permission(&request("alice", "doc:a", "b", "read")).await;
    assert!(!other.granted);
    assert_eq!(engine.cache_stats().hits, 0);
}

#[tokio::test]
async fn test_cached_grant_follows_session_roles() {
    let engine = viewer_engine(EngineConfig::default()).await;

    // carol is unknown to the store, so her session roles decide
    let mut with_viewer = read_doc("carol");
    with_viewer.subject = AuthorizationContext::new("carol").with_role("viewer");

    assert!(engine.check_permission(&with_viewer).await.granted);
    assert!(engine.check_permission(&with_viewer).await.granted);
    assert_eq!(engine.cache_stats().hits, 1);

    let dropped = engine.check_permission(&read_doc("carol")).await;
    assert!(!dropped.granted);
    assert_eq!(dropped.reason, "no matching role or direct permission");

    assert!(engine.check_permission(&with_viewer).await.granted);
}

#[tokio::test]
async fn test_cached_simple_grant_follows_request_data() {
    let mut config = EngineConfig::default();
    config.abac_enabled = false;
    config.rbac_enabled = false;
    config.simple.owner_bypass = true;
    let engine = AccessDecisionEngine::new(config).unwrap();

    let mut permitted = request("alice", "document", "doc1", "write");
    permitted.subject = AuthorizationContext::new("alice").with_permission("document:write");
    assert!(engine.check_permission(&permitted).await.granted);
    assert!(engine.check_permission(&permitted).await.granted);

    let bare = request("alice", "document", "doc1", "write");
    assert!(!engine.check_permission(&bare).await.granted);

    let mut owned = bare.clone();
    owned.resource = ResourceContext::new("document", "doc1").with_owner("alice");
    let by_owner = engine.check_permission(&owned).await;
    assert!(by_owner.granted);
    assert_eq!(by_owner.reason, "granted via resource ownership");

    let mut foreign = bare.clone();
    foreign.resource = ResourceContext::new("document", "doc1").with_owner("bob");
    assert!(!engine.check_permission(&foreign).await.granted);
}

#[tokio::test]
async fn test_cached_abac_grant_follows_attributes() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine
        .put_policy(PolicyRule::permit("low-class-only").with_condition(PolicyCondition::compare(
            "resource.classification_level",
            Operator::Lte,
            1.0,
        )))
        .await
        .unwrap();

    let mut internal = read_doc("alice");
    internal.resource = ResourceContext::new("document", "doc1").with_classification(Classification::Internal);
    assert!(engine.check_permission(&internal).await.granted);
    assert!(engine.check_permission(&internal).await.granted);
    assert_eq!(engine.cache_stats().hits, 1);

    let mut restricted = read_doc("alice");
    restricted.resource = ResourceContext::new("document", "doc1").with_classification(Classification::Restricted);
    assert!(!engine.check_permission(&restricted).await.granted);
}

#[tokio::test]
async fn test_attribute_free_abac_grant_is_shared() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine
        .put_policy(PolicyRule::permit("docs").with_resource(MatchPattern::wildcard("document:*")))
        .await
        .unwrap();

    let mut first = read_doc("alice");
    first.subject = AuthorizationContext::new("alice").with_risk_score(10);
    let mut second = read_doc("alice");
    second.subject = AuthorizationContext::new("alice").with_risk_score(20);

    assert!(engine.check_permission(&first).await.granted);
    assert!(engine.check_permission(&second).await.granted);
    assert_eq!(engine.cache_stats().hits, 1);
}

// ============================================================================
// ABAC
// ============================================================================

#[tokio::test]
async fn test_abac_deny_wins_within_tier() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine
        .put_policy(
            PolicyRule::permit("allow-docs")
                .with_resource(MatchPattern::wildcard("document:*"))
                .with_action(MatchPattern::exact("read"))
                .with_priority(10),
        )
        .await
        .unwrap();
    engine
        .put_policy(
            PolicyRule::deny("block-mallory")
                .with_subject(MatchPattern::exact("mallory"))
                .with_priority(10),
        )
        .await
        .unwrap();

    let alice = engine.check_permission(&read_doc("alice")).await;
    assert!(alice.granted);
    assert_eq!(alice.reason, "permitted by policy allow-docs");
    assert_eq!(alice.strategy, Strategy::Abac);

    let mallory = engine.check_permission(&read_doc("mallory")).await;
    assert!(!mallory.granted);
    assert_eq!(mallory.reason, "denied by policy block-mallory");
    assert_eq!(
        mallory.deny_reason,
        Some(DenyReason::PolicyDenied {
            rule_id: "block-mallory".to_string()
        })
    );

    // A higher tier overrides the lower-tier deny
    engine
        .put_policy(
            PolicyRule::permit("mallory-exception")
                .with_subject(MatchPattern::exact("mallory"))
                .with_priority(20),
        )
        .await
        .unwrap();
    let excepted = engine.check_permission(&read_doc("mallory")).await;
    assert!(excepted.granted);
    assert_eq!(excepted.reason, "permitted by policy mallory-exception");
}

#[tokio::test]
async fn test_abac_no_matching_policy() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();
    engine
        .put_policy(PolicyRule::permit("reports-only").with_resource(MatchPattern::wildcard("report:*")))
        .await
        .unwrap();

    // ABAC decides alone once a rule exists; RBAC is not consulted
    let decision = engine.check_permission(&read_doc("alice")).await;
    assert!(!decision.granted);
    assert_eq!(decision.reason, "no matching policy");
    assert_eq!(decision.deny_reason, Some(DenyReason::NoMatchingPolicy));
}

#[tokio::test]
async fn test_abac_conditions_over_attributes() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();
    engine
        .put_policy(
            PolicyRule::permit("owner-or-viewer-low-class")
                .with_condition(PolicyCondition::Any(vec![
                    PolicyCondition::compare_ref("resource.owner", Operator::Eq, "subject.id"),
                    PolicyCondition::All(vec![
                        PolicyCondition::compare("subject.roles", Operator::Contains, "viewer"),
                        PolicyCondition::compare("resource.classification_level", Operator::Lte, 1.0),
                    ]),
                ])),
        )
        .await
        .unwrap();

    let mut internal = read_doc("alice");
    internal.resource = ResourceContext::new("document", "doc1").with_classification(Classification::Internal);
    assert!(engine.check_permission(&internal).await.granted);

    let mut secret = read_doc("alice");
    secret.resource = ResourceContext::new("document", "doc2").with_classification(Classification::Restricted);
    assert!(!engine.check_permission(&secret).await.granted);

    let mut owned = read_doc("carol");
    owned.resource = ResourceContext::new("document", "doc1")
        .with_owner("carol")
        .with_classification(Classification::Restricted);
    assert!(engine.check_permission(&owned).await.granted);
}

#[tokio::test]
async fn test_policy_removal_restores_rbac() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();
    engine
        .put_policy(PolicyRule::deny("lockdown").with_priority(100))
        .await
        .unwrap();

    assert!(!engine.check_permission(&read_doc("alice")).await.granted);

    engine.remove_policy("lockdown").await.unwrap();
    let decision = engine.check_permission(&read_doc("alice")).await;
    assert!(decision.granted);
    assert_eq!(decision.strategy, Strategy::Rbac);
}

// ============================================================================
// STRATEGY CASCADE
// ============================================================================

#[tokio::test]
async fn test_strategy_cascade() {
    // ABAC enabled but without rules: RBAC decides
    let engine = viewer_engine(EngineConfig::default()).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();
    assert_eq!(engine.check_permission(&read_doc("alice")).await.strategy, Strategy::Rbac);

    // ABAC disabled: rules are ignored
    let config = EngineConfig {
        abac_enabled: false,
        ..EngineConfig::default()
    };
    let engine = viewer_engine(config).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();
    engine.put_policy(PolicyRule::deny("everything")).await.unwrap();
    let decision = engine.check_permission(&read_doc("alice")).await;
    assert!(decision.granted);
    assert_eq!(decision.strategy, Strategy::Rbac);

    // RBAC disabled and no rules: flat permission list
    let config = EngineConfig {
        rbac_enabled: false,
        ..EngineConfig::default()
    };
    let engine = viewer_engine(config).await;
    let mut req = read_doc("alice");
    req.subject = AuthorizationContext::new("alice").with_permission("document:read");
    let decision = engine.check_permission(&req).await;
    assert!(decision.granted);
    assert_eq!(decision.strategy, Strategy::Simple);
    assert_eq!(decision.reason, "granted via permission:document:read");
}

// ============================================================================
// CONDITIONS
// ============================================================================

#[tokio::test]
async fn test_high_risk_grant_requires_mfa() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();

    let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
    let mut risky = read_doc("alice").with_environment(Environment::at(at));
    risky.subject = AuthorizationContext::new("alice").with_risk_score(85);

    let decision = engine.check_permission(&risky).await;
    assert!(decision.granted);
    assert!(decision.has_condition(ConditionType::Mfa));
    let mfa = &decision.conditions[0];
    assert_eq!(mfa.expires_at, Some(at + chrono::Duration::seconds(300)));

    // Verified sessions pass without a new challenge
    let verified = risky
        .clone()
        .with_environment(Environment::at(at).with_mfa_verified(true));
    assert!(engine.check_permission(&verified).await.conditions.is_empty());

    // The threshold itself does not trigger MFA
    let mut boundary = read_doc("alice");
    boundary.subject = AuthorizationContext::new("alice").with_risk_score(70);
    assert!(engine.check_permission(&boundary).await.conditions.is_empty());
}

#[tokio::test]
async fn test_time_window_applies_to_cached_grants() {
    let window = TimeWindowRule::new(
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
    );
    let config = EngineConfig {
        conditions: ConditionPolicy::default().with_time_window(window),
        ..EngineConfig::default()
    };
    let engine = viewer_engine(config).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();

    let office = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
    let night = Utc.with_ymd_and_hms(2024, 3, 4, 23, 0, 0).unwrap();

    assert!(engine
        .check_permission(&read_doc("alice").with_environment(Environment::at(office)))
        .await
        .granted);

    // Served from cache, yet still vetoed by the clock
    let late = engine
        .check_permission(&read_doc("alice").with_environment(Environment::at(night)))
        .await;
    assert!(!late.granted);
    assert_eq!(late.reason, "access outside permitted time window");
    assert_eq!(engine.cache_stats().hits, 1);
}

#[tokio::test]
async fn test_untrusted_device_on_restricted_resource() {
    let config = EngineConfig {
        conditions: ConditionPolicy::default()
            .with_device(DeviceRule::trusting(["laptop-1"]).scoped_to(Classification::Confidential)),
        ..EngineConfig::default()
    };
    let engine = viewer_engine(config).await;
    engine.grant_role("alice", "viewer", None).await.unwrap();

    let mut restricted = read_doc("alice");
    restricted.resource = ResourceContext::new("document", "doc1").with_classification(Classification::Restricted);
    restricted.subject = AuthorizationContext::new("alice").with_device("phone-9");
    let decision = engine.check_permission(&restricted).await;
    assert!(!decision.granted);
    assert_eq!(decision.reason, "untrusted device");

    // Below the scoped classification the rule does not apply
    let mut internal = restricted.clone();
    internal.resource = ResourceContext::new("document", "doc2");
    assert!(engine.check_permission(&internal).await.granted);
}

// ============================================================================
// ADMINISTRATIVE CHECKS
// ============================================================================

#[tokio::test]
async fn test_grant_role_requires_manage_roles() {
    let engine = viewer_engine(EngineConfig::default()).await;
    engine
        .define_role(Role::new("user-admin", ["user:manage_roles"]).unwrap())
        .await
        .unwrap();
    engine.grant_role("root", "user-admin", None).await.unwrap();

    let root = AuthorizationContext::new("root");
    engine.grant_role("alice", "viewer", Some(&root)).await.unwrap();
    assert_eq!(engine.get_user_roles("alice").await.unwrap(), vec!["viewer".to_string()]);

    let bob = AuthorizationContext::new("bob");
    assert!(matches!(
        engine.revoke_role("alice", "viewer", Some(&bob)).await,
        Err(AuthzError::PermissionDenied(_))
    ));
    assert_eq!(engine.get_user_roles("alice").await.unwrap(), vec!["viewer".to_string()]);

    // A grant that still needs MFA does not authorize an admin change
    let risky_root = AuthorizationContext::new("root").with_risk_score(95);
    assert!(matches!(
        engine.revoke_role("alice", "viewer", Some(&risky_root)).await,
        Err(AuthzError::PermissionDenied(_))
    ));

    // Direct grants need their own permission
    let grant = DirectGrant::new("document", None, "document:write").unwrap();
    assert!(matches!(
        engine.grant_direct("alice", grant, Some(&root)).await,
        Err(AuthzError::PermissionDenied(_))
    ));
}

// ============================================================================
// FAIL-CLOSED
// ============================================================================

#[tokio::test]
async fn test_store_failure_denies_and_audits() {
    let store = Arc::new(FaultyRoleStore::new());
    let sink = Arc::new(MemoryAuditSink::new());
    let engine = AccessDecisionEngine::builder(EngineConfig::default())
        .role_store(store.clone())
        .audit_sink(sink.clone())
        .build()
        .unwrap();
    engine
        .define_role(Role::new("viewer", ["document:read"]).unwrap())
        .await
        .unwrap();
    engine.grant_role("alice", "viewer", None).await.unwrap();

    store.set_fault(Fault::Error);
    let decision = engine.check_permission(&read_doc("alice")).await;
    assert!(!decision.granted);
    assert_eq!(decision.reason, "authorization system error");
    assert!(matches!(decision.deny_reason, Some(DenyReason::SystemError { .. })));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert!(!events[0].granted);
    assert_eq!(events[0].reason, "authorization system error");

    store.set_fault(Fault::None);
    assert!(engine.check_permission(&read_doc("alice")).await.granted);
    assert_eq!(engine.metrics().await.error_count, 1);
}

#[tokio::test]
async fn test_panic_in_store_fails_closed() {
    let store = Arc::new(FaultyRoleStore::new());
    let engine = AccessDecisionEngine::builder(EngineConfig::default())
        .role_store(store.clone())
        .build()
        .unwrap();

    store.set_fault(Fault::Panic);
    let decision = engine.check_permission(&read_doc("alice")).await;
    assert!(!decision.granted);
    assert_eq!(decision.reason, "authorization system error");

    // The engine keeps serving afterwards
    store.set_fault(Fault::None);
    let after = engine.check_permission(&read_doc("alice")).await;
    assert_eq!(after.reason, "no matching role or direct permission");
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_wildcard_respects_segment_boundary(action in "[a-z]{1,10}") {
        tokio_test::block_on(async {
            let engine = AccessDecisionEngine::new(EngineConfig::default()).unwrap();
            engine.define_role(Role::new("editor", ["document:*"]).unwrap()).await.unwrap();
            engine.grant_role("alice", "editor", None).await.unwrap();

            let inside = engine.check_permission(&request("alice", "document", "d", &action)).await;
            prop_assert!(inside.granted);

            let outside = engine.check_permission(&request("alice", "documents", "d", &action)).await;
            prop_assert!(!outside.granted);
            Ok(())
        })?;
    }

    #[test]
    fn prop_cached_and_uncached_engines_agree(
        requests in prop::collection::vec(
            (
                prop::sample::select(vec!["alice", "carol"]),
                prop::sample::select(vec!["doc", "doc:a"]),
                prop::sample::select(vec!["b", "a:b"]),
                prop::sample::subsequence(vec!["viewer", "editor"], 0..=2),
            ),
            1..12,
        ),
    ) {
        tokio_test::block_on(async {
            let cached = session_engine(true).await;
            let uncached = session_engine(false).await;

            for (user, resource_type, resource_id, roles) in &requests {
                let mut req = request(user, resource_type, resource_id, "read");
                req.subject = roles
                    .iter()
                    .fold(AuthorizationContext::new(*user), |ctx, role| ctx.with_role(*role));

                let hit_or_miss = cached.check_permission(&req).await;
                let fresh = uncached.check_permission(&req).await;
                prop_assert_eq!(hit_or_miss.granted, fresh.granted);
                prop_assert_eq!(&hit_or_miss.reason, &fresh.reason);
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_decisions_are_deterministic(
        user in prop::sample::select(vec!["alice", "bob", "carol"]),
        action in prop::sample::select(vec!["read", "write", "delete"]),
        risk in 0u8..=100,
        cache_enabled in any::<bool>(),
    ) {
        tokio_test::block_on(async {
            let mut config = EngineConfig::default();
            config.cache.enabled = cache_enabled;
            let engine = viewer_engine(config).await;
            engine.define_role(Role::new("editor", ["document:write"]).unwrap().with_parent("viewer")).await.unwrap();
            engine.grant_role("alice", "editor", None).await.unwrap();
            engine.grant_role("bob", "viewer", None).await.unwrap();

            let mut req = request(user, "document", "doc1", action);
            req.subject = AuthorizationContext::new(user).with_risk_score(risk);

            let first = engine.check_permission(&req).await;
            let second = engine.check_permission(&req).await;

            prop_assert_eq!(first.granted, second.granted);
            prop_assert_eq!(&first.reason, &second.reason);
            prop_assert_eq!(first.has_condition(ConditionType::Mfa), second.has_condition(ConditionType::Mfa));
            prop_assert_eq!(first.has_condition(ConditionType::Mfa), first.granted && risk > 70);
            Ok(())
        })?;
    }
}
