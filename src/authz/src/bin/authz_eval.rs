//! # Access decision fixture runner
//!
//! Loads a JSON fixture (roles, assignments, direct grants, policies and
//! requests), builds an engine and prints one JSON decision per request.
//!
//! ```text
//! authz-eval <fixture.json> [--config <engine.json>]
//! ```
//!
//! ## Configuration
//!
//! Engine config comes from `--config`, else the fixture's `config` field,
//! else defaults; `BASTION_*` environment variables are applied on top.
//! - `RUST_LOG` - Log level (default: info); logs go to stderr
//! - `BASTION_AUDIT_LOG` - set to `1` to log every decision under the `audit` target

use anyhow::{bail, Context};
use bastion_authz::{
    AccessDecisionEngine, AccessRequest, DirectGrant, EngineConfig, PolicyRule, Role, TracingAuditSink,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixture {
    config: Option<EngineConfig>,
    roles: Vec<Role>,
    assignments: BTreeMap<String, Vec<String>>,
    direct_grants: BTreeMap<String, Vec<DirectGrant>>,
    policies: Vec<PolicyRule>,
    requests: Vec<AccessRequest>,
}

#[derive(Debug, Serialize)]
struct Outcome<'a> {
    index: usize,
    user_id: &'a str,
    resource: String,
    action: &'a str,
    decision: bastion_authz::AccessDecision,
}

struct Args {
    fixture: PathBuf,
    config: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut fixture = None;
    let mut config = None;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("usage: authz-eval <fixture.json> [--config <engine.json>]");
                std::process::exit(0);
            }
            other if fixture.is_none() => fixture = Some(PathBuf::from(other)),
            other => bail!("unexpected argument '{}'", other),
        }
    }

    Ok(Args {
        fixture: fixture.context("missing fixture path")?,
        config,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args()?;

    let raw = std::fs::read_to_string(&args.fixture)
        .with_context(|| format!("reading fixture {}", args.fixture.display()))?;
    let fixture: Fixture = serde_json::from_str(&raw)
        .with_context(|| format!("parsing fixture {}", args.fixture.display()))?;

    let base = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => fixture.config.clone().unwrap_or_default(),
    };
    let config = base
        .with_env_overrides(|name| std::env::var(name).ok())
        .context("applying BASTION_* overrides")?;

    let mut builder = AccessDecisionEngine::builder(config);
    if std::env::var("BASTION_AUDIT_LOG").map_or(false, |v| v == "1") {
        builder = builder.audit_sink(Arc::new(TracingAuditSink));
    }
    let engine = builder.build().context("building engine")?;

    engine
        .define_roles(fixture.roles)
        .await
        .context("defining roles")?;
    for (user_id, roles) in &fixture.assignments {
        for role in roles {
            engine
                .grant_role(user_id, role, None)
                .await
                .with_context(|| format!("granting {} to {}", role, user_id))?;
        }
    }
    for (user_id, grants) in fixture.direct_grants {
        for grant in grants {
            engine
                .grant_direct(&user_id, grant, None)
                .await
                .with_context(|| format!("granting direct permission to {}", user_id))?;
        }
    }
    for rule in fixture.policies {
        let id = rule.id.clone();
        engine
            .put_policy(rule)
            .await
            .with_context(|| format!("storing policy {}", id))?;
    }

    info!("Evaluating {} requests from {}", fixture.requests.len(), args.fixture.display());

    for (index, request) in fixture.requests.iter().enumerate() {
        let decision = engine.check_permission(request).await;
        let outcome = Outcome {
            index,
            user_id: &request.subject.user_id,
            resource: request.resource.qualified_id(),
            action: &request.action,
            decision,
        };
        println!("{}", serde_json::to_string(&outcome)?);
    }

    let metrics = engine.metrics().await;
    info!(
        "Done: {} requests, {} granted, {} denied, {} errors",
        metrics.total_requests, metrics.granted_decisions, metrics.denied_decisions, metrics.error_count
    );

    Ok(())
}
