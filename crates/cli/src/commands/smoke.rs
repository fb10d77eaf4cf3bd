use std::time::Instant;

use anyhow::{ensure, Context};
use chrono::Utc;
use gitslack_core::config::{AppConfig, LoadOptions};
use gitslack_db::mapper::{Entity, EntityType, EntityTypeBuilder, FieldDescriptor};
use gitslack_db::models::counters;
use gitslack_db::{connect_with_config, Collection, Model, StoreHandle};
use serde::Serialize;

use crate::commands::{
    check_runtime, escape_json, CheckStatus, CommandResult, EXIT_CHECK_FAILED,
    EXIT_CONFIG_INVALID, EXIT_OK,
};

const SCENARIO_STEPS: [&str; 5] = [
    "schema_validation",
    "entity_roundtrip",
    "index_lookup",
    "commit_counters",
    "collection_cleanup",
];

const PROBE_LOGIN: &str = "smoke";
const PROBE_EMAIL: &str = "smoke@gitslack.invalid";
const PROBE_EMAIL_RENAMED: &str = "smoke+renamed@gitslack.invalid";

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: CheckStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: CheckStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

/// Throwaway entity type living under its own prefix, so cleanup never touches real data.
struct SmokeProbe {
    entity: Entity,
}

impl Model for SmokeProbe {
    type Args = ();

    fn schema() -> EntityTypeBuilder {
        counters::with_commit_counters(
            EntityType::builder("SmokeProbe")
                .field("login", FieldDescriptor::text().primary())
                .field("email", FieldDescriptor::text().indexed()),
        )
    }

    fn from_entity(entity: Entity, _args: Self::Args) -> Self {
        Self { entity }
    }

    fn entity(&self) -> &Entity {
        &self.entity
    }
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("store_connectivity"));
            checks.extend(SCENARIO_STEPS.into_iter().map(skipped));
            return finalize_report(checks, elapsed_since(started), EXIT_CONFIG_INVALID);
        }
    };

    let runtime = match check_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "store_connectivity",
                status: CheckStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.extend(SCENARIO_STEPS.into_iter().map(skipped));
            return finalize_report(checks, elapsed_since(started), EXIT_CHECK_FAILED);
        }
    };

    let store_started = Instant::now();
    let store = match runtime.block_on(connect_with_config(&config.store)) {
        Ok(store) => {
            checks.push(SmokeCheck {
                name: "store_connectivity",
                status: CheckStatus::Pass,
                elapsed_ms: elapsed_since(store_started),
                message: format!("connected using `{}`", config.store.url),
            });
            store
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "store_connectivity",
                status: CheckStatus::Fail,
                elapsed_ms: elapsed_since(store_started),
                message: format!("failed to connect: {error}"),
            });
            checks.extend(SCENARIO_STEPS.into_iter().map(skipped));
            return finalize_report(checks, elapsed_since(started), EXIT_CHECK_FAILED);
        }
    };

    runtime.block_on(run_scenario(store, &mut checks));

    let overall = CheckStatus::overall(checks.iter().map(|check| check.status));
    let exit_code = if overall == CheckStatus::Fail { EXIT_CHECK_FAILED } else { EXIT_OK };
    finalize_report(checks, elapsed_since(started), exit_code)
}

async fn run_scenario(store: StoreHandle, checks: &mut Vec<SmokeCheck>) {
    let started = Instant::now();
    let schema = Collection::<SmokeProbe>::new(store)
        .map(|probes| (probes, "probe schema validated".to_string()))
        .map_err(anyhow::Error::from);
    let Some(probes) = record(checks, "schema_validation", started, schema) else {
        return skip_after(checks, "schema_validation");
    };

    let started = Instant::now();
    let roundtrip = entity_roundtrip(&probes).await;
    let Some(probe) = record(checks, "entity_roundtrip", started, roundtrip) else {
        return skip_after(checks, "entity_roundtrip");
    };

    let started = Instant::now();
    let lookup = index_lookup(&probes, &probe).await;
    if record(checks, "index_lookup", started, lookup).is_none() {
        return skip_after(checks, "index_lookup");
    }

    let started = Instant::now();
    let counted = commit_counters(&probe).await;
    if record(checks, "commit_counters", started, counted).is_none() {
        return skip_after(checks, "commit_counters");
    }

    let started = Instant::now();
    let cleanup = collection_cleanup(&probes).await;
    record(checks, "collection_cleanup", started, cleanup);
}

async fn entity_roundtrip(
    probes: &Collection<SmokeProbe>,
) -> anyhow::Result<(SmokeProbe, String)> {
    let probe = probes.load(PROBE_LOGIN, ()).await.context("loading probe entity")?;
    probe.entity().set("email", PROBE_EMAIL).await.context("writing probe email")?;

    let login: Option<String> = probe.entity().get_as("login").await?;
    ensure!(login.as_deref() == Some(PROBE_LOGIN), "primary field read back as {login:?}");
    let email: Option<String> = probe.entity().get_as("email").await?;
    ensure!(email.as_deref() == Some(PROBE_EMAIL), "email read back as {email:?}");

    let identity = probe.entity().identity().to_string();
    Ok((probe, format!("wrote and read back `{identity}`")))
}

async fn index_lookup(
    probes: &Collection<SmokeProbe>,
    probe: &SmokeProbe,
) -> anyhow::Result<((), String)> {
    let found = probes.find_by("email", PROBE_EMAIL, ()).await?;
    ensure!(
        found.as_ref().map(SmokeProbe::entity) == Some(probe.entity()),
        "email index did not resolve to the probe"
    );

    probe.entity().set("email", PROBE_EMAIL_RENAMED).await.context("renaming probe email")?;
    ensure!(
        probes.find_by("email", PROBE_EMAIL, ()).await?.is_none(),
        "old email still resolves after rename"
    );
    ensure!(
        probes.find_by("email", PROBE_EMAIL_RENAMED, ()).await?.is_some(),
        "renamed email does not resolve"
    );

    Ok(((), "index entry followed the email change".to_string()))
}

async fn commit_counters(probe: &SmokeProbe) -> anyhow::Result<((), String)> {
    let now = Utc::now();
    counters::update_commits(probe.entity(), 2, now).await?;
    counters::update_commits(probe.entity(), 1, now).await?;

    let stats = counters::commit_stats(probe.entity()).await?;
    ensure!(stats.total == 3 && stats.daily == 3, "unexpected counters {stats:?}");
    ensure!(stats.days == 1, "same-day updates counted {} days", stats.days);

    Ok(((), format!("counted {} commits over {} day", stats.total, stats.days)))
}

async fn collection_cleanup(probes: &Collection<SmokeProbe>) -> anyhow::Result<((), String)> {
    let deleted = probes.delete_all().await?;
    ensure!(probes.enumerate(()).await?.is_empty(), "probe entities left after delete_all");
    ensure!(probes.index("email")?.is_empty().await?, "probe index entries left after delete_all");

    Ok(((), format!("deleted {deleted} probe entities and their index entries")))
}

fn record<T>(
    checks: &mut Vec<SmokeCheck>,
    name: &'static str,
    started: Instant,
    result: anyhow::Result<(T, String)>,
) -> Option<T> {
    let elapsed_ms = elapsed_since(started);
    match result {
        Ok((value, message)) => {
            checks.push(SmokeCheck { name, status: CheckStatus::Pass, elapsed_ms, message });
            Some(value)
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name,
                status: CheckStatus::Fail,
                elapsed_ms,
                message: format!("{error:#}"),
            });
            None
        }
    }
}

fn skip_after(checks: &mut Vec<SmokeCheck>, failed_step: &str) {
    let remaining = SCENARIO_STEPS.iter().skip_while(|step| **step != failed_step).skip(1);
    checks.extend(remaining.copied().map(skipped));
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed_since(started), value)),
        Err(error) => Err((elapsed_since(started), error)),
    }
}

fn elapsed_since(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: CheckStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(
    checks: Vec<SmokeCheck>,
    total_elapsed_ms: u64,
    exit_code: u8,
) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == CheckStatus::Pass).count();
    let total = checks.len();
    let status = CheckStatus::overall(checks.iter().map(|check| check.status));

    let report = SmokeReport {
        command: "smoke",
        status,
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            escape_json(&error.to_string())
        )
    });

    CommandResult { exit_code, output: format!("{human}\n{machine}") }
}
