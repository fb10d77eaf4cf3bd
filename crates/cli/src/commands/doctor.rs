use gitslack_core::config::{AppConfig, LoadOptions};
use gitslack_db::{connect_with_config, StoreError};
use serde::Serialize;

use crate::commands::{
    check_runtime, escape_json, CheckStatus, CommandResult, EXIT_CHECK_FAILED,
    EXIT_CONFIG_INVALID, EXIT_OK,
};

const PROBE_KEY: &str = "gitslack:doctor:probe";

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let (report, exit_code) = build_report();

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report() -> (DoctorReport, u8) {
    let mut checks = Vec::new();
    let mut exit_code = EXIT_OK;

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_slack_token(&config));

            let store = check_store_connectivity(&config);
            if store.status == CheckStatus::Fail {
                exit_code = EXIT_CHECK_FAILED;
            }
            checks.push(store);
        }
        Err(error) => {
            exit_code = EXIT_CONFIG_INVALID;
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "slack_token_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "store_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let overall_status = CheckStatus::overall(checks.iter().map(|check| check.status));
    let summary = if overall_status == CheckStatus::Fail {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    (DoctorReport { overall_status, summary, checks }, exit_code)
}

fn check_slack_token(config: &AppConfig) -> DoctorCheck {
    match config.slack.bot_token {
        Some(_) => DoctorCheck {
            name: "slack_token_readiness",
            status: CheckStatus::Pass,
            details: "bot token format validated by config contract".to_string(),
        },
        None => DoctorCheck {
            name: "slack_token_readiness",
            status: CheckStatus::Skipped,
            details: "no bot token configured; Slack directory refresh is unavailable".to_string(),
        },
    }
}

fn check_store_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match check_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "store_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let store = connect_with_config(&config.store).await?;
        store.set(PROBE_KEY, "ok").await?;
        let echoed = store.get(PROBE_KEY).await?;
        store.del(&[PROBE_KEY.to_string()]).await?;
        Ok::<bool, StoreError>(echoed.as_deref() == Some("ok"))
    });

    match result {
        Ok(true) => DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Pass,
            details: format!("round-tripped a probe key using `{}`", config.store.url),
        },
        Ok(false) => DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Fail,
            details: "probe key did not read back".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Fail,
            details: format!("failed to use store: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        lines.push(format!("- [{}] {}: {}", check.status.marker(), check.name, check.details));
    }

    lines.join("\n")
}
