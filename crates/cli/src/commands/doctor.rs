use rxroute_core::config::{AppConfig, LoadOptions, RoutingMode};
use rxroute_db::{connect_with_config, migrations};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

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
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_routing_readiness(&config));
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "routing_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_routing_readiness(config: &AppConfig) -> DoctorCheck {
    match config.routing.mode {
        RoutingMode::Local => DoctorCheck {
            name: "routing_readiness",
            status: CheckStatus::Pass,
            details: format!(
                "in-process routing against the catalog database (timeout {}ms)",
                config.routing.timeout_ms
            ),
        },
        RoutingMode::Remote => {
            let endpoint = config.routing.remote_url.as_deref().unwrap_or_default();
            let has_key = config
                .routing
                .api_key
                .as_ref()
                .map(|key| !key.expose_secret().trim().is_empty())
                .unwrap_or(false);
            if endpoint.is_empty() || !has_key {
                return DoctorCheck {
                    name: "routing_readiness",
                    status: CheckStatus::Fail,
                    details: "remote routing needs routing.remote_url and routing.api_key"
                        .to_string(),
                };
            }
            DoctorCheck {
                name: "routing_readiness",
                status: CheckStatus::Pass,
                details: format!("remote routing via `{endpoint}` with an api key configured"),
            }
        }
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        let version = migrations::current_version(&pool)
            .await
            .map_err(|error| format!("failed to read schema version: {error}"));
        pool.close().await;
        version
    });

    match result {
        Ok(version) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: match version {
                Some(version) => {
                    format!("connected using `{}` (schema version {version})", config.database.url)
                }
                None => format!("connected using `{}` (no migrations applied)", config.database.url),
            },
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
