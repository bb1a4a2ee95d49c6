use catalogbot_core::config::{AppConfig, LoadOptions};
use catalogbot_db::{connect_with_config, ping};
use serde::Serialize;

use crate::commands::{escape_json, CommandResult};

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

impl DoctorCheck {
    fn from_result(name: &'static str, result: Result<String, String>) -> Self {
        match result {
            Ok(details) => Self { name, status: CheckStatus::Pass, details },
            Err(details) => Self { name, status: CheckStatus::Fail, details },
        }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Exit code 1 when any check fails.
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
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            },
            DoctorCheck::from_result(
                "whatsapp_credentials",
                config
                    .whatsapp
                    .require_credentials()
                    .map(|()| format!("phone number id {}", config.whatsapp.phone_number_id))
                    .map_err(|error| error.to_string()),
            ),
            DoctorCheck::from_result(
                "llm_credentials",
                config
                    .llm
                    .require_credentials()
                    .map(|()| {
                        format!(
                            "{} via {} (model {})",
                            config.llm.provider.as_str(),
                            config.llm.effective_base_url(),
                            config.llm.model
                        )
                    })
                    .map_err(|error| error.to_string()),
            ),
            DoctorCheck::from_result("database_connectivity", check_database(&config)),
        ],
        Err(error) => vec![
            DoctorCheck { name: "config_validation", status: CheckStatus::Fail, details: error.to_string() },
            DoctorCheck::skipped("whatsapp_credentials"),
            DoctorCheck::skipped("llm_credentials"),
            DoctorCheck::skipped("database_connectivity"),
        ],
    };

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_database(config: &AppConfig) -> Result<String, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to initialize async runtime: {error}"))?;

    runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let probe = ping(&pool).await.map_err(|error| format!("database did not answer: {error}"));
        pool.close().await;
        probe.map(|()| format!("connected using `{}`", config.database.url))
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

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
