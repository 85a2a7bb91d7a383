use std::path::Path;

use flowerbot_core::config::{AppConfig, LoadOptions};
use flowerbot_db::connect_with_settings;
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

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
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

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 6 };

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
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_chat_channels(&config));
            checks.push(check_media_directory(&config.storage.media_dir));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped("chat_channels"));
            checks.push(DoctorCheck::skipped("media_directory"));
            checks.push(DoctorCheck::skipped("database_schema"));
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

fn check_chat_channels(config: &AppConfig) -> DoctorCheck {
    let announcements = config
        .chat
        .announcement_channel_id
        .as_deref()
        .map(|channel| format!("announcements go to `{channel}`"))
        .unwrap_or_else(|| "announcements go to the submitter's channel".to_string());
    DoctorCheck::pass(
        "chat_channels",
        format!(
            "review tickets go to `{}`; {announcements}",
            config.chat.moderation_channel_id
        ),
    )
}

fn check_media_directory(media_dir: &Path) -> DoctorCheck {
    if !media_dir.exists() {
        return DoctorCheck::pass(
            "media_directory",
            format!("`{}` will be created on server start", media_dir.display()),
        );
    }

    match std::fs::metadata(media_dir) {
        Ok(metadata) if !metadata.is_dir() => DoctorCheck::fail(
            "media_directory",
            format!("`{}` exists but is not a directory", media_dir.display()),
        ),
        Ok(metadata) if metadata.permissions().readonly() => DoctorCheck::fail(
            "media_directory",
            format!("`{}` is read-only", media_dir.display()),
        ),
        Ok(_) => DoctorCheck::pass("media_directory", format!("`{}` is writable", media_dir.display())),
        Err(error) => DoctorCheck::fail(
            "media_directory",
            format!("could not inspect `{}`: {error}", media_dir.display()),
        ),
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(
                "database_schema",
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'flower_submission'",
        )
        .fetch_one(&pool)
        .await
        .map_err(|error| format!("failed to inspect schema: {error}"))?;
        pool.close().await;
        Ok::<bool, String>(tables == 1)
    });

    match result {
        Ok(true) => DoctorCheck::pass(
            "database_schema",
            format!("connected using `{}`; submission table present", config.database.url),
        ),
        Ok(false) => DoctorCheck::fail(
            "database_schema",
            "submission table missing; run `flowerbot migrate`",
        ),
        Err(error) => DoctorCheck::fail("database_schema", error),
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
