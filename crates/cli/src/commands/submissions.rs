use flowerbot_core::config::{AppConfig, LoadOptions};
use flowerbot_core::domain::submission::SubmissionRecord;
use flowerbot_db::{connect_with_settings, SqlSubmissionRepository, SubmissionRepository};
use serde::Serialize;

use crate::commands::{runtime, CommandResult};

pub const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Serialize)]
struct SubmissionListing {
    command: &'static str,
    status: &'static str,
    count: usize,
    pending_review: usize,
    submissions: Vec<SubmissionRecord>,
}

/// Lists the most recently updated submissions, newest first.
pub fn run(limit: u32) -> CommandResult {
    if limit == 0 || limit > MAX_LIMIT {
        return CommandResult::failure(
            "submissions",
            "invalid_argument",
            format!("--limit must be in range 1..={MAX_LIMIT}"),
            2,
        );
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "submissions",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match runtime("submissions") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let records = SqlSubmissionRepository::new(pool.clone())
            .list_recent(limit)
            .await
            .map_err(|error| ("query", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<Vec<SubmissionRecord>, (&'static str, String, u8)>(records)
    });

    match result {
        Ok(submissions) => {
            let listing = SubmissionListing {
                command: "submissions",
                status: "ok",
                count: submissions.len(),
                pending_review: submissions
                    .iter()
                    .filter(|record| record.website && !record.approved)
                    .count(),
                submissions,
            };
            match serde_json::to_string(&listing) {
                Ok(output) => CommandResult { exit_code: 0, output },
                Err(error) => {
                    CommandResult::failure("submissions", "serialization", error.to_string(), 7)
                }
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("submissions", error_class, message, exit_code)
        }
    }
}
