pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "flowerbot",
    about = "Flowerbot operator CLI",
    long_about = "Operate the flower submission bot: migrations, config inspection, readiness checks, and recent submissions.",
    after_help = "Examples:\n  flowerbot doctor --json\n  flowerbot config\n  flowerbot submissions --limit 5"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, channel settings, media directory, and database schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List the most recent submissions as JSON")]
    Submissions {
        #[arg(long, default_value_t = commands::submissions::DEFAULT_LIMIT)]
        limit: u32,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Submissions { limit } => commands::submissions::run(limit),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
