//! oncall-rotation: trigger-side entry point.
//!
//! Opens the configured rotation database and prints JSON for an external
//! scheduler to act on. Logging goes to stderr and is controlled with
//! `RUST_LOG`.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;

use oncall_rotation::error::{ErrorReport, RotationError};
use oncall_rotation::reminder;
use oncall_rotation::services::resolver;
use oncall_rotation::state::{load_config, load_config_from, AppState};
use oncall_rotation::week::WeekKey;

/// Weekly on-call rotation: reminder digest and schedule queries
#[derive(Parser, Debug)]
#[command(name = "oncall-rotation")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.oncall-rotation/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// This week and next week, plus whether a missed reminder is still due
    Digest,

    /// Resolve upcoming weeks starting with the current one
    Schedule {
        /// Number of weeks to resolve
        #[arg(default_value_t = 6, value_parser = clap::value_parser!(u64).range(1..=12))]
        weeks: u64,
    },

    /// Next reminder firing time for the stored schedule
    NextRun,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            let report = ErrorReport::from(&e);
            match serde_json::to_string_pretty(&report) {
                Ok(body) => eprintln!("{}", body),
                Err(_) => eprintln!("{}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<String, RotationError> {
    let config = match cli.config {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    };
    let state = AppState::open(config)?;
    let now = Utc::now();

    let value = match cli.command {
        Command::Digest => state.with_db(|db| {
            let digest = reminder::weekly_digest(db, now)?;
            let missed_reminder_due = reminder::missed_reminder_due(db, now)?;
            Ok(json!({ "digest": digest, "missedReminderDue": missed_reminder_due }))
        })?,
        Command::Schedule { weeks } => state.with_db(|db| {
            let schedule = resolver::upcoming_schedule(db, WeekKey::current(), weeks as usize)?;
            Ok(json!({ "schedule": schedule }))
        })?,
        Command::NextRun => state.with_db(|db| {
            let schedule = reminder::load_schedule(db)?;
            Ok(json!({
                "cron": schedule.cron_expression(),
                "timezone": schedule.timezone.name(),
                "nextRun": schedule.next_run_after(now)?.to_rfc3339(),
            }))
        })?,
    };

    serde_json::to_string_pretty(&value)
        .map_err(|e| RotationError::Configuration(format!("Failed to render output: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("oncall-rotation").chain(args.iter().copied()))
    }

    #[test]
    fn test_schedule_defaults_to_six_weeks() {
        let cli = parse(&["schedule"]).unwrap();
        assert_eq!(cli.command, Command::Schedule { weeks: 6 });
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_schedule_rejects_out_of_range_counts() {
        assert_eq!(parse(&["schedule", "12"]).unwrap().command, Command::Schedule { weeks: 12 });
        assert!(parse(&["schedule", "0"]).is_err());
        assert!(parse(&["schedule", "99"]).is_err());
        assert!(parse(&["schedule", "many"]).is_err());
    }

    #[test]
    fn test_config_flag_and_subcommands() {
        let cli = parse(&["--config", "/etc/oncall.json", "next-run"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/oncall.json")));
        assert_eq!(cli.command, Command::NextRun);
        assert_eq!(parse(&["digest"]).unwrap().command, Command::Digest);

        assert!(parse(&["--config"]).is_err());
        assert!(parse(&[]).is_err());
        assert!(parse(&["rotate"]).is_err());
    }
}
