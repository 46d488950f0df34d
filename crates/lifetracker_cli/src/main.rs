//! `lifetracker` command-line entry point.
//!
//! # Responsibility
//! - Parse arguments, load configuration, and start logging.
//! - Dispatch sync, objective, habit-grid, auth, and settings commands.
//!
//! # Invariants
//! - The process exits non-zero when any requested sync source fails.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lifetracker_core::sync::{SyncSource, SyncWindow};
use lifetracker_core::LifeTrackerConfig;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "lifetracker", version, long_about = None)]
#[command(about = "Sync health and productivity data and track monthly objectives")]
struct Args {
    #[command(subcommand)]
    command: Command,
    #[arg(long, global = true, env = "LIFETRACKER_CONFIG", help = "TOML config file")]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_parser = clap::value_parser!(u32).range(1..=36_500),
        help = "Sync window in days (default 30)"
    )]
    days: Option<u32>,
    #[arg(long, global = true, help = "Sync the full provider history")]
    all: bool,
    #[arg(long, global = true, help = "Fetch and count records without writing them")]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Sync workouts from Whoop")]
    SyncWhoop,
    #[command(about = "Sync weigh-ins from Withings")]
    SyncWithings,
    #[command(about = "Sync time entries from Toggl")]
    SyncToggl,
    #[command(about = "Sync daily nutrition from Cronometer")]
    SyncCronometer,
    #[command(about = "Sync every source, or only the named ones")]
    SyncAll {
        #[arg(long, value_delimiter = ',', help = "Comma-separated sources to run")]
        only: Vec<String>,
    },
    #[command(about = "Recompute stored results for monthly objectives")]
    UpdateObjectives {
        #[arg(long)]
        objective_id: Option<i64>,
    },
    #[command(about = "Show objective progress for a month")]
    Objectives {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },
    #[command(about = "Show the yearly habit grid")]
    HabitGrid {
        #[arg(long)]
        year: Option<i32>,
    },
    #[command(about = "Print the Whoop authorization URL, or exchange --code for tokens")]
    WhoopAuth {
        #[arg(long)]
        code: Option<String>,
    },
    #[command(about = "Print the Withings authorization URL, or exchange --code for tokens")]
    WithingsAuth {
        #[arg(long)]
        code: Option<String>,
    },
    #[command(about = "Create or update a runtime setting")]
    SetSetting {
        key: String,
        value: String,
        #[arg(long, default_value = "")]
        description: String,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = Args::parse();
    let config = match args.config.as_deref() {
        Some(path) => LifeTrackerConfig::load(path)
            .with_context(|| format!("failed to load config `{}`", path.display()))?,
        None => LifeTrackerConfig::from_env(),
    };
    lifetracker_core::init_from_config(&config).context("failed to start logging")?;

    let window = SyncWindow::from_flags(args.days, args.all);
    let app = commands::App::open(config, window, args.dry_run)?;

    match args.command {
        Command::SyncWhoop => app.sync(&[SyncSource::Whoop]),
        Command::SyncWithings => app.sync(&[SyncSource::Withings]),
        Command::SyncToggl => app.sync(&[SyncSource::Toggl]),
        Command::SyncCronometer => app.sync(&[SyncSource::Cronometer]),
        Command::SyncAll { only } => {
            let sources = parse_sources(&only)?;
            app.sync(&sources)
        }
        Command::UpdateObjectives { objective_id } => app.update_objectives(objective_id),
        Command::Objectives { year, month } => app.objectives(year, month),
        Command::HabitGrid { year } => app.habit_grid(year),
        Command::WhoopAuth { code } => app.whoop_auth(code.as_deref()),
        Command::WithingsAuth { code } => app.withings_auth(code.as_deref()),
        Command::SetSetting {
            key,
            value,
            description,
        } => app.set_setting(&key, &value, &description),
    }
}

fn parse_sources(names: &[String]) -> Result<Vec<SyncSource>> {
    names
        .iter()
        .filter(|name| !name.trim().is_empty())
        .map(|name| {
            SyncSource::parse(name).with_context(|| {
                format!("unknown source `{name}`; expected whoop, withings, toggl, or cronometer")
            })
        })
        .collect()
}
