//! # CI Repo Map CLI (`cimap`)
//!
//! Runs the CI discovery and ticket report jobs.
//!
//! ## Usage
//!
//! ```bash
//! cimap --config ./config/cimap.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cimap discover` | Scan the organization, consolidate with the spreadsheet, publish |
//! | `cimap merge` | Re-run consolidation from the raw JSON on disk (offline) |
//! | `cimap report` | Build the change/incident ticket report for the date window |
//! | `cimap window` | Print the report window for the current trigger |
//!
//! ## Environment
//!
//! | Variable | Used by |
//! |----------|---------|
//! | `GITHUB_TOKEN` | `discover`, `report` |
//! | `GITHUB_ORG` | `discover`, `report` (overrides `github.org`) |
//! | `COMMIT_REPO` | `discover`, `report --publish` (`owner/name`) |
//! | `GITHUB_EVENT_NAME` | `report`, `window` |
//! | `FROM_DATE`, `TO_DATE` | `report`, `window` on manual runs |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

use ci_repo_map::config::{self, JobEnv};
use ci_repo_map::github::GitHubClient;
use ci_repo_map::window::{self, Trigger};
use ci_repo_map::{discover, logging, report};

/// Maps CI numbers to repositories and reports change tickets per CI.
///
/// All settings have defaults; `--config` points to a TOML file overriding
/// them. See `config/cimap.example.toml`.
#[derive(Parser)]
#[command(name = "cimap", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan metadata files, consolidate with the spreadsheet, and commit
    /// the outputs.
    Discover {
        /// Write outputs locally without committing them.
        #[arg(long)]
        no_publish: bool,
    },

    /// Consolidate the raw map on disk with the spreadsheet (no network).
    Merge,

    /// Build the ticket report for the resolved date window.
    Report {
        /// Also commit the report workbook to `COMMIT_REPO`.
        #[arg(long)]
        publish: bool,
    },

    /// Print the resolved report window and exit.
    Window,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    logging::init_tracing(cli.log_json, level);

    let env = JobEnv::from_env();
    let cfg = config::load_config(cli.config.as_deref(), &env)?;

    match cli.command {
        Commands::Discover { no_publish } => {
            let token = env.require_token()?;
            cfg.require_org()?;
            let commit_repo = if no_publish {
                None
            } else {
                Some(cfg.require_commit_repo()?)
            };
            let client = GitHubClient::new(&cfg.github, token)?;
            let summary = discover::run_discover(&cfg, &client, commit_repo)?;
            discover::print_discovery_summary(&summary);
        }
        Commands::Merge => {
            let outcome = discover::run_merge(&cfg)?;
            discover::print_merge_summary(&outcome);
        }
        Commands::Report { publish } => {
            let token = env.require_token()?;
            cfg.require_org()?;
            let commit_repo = if publish {
                Some(cfg.require_commit_repo()?)
            } else {
                None
            };
            let tz = cfg.report.tz()?;
            let window = window::window_from_env(&env, &tz)?;
            let client = GitHubClient::new(&cfg.github, token)?;
            let summary = report::run_report(&cfg, &client, window, commit_repo)?;
            report::print_report_summary(&summary);
        }
        Commands::Window => {
            let tz = cfg.report.tz()?;
            let trigger = Trigger::from_event_name(env.event_name.as_deref())?;
            let window = window::window_from_env(&env, &tz)?;
            println!("trigger: {:?}", trigger);
            println!("from:    {}", window.from);
            println!("to:      {}", window.to);
        }
    }

    Ok(())
}
