//! autodeploy — poll a git remote and redeploy the application when it moves.
//!
//! # Usage
//!
//! ```text
//! autodeploy [run] [--json]
//! autodeploy check
//! autodeploy status [--json]
//! autodeploy config
//! autodeploy logs [--lines N]
//!
//! global: --config PATH --work-dir DIR --branch NAME --process-name NAME --log-file PATH
//! ```
//!
//! Meant to be invoked by an external scheduler (cron, systemd timer). Each
//! invocation is one pass; the exit status is 0 unless the run aborted on a
//! dirty working copy or failed.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use autodeploy_core::{config, AgentConfig};
use commands::{logs::LogsArgs, run::RunArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "autodeploy",
    version,
    about = "Keep a deployed working copy in sync with its git remote",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check for updates and deploy them (default).
    Run(RunArgs),

    /// Report whether the remote has new commits, without changing anything.
    /// Exits 10 when an update is available.
    Check,

    /// List local changes and preserved stashes in the working copy.
    Status(StatusArgs),

    /// Print the effective configuration as YAML.
    Config,

    /// Print the tail of the agent log.
    Logs(LogsArgs),
}

/// Overrides applied on top of the config file and environment.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Config file (default: $AUTODEPLOY_CONFIG, then ~/.autodeploy/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Working copy to deploy.
    #[arg(long, global = true, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Branch to track.
    #[arg(long, global = true)]
    pub branch: Option<String>,

    /// Name of the supervised process.
    #[arg(long, global = true)]
    pub process_name: Option<String>,

    /// Agent log file.
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl GlobalArgs {
    /// Defaults < file < environment < flags, then validate.
    pub fn load_config(&self) -> Result<AgentConfig> {
        let mut config =
            config::load(self.config.as_deref()).context("failed to load configuration")?;
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(branch) = &self.branch {
            config.branch = branch.clone();
        }
        if let Some(name) = &self.process_name {
            config.process_name = name.clone();
        }
        if let Some(path) = &self.log_file {
            config.log_file = Some(path.clone());
        }
        config.finalize().context("invalid configuration")
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let global = &cli.global;
    let code = match cli.command {
        None => RunArgs::default().run(global)?,
        Some(Commands::Run(args)) => args.run(global)?,
        Some(Commands::Check) => commands::check::run(global)?,
        Some(Commands::Status(args)) => args.run(global)?,
        Some(Commands::Config) => commands::config::run(global)?,
        Some(Commands::Logs(args)) => args.run(global)?,
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
