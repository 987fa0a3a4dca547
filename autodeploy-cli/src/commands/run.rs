//! `autodeploy run` — one deployment pass.

use anyhow::{Context, Result};
use clap::Args;

use autodeploy_agent::logging::{self, Console};
use autodeploy_agent::Orchestrator;
use autodeploy_sync::SystemRunner;

use crate::GlobalArgs;

/// Arguments for `autodeploy run`.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Print the deployment report as JSON on stdout when the run ends.
    /// Log lines then go to stderr.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<i32> {
        let config = global.load_config()?;
        let console = if self.json {
            Console::Stderr
        } else {
            Console::Stdout
        };

        // The default log lives inside the working copy; never create that
        // directory just to log that it is missing.
        if config.work_dir.is_dir() {
            let log_path = config.log_path();
            if let Err(err) = logging::init_with_file(&log_path, console) {
                logging::init_console(console);
                tracing::warn!("logging to the console only: {err}");
            }
        } else {
            logging::init_console(console);
        }

        let report = Orchestrator::new(&SystemRunner, &config).run();
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to render report JSON")?
            );
        }
        Ok(report.result.exit_code())
    }
}
