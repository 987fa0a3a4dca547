//! `autodeploy check` — read-only divergence check.

use anyhow::{bail, Context, Result};
use colored::Colorize;

use autodeploy_agent::logging::{self, Console};
use autodeploy_sync::{Inspector, SystemRunner};

use crate::GlobalArgs;

/// Exit status when the remote has commits the working copy lacks.
pub const UPDATE_AVAILABLE: i32 = 10;

pub fn run(global: &GlobalArgs) -> Result<i32> {
    let config = global.load_config()?;
    if !config.work_dir.is_dir() {
        bail!("working directory {} does not exist", config.work_dir.display());
    }
    logging::init_console(Console::Stdout);

    let divergence = Inspector::new(&SystemRunner, &config)
        .has_divergence(&config.branch)
        .context("failed to compare local and remote revisions")?;

    println!("local:  {}", divergence.local);
    println!("remote: {}", divergence.remote);
    if divergence.is_diverged() {
        println!("{}", "update available".yellow().bold());
        Ok(UPDATE_AVAILABLE)
    } else {
        println!("{}", "up to date".green().bold());
        Ok(0)
    }
}
