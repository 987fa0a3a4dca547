//! `autodeploy config` — show the merged configuration.

use anyhow::{Context, Result};

use autodeploy_core::config::to_yaml;

use crate::GlobalArgs;

pub fn run(global: &GlobalArgs) -> Result<i32> {
    let config = global.load_config()?;
    let yaml = to_yaml(&config).context("failed to render configuration")?;
    print!("{yaml}");
    Ok(0)
}
