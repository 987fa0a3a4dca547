//! Install and build stages.
//!
//! Both run the configured argv in the working directory and fail the
//! deployment on a non-zero exit. Restart lives in [`crate::supervisor`].

use std::fs;

use autodeploy_core::{AgentConfig, Stage};
use autodeploy_sync::{CommandRunner, CommandSpec};

use crate::error::{stage_io, StageError, StageFailure};

fn configured(
    stage: Stage,
    argv: &[String],
    what: &'static str,
) -> Result<CommandSpec, StageError> {
    CommandSpec::from_argv(argv)
        .ok_or_else(|| StageError::new(stage, StageFailure::EmptyCommand(what)))
}

/// Install dependencies. Only called when the manifest changed.
pub fn install(runner: &dyn CommandRunner, config: &AgentConfig) -> Result<(), StageError> {
    tracing::info!("Dependency manifest changed - installing dependencies");
    let command = configured(Stage::Install, &config.install_command, "install")?;
    runner
        .run(&command, &config.work_dir, true)
        .map_err(|e| StageError::new(Stage::Install, e))?;
    tracing::info!("Dependencies installed");
    Ok(())
}

/// Remove the previous build output, then build.
pub fn build(runner: &dyn CommandRunner, config: &AgentConfig) -> Result<(), StageError> {
    let output_dir = config.build_output_path();
    if output_dir.is_dir() {
        tracing::info!("Removing old build output {}", output_dir.display());
        fs::remove_dir_all(&output_dir).map_err(|e| stage_io(Stage::Build, &output_dir, e))?;
    } else if output_dir.exists() {
        fs::remove_file(&output_dir).map_err(|e| stage_io(Stage::Build, &output_dir, e))?;
    }

    tracing::info!("Building application");
    let command = configured(Stage::Build, &config.build_command, "build")?;
    runner
        .run(&command, &config.work_dir, true)
        .map_err(|e| StageError::new(Stage::Build, e))?;
    tracing::info!("Build completed");
    Ok(())
}
