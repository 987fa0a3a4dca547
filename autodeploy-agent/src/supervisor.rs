//! Process supervisor (pm2) integration for the restart stage.

use serde::Deserialize;

use autodeploy_core::{AgentConfig, Stage};
use autodeploy_sync::{best_effort, CommandError, CommandOutput, CommandRunner, CommandSpec};

use crate::error::StageError;

#[derive(Debug, Deserialize)]
struct ProcessEntry {
    name: String,
}

/// Process names from `pm2 jlist` output.
///
/// pm2 sometimes prints banner lines before the JSON array, so parsing is
/// attempted from each `[` in turn. Returns `None` when no JSON array can be
/// read.
pub fn parse_process_names(jlist: &str) -> Option<Vec<String>> {
    jlist
        .match_indices('[')
        .find_map(|(start, _)| serde_json::from_str::<Vec<ProcessEntry>>(&jlist[start..]).ok())
        .map(|entries| entries.into_iter().map(|e| e.name).collect())
}

/// Whether `name` appears as a cell of the human-readable `pm2 list` table.
pub fn list_mentions(list: &str, name: &str) -> bool {
    list.lines().any(|line| {
        line.split(|c: char| c == '│' || c == '|' || c.is_whitespace())
            .any(|cell| cell == name)
    })
}

pub struct Supervisor<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a AgentConfig,
}

impl<'a> Supervisor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a AgentConfig) -> Self {
        Self { runner, config }
    }

    fn run(&self, args: &[&str], must_succeed: bool) -> Result<CommandOutput, CommandError> {
        let command = CommandSpec::new(self.config.supervisor.as_str(), args.iter().copied());
        self.runner.run(&command, &self.config.work_dir, must_succeed)
    }

    /// Whether the configured process is currently registered.
    ///
    /// A process list that cannot be read counts as "not registered"; only a
    /// supervisor that cannot be executed at all is an error.
    pub fn is_running(&self) -> Result<bool, CommandError> {
        let name = self.config.process_name.as_str();
        let jlist = self.run(&["jlist"], false)?;
        if jlist.success() {
            if let Some(names) = parse_process_names(&jlist.stdout) {
                return Ok(names.iter().any(|n| n == name));
            }
        }
        tracing::debug!("process list is not JSON, falling back to the table view");
        let list = self.run(&["list"], false)?;
        if !list.success() {
            tracing::warn!("Could not read the process list; assuming {name} is not running");
            return Ok(false);
        }
        Ok(list_mentions(&list.stdout, name))
    }

    /// Restart (or first start) the application, then persist the process list.
    pub fn restart(&self) -> Result<(), StageError> {
        self.restart_inner()
            .map_err(|e| StageError::new(Stage::Restart, e))
    }

    fn restart_inner(&self) -> Result<(), CommandError> {
        let name = self.config.process_name.as_str();
        tracing::info!("Restarting {name} under {}", self.config.supervisor);

        if self.config.process_file_path().exists() {
            let process_file = self.config.process_file.to_string_lossy();
            tracing::info!("Using process file {process_file}");
            if self.is_running()? {
                tracing::info!("Stopping existing {name} process");
                best_effort("Stopping process", self.run(&["stop", name], true));
                best_effort("Deleting process", self.run(&["delete", name], true));
            }
            self.run(&["start", &*process_file], true)?;
        } else if self.is_running()? {
            self.run(&["restart", name], true)?;
        } else {
            tracing::info!("{name} is not running - starting it");
            let entry_point = self.config.entry_point.to_string_lossy();
            self.run(&["start", &*entry_point, "--name", name], true)?;
        }

        self.run(&["save"], true)?;
        best_effort("Listing processes", self.run(&["list"], true));
        tracing::info!("Application restarted");
        Ok(())
    }
}
