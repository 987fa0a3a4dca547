//! Deployment orchestrator — one run of the polling agent.
//!
//! ```text
//! Preflight → CheckDivergence ─ none ─────────────────────→ NoUpdateNeeded
//!                                   └ found → Sync ─ Aborted   → AbortedDirtyTree
//!                                                  ├ NoChanges → UpToDateAfterFetch
//!                                                  └ Synced(c) → [c] Install → Build → Restart → Succeeded
//! ```
//!
//! Any error ends the run as `Failed(stage, cause)`. Nothing is rolled back:
//! a failed build leaves the pulled code and removed build output in place.
//! Runs are not serialized against each other; the scheduler must not start
//! one while another is still going.

use std::fmt::Display;

use chrono::Utc;

use autodeploy_core::{
    AgentConfig, DeploymentReport, DeploymentResult, RevisionId, Stage, SyncOutcome,
};
use autodeploy_sync::{best_effort, CommandRunner, Inspector, SyncEngine};

use crate::error::StageError;
use crate::stages;
use crate::supervisor::Supervisor;

const BANNER_RULE: &str = "==================================================";

/// What a run learned along the way, copied into the report.
#[derive(Debug, Default)]
struct RunFacts {
    local_head: Option<RevisionId>,
    remote_head: Option<RevisionId>,
    manifest_changed: Option<bool>,
}

/// Logs the start banner when created and the end banner when dropped, so
/// every exit path closes the run in the log.
struct Banner<'a> {
    config: &'a AgentConfig,
}

impl<'a> Banner<'a> {
    fn open(config: &'a AgentConfig) -> Self {
        tracing::info!("{BANNER_RULE}");
        tracing::info!(
            "Auto-deploy started for {} ({})",
            config.process_name,
            config.work_dir.display()
        );
        Self { config }
    }
}

impl Drop for Banner<'_> {
    fn drop(&mut self) {
        tracing::info!("Auto-deploy finished for {}", self.config.process_name);
        tracing::info!("{BANNER_RULE}");
    }
}

pub struct Orchestrator<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a AgentConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a AgentConfig) -> Self {
        Self { runner, config }
    }

    /// Execute one deployment run. Never panics on deployment failures; every
    /// outcome is described by the returned report.
    pub fn run(&self) -> DeploymentReport {
        let started_at = Utc::now();
        let mut facts = RunFacts::default();

        let result = {
            let _banner = Banner::open(self.config);
            let result = self.execute(&mut facts);
            self.announce(&result, &facts);
            result
        };

        let finished_at = Utc::now();
        DeploymentReport {
            result,
            local_head: facts.local_head,
            remote_head: facts.remote_head,
            manifest_changed: facts.manifest_changed,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
        }
    }

    fn execute(&self, facts: &mut RunFacts) -> DeploymentResult {
        if let Err(cause) = self.preflight() {
            return failed(Stage::Preflight, cause);
        }

        let inspector = Inspector::new(self.runner, self.config);
        if self.log_dirties_tree(&inspector) {
            tracing::warn!(
                "{} is not git-ignored; the next run will see it as an untracked file \
                 and abort",
                self.config.log_path().display()
            );
        }
        self.deploy(&inspector, facts)
    }

    /// Whether the log file lives inside the working copy without being
    /// ignored by git. Query failures count as "no".
    fn log_dirties_tree(&self, inspector: &Inspector<'_>) -> bool {
        let log_path = self.config.log_path();
        let Ok(relative) = log_path.strip_prefix(&self.config.work_dir) else {
            return false;
        };
        let ignored = best_effort(
            "Checking that the log file is git-ignored",
            inspector.is_ignored(relative),
        );
        ignored == Some(false)
    }

    fn preflight(&self) -> Result<(), String> {
        let work_dir = &self.config.work_dir;
        if !work_dir.is_dir() {
            return Err(format!(
                "working directory {} does not exist",
                work_dir.display()
            ));
        }
        // A directory for ordinary clones, a file for linked worktrees.
        if !work_dir.join(".git").exists() {
            return Err(format!("{} is not a git repository", work_dir.display()));
        }
        Ok(())
    }

    fn deploy(&self, inspector: &Inspector<'_>, facts: &mut RunFacts) -> DeploymentResult {
        let divergence = match inspector.has_divergence(&self.config.branch) {
            Ok(divergence) => divergence,
            Err(err) => return failed(Stage::Inspect, err),
        };
        facts.local_head = Some(divergence.local.clone());
        facts.remote_head = Some(divergence.remote.clone());

        if !divergence.is_diverged() {
            tracing::info!("No updates found - skipping deployment");
            return DeploymentResult::NoUpdateNeeded;
        }

        tracing::info!("Updates found - starting deployment");
        let outcome = match SyncEngine::new(self.runner, self.config).synchronize() {
            Ok(outcome) => outcome,
            Err(err) => return failed(Stage::Sync, err),
        };

        match outcome {
            SyncOutcome::Aborted { reason } => {
                tracing::warn!("Deployment skipped: {reason}");
                DeploymentResult::AbortedDirtyTree
            }
            SyncOutcome::NoChanges => {
                tracing::info!("Nothing new after fetch - deployment not needed");
                DeploymentResult::UpToDateAfterFetch
            }
            SyncOutcome::Synced { manifest_changed } => {
                facts.manifest_changed = Some(manifest_changed);
                match self.roll_out(manifest_changed) {
                    Ok(()) => DeploymentResult::Succeeded,
                    Err(err) => failed(err.stage, &err.source),
                }
            }
        }
    }

    fn roll_out(&self, manifest_changed: bool) -> Result<(), StageError> {
        if manifest_changed {
            stages::install(self.runner, self.config)?;
        } else {
            tracing::info!("Dependency manifest unchanged - skipping install");
        }
        stages::build(self.runner, self.config)?;
        Supervisor::new(self.runner, self.config).restart()
    }

    /// Deployment notice. Delivery to an external channel would hook in here.
    fn announce(&self, result: &DeploymentResult, facts: &RunFacts) {
        let name = &self.config.process_name;
        match result {
            DeploymentResult::Succeeded => {
                let revision = facts
                    .remote_head
                    .as_ref()
                    .map(|r| r.short().to_string())
                    .unwrap_or_default();
                tracing::info!("DEPLOYMENT: {name} deployed successfully at {revision}");
            }
            DeploymentResult::Failed { stage, cause } => {
                tracing::error!("DEPLOYMENT: {name} deployment failed during {stage}: {cause}");
            }
            _ => {}
        }
    }
}

fn failed(stage: Stage, cause: impl Display) -> DeploymentResult {
    let cause = cause.to_string();
    tracing::error!("Deployment failed during {stage}: {cause}");
    DeploymentResult::Failed { stage, cause }
}
