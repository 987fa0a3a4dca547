//! Repository state inspector — read-only questions about the working copy.
//!
//! The only network access is `git fetch` of the tracked branch; nothing here
//! touches the working tree. Any failure is an [`InspectionError`], which the
//! orchestrator treats as fatal.

use std::path::{Path, PathBuf};

use autodeploy_core::{
    AgentConfig, ManifestFingerprint, OperationState, RevisionId, WorkingCopyStatus,
};

use crate::error::{CommandError, InspectionError};
use crate::fingerprint::fingerprint_file;
use crate::interpret::{self, StashEntry};
use crate::runner::{git_command, CommandOutput, CommandRunner};

/// Local and remote committed revisions, read together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub local: RevisionId,
    pub remote: RevisionId,
}

impl Divergence {
    /// Committed-history-only comparison: uncommitted or untracked edits
    /// never count as divergence.
    pub fn is_diverged(&self) -> bool {
        self.local != self.remote
    }
}

pub struct Inspector<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a AgentConfig,
}

impl<'a> Inspector<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a AgentConfig) -> Self {
        Self { runner, config }
    }

    fn git(&self, args: &[&str]) -> Result<CommandOutput, InspectionError> {
        let command = git_command(args.iter().copied());
        Ok(self.runner.run(&command, &self.config.work_dir, true)?)
    }

    fn rev_parse(&self, rev: &str) -> Result<RevisionId, InspectionError> {
        let output = self.git(&["rev-parse", rev])?;
        let id = output.stdout_trimmed();
        if id.is_empty() {
            return Err(InspectionError::EmptyRevision(rev.to_string()));
        }
        Ok(RevisionId::from(id))
    }

    /// Committed HEAD of the working copy.
    pub fn current_local_revision(&self) -> Result<RevisionId, InspectionError> {
        self.rev_parse("HEAD")
    }

    /// Fetch `branch` (metadata only, no merge) and read the updated
    /// remote-tracking ref.
    pub fn current_remote_revision(&self, branch: &str) -> Result<RevisionId, InspectionError> {
        self.git(&["fetch", self.config.remote.as_str(), branch])?;
        self.rev_parse(&format!("{}/{}", self.config.remote, branch))
    }

    /// Compare committed HEAD against the remote tip of `branch`.
    pub fn has_divergence(&self, branch: &str) -> Result<Divergence, InspectionError> {
        tracing::info!("Checking for updates (committed code only, local edits are ignored)");
        let local = self.current_local_revision()?;
        let remote = self.current_remote_revision(branch)?;
        tracing::info!("Local committed code: {}", local.short());
        tracing::info!("Remote commit:        {}", remote.short());

        let divergence = Divergence { local, remote };
        if divergence.is_diverged() {
            tracing::info!("Remote has different commits - updates found");
        } else {
            tracing::info!("Committed code matches remote - no updates found");
        }
        Ok(divergence)
    }

    /// Absolute path of the repository metadata directory.
    pub fn git_dir(&self) -> Result<PathBuf, InspectionError> {
        let output = self.git(&["rev-parse", "--git-dir"])?;
        let raw = output.stdout_trimmed();
        if raw.is_empty() {
            return Err(InspectionError::NotARepository(self.config.work_dir.clone()));
        }
        let path = PathBuf::from(raw);
        Ok(if path.is_absolute() {
            path
        } else {
            self.config.work_dir.join(path)
        })
    }

    /// Merge or rebase in progress, judged by git's marker files.
    pub fn operation_state(&self) -> Result<OperationState, InspectionError> {
        let git_dir = self.git_dir()?;
        if git_dir.join("MERGE_HEAD").exists() {
            return Ok(OperationState::Merging);
        }
        let rebasing = git_dir.join("REBASE_HEAD").exists()
            || git_dir.join("rebase-merge").is_dir()
            || git_dir.join("rebase-apply").is_dir();
        Ok(if rebasing {
            OperationState::Rebasing
        } else {
            OperationState::None
        })
    }

    /// Classify the working tree from `git status --porcelain` plus the
    /// operation markers.
    pub fn classify_working_copy(&self) -> Result<WorkingCopyStatus, InspectionError> {
        let output = self.git(&["status", "--porcelain"])?;
        let summary = interpret::parse_porcelain(&output.stdout);
        let operation = self.operation_state()?;
        Ok(WorkingCopyStatus {
            has_uncommitted: summary.has_uncommitted,
            has_untracked: summary.has_untracked,
            operation,
            entries: summary.entries,
        })
    }

    pub fn manifest_fingerprint(&self) -> Result<ManifestFingerprint, InspectionError> {
        fingerprint_file(&self.config.manifest_path())
    }

    /// Whether git ignores `path`, given relative to the working copy.
    /// `check-ignore` exits 1 for a path that is not ignored.
    pub fn is_ignored(&self, path: &Path) -> Result<bool, InspectionError> {
        let path = path.to_string_lossy();
        let command = git_command(["check-ignore", "-q", "--", &*path]);
        let output = self.runner.run(&command, &self.config.work_dir, false)?;
        match output.exit_code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            exit_code => Err(CommandError::Exit {
                command: command.to_string(),
                exit_code,
                stderr: output.stderr,
            }
            .into()),
        }
    }

    /// Stashes carrying the configured preservation label.
    pub fn preserved_stashes(&self) -> Result<Vec<StashEntry>, InspectionError> {
        let output = self.git(&["stash", "list"])?;
        Ok(interpret::preserved_stashes(
            interpret::parse_stash_list(&output.stdout),
            &self.config.stash_label,
        ))
    }
}
