//! Synchronization engine — decides whether and how to move the working copy
//! to the remote tip without losing local work.
//!
//! ## Primary path
//!
//! 1. Abort an interrupted merge or rebase (best-effort).
//! 2. Re-classify the tree; any uncommitted or untracked change aborts the
//!    sync. Local edits are never stashed, reset or discarded here.
//! 3. Fingerprint the manifest.
//! 4. `git pull`; no HEAD movement means [`SyncOutcome::NoChanges`],
//!    otherwise fingerprint again and report whether the manifest changed.
//!
//! ## Recovery path (pull failed)
//!
//! Fetch, merge the remote tip, and on a conflict abort the merge and put back
//! the newest preservation stash. Every sub-step is best-effort. Recovery
//! always reports `manifest_changed = true` so a needed install is never
//! skipped. If recovery itself cannot run, the original pull error is
//! returned.

use std::fmt::Display;

use autodeploy_core::{AbortReason, AgentConfig, OperationState, SyncOutcome};

use crate::error::{CommandError, SyncError};
use crate::inspector::Inspector;
use crate::interpret::{self, MergeEffect, PullEffect};
use crate::runner::{git_command, CommandOutput, CommandRunner};

/// Run a step whose failure must not stop the enclosing procedure: log the
/// error at WARN and continue with `None`.
pub fn best_effort<T, E: Display>(step: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("{step} failed (continuing): {err}");
            None
        }
    }
}

pub struct SyncEngine<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a AgentConfig,
    inspector: Inspector<'a>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a AgentConfig) -> Self {
        Self {
            runner,
            config,
            inspector: Inspector::new(runner, config),
        }
    }

    /// Bring the current branch up to the remote tip.
    ///
    /// Call only after the inspector reported divergence.
    pub fn synchronize(&self) -> Result<SyncOutcome, SyncError> {
        tracing::info!("Pulling latest changes while preserving local modifications");
        self.clear_interrupted_operation();

        tracing::info!("Checking for uncommitted or untracked changes");
        let status = self.inspector.classify_working_copy()?;
        if !status.is_clean() {
            tracing::warn!(
                "Found {}! Commit all changes before the next deployment.",
                status.describe_changes()
            );
            tracing::warn!("Aborting pull to avoid conflicts");
            return Ok(SyncOutcome::Aborted {
                reason: AbortReason::UncommittedOrUntrackedChanges,
            });
        }
        tracing::info!("No uncommitted or untracked changes detected, proceeding with pull");

        let before = self.inspector.manifest_fingerprint()?;

        let effect = match self.pull() {
            Ok(effect) => effect,
            Err(err) => {
                tracing::error!("Failed to pull changes: {err}");
                return self.recover(err);
            }
        };

        match effect {
            PullEffect::AlreadyUpToDate => {
                tracing::info!("Repository is already up to date - no deployment needed");
                Ok(SyncOutcome::NoChanges)
            }
            PullEffect::Advanced => {
                let after = self.inspector.manifest_fingerprint()?;
                let manifest_changed = before != after;
                tracing::info!(
                    "Successfully pulled changes (manifest {before} -> {after}, \
                     changed: {manifest_changed})"
                );
                Ok(SyncOutcome::Synced { manifest_changed })
            }
        }
    }

    /// Run a git command with `must_succeed = false`, logging non-zero exits.
    /// Spawn failures are still returned to the caller.
    fn git_tolerated(&self, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let command = git_command(args.iter().copied());
        let output = self.runner.run(&command, &self.config.work_dir, false)?;
        if !output.success() {
            tracing::warn!("`{command}` did not succeed: {}", output.stderr.trim());
        }
        Ok(output)
    }

    fn clear_interrupted_operation(&self) {
        let state = best_effort(
            "Checking for an in-progress merge or rebase",
            self.inspector.operation_state(),
        );
        match state {
            Some(OperationState::Merging) => {
                tracing::warn!("Repository is in the middle of a merge - aborting merge first");
                best_effort("Aborting merge", self.git_tolerated(&["merge", "--abort"]));
            }
            Some(OperationState::Rebasing) => {
                tracing::warn!("Repository is in the middle of a rebase - aborting rebase first");
                best_effort("Aborting rebase", self.git_tolerated(&["rebase", "--abort"]));
            }
            Some(OperationState::None) | None => {}
        }
    }

    fn pull(&self) -> Result<PullEffect, CommandError> {
        tracing::info!("Pulling remote changes");
        let head_before = best_effort(
            "Reading HEAD before pull",
            self.inspector.current_local_revision(),
        );
        let command = git_command([
            "pull",
            "--no-rebase",
            "--no-edit",
            self.config.remote.as_str(),
            self.config.branch.as_str(),
        ]);
        let output = self.runner.run(&command, &self.config.work_dir, true)?;
        let head_after = best_effort(
            "Reading HEAD after pull",
            self.inspector.current_local_revision(),
        );
        Ok(interpret::pull_effect(
            head_before.as_ref(),
            head_after.as_ref(),
            &output,
        ))
    }

    fn recover(&self, original: CommandError) -> Result<SyncOutcome, SyncError> {
        tracing::warn!("Attempting recovery while preserving local changes");
        match self.try_recover() {
            Ok(()) => {
                tracing::info!("Recovery finished; assuming the manifest may have changed");
                Ok(SyncOutcome::Synced {
                    manifest_changed: true,
                })
            }
            Err(recovery_err) => {
                tracing::error!("Recovery also failed: {recovery_err}");
                tracing::error!("Manual intervention may be required");
                tracing::error!("Check 'git stash list' for preserved changes");
                Err(SyncError::Pull(original))
            }
        }
    }

    fn try_recover(&self) -> Result<(), CommandError> {
        let remote = self.config.remote.as_str();
        let branch = self.config.branch.as_str();
        best_effort(
            "Re-fetching remote",
            self.git_tolerated(&["fetch", remote, branch]),
        );

        let remote_ref = self.config.remote_ref();
        match self.git_tolerated(&["merge", "--no-edit", remote_ref.as_str()]) {
            Ok(output) => match interpret::merge_effect(&output) {
                MergeEffect::Clean => {
                    tracing::info!("Recovery successful using merge strategy");
                }
                MergeEffect::Conflicted => {
                    tracing::warn!("Merge conflicts detected during recovery");
                    best_effort("Aborting merge", self.git_tolerated(&["merge", "--abort"]));
                    self.restore_preserved_stash()?;
                    tracing::info!("Merge aborted, local changes restored");
                }
                MergeEffect::Failed => {
                    tracing::warn!("Recovery merge did not complete; working copy left as is");
                }
            },
            Err(merge_err) => {
                tracing::warn!("Merge failed: {merge_err}");
                self.restore_preserved_stash()?;
                tracing::info!("Recovery completed - local changes should be preserved");
            }
        }
        Ok(())
    }

    /// Pop the newest stash carrying the preservation label, if there is one.
    /// Listing stashes must at least run; the pop itself is best-effort.
    fn restore_preserved_stash(&self) -> Result<(), CommandError> {
        let listing = self.git_tolerated(&["stash", "list"])?;
        let preserved = interpret::preserved_stashes(
            interpret::parse_stash_list(&listing.stdout),
            &self.config.stash_label,
        );
        match preserved.first() {
            Some(entry) => {
                tracing::info!("Restoring local changes from {}", entry.reference);
                best_effort(
                    "Restoring preserved stash",
                    self.git_tolerated(&["stash", "pop", entry.reference.as_str()]),
                );
            }
            None => tracing::info!("No preserved stash to restore"),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;
    use crate::testing::{Reply, ScriptedRunner};

    /// Commands that change the working tree, index, refs or stash.
    const MUTATING: &[&str] = &[
        "git pull",
        "git merge --no-edit",
        "git reset",
        "git checkout",
        "git stash",
        "git clean",
        "git rebase --continue",
    ];

    struct Fixture {
        dir: TempDir,
        config: AgentConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::create_dir_all(dir.path().join(".git")).unwrap();
            fs::write(dir.path().join("package.json"), br#"{"name":"chat"}"#).unwrap();
            let config = AgentConfig {
                work_dir: dir.path().to_path_buf(),
                process_name: "chat".into(),
                ..Default::default()
            };
            Self { dir, config }
        }

        fn git_dir(&self) -> std::path::PathBuf {
            self.dir.path().join(".git")
        }
    }

    fn base_runner() -> ScriptedRunner {
        ScriptedRunner::new().reply("git rev-parse --git-dir", Reply::ok(".git\n"))
    }

    fn advancing_heads(runner: ScriptedRunner) -> ScriptedRunner {
        runner.replies(
            "git rev-parse HEAD",
            vec![Reply::ok("abc123\n"), Reply::ok("def456\n")],
        )
    }

    fn assert_no_mutation(runner: &ScriptedRunner) {
        for cmd in runner.commands() {
            assert!(
                !MUTATING.iter().any(|m| cmd.starts_with(m)),
                "unexpected mutating command: {cmd}"
            );
        }
    }

    #[test]
    fn clean_tree_pull_with_unchanged_manifest() {
        let fx = Fixture::new();
        let runner = advancing_heads(base_runner()).reply(
            "git pull",
            Reply::ok("Updating abc123..def456\nFast-forward\n"),
        );

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { manifest_changed: false });
        assert!(runner.ran("git pull --no-rebase --no-edit origin main"));
    }

    #[test]
    fn clean_tree_pull_with_changed_manifest() {
        let fx = Fixture::new();
        let runner = advancing_heads(base_runner()).reply_with_effect(
            "git pull",
            Reply::ok("Updating abc123..def456\nFast-forward\n package.json | 2 +-\n"),
            |dir: &Path| {
                fs::write(dir.join("package.json"), br#"{"name":"chat","dependencies":{}}"#)
                    .unwrap();
            },
        );

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { manifest_changed: true });
    }

    #[test]
    fn manifest_rewritten_with_identical_bytes_is_unchanged() {
        let fx = Fixture::new();
        let runner = advancing_heads(base_runner()).reply_with_effect(
            "git pull",
            Reply::ok("Fast-forward\n"),
            |dir: &Path| fs::write(dir.join("package.json"), br#"{"name":"chat"}"#).unwrap(),
        );

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { manifest_changed: false });
    }

    #[test]
    fn unmoved_head_means_no_changes() {
        let fx = Fixture::new();
        let runner = base_runner()
            .reply("git rev-parse HEAD", Reply::ok("abc123\n"))
            .reply("git pull", Reply::ok("Already up to date.\n"));

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(outcome, SyncOutcome::NoChanges);
    }

    #[test]
    fn untracked_file_aborts_without_mutation() {
        let fx = Fixture::new();
        let runner = base_runner().reply("git status --porcelain", Reply::ok("?? scratch.txt\n"));

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Aborted {
                reason: AbortReason::UncommittedOrUntrackedChanges
            }
        );
        assert_no_mutation(&runner);
        assert!(!runner.ran("git merge"));
        assert!(!runner.ran("git rebase"));
    }

    #[test]
    fn uncommitted_change_aborts_without_mutation() {
        let fx = Fixture::new();
        let runner =
            base_runner().reply("git status --porcelain", Reply::ok(" M src/server.ts\n"));

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert!(matches!(outcome, SyncOutcome::Aborted { .. }));
        assert_no_mutation(&runner);
    }

    #[test]
    fn interrupted_merge_is_aborted_before_dirty_check() {
        let fx = Fixture::new();
        fs::write(fx.git_dir().join("MERGE_HEAD"), "def456\n").unwrap();
        let runner = base_runner().reply("git status --porcelain", Reply::ok("UU package.json\n"));

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert!(matches!(outcome, SyncOutcome::Aborted { .. }));

        let commands = runner.commands();
        let abort = commands.iter().position(|c| c == "git merge --abort");
        let status = commands.iter().position(|c| c == "git status --porcelain");
        assert!(abort.is_some(), "merge --abort must run: {commands:?}");
        assert!(abort < status, "abort must precede classification: {commands:?}");
        assert_no_mutation(&runner);
    }

    #[test]
    fn interrupted_rebase_is_aborted() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.git_dir().join("rebase-merge")).unwrap();
        let runner = advancing_heads(base_runner()).reply("git pull", Reply::ok("Fast-forward\n"));

        SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert!(runner.ran("git rebase --abort"));
        assert!(!runner.ran("git merge --abort"));
    }

    #[test]
    fn failed_abort_is_not_fatal() {
        let fx = Fixture::new();
        fs::write(fx.git_dir().join("MERGE_HEAD"), "def456\n").unwrap();
        let runner = advancing_heads(base_runner())
            .reply("git merge --abort", Reply::fail(128, "fatal: There is no merge to abort"))
            .reply("git pull", Reply::ok("Fast-forward\n"));

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { manifest_changed: false });
    }

    #[test]
    fn status_failure_is_fatal_inspection_error() {
        let fx = Fixture::new();
        let runner = base_runner().reply(
            "git status",
            Reply::fail(128, "fatal: not a git repository"),
        );
        let err = SyncEngine::new(&runner, &fx.config).synchronize().unwrap_err();
        assert!(matches!(err, SyncError::Inspection(_)), "got: {err:?}");
    }

    #[test]
    fn pull_failure_then_clean_merge_reports_manifest_changed() {
        let fx = Fixture::new();
        let runner = base_runner()
            .reply("git rev-parse HEAD", Reply::ok("abc123\n"))
            .reply("git pull", Reply::fail(1, "fatal: couldn't find remote ref"))
            .reply("git merge --no-edit origin/main", Reply::ok("Fast-forward\n"));

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { manifest_changed: true });
        assert!(runner.ran("git fetch origin main"));
        assert!(!runner.ran("git stash"), "clean merge needs no stash restore");
    }

    #[test]
    fn pull_failure_conflict_restores_matching_stash() {
        let fx = Fixture::new();
        let runner = base_runner()
            .reply("git rev-parse HEAD", Reply::ok("abc123\n"))
            .reply("git pull", Reply::fail(1, "Automatic merge failed"))
            .reply(
                "git merge --no-edit",
                Reply::exit(1, "CONFLICT (content): Merge conflict in package.json\n", ""),
            )
            .reply(
                "git stash list",
                Reply::ok(
                    "stash@{0}: WIP on main: 1a2b3c experiment\n\
                     stash@{1}: On main: auto-deploy-preserve\n",
                ),
            );

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { manifest_changed: true });

        let commands = runner.commands();
        let merge_abort = commands.iter().position(|c| c == "git merge --abort");
        let pop = commands.iter().position(|c| c == "git stash pop stash@{1}");
        assert!(merge_abort.is_some() && pop.is_some(), "{commands:?}");
        assert!(merge_abort < pop, "abort before restore: {commands:?}");
        assert!(!runner.ran("git stash pop stash@{0}"), "unlabelled stash untouched");
    }

    #[test]
    fn conflict_without_matching_stash_pops_nothing() {
        let fx = Fixture::new();
        let runner = base_runner()
            .reply("git rev-parse HEAD", Reply::ok("abc123\n"))
            .reply("git pull", Reply::fail(1, "error"))
            .reply("git merge --no-edit", Reply::exit(1, "CONFLICT (content)\n", ""))
            .reply("git stash list", Reply::ok("stash@{0}: WIP on main: 1a2b3c\n"));

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { manifest_changed: true });
        assert!(!runner.ran("git stash pop"));
    }

    #[test]
    fn merge_that_cannot_run_goes_straight_to_stash_restore() {
        let fx = Fixture::new();
        let runner = base_runner()
            .reply("git rev-parse HEAD", Reply::ok("abc123\n"))
            .reply("git pull", Reply::fail(1, "error"))
            .reply("git merge --no-edit", Reply::SpawnFailure)
            .reply("git stash list", Reply::ok("stash@{0}: On main: auto-deploy-preserve\n"));

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { manifest_changed: true });
        assert!(!runner.ran("git merge --abort"));
        assert!(runner.ran("git stash pop stash@{0}"));
    }

    #[test]
    fn failed_stash_pop_is_swallowed() {
        let fx = Fixture::new();
        let runner = base_runner()
            .reply("git rev-parse HEAD", Reply::ok("abc123\n"))
            .reply("git pull", Reply::fail(1, "error"))
            .reply("git merge --no-edit", Reply::exit(1, "CONFLICT\n", ""))
            .reply("git stash list", Reply::ok("stash@{0}: On main: auto-deploy-preserve\n"))
            .reply("git stash pop", Reply::fail(1, "error: could not restore untracked files"));

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { manifest_changed: true });
    }

    #[test]
    fn failed_recovery_merge_without_conflict_leaves_stash_alone() {
        let fx = Fixture::new();
        let runner = base_runner()
            .reply("git rev-parse HEAD", Reply::ok("abc123\n"))
            .reply("git pull", Reply::fail(1, "error"))
            .reply(
                "git merge --no-edit",
                Reply::fail(1, "error: Your local changes would be overwritten by merge"),
            )
            .reply("git stash list", Reply::ok("stash@{0}: On main: auto-deploy-preserve\n"));

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { manifest_changed: true });
        assert!(!runner.ran("git merge --abort"));
        assert!(!runner.ran("git stash list"));
        assert!(!runner.ran("git stash pop"));
    }

    #[rstest]
    #[case::exit(Reply::fail(128, "fatal: unable to access remote"))]
    #[case::spawn(Reply::SpawnFailure)]
    fn failed_recovery_fetch_still_merges(#[case] fetch: Reply) {
        let fx = Fixture::new();
        let runner = base_runner()
            .reply("git rev-parse HEAD", Reply::ok("abc123\n"))
            .reply("git pull", Reply::fail(1, "error"))
            .reply("git fetch", fetch)
            .reply("git merge --no-edit", Reply::ok("Merge made by the 'ort' strategy.\n"));

        let outcome = SyncEngine::new(&runner, &fx.config).synchronize().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { manifest_changed: true });
        let fetch_at = runner.commands().iter().position(|c| c.starts_with("git fetch"));
        let merge_at = runner
            .commands()
            .iter()
            .position(|c| c.starts_with("git merge --no-edit origin/main"));
        assert!(fetch_at.is_some() && merge_at.is_some());
        assert!(fetch_at < merge_at, "{:?}", runner.commands());
    }

    #[test]
    fn broken_recovery_reraises_original_pull_failure() {
        let fx = Fixture::new();
        let runner = base_runner()
            .reply("git rev-parse HEAD", Reply::ok("abc123\n"))
            .reply("git pull", Reply::fail(1, "fatal: the original pull failure"))
            .reply("git merge --no-edit", Reply::exit(1, "CONFLICT\n", ""))
            .reply("git stash list", Reply::SpawnFailure);

        let err = SyncEngine::new(&runner, &fx.config).synchronize().unwrap_err();
        match err {
            SyncError::Pull(inner) => assert!(
                inner.stderr().contains("the original pull failure"),
                "got: {inner}"
            ),
            other => panic!("expected SyncError::Pull, got {other:?}"),
        }
    }

    #[test]
    fn best_effort_maps_error_to_none() {
        let ok: Result<u8, String> = Ok(3);
        let err: Result<u8, String> = Err("nope".into());
        assert_eq!(best_effort("step", ok), Some(3));
        assert_eq!(best_effort("step", err), None);
    }
}
