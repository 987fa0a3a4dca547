//! Translation of git command output into typed results.
//!
//! All string matching on tool output lives here. Machine-readable signals
//! are preferred where git offers them (porcelain status, HEAD movement);
//! the remaining text heuristics are covered by the table tests below.

use autodeploy_core::RevisionId;

use crate::runner::CommandOutput;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Summary of `git status --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PorcelainSummary {
    pub has_uncommitted: bool,
    pub has_untracked: bool,
    pub entries: Vec<String>,
}

/// Classify porcelain status lines. `??` marks an untracked path; every other
/// non-empty line is a tracked change (staged, unstaged or unmerged).
pub fn parse_porcelain(stdout: &str) -> PorcelainSummary {
    let mut summary = PorcelainSummary::default();
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        if line.starts_with("??") {
            summary.has_untracked = true;
        } else {
            summary.has_uncommitted = true;
        }
        summary.entries.push(line.to_string());
    }
    summary
}

// ---------------------------------------------------------------------------
// Pull
// ---------------------------------------------------------------------------

/// What a successful pull did to the current branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullEffect {
    AlreadyUpToDate,
    Advanced,
}

/// Decide whether a successful pull moved the branch.
///
/// HEAD before and after is authoritative. Only when either revision could
/// not be read does this fall back to git's "Already up to date" message
/// (spelled "up-to-date" by older releases).
pub fn pull_effect(
    head_before: Option<&RevisionId>,
    head_after: Option<&RevisionId>,
    output: &CommandOutput,
) -> PullEffect {
    match (head_before, head_after) {
        (Some(before), Some(after)) if before == after => PullEffect::AlreadyUpToDate,
        (Some(_), Some(_)) => PullEffect::Advanced,
        _ if reports_up_to_date(&output.stdout) || reports_up_to_date(&output.stderr) => {
            PullEffect::AlreadyUpToDate
        }
        _ => PullEffect::Advanced,
    }
}

fn reports_up_to_date(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("already up to date") || lower.contains("already up-to-date")
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Result of a tolerated (`must_succeed = false`) merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeEffect {
    Clean,
    /// Git reported conflicting paths; the merge is left half-applied.
    Conflicted,
    /// Non-zero exit without a conflict report (e.g. local changes would be
    /// overwritten, unrelated histories).
    Failed,
}

/// A conflict report anywhere in the output wins over the exit status.
pub fn merge_effect(output: &CommandOutput) -> MergeEffect {
    let mentions_conflict = |text: &str| text.to_ascii_lowercase().contains("conflict");
    if mentions_conflict(&output.stdout) || mentions_conflict(&output.stderr) {
        MergeEffect::Conflicted
    } else if output.success() {
        MergeEffect::Clean
    } else {
        MergeEffect::Failed
    }
}

// ---------------------------------------------------------------------------
// Stash
// ---------------------------------------------------------------------------

/// One line of `git stash list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashEntry {
    /// Reference usable with `git stash pop`, e.g. `stash@{0}`.
    pub reference: String,
    /// Everything after the reference, e.g. `On main: auto-deploy-preserve`.
    pub message: String,
}

/// Parse `git stash list` (`stash@{N}: <message>` per line).
pub fn parse_stash_list(stdout: &str) -> Vec<StashEntry> {
    stdout
        .lines()
        .filter_map(|line| {
            let (reference, message) = line.split_once(": ")?;
            if !reference.starts_with("stash@{") {
                return None;
            }
            Some(StashEntry {
                reference: reference.to_string(),
                message: message.trim().to_string(),
            })
        })
        .collect()
}

/// Stashes created under the agent's preservation label, newest first (the
/// order git lists them).
pub fn preserved_stashes(entries: Vec<StashEntry>, label: &str) -> Vec<StashEntry> {
    entries
        .into_iter()
        .filter(|entry| entry.message.contains(label))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
