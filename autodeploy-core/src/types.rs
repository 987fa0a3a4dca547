//! Domain types shared by the inspector, the sync engine and the orchestrator.
//!
//! None of these values outlive a single invocation of the agent. They are
//! serializable so the CLI can emit a machine-readable report.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An opaque commit identifier. Compared for equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionId(pub String);

impl RevisionId {
    /// Abbreviated form used in log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RevisionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RevisionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Working copy
// ---------------------------------------------------------------------------

/// An in-progress multi-step operation recorded in the repository metadata.
///
/// A repository is never mid-merge and mid-rebase at the same time, so this
/// is a single value rather than two flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    #[default]
    None,
    Merging,
    Rebasing,
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationState::None => write!(f, "none"),
            OperationState::Merging => write!(f, "merging"),
            OperationState::Rebasing => write!(f, "rebasing"),
        }
    }
}

/// Classification of the working tree at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkingCopyStatus {
    pub has_uncommitted: bool,
    pub has_untracked: bool,
    pub operation: OperationState,
    /// Raw short-format status lines, in the order git reported them.
    #[serde(default)]
    pub entries: Vec<String>,
}

impl WorkingCopyStatus {
    /// `true` when there is nothing uncommitted and nothing untracked.
    pub fn is_clean(&self) -> bool {
        !(self.has_uncommitted || self.has_untracked)
    }

    pub fn in_merge(&self) -> bool {
        self.operation == OperationState::Merging
    }

    pub fn in_rebase(&self) -> bool {
        self.operation == OperationState::Rebasing
    }

    /// Human-readable summary of what makes the tree dirty, e.g.
    /// `"uncommitted changes, untracked files"`.
    pub fn describe_changes(&self) -> String {
        let mut kinds = Vec::new();
        if self.has_uncommitted {
            kinds.push("uncommitted changes");
        }
        if self.has_untracked {
            kinds.push("untracked files");
        }
        if kinds.is_empty() {
            "no local changes".to_string()
        } else {
            kinds.join(", ")
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest fingerprint
// ---------------------------------------------------------------------------

/// Content hash of the dependency manifest, captured before and after a sync.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ManifestFingerprint {
    /// The manifest file does not exist.
    Absent,
    /// Lowercase hex SHA-256 of the manifest bytes.
    Digest(String),
}

impl fmt::Display for ManifestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestFingerprint::Absent => write!(f, "absent"),
            ManifestFingerprint::Digest(hex) => write!(f, "{}", &hex[..hex.len().min(12)]),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync outcome
// ---------------------------------------------------------------------------

/// Why the sync engine refused to touch the working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    UncommittedOrUntrackedChanges,
}

impl AbortReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AbortReason::UncommittedOrUntrackedChanges => "uncommitted_or_untracked_changes",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The single value handed from the sync engine to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Deliberate refusal; the working copy was not modified.
    Aborted { reason: AbortReason },
    /// The pull was a no-op; the branch already matched the remote tip.
    NoChanges,
    /// The branch advanced.
    Synced { manifest_changed: bool },
}

// ---------------------------------------------------------------------------
// Deployment result
// ---------------------------------------------------------------------------

/// Step of the deployment a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Preflight,
    Inspect,
    Sync,
    Install,
    Build,
    Restart,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Preflight => write!(f, "preflight"),
            Stage::Inspect => write!(f, "inspect"),
            Stage::Sync => write!(f, "sync"),
            Stage::Install => write!(f, "install"),
            Stage::Build => write!(f, "build"),
            Stage::Restart => write!(f, "restart"),
        }
    }
}

/// Terminal outcome of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeploymentResult {
    NoUpdateNeeded,
    AbortedDirtyTree,
    UpToDateAfterFetch,
    Succeeded,
    Failed { stage: Stage, cause: String },
}

impl DeploymentResult {
    /// Process exit status for this result.
    pub fn exit_code(&self) -> i32 {
        match self {
            DeploymentResult::NoUpdateNeeded
            | DeploymentResult::UpToDateAfterFetch
            | DeploymentResult::Succeeded => 0,
            DeploymentResult::AbortedDirtyTree | DeploymentResult::Failed { .. } => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

impl fmt::Display for DeploymentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentResult::NoUpdateNeeded => write!(f, "no update needed"),
            DeploymentResult::AbortedDirtyTree => {
                write!(f, "aborted: working copy has uncommitted or untracked changes")
            }
            DeploymentResult::UpToDateAfterFetch => write!(f, "already up to date after fetch"),
            DeploymentResult::Succeeded => write!(f, "deployment succeeded"),
            DeploymentResult::Failed { stage, cause } => {
                write!(f, "failed during {stage}: {cause}")
            }
        }
    }
}

/// Everything one run learned, for the log and for `--json` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    #[serde(flatten)]
    pub result: DeploymentResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_head: Option<RevisionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_head: Option<RevisionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_changed: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
