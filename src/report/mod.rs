//! Promotion reports.
//!
//! A [`PromotionReport`] is built once, at the end of an attempt that reached
//! a terminal merge outcome, and never changes afterwards. It renders to three
//! artifacts: the operation log, a JSON record, and a human summary (see
//! [`artifacts`]).

pub mod artifacts;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::Serialize;
use sfci_git::{CommitSummary, remote_ref};

use crate::request::{PromotionBranchName, PromotionRequest};

pub use artifacts::{ArtifactPaths, ReportError, write_artifacts};

// ---------------------------------------------------------------------------
// MergeOutcome
// ---------------------------------------------------------------------------

/// Both index sides of one conflicted file.
///
/// `None` means git had no blob for that side (added on one side only, or
/// deleted on one side).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConflictVersions {
    /// Stage 2: the target branch's content.
    pub ours: Option<Vec<u8>>,
    /// Stage 3: the source branch's content.
    pub theirs: Option<Vec<u8>>,
}

/// How the merge attempt ended. Exactly one variant per attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merged cleanly and pushed.
    Success {
        /// Commits the merge introduced on top of the target, newest first.
        commits: Vec<CommitSummary>,
        /// The branch that was pushed.
        pushed_ref: String,
    },
    /// Merge stopped on conflicts and was aborted. Nothing was pushed.
    Conflict {
        conflicted_files: BTreeSet<String>,
        versions: BTreeMap<String, ConflictVersions>,
    },
}

impl MergeOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Conflict { .. } => "conflict",
        }
    }
}

// ---------------------------------------------------------------------------
// PromotionReport
// ---------------------------------------------------------------------------

/// The complete, immutable record of one promotion attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromotionReport {
    repository: String,
    source_branch: String,
    target_branch: String,
    promotion_branch: PromotionBranchName,
    timestamp: String,
    outcome: MergeOutcome,
    branch_url: Option<String>,
    log: Vec<String>,
}

impl PromotionReport {
    /// Assemble a report. `branch_url` is dropped for non-success outcomes.
    #[must_use]
    pub fn new(
        request: &PromotionRequest,
        timestamp: String,
        outcome: MergeOutcome,
        branch_url: Option<String>,
        log: Vec<String>,
    ) -> Self {
        let branch_url = branch_url.filter(|_| outcome.is_success());
        Self {
            repository: request.repository().to_owned(),
            source_branch: request.source_branch().to_owned(),
            target_branch: request.target_branch().to_owned(),
            promotion_branch: request.promotion_branch(),
            timestamp,
            outcome,
            branch_url,
            log,
        }
    }

    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    #[must_use]
    pub fn source_branch(&self) -> &str {
        &self.source_branch
    }

    #[must_use]
    pub fn target_branch(&self) -> &str {
        &self.target_branch
    }

    #[must_use]
    pub const fn promotion_branch(&self) -> &PromotionBranchName {
        &self.promotion_branch
    }

    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    #[must_use]
    pub const fn outcome(&self) -> &MergeOutcome {
        &self.outcome
    }

    #[must_use]
    pub fn branch_url(&self) -> Option<&str> {
        self.branch_url.as_deref()
    }

    #[must_use]
    pub fn log(&self) -> &[String] {
        &self.log
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        self.outcome.is_success()
    }

    /// The machine-readable form written to `promotion.json`.
    #[must_use]
    pub fn to_record(&self) -> PromotionRecord {
        let (commits, conflicted_files, conflicts) = match &self.outcome {
            MergeOutcome::Success { commits, .. } => (Some(commits.clone()), None, None),
            MergeOutcome::Conflict {
                conflicted_files,
                versions,
            } => {
                let conflicts = conflicted_files
                    .iter()
                    .map(|path| {
                        let sides = versions.get(path).cloned().unwrap_or_default();
                        ConflictRecord {
                            path: path.clone(),
                            ours: sides.ours.as_deref().map(lossy),
                            theirs: sides.theirs.as_deref().map(lossy),
                        }
                    })
                    .collect();
                (
                    None,
                    Some(conflicted_files.iter().cloned().collect()),
                    Some(conflicts),
                )
            }
        };

        PromotionRecord {
            repository: self.repository.clone(),
            source_branch: self.source_branch.clone(),
            target_branch: self.target_branch.clone(),
            promotion_branch: self.promotion_branch.as_str().to_owned(),
            timestamp: self.timestamp.clone(),
            success: self.success(),
            outcome: self.outcome.label(),
            branch_url: self.branch_url.clone(),
            commits,
            conflicted_files,
            conflicts,
        }
    }

    /// The operation log, one step per line.
    #[must_use]
    pub fn render_log(&self) -> String {
        let mut out = self.log.join("\n");
        out.push('\n');
        out
    }

    /// A human-readable summary, including both sides of every conflict.
    #[must_use]
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Promotion summary");
        let _ = writeln!(out, "=================");
        let _ = writeln!(out, "Repository:       {}", self.repository);
        let _ = writeln!(out, "Source branch:    {}", self.source_branch);
        let _ = writeln!(out, "Target branch:    {}", self.target_branch);
        let _ = writeln!(out, "Promotion branch: {}", self.promotion_branch);
        let _ = writeln!(out, "Timestamp:        {}", self.timestamp);

        match &self.outcome {
            MergeOutcome::Success { commits, pushed_ref } => {
                let _ = writeln!(out, "Result:           SUCCESS");
                let _ = writeln!(out);
                let _ = writeln!(out, "Pushed {pushed_ref} to origin.");
                if let Some(url) = &self.branch_url {
                    let _ = writeln!(out, "Branch URL: {url}");
                }
                let _ = writeln!(out);
                let _ = writeln!(out, "Commits introduced ({}):", commits.len());
                for commit in commits {
                    let _ = writeln!(out, "  {commit}");
                }
            }
            MergeOutcome::Conflict {
                conflicted_files,
                versions,
            } => {
                let _ = writeln!(out, "Result:           CONFLICT");
                let _ = writeln!(out);
                let _ = writeln!(out, "Conflicted files ({}):", conflicted_files.len());
                for path in conflicted_files {
                    let _ = writeln!(out, "  - {path}");
                }
                let _ = writeln!(out);
                let _ = writeln!(out, "The merge was aborted and nothing was pushed.");
                let _ = writeln!(out, "To resolve manually:");
                let _ = writeln!(out, "  git fetch origin");
                let _ = writeln!(
                    out,
                    "  git checkout -b {} {}",
                    self.promotion_branch,
                    remote_ref(&self.target_branch)
                );
                let _ = writeln!(out, "  git merge --no-ff {}", remote_ref(&self.source_branch));

                for path in conflicted_files {
                    let sides = versions.get(path).cloned().unwrap_or_default();
                    let _ = writeln!(out);
                    write_side(&mut out, path, "ours", &self.target_branch, sides.ours.as_deref());
                    write_side(
                        &mut out,
                        path,
                        "theirs",
                        &self.source_branch,
                        sides.theirs.as_deref(),
                    );
                }
            }
        }
        out
    }
}

fn write_side(out: &mut String, path: &str, side: &str, branch: &str, content: Option<&[u8]>) {
    let _ = writeln!(out, "--- {path} ({side}: {branch}) ---");
    match content {
        Some(bytes) => {
            let text = lossy(bytes);
            out.push_str(&text);
            if !text.ends_with('\n') {
                out.push('\n');
            }
        }
        None => {
            let _ = writeln!(out, "(not found)");
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// ---------------------------------------------------------------------------
// Serialized forms
// ---------------------------------------------------------------------------

/// JSON record of one attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PromotionRecord {
    pub repository: String,
    pub source_branch: String,
    pub target_branch: String,
    pub promotion_branch: String,
    pub timestamp: String,
    pub success: bool,
    pub outcome: &'static str,
    pub branch_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commits: Option<Vec<CommitSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicted_files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<ConflictRecord>>,
}

/// One conflicted file with both sides as (lossy) UTF-8 text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConflictRecord {
    pub path: String,
    pub ours: Option<String>,
    pub theirs: Option<String>,
}
