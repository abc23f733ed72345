//! Error type for branch promotion.
//!
//! A merge conflict is not an error: it is a [`MergeOutcome`] recorded in the
//! report. Everything here aborts the attempt without producing a report.
//!
//! [`MergeOutcome`]: crate::report::MergeOutcome

use sfci_git::GitError;
use thiserror::Error;

use crate::hosting::HostError;
use crate::promote::Step;
use crate::promote::state::InvalidTransition;
use crate::report::ReportError;
use crate::request::{BranchRole, RequestError};

#[derive(Debug, Error)]
pub enum PromoteError {
    #[error("invalid promotion request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("authentication with {host} failed: {message}")]
    Authentication { host: String, message: String },

    #[error("{role} branch '{name}' does not exist on the remote")]
    BranchNotFound { role: BranchRole, name: String },

    #[error(
        "promotion branch '{name}' already exists on the remote; delete it or merge it before promoting again"
    )]
    PromotionBranchExists { name: String },

    /// The private config directory for git and gh could not be created.
    #[error("could not create tool home: {0}")]
    ToolHome(#[source] std::io::Error),

    #[error("clone failed: {0}")]
    Clone(#[source] GitError),

    #[error("fetch failed: {0}")]
    Fetch(#[source] GitError),

    #[error("could not create branch '{branch}': {source}")]
    CreateBranch {
        branch: String,
        #[source]
        source: GitError,
    },

    /// The merge command failed without leaving unmerged paths.
    #[error("merge failed: {0}")]
    Merge(#[source] GitError),

    #[error("push of '{branch}' failed: {source}")]
    Push {
        branch: String,
        #[source]
        source: GitError,
    },

    /// The conflicted merge could not be rolled back.
    #[error("merge abort failed: {message}")]
    Abort { message: String },

    /// Reading repository state (refs, history, index) failed.
    #[error("{step} failed: {source}")]
    Inspect {
        step: Step,
        #[source]
        source: GitError,
    },

    #[error("promotion timed out during {step}")]
    Timeout { step: Step },

    #[error("could not write promotion report: {0}")]
    Report(#[from] ReportError),

    #[error("internal error: {0}")]
    State(#[from] InvalidTransition),
}

impl PromoteError {
    /// Map a git failure during `step` onto the matching variant.
    /// Deadline expiry always becomes [`PromoteError::Timeout`].
    pub(crate) fn from_git(step: Step, branch: &str, err: GitError) -> Self {
        if err.is_timeout() {
            return Self::Timeout { step };
        }
        match step {
            Step::Clone => Self::Clone(err),
            Step::Fetch => Self::Fetch(err),
            Step::CreateBranch => Self::CreateBranch {
                branch: branch.to_owned(),
                source: err,
            },
            Step::Merge => Self::Merge(err),
            Step::Push => Self::Push {
                branch: branch.to_owned(),
                source: err,
            },
            Step::Abort => Self::Abort {
                message: err.to_string(),
            },
            Step::Authenticate
            | Step::VerifyBranches
            | Step::CollectCommits
            | Step::CollectConflicts => Self::Inspect { step, source: err },
        }
    }

    pub(crate) fn from_host(host: &str, err: HostError) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                step: Step::Authenticate,
            };
        }
        Self::Authentication {
            host: host.to_owned(),
            message: err.to_string(),
        }
    }

    /// The step that failed, when the failure is tied to one.
    #[must_use]
    pub const fn step(&self) -> Option<Step> {
        match self {
            Self::Authentication { .. } => Some(Step::Authenticate),
            Self::BranchNotFound { .. } | Self::PromotionBranchExists { .. } => {
                Some(Step::VerifyBranches)
            }
            Self::Clone(_) => Some(Step::Clone),
            Self::Fetch(_) => Some(Step::Fetch),
            Self::CreateBranch { .. } => Some(Step::CreateBranch),
            Self::Merge(_) => Some(Step::Merge),
            Self::Push { .. } => Some(Step::Push),
            Self::Abort { .. } => Some(Step::Abort),
            Self::Inspect { step, .. } | Self::Timeout { step } => Some(*step),
            Self::InvalidRequest(_) | Self::ToolHome(_) | Self::Report(_) | Self::State(_) => {
                None
            }
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfci_git::ProcessError;

    fn failed() -> GitError {
        GitError::CommandFailed {
            command: "git push".to_owned(),
            exit_code: Some(1),
            stderr: "rejected".to_owned(),
        }
    }

    #[test]
    fn git_timeouts_become_timeout() {
        let err = GitError::Process(ProcessError::TimedOut {
            command: "git fetch".to_owned(),
        });
        let mapped = PromoteError::from_git(Step::Fetch, "", err);
        assert!(mapped.is_timeout());
        assert_eq!(mapped.step(), Some(Step::Fetch));
    }

    #[test]
    fn push_failure_names_branch_and_tool_message() {
        let err = PromoteError::from_git(Step::Push, "promotion/a-to-b", failed());
        let msg = err.to_string();
        assert!(msg.contains("promotion/a-to-b"), "{msg}");
        assert!(msg.contains("rejected"), "{msg}");
        assert_eq!(err.step(), Some(Step::Push));
    }

    #[test]
    fn inspection_steps_map_to_inspect() {
        let err = PromoteError::from_git(Step::CollectCommits, "", failed());
        assert!(matches!(err, PromoteError::Inspect { step: Step::CollectCommits, .. }));
    }

    #[test]
    fn host_rejection_is_authentication() {
        let err = PromoteError::from_host(
            "github.com",
            HostError::Rejected {
                host: "github.com".to_owned(),
                message: "bad token".to_owned(),
            },
        );
        assert!(matches!(err, PromoteError::Authentication { .. }));
        assert_eq!(err.step(), Some(Step::Authenticate));
    }

    #[test]
    fn branch_not_found_message() {
        let err = PromoteError::BranchNotFound {
            role: BranchRole::Source,
            name: "feature/z".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "source branch 'feature/z' does not exist on the remote"
        );
    }
}
