//! Promotion inputs: the request, its credential, and the derived branch name.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Prefix of every promotion branch.
pub const PROMOTION_PREFIX: &str = "promotion/";

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// An opaque secret (hosting token, Salesforce auth URL).
///
/// `Debug` is redacted so a credential can never leak through logs or error
/// chains; the value is only reachable through [`Credential::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret. Only hand this to a process's stdin.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// BranchRole
// ---------------------------------------------------------------------------

/// Which side of a promotion a branch plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchRole {
    /// The branch being promoted (merged in).
    Source,
    /// The branch the promotion is based on.
    Target,
}

impl fmt::Display for BranchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

// ---------------------------------------------------------------------------
// PromotionBranchName
// ---------------------------------------------------------------------------

/// `promotion/<source>-to-<target>`.
///
/// A pure function of the two branch names. No ref-format validation is done
/// here; git rejects an unusable name when the branch is created.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PromotionBranchName(String);

impl PromotionBranchName {
    #[must_use]
    pub fn derive(source: &str, target: &str) -> Self {
        Self(format!("{PROMOTION_PREFIX}{source}-to-{target}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PromotionBranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PromotionBranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// PromotionRequest
// ---------------------------------------------------------------------------

/// Why a [`PromotionRequest`] was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("repository '{repository}' must look like 'owner/name'")]
    InvalidRepository { repository: String },

    #[error("source and target are both '{branch}'; a branch cannot be promoted into itself")]
    SameBranch { branch: String },
}

/// Immutable input to one promotion attempt.
#[derive(Clone, Debug)]
pub struct PromotionRequest {
    repository: String,
    source_branch: String,
    target_branch: String,
    credential: Credential,
}

impl PromotionRequest {
    /// Validate and build a request.
    ///
    /// # Errors
    /// Rejects empty fields, a repository that is not `owner/name` shaped
    /// (nested groups such as `group/sub/name` are accepted), and identical
    /// source and target branches.
    pub fn new(
        repository: impl Into<String>,
        source_branch: impl Into<String>,
        target_branch: impl Into<String>,
        credential: Credential,
    ) -> Result<Self, RequestError> {
        let repository = repository.into().trim().to_owned();
        let source_branch = source_branch.into().trim().to_owned();
        let target_branch = target_branch.into().trim().to_owned();

        if repository.is_empty() {
            return Err(RequestError::Empty { field: "repository" });
        }
        if source_branch.is_empty() {
            return Err(RequestError::Empty {
                field: "source branch",
            });
        }
        if target_branch.is_empty() {
            return Err(RequestError::Empty {
                field: "target branch",
            });
        }
        if credential.is_empty() {
            return Err(RequestError::Empty { field: "credential" });
        }
        let segments: Vec<&str> = repository.split('/').collect();
        if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
            return Err(RequestError::InvalidRepository { repository });
        }
        if source_branch == target_branch {
            return Err(RequestError::SameBranch {
                branch: source_branch,
            });
        }

        Ok(Self {
            repository,
            source_branch,
            target_branch,
            credential,
        })
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
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The branch this request will create.
    #[must_use]
    pub fn promotion_branch(&self) -> PromotionBranchName {
        PromotionBranchName::derive(&self.source_branch, &self.target_branch)
    }

    /// The branch name playing `role`.
    #[must_use]
    pub fn branch(&self, role: BranchRole) -> &str {
        match role {
            BranchRole::Source => &self.source_branch,
            BranchRole::Target => &self.target_branch,
        }
    }
}
