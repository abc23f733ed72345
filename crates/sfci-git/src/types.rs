//! Value types used in [`VersionControlClient`](crate::VersionControlClient)
//! signatures.
//!
//! None of these carry backend details; the git CLI backend and test doubles
//! speak the same vocabulary.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;

use crate::process::Deadline;

/// Name of the remote every working copy is cloned from.
pub const ORIGIN: &str = "origin";

/// The remote-tracking ref for `branch` on [`ORIGIN`] (`origin/<branch>`).
#[must_use]
pub fn remote_ref(branch: &str) -> String {
    format!("{ORIGIN}/{branch}")
}

// ---------------------------------------------------------------------------
// ToolHome
// ---------------------------------------------------------------------------

/// Private configuration directories for `git` and `gh`, scoped to one
/// operation.
///
/// Every tool run with [`env`](Self::env) reads and writes its global config
/// here (`GIT_CONFIG_GLOBAL`, `GH_CONFIG_DIR`), so logins and credential
/// helpers never touch the operator's own `~/.gitconfig` or gh hosts file.
/// The directory is deleted when the `ToolHome` is dropped or
/// [released](Self::release).
#[derive(Debug)]
pub struct ToolHome {
    dir: TempDir,
}

impl ToolHome {
    /// Create a fresh home in the system temp dir.
    ///
    /// # Errors
    /// Returns the I/O error from creating the directory.
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("sfci-home-").tempdir()?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Environment that points git and gh at this home.
    #[must_use]
    pub fn env(&self) -> Vec<(String, String)> {
        let root = self.dir.path();
        vec![
            (
                "GIT_CONFIG_GLOBAL".to_owned(),
                root.join("gitconfig").to_string_lossy().into_owned(),
            ),
            (
                "GH_CONFIG_DIR".to_owned(),
                root.join("gh").to_string_lossy().into_owned(),
            ),
        ]
    }

    /// Delete the home now.
    ///
    /// # Errors
    /// Returns the I/O error from removing the directory.
    pub fn release(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

// ---------------------------------------------------------------------------
// WorkingCopy
// ---------------------------------------------------------------------------

/// An exclusively owned checkout, scoped to one operation.
///
/// The checkout lives inside a temporary directory that is deleted when the
/// `WorkingCopy` is dropped or [released](Self::release). Every subprocess run
/// against it honours the deadline it was cloned under and the environment of
/// the [`ToolHome`] it was cloned with.
#[derive(Debug)]
pub struct WorkingCopy {
    dir: TempDir,
    root: PathBuf,
    deadline: Deadline,
    env: Vec<(String, String)>,
}

impl WorkingCopy {
    /// Wrap a checkout at `root`, which must live inside `dir`.
    #[must_use]
    pub const fn new(dir: TempDir, root: PathBuf, deadline: Deadline) -> Self {
        Self {
            dir,
            root,
            deadline,
            env: Vec::new(),
        }
    }

    /// Run every later command with `env` set.
    #[must_use]
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Environment applied to commands run in this checkout.
    #[must_use]
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// The top-level directory of the checkout.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// The deadline inherited from the clone.
    #[must_use]
    pub const fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Delete the checkout now, reporting cleanup failures instead of
    /// swallowing them as `Drop` would.
    ///
    /// # Errors
    /// Returns the I/O error from removing the temporary directory.
    pub fn release(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

// ---------------------------------------------------------------------------
// Merge types
// ---------------------------------------------------------------------------

/// Options for [`merge`](crate::VersionControlClient::merge).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Always create a merge commit (`--no-ff`).
    pub no_fast_forward: bool,
    /// Merge commit message. git's default message is used when `None`.
    pub message: Option<String>,
}

impl MergeOptions {
    /// `--no-ff` with the given commit message.
    #[must_use]
    pub fn no_ff(message: impl Into<String>) -> Self {
        Self {
            no_fast_forward: true,
            message: Some(message.into()),
        }
    }
}

/// Result of a merge attempt that ran to completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeResult {
    /// The merge committed with no conflicts.
    Clean,
    /// The merge stopped with unmerged paths; a merge is now in progress.
    Conflict,
}

/// Index stage of an unmerged path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Stage 1: the common ancestor.
    Base,
    /// Stage 2: the branch being merged into (the target side).
    Ours,
    /// Stage 3: the branch being merged in (the source side).
    Theirs,
}

impl Stage {
    /// The numeric stage as git writes it.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Base => 1,
            Self::Ours => 2,
            Self::Theirs => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

// ---------------------------------------------------------------------------
// CommitSummary
// ---------------------------------------------------------------------------

/// One line of history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    /// Full commit hash.
    pub id: String,
    /// Author name.
    pub author: String,
    /// Author date, strict ISO-8601 as reported by git.
    pub date: String,
    /// First line of the commit message.
    pub subject: String,
}

impl CommitSummary {
    /// The first 8 characters of the hash.
    #[must_use]
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

impl fmt::Display for CommitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.short_id(), self.subject, self.author)
    }
}
