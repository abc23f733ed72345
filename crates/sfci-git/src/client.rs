//! The [`VersionControlClient`] trait — the boundary between sfci and git.
//!
//! The promotion workflow talks to git exclusively through this trait, so a
//! test double can stand in for the real backend. The trait is object-safe.
//!
//! | Group      | Methods                                                     |
//! |------------|-------------------------------------------------------------|
//! | Checkout   | `clone_repo`, `fetch_all`, `create_branch_from`             |
//! | Refs       | `branch_exists`                                             |
//! | Merge      | `merge`, `conflicted_files`, `show_staged`, `abort_merge`, `merge_in_progress` |
//! | Remote     | `push`                                                      |
//! | History    | `commits_between`                                           |

#![allow(clippy::missing_errors_doc)]

use std::collections::BTreeSet;

use crate::error::GitError;
use crate::process::Deadline;
use crate::types::{CommitSummary, MergeOptions, MergeResult, Stage, ToolHome, WorkingCopy};

/// Version-control operations needed to build a promotion branch.
pub trait VersionControlClient {
    /// Clone `url` into a fresh, exclusively owned checkout.
    ///
    /// The clone and every later call against the returned [`WorkingCopy`]
    /// run under `deadline` with `home`'s environment.
    ///
    /// Replaces: `git clone <url> <dir>`.
    fn clone_repo(
        &self,
        url: &str,
        home: &ToolHome,
        deadline: Deadline,
    ) -> Result<WorkingCopy, GitError>;

    /// Fetch every branch from the remote, pruning deleted ones.
    ///
    /// Replaces: `git fetch --all --prune`.
    fn fetch_all(&self, wc: &WorkingCopy) -> Result<(), GitError>;

    /// Whether `branch` exists as a remote-tracking branch on origin.
    ///
    /// Replaces: `git show-ref --verify refs/remotes/origin/<branch>`.
    fn branch_exists(&self, wc: &WorkingCopy, branch: &str) -> Result<bool, GitError>;

    /// Create `new_branch` at `base_ref` and check it out.
    ///
    /// Replaces: `git checkout -b <new_branch> <base_ref>`.
    fn create_branch_from(
        &self,
        wc: &WorkingCopy,
        new_branch: &str,
        base_ref: &str,
    ) -> Result<(), GitError>;

    /// Merge `reference` into the checked-out branch.
    ///
    /// Conflicts are a normal [`MergeResult::Conflict`], leaving the merge in
    /// progress. A merge that fails for any other reason is an error.
    ///
    /// Replaces: `git merge [--no-ff] <reference>`.
    fn merge(
        &self,
        wc: &WorkingCopy,
        reference: &str,
        options: &MergeOptions,
    ) -> Result<MergeResult, GitError>;

    /// Paths with unresolved conflicts, sorted.
    ///
    /// Replaces: `git diff --name-only --diff-filter=U`.
    fn conflicted_files(&self, wc: &WorkingCopy) -> Result<BTreeSet<String>, GitError>;

    /// Content of `path` at `stage` in the index, or `None` when that side
    /// has no blob (e.g. the file was deleted on one side).
    ///
    /// Replaces: `git show :<stage>:<path>`.
    fn show_staged(
        &self,
        wc: &WorkingCopy,
        stage: Stage,
        path: &str,
    ) -> Result<Option<Vec<u8>>, GitError>;

    /// Abandon an in-progress merge and restore the pre-merge state.
    ///
    /// Replaces: `git merge --abort`.
    fn abort_merge(&self, wc: &WorkingCopy) -> Result<(), GitError>;

    /// Whether a merge is currently in progress.
    ///
    /// Replaces: `git rev-parse --verify MERGE_HEAD`.
    fn merge_in_progress(&self, wc: &WorkingCopy) -> Result<bool, GitError>;

    /// Push the local `branch` to the same name on origin. Never forces.
    ///
    /// Replaces: `git push origin <branch>`.
    fn push(&self, wc: &WorkingCopy, branch: &str) -> Result<(), GitError>;

    /// Commits reachable from `to` but not from `from`, newest first.
    ///
    /// Replaces: `git log <from>..<to>`.
    fn commits_between(
        &self,
        wc: &WorkingCopy,
        from: &str,
        to: &str,
    ) -> Result<Vec<CommitSummary>, GitError>;
}
