//! Branch promotion: merge a source branch into a fresh branch cut from the
//! target, push it on a clean merge, and report both sides of every file on a
//! conflict.
//!
//! [`BranchPromoter`] drives the [`state`] machine through a
//! [`VersionControlClient`] and a [`RemoteHostingClient`]. Each attempt owns a
//! temporary clone and a private [`ToolHome`] for the login, both deleted
//! before `promote` returns.

pub mod state;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use sfci_git::{
    Deadline, MergeOptions, MergeResult, Stage, ToolHome, VersionControlClient, WorkingCopy,
    remote_ref,
};
use tracing::instrument;

use crate::error::PromoteError;
use crate::hosting::{RemoteHostingClient, Session};
use crate::report::{ArtifactPaths, ConflictVersions, MergeOutcome, PromotionReport, write_artifacts};
use crate::request::{BranchRole, PromotionRequest};
use crate::time::now_iso8601;

use state::{Attempt, PromotionPhase};

/// Default overall budget for one attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A unit of work that can fail or time out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Authenticate,
    Clone,
    Fetch,
    VerifyBranches,
    CreateBranch,
    Merge,
    CollectCommits,
    Push,
    CollectConflicts,
    Abort,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Authenticate => "authenticate",
            Self::Clone => "clone",
            Self::Fetch => "fetch",
            Self::VerifyBranches => "verify-branches",
            Self::CreateBranch => "create-branch",
            Self::Merge => "merge",
            Self::CollectCommits => "collect-commits",
            Self::Push => "push",
            Self::CollectConflicts => "collect-conflicts",
            Self::Abort => "abort",
        };
        f.write_str(name)
    }
}

fn checkpoint(deadline: Deadline, step: Step) -> Result<(), PromoteError> {
    if deadline.is_expired() {
        return Err(PromoteError::Timeout { step });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// BranchPromoter
// ---------------------------------------------------------------------------

pub struct BranchPromoter<G, H> {
    git: G,
    host: H,
    host_name: String,
    timeout: Option<Duration>,
    remote_url: Option<String>,
}

impl<G: VersionControlClient, H: RemoteHostingClient> BranchPromoter<G, H> {
    /// A promoter for repositories on `host_name`, with the default timeout.
    #[must_use]
    pub fn new(git: G, host: H, host_name: impl Into<String>) -> Self {
        Self {
            git,
            host,
            host_name: host_name.into(),
            timeout: Some(DEFAULT_TIMEOUT),
            remote_url: None,
        }
    }

    /// Overall budget for one attempt. `None` disables the deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Clone from `url` instead of the URL the hosting client resolves.
    #[must_use]
    pub fn with_remote_url(mut self, url: Option<String>) -> Self {
        self.remote_url = url;
        self
    }

    /// Run one promotion attempt.
    ///
    /// Returns a report for both clean and conflicted merges.
    ///
    /// # Errors
    /// Any [`PromoteError`]: authentication, missing branches, an existing
    /// promotion branch, git failures, or the deadline expiring.
    #[instrument(skip_all, fields(
        repository = request.repository(),
        source = request.source_branch(),
        target = request.target_branch(),
    ))]
    pub fn promote(&self, request: &PromotionRequest) -> Result<PromotionReport, PromoteError> {
        let timestamp = now_iso8601();
        let deadline = self.timeout.map_or(Deadline::NONE, Deadline::after);
        let mut attempt = Attempt::new();
        attempt.note(format_args!(
            "promoting {} into {} in {}",
            request.source_branch(),
            request.target_branch(),
            request.repository()
        ));

        let home = ToolHome::new().map_err(PromoteError::ToolHome)?;
        let result = self.promote_with(request, &home, deadline, &mut attempt);
        let dir = home.path().to_path_buf();
        if let Err(e) = home.release() {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to remove tool home");
        }
        let (outcome, branch_url) = result?;

        Ok(PromotionReport::new(
            request,
            timestamp,
            outcome,
            branch_url,
            attempt.into_log(),
        ))
    }

    /// [`promote`](Self::promote), then write the report's artifacts under
    /// `artifact_root`.
    ///
    /// # Errors
    /// As `promote`, plus [`PromoteError::Report`] if writing fails.
    pub fn promote_and_record(
        &self,
        request: &PromotionRequest,
        artifact_root: &Path,
    ) -> Result<(PromotionReport, ArtifactPaths), PromoteError> {
        let report = self.promote(request)?;
        let paths = write_artifacts(&report, artifact_root)?;
        Ok((report, paths))
    }

    fn promote_with(
        &self,
        request: &PromotionRequest,
        home: &ToolHome,
        deadline: Deadline,
        attempt: &mut Attempt,
    ) -> Result<(MergeOutcome, Option<String>), PromoteError> {
        let session = self.authenticate(request, home, deadline)?;
        attempt.advance(
            PromotionPhase::Authenticated,
            format_args!("authenticated with {}", session.host()),
        )?;

        checkpoint(deadline, Step::Clone)?;
        let url = self
            .remote_url
            .clone()
            .unwrap_or_else(|| self.host.clone_url(&session, request.repository()));
        let wc = self
            .git
            .clone_repo(&url, home, deadline)
            .map_err(|e| PromoteError::from_git(Step::Clone, "", e))?;
        attempt.note(format_args!("cloned {url}"));

        let outcome = self.promote_in(&wc, request, attempt);
        let dir = wc.path().to_path_buf();
        if let Err(e) = wc.release() {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to remove working copy");
        }
        let outcome = outcome?;

        let branch_url = outcome.is_success().then(|| {
            self.host.browse_url(
                &session,
                request.repository(),
                request.promotion_branch().as_str(),
            )
        });
        Ok((outcome, branch_url))
    }

    fn authenticate(
        &self,
        request: &PromotionRequest,
        home: &ToolHome,
        deadline: Deadline,
    ) -> Result<Session, PromoteError> {
        checkpoint(deadline, Step::Authenticate)?;
        let session = self
            .host
            .authenticate(request.credential(), home, deadline)
            .map_err(|e| PromoteError::from_host(&self.host_name, e))?;
        let verified = self
            .host
            .verify(&session, deadline)
            .map_err(|e| PromoteError::from_host(&self.host_name, e))?;
        if !verified {
            return Err(PromoteError::Authentication {
                host: session.host().to_owned(),
                message: "credential was accepted but the session could not be verified"
                    .to_owned(),
            });
        }
        Ok(session)
    }

    fn promote_in(
        &self,
        wc: &WorkingCopy,
        request: &PromotionRequest,
        attempt: &mut Attempt,
    ) -> Result<MergeOutcome, PromoteError> {
        let deadline = wc.deadline();
        let source = request.source_branch();
        let target = request.target_branch();
        let promo = request.promotion_branch();

        checkpoint(deadline, Step::Fetch)?;
        self.git
            .fetch_all(wc)
            .map_err(|e| PromoteError::from_git(Step::Fetch, "", e))?;
        attempt.advance(PromotionPhase::Cloned, "fetched all branches")?;

        checkpoint(deadline, Step::VerifyBranches)?;
        for role in [BranchRole::Source, BranchRole::Target] {
            let name = request.branch(role);
            if !self.branch_exists(wc, name)? {
                return Err(PromoteError::BranchNotFound {
                    role,
                    name: name.to_owned(),
                });
            }
        }
        if self.branch_exists(wc, promo.as_str())? {
            return Err(PromoteError::PromotionBranchExists {
                name: promo.as_str().to_owned(),
            });
        }
        attempt.advance(
            PromotionPhase::BranchesVerified,
            format_args!("{source} and {target} exist; {promo} does not"),
        )?;

        checkpoint(deadline, Step::CreateBranch)?;
        let base = remote_ref(target);
        self.git
            .create_branch_from(wc, promo.as_str(), &base)
            .map_err(|e| PromoteError::from_git(Step::CreateBranch, promo.as_str(), e))?;
        attempt.advance(
            PromotionPhase::PromotionBranchCreated,
            format_args!("created {promo} from {base}"),
        )?;

        checkpoint(deadline, Step::Merge)?;
        let incoming = remote_ref(source);
        let options = MergeOptions::no_ff(format!("Promote {source} into {target}"));
        let result = self
            .git
            .merge(wc, &incoming, &options)
            .map_err(|e| PromoteError::from_git(Step::Merge, "", e))?;
        attempt.advance(
            PromotionPhase::MergeAttempted,
            format_args!("merged {incoming} into {promo}"),
        )?;

        match result {
            MergeResult::Clean => self.finish_clean(wc, request, attempt),
            MergeResult::Conflict => self.finish_conflict(wc, attempt),
        }
    }

    fn branch_exists(&self, wc: &WorkingCopy, name: &str) -> Result<bool, PromoteError> {
        self.git
            .branch_exists(wc, name)
            .map_err(|e| PromoteError::from_git(Step::VerifyBranches, name, e))
    }

    fn finish_clean(
        &self,
        wc: &WorkingCopy,
        request: &PromotionRequest,
        attempt: &mut Attempt,
    ) -> Result<MergeOutcome, PromoteError> {
        let promo = request.promotion_branch();
        attempt.advance(PromotionPhase::MergeClean, "merge committed without conflicts")?;

        checkpoint(wc.deadline(), Step::CollectCommits)?;
        let commits = self
            .git
            .commits_between(wc, &remote_ref(request.target_branch()), promo.as_str())
            .map_err(|e| PromoteError::from_git(Step::CollectCommits, "", e))?;
        attempt.note(format_args!("{} commit(s) introduced", commits.len()));

        checkpoint(wc.deadline(), Step::Push)?;
        self.git
            .push(wc, promo.as_str())
            .map_err(|e| PromoteError::from_git(Step::Push, promo.as_str(), e))?;
        attempt.advance(PromotionPhase::Pushed, format_args!("pushed {promo} to origin"))?;
        attempt.advance(PromotionPhase::DoneSuccess, "promotion complete")?;

        Ok(MergeOutcome::Success {
            commits,
            pushed_ref: promo.as_str().to_owned(),
        })
    }

    fn finish_conflict(
        &self,
        wc: &WorkingCopy,
        attempt: &mut Attempt,
    ) -> Result<MergeOutcome, PromoteError> {
        // Whatever happens while collecting, the merge must be aborted.
        let collected = self.collect_conflicts(wc);
        if let Ok((files, _)) = &collected {
            let listed: Vec<&str> = files.iter().map(String::as_str).collect();
            attempt.advance(
                PromotionPhase::MergeConflict,
                format_args!("{} conflicted file(s): {}", files.len(), listed.join(", ")),
            )?;
        }

        let aborted = self.abort(wc);
        let (conflicted_files, versions) = collected?;
        aborted?;
        attempt.advance(PromotionPhase::Aborted, "merge aborted; nothing pushed")?;
        attempt.advance(PromotionPhase::DoneConflict, "promotion stopped on conflicts")?;

        Ok(MergeOutcome::Conflict {
            conflicted_files,
            versions,
        })
    }

    fn collect_conflicts(
        &self,
        wc: &WorkingCopy,
    ) -> Result<(BTreeSet<String>, BTreeMap<String, ConflictVersions>), PromoteError> {
        let step = Step::CollectConflicts;
        checkpoint(wc.deadline(), step)?;
        let files = self
            .git
            .conflicted_files(wc)
            .map_err(|e| PromoteError::from_git(step, "", e))?;

        let mut versions = BTreeMap::new();
        for path in &files {
            let ours = self
                .git
                .show_staged(wc, Stage::Ours, path)
                .map_err(|e| PromoteError::from_git(step, "", e))?;
            let theirs = self
                .git
                .show_staged(wc, Stage::Theirs, path)
                .map_err(|e| PromoteError::from_git(step, "", e))?;
            versions.insert(path.clone(), ConflictVersions { ours, theirs });
        }
        Ok((files, versions))
    }

    fn abort(&self, wc: &WorkingCopy) -> Result<(), PromoteError> {
        self.git
            .abort_merge(wc)
            .map_err(|e| PromoteError::from_git(Step::Abort, "", e))?;
        let still_merging = self
            .git
            .merge_in_progress(wc)
            .map_err(|e| PromoteError::from_git(Step::Abort, "", e))?;
        if still_merging {
            return Err(PromoteError::Abort {
                message: "a merge is still in progress after `git merge --abort`".to_owned(),
            });
        }
        Ok(())
    }
}
