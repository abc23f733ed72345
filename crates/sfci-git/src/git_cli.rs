//! The git-CLI-backed implementation of [`VersionControlClient`].

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::instrument;

use crate::client::VersionControlClient;
use crate::error::GitError;
use crate::process::{Deadline, Invocation, ProcessOutput};
use crate::types::{
    CommitSummary, MergeOptions, MergeResult, ORIGIN, Stage, ToolHome, WorkingCopy,
};

/// Field separator inside one `git log` record.
const FIELD_SEP: char = '\u{1f}';

/// Committer identity used for merge commits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A [`VersionControlClient`] that shells out to `git`.
///
/// Construct with [`GitCli::new`] and refine with the builder methods.
#[derive(Clone, Debug)]
pub struct GitCli {
    program: String,
    work_root: Option<PathBuf>,
    identity: Option<Identity>,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Use `git` from `PATH`, system temp dir, ambient identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "git".to_owned(),
            work_root: None,
            identity: None,
        }
    }

    /// Use a different git executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Create checkouts under `root` instead of the system temp dir.
    #[must_use]
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    /// Author and commit merges as `identity`.
    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    fn invocation(&self) -> Invocation {
        let mut inv = Invocation::new(&self.program)
            // Never block on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(id) = &self.identity {
            inv = inv
                .arg("-c")
                .arg(format!("user.name={}", id.name))
                .arg("-c")
                .arg(format!("user.email={}", id.email));
        }
        inv
    }

    /// Run git in the checkout; the exit status is left to the caller.
    fn run(&self, wc: &WorkingCopy, args: &[&str]) -> Result<ProcessOutput, GitError> {
        Ok(self
            .invocation()
            .envs(wc.env().iter().cloned())
            .args(args.iter().copied())
            .current_dir(wc.path())
            .run(wc.deadline())?)
    }

    /// Run git in the checkout and require exit status 0.
    fn run_ok(&self, wc: &WorkingCopy, args: &[&str]) -> Result<ProcessOutput, GitError> {
        let out = self.run(wc, args)?;
        ensure_success(out)
    }
}

fn ensure_success(out: ProcessOutput) -> Result<ProcessOutput, GitError> {
    if out.success() {
        Ok(out)
    } else {
        Err(failed(&out))
    }
}

fn failed(out: &ProcessOutput) -> GitError {
    GitError::CommandFailed {
        command: out.command.clone(),
        exit_code: out.exit_code,
        stderr: out.stderr_lossy(),
    }
}

impl VersionControlClient for GitCli {
    #[instrument(skip(self, home))]
    fn clone_repo(
        &self,
        url: &str,
        home: &ToolHome,
        deadline: Deadline,
    ) -> Result<WorkingCopy, GitError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sfci-promote-");
        let dir = match &self.work_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let checkout = dir.path().join("repo");

        let out = self
            .invocation()
            .envs(home.env())
            .args(["clone", "--quiet", "--origin", ORIGIN, url])
            .arg(checkout.to_string_lossy())
            .run(deadline)?;
        ensure_success(out)?;

        tracing::info!(path = %checkout.display(), "cloned");
        Ok(WorkingCopy::new(dir, checkout, deadline).with_env(home.env()))
    }

    fn fetch_all(&self, wc: &WorkingCopy) -> Result<(), GitError> {
        self.run_ok(wc, &["fetch", "--all", "--prune", "--quiet"])?;
        Ok(())
    }

    fn branch_exists(&self, wc: &WorkingCopy, branch: &str) -> Result<bool, GitError> {
        let full = format!("refs/remotes/{ORIGIN}/{branch}");
        let out = self.run(wc, &["show-ref", "--verify", "--quiet", &full])?;
        match out.exit_code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(failed(&out)),
        }
    }

    fn create_branch_from(
        &self,
        wc: &WorkingCopy,
        new_branch: &str,
        base_ref: &str,
    ) -> Result<(), GitError> {
        self.run_ok(
            wc,
            &["checkout", "--quiet", "--no-track", "-b", new_branch, base_ref],
        )?;
        Ok(())
    }

    #[instrument(skip(self, wc, options), fields(no_ff = options.no_fast_forward))]
    fn merge(
        &self,
        wc: &WorkingCopy,
        reference: &str,
        options: &MergeOptions,
    ) -> Result<MergeResult, GitError> {
        let mut args = vec!["merge", "--no-edit"];
        if options.no_fast_forward {
            args.push("--no-ff");
        }
        if let Some(message) = &options.message {
            args.push("-m");
            args.push(message);
        }
        args.push(reference);

        let out = self.run(wc, &args)?;
        if out.success() {
            return Ok(MergeResult::Clean);
        }

        // A failed merge is only a conflict if it left unmerged paths behind;
        // anything else (missing identity, unrelated histories) is a failure.
        if self.conflicted_files(wc)?.is_empty() {
            Err(failed(&out))
        } else {
            Ok(MergeResult::Conflict)
        }
    }

    fn conflicted_files(&self, wc: &WorkingCopy) -> Result<BTreeSet<String>, GitError> {
        let out = self.run_ok(wc, &["diff", "--name-only", "--diff-filter=U", "-z"])?;
        Ok(split_nul(&out.stdout_lossy())
            .map(str::to_owned)
            .collect())
    }

    fn show_staged(
        &self,
        wc: &WorkingCopy,
        stage: Stage,
        path: &str,
    ) -> Result<Option<Vec<u8>>, GitError> {
        let out = self.run_ok(wc, &["ls-files", "--unmerged", "-z", "--", path])?;
        let entries = parse_unmerged(&out.stdout_lossy()).map_err(|message| GitError::Parse {
            command: out.command.clone(),
            message,
        })?;
        let Some(entry) = entries
            .into_iter()
            .find(|e| e.stage == stage.number() && e.path == path)
        else {
            return Ok(None);
        };

        let blob = self.run_ok(wc, &["cat-file", "blob", &entry.oid])?;
        Ok(Some(blob.stdout))
    }

    fn abort_merge(&self, wc: &WorkingCopy) -> Result<(), GitError> {
        self.run_ok(wc, &["merge", "--abort"])?;
        Ok(())
    }

    fn merge_in_progress(&self, wc: &WorkingCopy) -> Result<bool, GitError> {
        let out = self.run(wc, &["rev-parse", "-q", "--verify", "MERGE_HEAD"])?;
        match out.exit_code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(failed(&out)),
        }
    }

    #[instrument(skip(self, wc))]
    fn push(&self, wc: &WorkingCopy, branch: &str) -> Result<(), GitError> {
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        self.run_ok(wc, &["push", "--quiet", ORIGIN, &refspec])?;
        tracing::info!(%branch, "pushed");
        Ok(())
    }

    fn commits_between(
        &self,
        wc: &WorkingCopy,
        from: &str,
        to: &str,
    ) -> Result<Vec<CommitSummary>, GitError> {
        let range = format!("{from}..{to}");
        let out = self.run_ok(
            wc,
            &["log", "-z", "--topo-order", "--format=%H%x1f%an%x1f%aI%x1f%s", &range, "--"],
        )?;
        parse_log(&out.stdout_lossy()).map_err(|message| GitError::Parse {
            command: out.command.clone(),
            message,
        })
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

fn split_nul(s: &str) -> impl Iterator<Item = &str> {
    s.split('\0').filter(|part| !part.is_empty())
}

/// One `git ls-files --unmerged` entry.
#[derive(Debug, PartialEq, Eq)]
struct UnmergedEntry {
    oid: String,
    stage: u8,
    path: String,
}

/// Parse `git ls-files --unmerged -z` output: `<mode> <oid> <stage>\t<path>\0`.
fn parse_unmerged(raw: &str) -> Result<Vec<UnmergedEntry>, String> {
    split_nul(raw)
        .map(|record| {
            let (meta, path) = record
                .split_once('\t')
                .ok_or_else(|| format!("missing tab in entry {record:?}"))?;
            let mut fields = meta.split_whitespace();
            let (Some(_mode), Some(oid), Some(stage)) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(format!("expected `<mode> <oid> <stage>`, got {meta:?}"));
            };
            let stage = stage
                .parse()
                .map_err(|_| format!("invalid stage {stage:?}"))?;
            Ok(UnmergedEntry {
                oid: oid.to_owned(),
                stage,
                path: path.to_owned(),
            })
        })
        .collect()
}

/// Parse `git log -z --format=%H%x1f%an%x1f%aI%x1f%s` output.
fn parse_log(raw: &str) -> Result<Vec<CommitSummary>, String> {
    split_nul(raw)
        .map(|record| {
            let fields: Vec<&str> = record.trim_start_matches('\n').split(FIELD_SEP).collect();
            match fields.as_slice() {
                [id, author, date, subject] => Ok(CommitSummary {
                    id: (*id).to_owned(),
                    author: (*author).to_owned(),
                    date: (*date).to_owned(),
                    subject: (*subject).to_owned(),
                }),
                _ => Err(format!(
                    "expected 4 fields per commit, got {} in {record:?}",
                    fields.len()
                )),
            }
        })
        .collect()
}
