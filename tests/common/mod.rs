//! Shared test helpers for sfci integration tests.
//!
//! Every test gets its own bare "remote" repository in a temp directory,
//! seeded through a scratch clone. Nothing touches the network.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use sfci::hosting::{HostError, RemoteHostingClient, Session};
use sfci::request::Credential;
use sfci_git::{Deadline, ToolHome};
use tempfile::TempDir;

/// Host name reported by [`LocalHost`].
pub const TEST_HOST: &str = "git.example.test";

/// Run git in `dir`, asserting success, and return stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {}: {e}", args.join(" ")));
    assert!(
        out.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).to_string()
}

/// A bare remote on `main` with one commit, plus the seed clone that
/// publishes into it.
pub struct Remote {
    pub dir: TempDir,
    pub bare: PathBuf,
    pub seed: PathBuf,
}

pub fn setup_remote() -> Remote {
    let dir = TempDir::new().expect("failed to create temp dir");
    let bare = dir.path().join("remote.git");
    let seed = dir.path().join("seed");

    git(
        dir.path(),
        &["init", "--quiet", "--bare", "--initial-branch=main", bare.to_str().unwrap()],
    );
    git(
        dir.path(),
        &["init", "--quiet", "--initial-branch=main", seed.to_str().unwrap()],
    );
    git(&seed, &["config", "user.email", "dev@test.com"]);
    git(&seed, &["config", "user.name", "Dev"]);
    git(&seed, &["remote", "add", "origin", bare.to_str().unwrap()]);

    std::fs::write(seed.join("app.cls"), "public class App {}\n").unwrap();
    git(&seed, &["add", "app.cls"]);
    git(&seed, &["commit", "--quiet", "-m", "initial commit"]);
    git(&seed, &["push", "--quiet", "origin", "main"]);

    Remote { dir, bare, seed }
}

impl Remote {
    pub fn url(&self) -> String {
        self.bare.to_str().unwrap().to_owned()
    }

    /// Commit `content` to `file` on `branch` (created from `base` when new)
    /// and push it.
    pub fn commit_on(&self, branch: &str, base: &str, file: &str, content: &str, msg: &str) {
        let exists = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", branch])
            .current_dir(&self.seed)
            .output()
            .unwrap()
            .status
            .success();
        if exists {
            git(&self.seed, &["checkout", "--quiet", branch]);
        } else {
            git(&self.seed, &["checkout", "--quiet", "-b", branch, base]);
        }
        std::fs::write(self.seed.join(file), content).unwrap();
        git(&self.seed, &["add", file]);
        git(&self.seed, &["commit", "--quiet", "-m", msg]);
        git(&self.seed, &["push", "--quiet", "origin", branch]);
        git(&self.seed, &["checkout", "--quiet", "main"]);
    }

    pub fn branches(&self) -> Vec<String> {
        git(&self.bare, &["for-each-ref", "--format=%(refname:short)", "refs/heads"])
            .lines()
            .map(str::to_owned)
            .collect()
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        self.branches().iter().any(|b| b == branch)
    }

    /// Subjects of commits reachable from `branch` but not `base`, children
    /// before parents.
    pub fn subjects_between(&self, base: &str, branch: &str) -> Vec<String> {
        let range = format!("{base}..{branch}");
        git(&self.bare, &["log", "--topo-order", "--format=%s", &range])
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// Subject of the `n`th parent of the tip of `branch`.
    pub fn parent_subject(&self, branch: &str, n: u8) -> String {
        let rev = format!("{branch}^{n}");
        git(&self.bare, &["log", "-1", "--format=%s", &rev])
            .trim()
            .to_owned()
    }
}

/// A hosting client that accepts any credential without network access.
/// Pair it with `BranchPromoter::with_remote_url` pointing at the bare repo.
pub struct LocalHost;

impl RemoteHostingClient for LocalHost {
    fn authenticate(
        &self,
        _credential: &Credential,
        home: &ToolHome,
        _deadline: Deadline,
    ) -> Result<Session, HostError> {
        Ok(Session::new(TEST_HOST).with_env(home.env()))
    }

    fn verify(&self, _session: &Session, _deadline: Deadline) -> Result<bool, HostError> {
        Ok(true)
    }
}

/// Run the sfci binary with `args` in `dir`.
pub fn sfci_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sfci"))
        .args(args)
        .current_dir(dir)
        .env_remove("GH_TOKEN")
        .env_remove("SF_AUTH_URL")
        .env_remove("SFCI_CONFIG")
        .output()
        .expect("failed to run sfci")
}
