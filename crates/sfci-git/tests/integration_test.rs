use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use sfci_git::{
    Deadline, GitCli, GitError, Identity, MergeOptions, MergeResult, Stage, ToolHome,
    VersionControlClient, remote_ref,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A bare "remote" plus a seed clone used to publish branches into it.
struct Fixture {
    _dir: TempDir,
    bare: PathBuf,
    seed: PathBuf,
}

fn git(dir: &Path, args: &[&str]) -> String {
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

fn setup_remote() -> Fixture {
    let dir = TempDir::new().unwrap();
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
    git(&seed, &["config", "user.email", "test@test.com"]);
    git(&seed, &["config", "user.name", "Test User"]);
    git(&seed, &["remote", "add", "origin", bare.to_str().unwrap()]);

    std::fs::write(seed.join("app.cls"), "public class App {}\n").unwrap();
    git(&seed, &["add", "app.cls"]);
    git(&seed, &["commit", "--quiet", "-m", "initial commit"]);
    git(&seed, &["push", "--quiet", "origin", "main"]);

    Fixture {
        _dir: dir,
        bare,
        seed,
    }
}

impl Fixture {
    fn url(&self) -> String {
        self.bare.to_str().unwrap().to_owned()
    }

    /// Commit `content` to `file` on `branch` (created from `base` if new)
    /// and publish it.
    fn commit_on(&self, branch: &str, base: &str, file: &str, content: Option<&str>, msg: &str) {
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
        match content {
            Some(text) => {
                std::fs::write(self.seed.join(file), text).unwrap();
                git(&self.seed, &["add", file]);
            }
            None => {
                git(&self.seed, &["rm", "--quiet", file]);
            }
        }
        git(&self.seed, &["commit", "--quiet", "-m", msg]);
        git(&self.seed, &["push", "--quiet", "origin", branch]);
        git(&self.seed, &["checkout", "--quiet", "main"]);
    }

    fn remote_has_branch(&self, branch: &str) -> bool {
        let refs = git(&self.bare, &["for-each-ref", "--format=%(refname)"]);
        refs.lines().any(|r| r == format!("refs/heads/{branch}"))
    }
}

fn client() -> GitCli {
    GitCli::new().with_identity(Identity::new("Promoter", "promoter@test.com"))
}

// ===========================================================================
// Clone / refs
// ===========================================================================

#[test]
fn clone_and_check_branches() {
    let fx = setup_remote();
    fx.commit_on("feature/x", "main", "feature.cls", Some("x\n"), "add feature");

    let git = client();
    let home = ToolHome::new().unwrap();
    let wc = git.clone_repo(&fx.url(), &home, Deadline::NONE).unwrap();
    git.fetch_all(&wc).unwrap();

    assert!(wc.path().join("app.cls").exists());
    assert!(git.branch_exists(&wc, "main").unwrap());
    assert!(git.branch_exists(&wc, "feature/x").unwrap());
    assert!(!git.branch_exists(&wc, "nonexistent-branch").unwrap());
}

#[test]
fn clone_of_missing_remote_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.git");
    let home = ToolHome::new().unwrap();
    let err = client()
        .clone_repo(missing.to_str().unwrap(), &home, Deadline::NONE)
        .unwrap_err();
    assert!(matches!(err, GitError::CommandFailed { .. }), "{err}");
}

#[test]
fn clone_uses_work_root_and_release_cleans_up() {
    let fx = setup_remote();
    let work = TempDir::new().unwrap();
    let git = client().with_work_root(work.path());
    let home = ToolHome::new().unwrap();

    let wc = git.clone_repo(&fx.url(), &home, Deadline::NONE).unwrap();
    assert!(wc.path().starts_with(work.path()));
    let attempt_dir = wc.path().parent().unwrap().to_path_buf();

    wc.release().unwrap();
    assert!(!attempt_dir.exists());
}

#[test]
fn checkout_commands_read_the_tool_home_config() {
    let fx = setup_remote();
    fx.commit_on("feature/x", "main", "feature.cls", Some("x\n"), "add feature");

    let home = ToolHome::new().unwrap();
    std::fs::write(
        home.path().join("gitconfig"),
        "[user]\n\tname = Isolated\n\temail = isolated@test.com\n",
    )
    .unwrap();

    let git = GitCli::new();
    let wc = git.clone_repo(&fx.url(), &home, Deadline::NONE).unwrap();
    git.create_branch_from(&wc, "promo", &remote_ref("main")).unwrap();
    git.merge(&wc, &remote_ref("feature/x"), &MergeOptions::no_ff("merge"))
        .unwrap();

    let commits = git.commits_between(&wc, &remote_ref("main"), "promo").unwrap();
    assert_eq!(commits[0].author, "Isolated");
}

// ===========================================================================
// Merge
// ===========================================================================

#[test]
fn clean_merge_then_push() {
    let fx = setup_remote();
    fx.commit_on("feature/x", "main", "feature.cls", Some("x\n"), "add feature");

    let git = client();
    let home = ToolHome::new().unwrap();
    let wc = git.clone_repo(&fx.url(), &home, Deadline::NONE).unwrap();
    git.create_branch_from(&wc, "promotion/feature/x-to-main", &remote_ref("main"))
        .unwrap();

    let result = git
        .merge(
            &wc,
            &remote_ref("feature/x"),
            &MergeOptions::no_ff("Promote feature/x into main"),
        )
        .unwrap();
    assert_eq!(result, MergeResult::Clean);
    assert!(!git.merge_in_progress(&wc).unwrap());

    let commits = git
        .commits_between(&wc, &remote_ref("main"), "promotion/feature/x-to-main")
        .unwrap();
    let subjects: Vec<&str> = commits.iter().map(|c| c.subject.as_str()).collect();
    assert_eq!(subjects, vec!["Promote feature/x into main", "add feature"]);
    assert_eq!(commits[0].author, "Promoter");

    git.push(&wc, "promotion/feature/x-to-main").unwrap();
    assert!(fx.remote_has_branch("promotion/feature/x-to-main"));
}

#[test]
fn conflicting_merge_exposes_both_sides() {
    let fx = setup_remote();
    fx.commit_on("main", "main", "app.cls", Some("main side\n"), "edit on main");
    fx.commit_on("feature/y", "main~1", "app.cls", Some("feature side\n"), "edit on feature");

    let git = client();
    let home = ToolHome::new().unwrap();
    let wc = git.clone_repo(&fx.url(), &home, Deadline::NONE).unwrap();
    git.create_branch_from(&wc, "promo", &remote_ref("main")).unwrap();

    let result = git
        .merge(&wc, &remote_ref("feature/y"), &MergeOptions::no_ff("merge"))
        .unwrap();
    assert_eq!(result, MergeResult::Conflict);
    assert!(git.merge_in_progress(&wc).unwrap());

    let files = git.conflicted_files(&wc).unwrap();
    assert_eq!(files.into_iter().collect::<Vec<_>>(), vec!["app.cls".to_owned()]);

    let ours = git.show_staged(&wc, Stage::Ours, "app.cls").unwrap();
    let theirs = git.show_staged(&wc, Stage::Theirs, "app.cls").unwrap();
    assert_eq!(ours.as_deref(), Some(&b"main side\n"[..]));
    assert_eq!(theirs.as_deref(), Some(&b"feature side\n"[..]));

    git.abort_merge(&wc).unwrap();
    assert!(!git.merge_in_progress(&wc).unwrap());
    assert!(git.conflicted_files(&wc).unwrap().is_empty());
}

#[test]
fn modify_delete_conflict_reports_missing_side() {
    let fx = setup_remote();
    fx.commit_on("main", "main", "app.cls", Some("changed on main\n"), "modify");
    fx.commit_on("feature/rm", "main~1", "app.cls", None, "delete");

    let git = client();
    let home = ToolHome::new().unwrap();
    let wc = git.clone_repo(&fx.url(), &home, Deadline::NONE).unwrap();
    git.create_branch_from(&wc, "promo", &remote_ref("main")).unwrap();

    let result = git
        .merge(&wc, &remote_ref("feature/rm"), &MergeOptions::no_ff("merge"))
        .unwrap();
    assert_eq!(result, MergeResult::Conflict);

    assert!(git.show_staged(&wc, Stage::Ours, "app.cls").unwrap().is_some());
    assert_eq!(git.show_staged(&wc, Stage::Theirs, "app.cls").unwrap(), None);

    git.abort_merge(&wc).unwrap();
}

#[test]
fn merging_unknown_ref_is_an_error_not_a_conflict() {
    let fx = setup_remote();
    let git = client();
    let home = ToolHome::new().unwrap();
    let wc = git.clone_repo(&fx.url(), &home, Deadline::NONE).unwrap();
    git.create_branch_from(&wc, "promo", &remote_ref("main")).unwrap();

    let err = git
        .merge(&wc, "origin/does-not-exist", &MergeOptions::no_ff("merge"))
        .unwrap_err();
    assert!(matches!(err, GitError::CommandFailed { .. }), "{err}");
}

#[test]
fn create_branch_twice_fails() {
    let fx = setup_remote();
    let git = client();
    let home = ToolHome::new().unwrap();
    let wc = git.clone_repo(&fx.url(), &home, Deadline::NONE).unwrap();
    git.create_branch_from(&wc, "promo", &remote_ref("main")).unwrap();
    let err = git
        .create_branch_from(&wc, "promo", &remote_ref("main"))
        .unwrap_err();
    assert!(matches!(err, GitError::CommandFailed { .. }));
}

#[test]
fn push_never_overwrites_diverged_remote_branch() {
    let fx = setup_remote();
    fx.commit_on("feature/x", "main", "feature.cls", Some("x\n"), "add feature");
    fx.commit_on("promo", "main", "other.cls", Some("other\n"), "unrelated promo");

    let git = client();
    let home = ToolHome::new().unwrap();
    let wc = git.clone_repo(&fx.url(), &home, Deadline::NONE).unwrap();
    git.create_branch_from(&wc, "promo", &remote_ref("feature/x")).unwrap();

    let err = git.push(&wc, "promo").unwrap_err();
    assert!(matches!(err, GitError::CommandFailed { .. }), "{err}");
}
