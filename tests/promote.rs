//! End-to-end promotion against real git repositories.

mod common;

use std::fs;

use common::{LocalHost, Remote, TEST_HOST, setup_remote};
use sfci::error::PromoteError;
use sfci::promote::BranchPromoter;
use sfci::report::MergeOutcome;
use sfci::request::{BranchRole, Credential, PromotionRequest};
use sfci_git::{GitCli, Identity};
use tempfile::TempDir;

fn promoter(remote: &Remote, work: &TempDir) -> BranchPromoter<GitCli, LocalHost> {
    let git = GitCli::new()
        .with_identity(Identity::new("sfci", "sfci@test.com"))
        .with_work_root(work.path());
    BranchPromoter::new(git, LocalHost, TEST_HOST).with_remote_url(Some(remote.url()))
}

fn request(source: &str, target: &str) -> PromotionRequest {
    PromotionRequest::new("acme/app", source, target, Credential::new("token")).unwrap()
}

fn work_dir_is_empty(work: &TempDir) -> bool {
    fs::read_dir(work.path()).unwrap().next().is_none()
}

// ===========================================================================
// Scenario A: clean merge
// ===========================================================================

#[test]
fn clean_promotion_pushes_branch_and_records_artifacts() {
    let remote = setup_remote();
    remote.commit_on("feature/x", "main", "feature.cls", "public class Feature {}\n", "add feature");
    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let (report, paths) = promoter(&remote, &work)
        .promote_and_record(&request("feature/x", "main"), out.path())
        .unwrap();

    assert!(report.success());
    assert!(remote.has_branch("promotion/feature/x-to-main"));
    assert_eq!(
        remote.subjects_between("main", "promotion/feature/x-to-main"),
        ["Promote feature/x into main", "add feature"]
    );
    assert_eq!(remote.parent_subject("promotion/feature/x-to-main", 1), "initial commit");
    assert_eq!(remote.parent_subject("promotion/feature/x-to-main", 2), "add feature");
    assert_eq!(
        report.branch_url(),
        Some("https://git.example.test/acme/app/tree/promotion/feature/x-to-main")
    );

    let MergeOutcome::Success { commits, pushed_ref } = report.outcome() else {
        panic!("expected success");
    };
    assert_eq!(pushed_ref, "promotion/feature/x-to-main");
    let subjects: Vec<&str> = commits.iter().map(|c| c.subject.as_str()).collect();
    assert_eq!(subjects, ["Promote feature/x into main", "add feature"]);

    let record: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
    assert_eq!(record["success"], true);
    assert_eq!(record["promotion_branch"], "promotion/feature/x-to-main");
    assert!(fs::read_to_string(&paths.log).unwrap().contains("done-success"));

    assert!(work_dir_is_empty(&work), "checkout was not cleaned up");
}

// ===========================================================================
// Scenario B: conflict
// ===========================================================================

#[test]
fn conflicting_promotion_reports_both_sides_and_pushes_nothing() {
    let remote = setup_remote();
    remote.commit_on("feature/y", "main", "app.cls", "public class App { /* feature */ }\n", "feature edit");
    remote.commit_on("main", "main", "app.cls", "public class App { /* main */ }\n", "main edit");
    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let (report, paths) = promoter(&remote, &work)
        .promote_and_record(&request("feature/y", "main"), out.path())
        .unwrap();

    assert!(!report.success());
    assert_eq!(report.branch_url(), None);
    assert!(!remote.has_branch("promotion/feature/y-to-main"));

    let MergeOutcome::Conflict {
        conflicted_files,
        versions,
    } = report.outcome()
    else {
        panic!("expected conflict");
    };
    assert_eq!(conflicted_files.iter().collect::<Vec<_>>(), ["app.cls"]);
    assert_eq!(
        versions["app.cls"].ours.as_deref(),
        Some(&b"public class App { /* main */ }\n"[..])
    );
    assert_eq!(
        versions["app.cls"].theirs.as_deref(),
        Some(&b"public class App { /* feature */ }\n"[..])
    );

    let summary = fs::read_to_string(&paths.summary).unwrap();
    assert!(summary.contains("CONFLICT"));
    assert!(summary.contains("/* main */"));
    assert!(summary.contains("/* feature */"));

    let record: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
    assert_eq!(record["success"], false);
    assert!(record["branch_url"].is_null());
    assert_eq!(record["conflicted_files"][0], "app.cls");

    assert!(work_dir_is_empty(&work));
}

// ===========================================================================
// Scenario C: missing branch
// ===========================================================================

#[test]
fn missing_source_branch_changes_nothing() {
    let remote = setup_remote();
    let before = remote.branches();
    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let err = promoter(&remote, &work)
        .promote_and_record(&request("feature/z", "main"), out.path())
        .unwrap_err();

    assert!(
        matches!(&err, PromoteError::BranchNotFound { role: BranchRole::Source, name } if name == "feature/z"),
        "{err}"
    );
    assert_eq!(remote.branches(), before);
    assert!(fs::read_dir(out.path()).unwrap().next().is_none(), "no artifacts on failure");
    assert!(work_dir_is_empty(&work));
}

// ===========================================================================
// Idempotence
// ===========================================================================

#[test]
fn rerunning_a_promotion_refuses_to_overwrite() {
    let remote = setup_remote();
    remote.commit_on("feature/x", "main", "feature.cls", "x\n", "add feature");
    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let p = promoter(&remote, &work);

    p.promote_and_record(&request("feature/x", "main"), out.path())
        .unwrap();
    let pushed = common::git(&remote.bare, &["rev-parse", "promotion/feature/x-to-main"]);

    let err = p.promote(&request("feature/x", "main")).unwrap_err();
    assert!(matches!(err, PromoteError::PromotionBranchExists { .. }), "{err}");
    assert_eq!(
        common::git(&remote.bare, &["rev-parse", "promotion/feature/x-to-main"]),
        pushed
    );
}
