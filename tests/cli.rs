//! Command-line surface: help, argument validation, exit codes.

mod common;

use common::sfci_in;
use tempfile::TempDir;

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    let out = sfci_in(dir.path(), &["--help"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for cmd in ["promote", "pipeline", "doctor"] {
        assert!(stdout.contains(cmd), "missing {cmd} in help:\n{stdout}");
    }
}

#[test]
fn promote_into_same_branch_is_rejected_before_any_work() {
    let dir = TempDir::new().unwrap();
    let out = sfci_in(
        dir.path(),
        &["promote", "--repo", "acme/app", "--source", "main", "--target", "main", "--token", "t"],
    );
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("cannot be promoted into itself"), "{stderr}");
    assert!(!dir.path().join("promotion-artifacts").exists());
}

#[test]
fn promote_requires_a_token() {
    let dir = TempDir::new().unwrap();
    let out = sfci_in(
        dir.path(),
        &["promote", "--repo", "acme/app", "--source", "a", "--target", "b"],
    );
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("--token"));
}

#[test]
fn usage_errors_never_use_the_conflict_exit_code() {
    let dir = TempDir::new().unwrap();
    let out = sfci_in(dir.path(), &["promote", "--bogus"]);
    assert_eq!(out.status.code(), Some(1));

    let out = sfci_in(dir.path(), &["no-such-command"]);
    assert_eq!(out.status.code(), Some(1));

    let out = sfci_in(dir.path(), &["--version"]);
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".sfci.toml"), "[promote]\nbogus = 1\n").unwrap();
    let out = sfci_in(
        dir.path(),
        &["promote", "--repo", "acme/app", "--source", "a", "--target", "b", "--token", "t"],
    );
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains(".sfci.toml"), "{stderr}");
    assert!(stderr.contains("line 2"), "{stderr}");
}

#[test]
fn doctor_json_reports_every_tool() {
    let dir = TempDir::new().unwrap();
    let out = sfci_in(dir.path(), &["doctor", "--format", "json"]);
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let names: Vec<&str> = report["checks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["git", "gh", "sf", "npm", "config"]);
    assert!(report["all_ok"].is_boolean());
}

#[test]
fn pipeline_scan_without_delta_fails() {
    let dir = TempDir::new().unwrap();
    let out = sfci_in(dir.path(), &["pipeline", "scan-delta"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("prepare-delta"), "{stderr}");
}

#[test]
fn pipeline_lwc_tests_skip_without_jest_config() {
    let dir = TempDir::new().unwrap();
    let out = sfci_in(dir.path(), &["pipeline", "lwc-tests", "--format", "json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["step"], "lwc-tests");
    assert_eq!(json["status"], "skipped");
}
