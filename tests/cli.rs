use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use ci_repo_map::export;
use ci_repo_map::models::{CiId, CiRepoMap};
use ci_repo_map::workbook::{self, Sheet};

const JOB_VARS: &[&str] = &[
    "GITHUB_TOKEN",
    "GITHUB_ORG",
    "GITHUB_EVENT_NAME",
    "FROM_DATE",
    "TO_DATE",
    "COMMIT_REPO",
    "RUST_LOG",
];

fn cimap_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("cimap");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let config_content = format!(
        r#"[github]
org = "acme"

[discovery]
page_delay_ms = 0

[paths]
root = '{}'
"#,
        root.display()
    );
    let config_path = root.join("config/cimap.toml");
    fs::write(&config_path, config_content).unwrap();
    (tmp, config_path)
}

/// Run the binary with only `vars` set among the job variables.
fn run_cimap(config_path: &Path, args: &[&str], vars: &[(&str, &str)]) -> (String, String, bool) {
    let binary = cimap_binary();
    let mut cmd = Command::new(&binary);
    for var in JOB_VARS {
        cmd.env_remove(var);
    }
    for (k, v) in vars {
        cmd.env(k, v);
    }
    let output = cmd
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cimap binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_window_manual_bounds() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_cimap(
        &config,
        &["window"],
        &[
            ("GITHUB_EVENT_NAME", "workflow_dispatch"),
            ("FROM_DATE", "2024-05-01"),
            ("TO_DATE", "2024-05-15T23:00:00-04:00"),
        ],
    );
    assert!(success, "window failed: {}", stderr);
    assert!(stdout.contains("Manual"));
    assert!(stdout.contains("from:    2024-05-01"));
    assert!(stdout.contains("to:      2024-05-15"));
}

#[test]
fn test_window_manual_requires_bounds() {
    let (_tmp, config) = setup_test_env();
    let (_stdout, stderr, success) =
        run_cimap(&config, &["window"], &[("TO_DATE", "2024-05-15")]);
    assert!(!success);
    assert!(stderr.contains("FROM_DATE"), "stderr: {}", stderr);
}

#[test]
fn test_window_rejects_inverted_bounds() {
    let (_tmp, config) = setup_test_env();
    let (_stdout, stderr, success) = run_cimap(
        &config,
        &["window"],
        &[("FROM_DATE", "2024-05-20"), ("TO_DATE", "2024-05-01")],
    );
    assert!(!success);
    assert!(stderr.contains("after TO_DATE"), "stderr: {}", stderr);
}

#[test]
fn test_window_unsupported_event() {
    let (_tmp, config) = setup_test_env();
    let (_stdout, stderr, success) =
        run_cimap(&config, &["window"], &[("GITHUB_EVENT_NAME", "push")]);
    assert!(!success);
    assert!(stderr.contains("Unsupported event: push"), "stderr: {}", stderr);
}

#[test]
fn test_window_scheduled() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) =
        run_cimap(&config, &["window"], &[("GITHUB_EVENT_NAME", "schedule")]);
    assert!(success, "window failed: {}", stderr);
    assert!(stdout.contains("Scheduled"));
    assert!(stdout.contains("-01\n"));
}

#[test]
fn test_report_requires_token() {
    let (_tmp, config) = setup_test_env();
    let (_stdout, stderr, success) = run_cimap(
        &config,
        &["report"],
        &[("FROM_DATE", "2024-05-01"), ("TO_DATE", "2024-05-15")],
    );
    assert!(!success);
    assert!(stderr.contains("GITHUB_TOKEN"), "stderr: {}", stderr);
}

#[test]
fn test_discover_requires_commit_repo() {
    let (_tmp, config) = setup_test_env();
    let (_stdout, stderr, success) =
        run_cimap(&config, &["discover"], &[("GITHUB_TOKEN", "t0ken")]);
    assert!(!success);
    assert!(stderr.contains("COMMIT_REPO"), "stderr: {}", stderr);
}

#[test]
fn test_discover_rejects_malformed_commit_repo() {
    let (_tmp, config) = setup_test_env();
    let (_stdout, stderr, success) = run_cimap(
        &config,
        &["discover"],
        &[("GITHUB_TOKEN", "t0ken"), ("COMMIT_REPO", "just-a-name")],
    );
    assert!(!success);
    assert!(stderr.contains("owner/name"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_is_fatal() {
    let (tmp, config) = setup_test_env();
    fs::write(&config, "[report]\ntime_zone = \"Mars/Olympus\"\n").unwrap();
    let (_stdout, stderr, success) = run_cimap(&config, &["merge"], &[]);
    assert!(!success);
    assert!(stderr.contains("Mars/Olympus"), "stderr: {}", stderr);
    drop(tmp);
}

#[test]
fn test_merge_offline() {
    let (tmp, config) = setup_test_env();
    let root = tmp.path();

    let mut raw = CiRepoMap::new();
    raw.insert(CiId::new("CI1234"), "web");
    raw.insert(CiId::new("CI1234"), "payments");
    export::write_json(&root.join("data/ci_repo_map_raw.json"), &raw).unwrap();

    let mut sheet = Sheet::new("Mapping", &["Repo Name", "Related CI Nums"]);
    sheet.push_row(vec!["acme/billing".into(), "ci7777".into()]);
    sheet.push_row(vec!["payments".into(), "CI5555".into()]);
    workbook::write_xlsx(&root.join("data/GWAM_github_repo_CI_mapping.xlsx"), &sheet).unwrap();

    let (stdout, stderr, success) = run_cimap(&config, &["merge"], &[]);
    assert!(success, "merge failed: {}", stderr);
    assert!(stdout.contains("merge ok"));
    assert!(stdout.contains("conflicts:         1"));
    assert!(stdout.contains("payments: spreadsheet CI5555 vs discovered CI1234"));

    let merged = CiRepoMap::load_json(&root.join("data/consolidated_ci_repo_map.json")).unwrap();
    assert_eq!(merged.len(), 3);
    assert!(merged.get(&CiId::new("CI7777")).unwrap().contains("billing"));
    assert!(root.join("data/consolidated_ci_repo_map.xlsx").exists());
    assert!(root.join("data/ci_repo_map_conflicts.json").exists());
}

#[test]
fn test_merge_without_raw_map_fails() {
    let (_tmp, config) = setup_test_env();
    let (_stdout, _stderr, success) = run_cimap(&config, &["merge"], &[]);
    assert!(!success);
}
