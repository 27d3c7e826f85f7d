//! End-to-end tests for the `prof` binary.
//!
//! Records a session through repeated `prof record` invocations, then
//! combines and inspects it.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn prof_binary() -> String {
    env!("CARGO_BIN_EXE_prof").to_string()
}

/// Runs `prof` offline, isolated from any user configuration.
fn prof(home: &Path, args: &[&str]) -> Output {
    Command::new(prof_binary())
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("PROF_NTP_ENABLED", "false")
        .args(args)
        .output()
        .expect("failed to run prof")
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "{what} should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Records a task that is canceled and then completes.
fn record_session(temp: &TempDir) -> String {
    let dir = temp.path().join("profiles");
    let dir_str = dir.to_string_lossy().into_owned();

    let steps: [&[&str]; 5] = [
        &["record", "agent", "bootstrap", "--dir", &dir_str],
        &[
            "record", "agent", "advance", "--uid", "task.0", "--state", "NEW", "--dir", &dir_str,
        ],
        &[
            "record", "agent", "advance", "--uid", "task.0", "--state", "CANCELED", "--dir",
            &dir_str,
        ],
        &[
            "record", "agent", "advance", "--uid", "task.0", "--state", "DONE", "--dir", &dir_str,
        ],
        &["record", "agent", "shutdown", "--dir", &dir_str, "--close"],
    ];
    for step in steps {
        assert_success(&prof(temp.path(), step), "prof record");
    }
    dir_str
}

#[test]
fn test_record_then_combine() {
    let temp = TempDir::new().unwrap();
    let dir = record_session(&temp);

    let output = prof(temp.path(), &["combine", "--dir", &dir, "--sid", "session.0"]);
    assert_success(&output, "prof combine");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    assert_eq!(
        lines.next(),
        Some("time,name,uid,state,event,msg,entity_type,event_name")
    );

    let rows: Vec<Vec<&str>> = lines.map(|l| l.split(',').collect()).collect();
    let task_states: Vec<&str> = rows
        .iter()
        .filter(|r| r[2] == "task.0" && r[7] == "state")
        .map(|r| r[3])
        .collect();
    assert_eq!(task_states, ["NEW", "DONE"]);

    assert!(rows.iter().any(|r| r[4] == "sync abs" && r[2] == "session.0"));
    assert!(rows.iter().any(|r| r[4] == "END" && r[6] == "session"));
    assert_eq!(rows[0][0], "0.0000", "first record sits at the session origin");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("not correctly closed"), "stderr: {stderr}");
}

#[test]
fn test_combine_jsonl_to_file() {
    let temp = TempDir::new().unwrap();
    let dir = record_session(&temp);
    let out = temp.path().join("combined.jsonl");
    let out_str = out.to_string_lossy();

    let output = prof(
        temp.path(),
        &[
            "combine", "--dir", &dir, "--sid", "session.0", "--format", "jsonl", "-o", &out_str,
        ],
    );
    assert_success(&output, "prof combine");

    let content = std::fs::read_to_string(&out).unwrap();
    let records: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(!records.is_empty());
    assert!(records.iter().all(|r| r["entity_type"].is_string()));
    assert!(
        records
            .iter()
            .any(|r| r["uid"] == "task.0" && r["event_name"] == "state")
    );
}

#[test]
fn test_unreadable_profile_is_reported() {
    let temp = TempDir::new().unwrap();
    let dir = record_session(&temp);
    std::fs::write(Path::new(&dir).join("broken.prof"), "not-a-time,x,,,y,\n").unwrap();

    let output = prof(temp.path(), &["combine", "--dir", &dir, "--sid", "session.0"]);
    assert_success(&output, "prof combine");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken.prof"), "stderr: {stderr}");
    assert!(String::from_utf8_lossy(&output.stdout).contains("task.0"));
}

#[test]
fn test_unclosed_profile_is_warned() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("profiles");
    let dir_str = dir.to_string_lossy();
    assert_success(
        &prof(temp.path(), &["record", "worker", "bootstrap", "--dir", &dir_str]),
        "prof record",
    );

    let output = prof(temp.path(), &["combine", "--dir", &dir_str]);
    assert_success(&output, "prof combine");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not correctly closed"), "stderr: {stderr}");
}

#[test]
fn test_combine_empty_dir_fails() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().to_string_lossy();

    let output = prof(temp.path(), &["combine", "--dir", &dir]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no profiles found"));
}

#[test]
fn test_inspect_json() {
    let temp = TempDir::new().unwrap();
    let dir = record_session(&temp);

    let output = prof(temp.path(), &["inspect", "--dir", &dir, "--json"]);
    assert_success(&output, "prof inspect");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let summary: serde_json::Value = serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(summary["mode"], "sys");
    assert_eq!(summary["ends"], 1);
    assert_eq!(summary["records"], 7);
}

#[test]
fn test_help_lists_subcommands() {
    let output = Command::new(prof_binary()).arg("--help").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["combine", "record", "inspect"] {
        assert!(stdout.contains(command), "help should list {command}");
    }
}
