use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::{read_to_string, write};

#[test]
fn session_caches_by_file_name() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path().join("scan.json"), "{\"findings\": []}").unwrap();
    write(dir.path().join("app.log"), "GET /health 200\n").unwrap();

    Command::cargo_bin("threat-analyzer-cli")
        .unwrap()
        .current_dir(dir.path())
        .env("NO_COLOR", "1")
        .env("THREAT_ANALYZER_MODEL__PROVIDER", "noop")
        .env("THREAT_ANALYZER_STORE__BACKEND", "jsonl")
        .env("THREAT_ANALYZER_STORE__PATH", "threats.jsonl")
        .args(["session", "--out", "out"])
        .write_stdin("scan.json\nscan.json\n\napp.log\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Type: Scan Report"))
        .stdout(predicate::str::contains("(cached result)"))
        .stdout(predicate::str::contains("Type: Log File"))
        .stdout(
            predicate::str::contains("Please upload a file to begin analysis.").count(2),
        );

    let log = read_to_string(dir.path().join("threats.jsonl")).unwrap();
    let names: Vec<String> = log
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["file_name"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(names, ["scan.json", "app.log"]);
    assert!(dir.path().join("out/threat_report.pdf").exists());
}

#[test]
fn session_reports_errors_and_keeps_going() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path().join("image.png"), [0x89, b'P', b'N', b'G']).unwrap();
    write(dir.path().join("Dockerfile"), "FROM alpine:3.19\n").unwrap();

    Command::cargo_bin("threat-analyzer-cli")
        .unwrap()
        .current_dir(dir.path())
        .env("NO_COLOR", "1")
        .env("THREAT_ANALYZER_MODEL__PROVIDER", "noop")
        .env("THREAT_ANALYZER_STORE__BACKEND", "jsonl")
        .env("THREAT_ANALYZER_STORE__PATH", "threats.jsonl")
        .args(["session"])
        .write_stdin("missing.log\nimage.png\nDockerfile\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("failed to read missing.log"))
        .stderr(predicate::str::contains("image.png"))
        .stdout(predicate::str::contains("File: Dockerfile"));

    let log = read_to_string(dir.path().join("threats.jsonl")).unwrap();
    assert_eq!(log.lines().count(), 1);
}

#[test]
fn session_errors_include_their_cause() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path().join("app.log"), "GET /health 200\n").unwrap();
    // A regular file where the store expects a directory.
    write(dir.path().join("blocker"), "").unwrap();

    Command::cargo_bin("threat-analyzer-cli")
        .unwrap()
        .current_dir(dir.path())
        .env("NO_COLOR", "1")
        .env("THREAT_ANALYZER_MODEL__PROVIDER", "noop")
        .env("THREAT_ANALYZER_STORE__BACKEND", "jsonl")
        .env("THREAT_ANALYZER_STORE__PATH", "blocker/threats.jsonl")
        .args(["session"])
        .write_stdin("app.log\n\n")
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "failed to write threat report record: failed to create report directory blocker",
        ))
        .stdout(predicate::str::contains("Please upload a file to begin analysis.").count(2));

    assert!(!dir.path().join("threat_report.pdf").exists());
}
