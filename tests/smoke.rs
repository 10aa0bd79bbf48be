//! Smoke tests -- verify the binary runs and key subcommands exist.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("paypulse")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Statistical health monitoring for payment-processing pipelines",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("paypulse")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("paypulse"));
}

#[test]
fn test_evaluate_subcommand_exists() {
    Command::cargo_bin("paypulse")
        .unwrap()
        .args(["evaluate", "--help"])
        .assert()
        .success();
}

#[test]
fn test_score_subcommand_exists() {
    Command::cargo_bin("paypulse")
        .unwrap()
        .args(["score", "--help"])
        .assert()
        .success();
}

#[test]
fn test_movers_subcommand_exists() {
    Command::cargo_bin("paypulse")
        .unwrap()
        .args(["movers", "--help"])
        .assert()
        .success();
}

#[test]
fn test_ingest_subcommand_exists() {
    Command::cargo_bin("paypulse")
        .unwrap()
        .args(["ingest", "--help"])
        .assert()
        .success();
}

#[test]
fn test_evaluate_rejects_bad_date() {
    Command::cargo_bin("paypulse")
        .unwrap()
        .args(["evaluate", "--date", "June 15th"])
        .assert()
        .failure();
}
