// CLI surface checks: the binary advertises every workflow command.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_all_workflow_commands() {
    let mut cmd = Command::cargo_bin("inzo").unwrap();

    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("kyc"))
        .stdout(predicate::str::contains("policy"))
        .stdout(predicate::str::contains("mints"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn kyc_help_walks_through_the_saga() {
    let mut cmd = Command::cargo_bin("inzo").unwrap();

    cmd.args(["kyc", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("begin"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("finalize"));
}

#[test]
fn policy_initiate_requires_the_application_fields() {
    let mut cmd = Command::cargo_bin("inzo").unwrap();

    // Missing required arguments fails with usage guidance, not a panic.
    cmd.args(["policy", "initiate", "u1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--risk-tier"));
}

#[test]
fn no_subcommand_prints_usage() {
    let mut cmd = Command::cargo_bin("inzo").unwrap();

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}
