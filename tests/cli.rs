use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("codeforge").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("codeforge"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("codeforge").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("per-token quota"))
        .stdout(predicate::str::contains("check-config"));
}

#[test]
fn test_cli_register_missing_email() {
    let mut cmd = Command::cargo_bin("codeforge").unwrap();
    cmd.arg("register")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "required arguments were not provided",
        ));
}

#[test]
fn test_cli_check_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("codeforge").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("missing.json"))
        .arg("check-config")
        .assert()
        .failure();
}

#[test]
fn test_cli_check_config_malformed_file() {
    let file = config_file("{ not json");
    let mut cmd = Command::cargo_bin("codeforge").unwrap();
    cmd.arg("-c")
        .arg(file.path())
        .arg("check-config")
        .assert()
        .failure();
}

#[test]
fn test_cli_check_config_valid_file() {
    let file = config_file(r#"{"port": 8123, "quota": {"default_limit": 5}}"#);
    let mut cmd = Command::cargo_bin("codeforge").unwrap();
    cmd.arg("-c")
        .arg(file.path())
        .arg("check-config")
        .env_remove("CODEFORGE_PORT")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"))
        .stdout(predicate::str::contains("5 per 1800s"));
}

#[test]
fn test_cli_register_prints_token_and_rejects_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = dir.path().join("tokens.json");
    let file = config_file(&format!(
        r#"{{"token_path": {}}}"#,
        serde_json::to_string(&tokens.display().to_string()).unwrap()
    ));

    let mut cmd = Command::cargo_bin("codeforge").unwrap();
    cmd.arg("-c")
        .arg(file.path())
        .args(["register", "dev@example.com"])
        .env_remove("CODEFORGE_TOKEN_PATH")
        .assert()
        .success()
        .stdout(predicate::str::is_match("^[0-9a-f]{32}\n$").unwrap());
    assert!(tokens.exists());

    let mut cmd = Command::cargo_bin("codeforge").unwrap();
    cmd.arg("-c")
        .arg(file.path())
        .args(["register", "DEV@example.com"])
        .env_remove("CODEFORGE_TOKEN_PATH")
        .assert()
        .failure();
}
