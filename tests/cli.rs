// ABOUTME: Integration tests for the edgeswap CLI commands.
// ABOUTME: Validates --help, init, bootstrap, route, run, status, and purge behavior.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn edgeswap_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("edgeswap"));
    cmd.env_remove("RUST_LOG");
    cmd
}

/// A project with a config, a v1 site, and a build script.
fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("edgeswap.yml"),
        "service: shop\nrepository: acme/shop\nrecipients: [qa@example.com]\n",
    )
    .unwrap();

    let site = dir.path().join("site");
    fs::create_dir_all(&site).unwrap();
    fs::write(site.join("index.html"), "<h1>v1</h1>").unwrap();

    #[cfg(unix)]
    write_build_script(dir.path());
    dir
}

#[cfg(unix)]
fn write_build_script(root: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let stages = root.join(".edgeswap/stages");
    fs::create_dir_all(&stages).unwrap();
    let script = stages.join("build");
    fs::write(
        &script,
        "#!/bin/sh\nset -e\necho \"<h1>$EDGESWAP_COMMIT</h1>\" > \"$EDGESWAP_OUTPUT_DIR/index.html\"\n",
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
}

fn bootstrap(dir: &Path) {
    edgeswap_cmd()
        .current_dir(dir)
        .args(["bootstrap", "--initial-version", "v1", "--artifact", "site"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bootstrapped shop at v1"));
}

#[test]
fn help_shows_commands() {
    edgeswap_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("bootstrap"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("purge"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("edgeswap.yml");

    edgeswap_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--service", "storefront"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created edgeswap.yml"));

    assert!(config_path.exists(), "edgeswap.yml should be created");
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("service: storefront"));
    assert!(content.contains("repository:"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("edgeswap.yml");

    fs::write(&config_path, "existing: config").unwrap();

    edgeswap_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn commands_need_a_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    edgeswap_cmd()
        .current_dir(temp_dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn status_before_bootstrap_fails() {
    let dir = project();
    edgeswap_cmd()
        .current_dir(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not bootstrapped"));
}

#[test]
fn bootstrap_twice_needs_force() {
    let dir = project();
    bootstrap(dir.path());

    edgeswap_cmd()
        .current_dir(dir.path())
        .args(["bootstrap", "--initial-version", "v1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already bootstrapped"));

    edgeswap_cmd()
        .current_dir(dir.path())
        .args(["bootstrap", "--initial-version", "v1", "--force"])
        .assert()
        .success();
}

#[test]
fn bootstrap_then_route_serves_initial_version() {
    let dir = project();
    bootstrap(dir.path());

    edgeswap_cmd()
        .current_dir(dir.path())
        .args(["route", "/", "--body"])
        .assert()
        .success()
        .stdout(predicate::str::contains("200 /"))
        .stdout(predicate::str::contains("(v1)"))
        .stdout(predicate::str::contains("<h1>v1</h1>"));

    edgeswap_cmd()
        .current_dir(dir.path())
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Version:    v1"))
        .stdout(predicate::str::contains("Staging:    none"));
}

#[test]
fn route_rejects_malformed_header() {
    let dir = project();
    bootstrap(dir.path());

    edgeswap_cmd()
        .current_dir(dir.path())
        .args(["route", "-H", "nonsense"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not 'name: value'"));
}

#[cfg(unix)]
#[test]
fn accepted_run_promotes_new_version() {
    let dir = project();
    bootstrap(dir.path());

    edgeswap_cmd()
        .current_dir(dir.path())
        .args(["run", "--commit", "v2", "--decision", "accept"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Production now serves v2"));

    edgeswap_cmd()
        .current_dir(dir.path())
        .args(["route", "/", "--body"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<h1>v2</h1>"));

    let status = edgeswap_cmd()
        .current_dir(dir.path())
        .args(["--json", "status"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let record: serde_json::Value = serde_json::from_slice(&status).unwrap();
    assert_eq!(record["event"], "status");
    assert_eq!(record["data"]["params"]["frontendVersion"], "v2");
    assert_eq!(record["data"]["runs"][0]["status"], "succeeded");
    assert!(!dir.path().join(".edgeswap/state/shop.lock").exists());
}

#[cfg(unix)]
#[test]
fn rejected_run_leaves_production_alone() {
    let dir = project();
    bootstrap(dir.path());

    edgeswap_cmd()
        .current_dir(dir.path())
        .args(["run", "--commit", "v2", "--decision", "reject"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rejected"));

    edgeswap_cmd()
        .current_dir(dir.path())
        .args(["route", "/", "--body", "-H", "aws-cf-cd-staging: true"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<h1>v1</h1>"));

    edgeswap_cmd()
        .current_dir(dir.path())
        .arg("orphans")
        .assert()
        .success()
        .stdout(predicate::str::contains("No orphaned staging distributions"));
}

#[test]
fn change_on_other_branch_is_ignored() {
    let dir = project();
    bootstrap(dir.path());

    edgeswap_cmd()
        .current_dir(dir.path())
        .args(["run", "--branch", "feature", "--decision", "accept"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ignored"));
}

#[test]
fn purge_of_unknown_run_fails() {
    let dir = project();
    bootstrap(dir.path());

    edgeswap_cmd()
        .current_dir(dir.path())
        .args(["purge", "shop-19700101T000000-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown run"));
}
