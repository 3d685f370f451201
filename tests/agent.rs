// ABOUTME: Integration tests for the shell stage agent.
// ABOUTME: Runs real scripts to check environment, reports, artifacts, failures, and timeouts.

#![cfg(unix)]

use edgeswap::agent::{AgentError, ShellAgent, StageAgent, StageEnv, Step, vars};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn write_script(stages: &Path, step: Step, body: &str) {
    std::fs::create_dir_all(stages).unwrap();
    let path = stages.join(step.script_name());
    std::fs::write(&path, format!("#!/bin/sh\nset -e\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn agent(dir: &TempDir) -> ShellAgent {
    ShellAgent::new(dir.path().join("stages"), dir.path().join("work"))
}

fn env(run: &str) -> StageEnv {
    let mut env = StageEnv::new();
    env.set(vars::RUN_ID, run)
        .set(vars::SERVICE, "shop")
        .set(vars::COMMIT, "abc123");
    env
}

#[tokio::test]
async fn build_produces_artifact_and_report() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        &dir.path().join("stages"),
        Step::Build,
        r#"mkdir -p "$EDGESWAP_OUTPUT_DIR/assets"
echo "<h1>$EDGESWAP_COMMIT</h1>" > "$EDGESWAP_OUTPUT_DIR/index.html"
echo "version=1.4.0" >> "$EDGESWAP_REPORT"
echo "built for $EDGESWAP_SERVICE""#,
    );

    let outcome = agent(&dir).run(Step::Build, &env("shop-1")).await.unwrap();

    assert!(outcome.success());
    assert!(!outcome.skipped);
    assert_eq!(outcome.output("version"), Some("1.4.0"));
    assert_eq!(outcome.stdout.trim(), "built for shop");

    let artifact = outcome.artifact.expect("artifact directory");
    assert!(artifact.starts_with(dir.path().join("work/shop-1")));
    let index = std::fs::read_to_string(artifact.join("index.html")).unwrap();
    assert_eq!(index.trim(), "<h1>abc123</h1>");
}

#[tokio::test]
async fn step_name_is_exported() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        &dir.path().join("stages"),
        Step::Deploy,
        r#"echo "stage=$EDGESWAP_STAGE" >> "$EDGESWAP_REPORT""#,
    );

    let outcome = agent(&dir).run(Step::Deploy, &env("shop-1")).await.unwrap();
    assert_eq!(outcome.output("stage"), Some("deploy"));
    assert!(outcome.artifact.is_none());
}

#[tokio::test]
async fn nonzero_exit_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        &dir.path().join("stages"),
        Step::Build,
        "echo 'npm ERR! missing script' >&2\nexit 3",
    );

    let outcome = agent(&dir).run(Step::Build, &env("shop-1")).await.unwrap();
    assert!(!outcome.success());
    assert_eq!(outcome.exit_code, 3);
    assert!(outcome.stderr.contains("missing script"));
}

#[tokio::test]
async fn slow_step_times_out() {
    let dir = tempfile::tempdir().unwrap();
    write_script(&dir.path().join("stages"), Step::Source, "sleep 5");

    let err = agent(&dir)
        .with_timeout(Duration::from_millis(200))
        .run(Step::Source, &env("shop-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Timeout { step: Step::Source, .. }));
}

#[tokio::test]
async fn missing_script_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = agent(&dir).run(Step::Source, &env("shop-1")).await.unwrap();
    assert!(outcome.skipped);
    assert!(outcome.success());
    assert!(!dir.path().join("work").exists());
}

#[tokio::test]
async fn reruns_start_from_an_empty_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let stages = dir.path().join("stages");
    write_script(
        &stages,
        Step::Build,
        r#"echo first > "$EDGESWAP_OUTPUT_DIR/stale.txt""#,
    );
    let agent = agent(&dir);
    agent.run(Step::Build, &env("shop-1")).await.unwrap();

    write_script(
        &stages,
        Step::Build,
        r#"echo second > "$EDGESWAP_OUTPUT_DIR/fresh.txt""#,
    );
    let outcome = agent.run(Step::Build, &env("shop-1")).await.unwrap();
    let artifact = outcome.artifact.unwrap();
    assert!(artifact.join("fresh.txt").exists());
    assert!(!artifact.join("stale.txt").exists());
}

#[tokio::test]
async fn scripts_run_in_the_configured_directory() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(project.join("package.json"), "{}").unwrap();
    write_script(
        &dir.path().join("stages"),
        Step::Source,
        r#"test -f package.json && echo "found=yes" >> "$EDGESWAP_REPORT""#,
    );

    let outcome = agent(&dir)
        .with_current_dir(&project)
        .run(Step::Source, &env("shop-1"))
        .await
        .unwrap();
    assert!(outcome.success());
    assert_eq!(outcome.output("found"), Some("yes"));
}
