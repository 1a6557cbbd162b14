//! Unit tests for command specs and runners.
#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clarity and assertions"
)]

use rstest::{fixture, rstest};

use super::*;

#[fixture]
fn dump_spec() -> CommandSpec {
    CommandSpec::new("pg_dump")
        .args(["-h", "127.0.0.1"])
        .arg("app_test")
        .secret_env("PGPASSWORD", Secret::new("hunter2"))
}

#[rstest]
fn display_line_omits_environment(dump_spec: CommandSpec) {
    let line = dump_spec.display_line();
    assert_eq!(line, "pg_dump -h 127.0.0.1 app_test");
    assert!(!format!("{dump_spec:?}").contains("hunter2"));
}

#[rstest]
fn secret_is_redacted() {
    let secret = Secret::new("hunter2");
    assert_eq!(secret.to_string(), "[redacted]");
    assert_eq!(format!("{secret:?}"), "Secret([redacted])");
    assert_eq!(secret.expose(), "hunter2");
}

#[rstest]
fn run_checked_accepts_success(dump_spec: CommandSpec) {
    let mut runner = MockCommandRunner::new();
    runner
        .expect_run()
        .times(1)
        .returning(|_| Ok(CommandOutput::exited(0)));
    let output = run_checked(&runner, &dump_spec).expect("command should succeed");
    assert!(output.success());
}

#[rstest]
fn run_checked_reports_non_zero_exit(dump_spec: CommandSpec) {
    let mut runner = MockCommandRunner::new();
    runner.expect_run().times(1).returning(|_| {
        Ok(CommandOutput {
            status: Some(1),
            stdout: String::new(),
            stderr: String::from("connection refused\n"),
        })
    });
    let error = run_checked(&runner, &dump_spec).expect_err("command should fail");
    match error {
        IsolationError::CommandFailed {
            command,
            status,
            stderr,
        } => {
            assert_eq!(command, "pg_dump -h 127.0.0.1 app_test");
            assert_eq!(status, Some(1));
            assert_eq!(stderr, "connection refused");
        }
        other => panic!("expected command failure, got {other:?}"),
    }
}

#[cfg(unix)]
#[rstest]
fn system_runner_passes_environment_and_status() {
    let spec = CommandSpec::new("sh")
        .args(["-c", "printf '%s' \"$BASELINE_PROBE\"; exit 3"])
        .secret_env("BASELINE_PROBE", Secret::new("visible"));
    let output = SystemCommandRunner.run(&spec).expect("sh should spawn");
    assert_eq!(output.status, Some(3));
    assert_eq!(output.stdout, "visible");
}

#[cfg(unix)]
#[rstest]
fn system_runner_honours_working_directory() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path");
    let spec = CommandSpec::new("pwd").current_dir(path.clone());
    let output = SystemCommandRunner.run(&spec).expect("pwd should spawn");
    assert!(output.success());
    let reported = std::fs::canonicalize(output.stdout.trim()).expect("canonicalise reported dir");
    let expected = std::fs::canonicalize(&path).expect("canonicalise temp dir");
    assert_eq!(reported, expected);
}

#[rstest]
fn system_runner_reports_missing_program() {
    let spec = CommandSpec::new("baseline-definitely-missing-binary");
    let error = SystemCommandRunner
        .run(&spec)
        .expect_err("missing binary should fail");
    assert!(matches!(error, IsolationError::CommandSpawn { .. }));
}
