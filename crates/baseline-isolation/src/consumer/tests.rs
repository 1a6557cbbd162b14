//! Unit tests for consumer commands and process control.
#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clarity and assertions"
)]

use rstest::rstest;

use super::*;
use crate::command::{CommandOutput, MockCommandRunner};

#[rstest]
fn command_from_config_adds_environment_flags() {
    let config = Config {
        app_root: Utf8PathBuf::from("/srv/app"),
        app_env: String::from("behat"),
        ..Config::default()
    };
    let command = ConsumerCommand::from_config(&config);

    assert_eq!(
        command.display_line(),
        "./console oro:message-queue:consume --env=behat --no-debug"
    );
    assert_eq!(command.working_dir(), Utf8Path::new("/srv/app"));
    assert_eq!(command.pattern(), "oro:message-queue:consume");
}

#[rstest]
fn debug_mode_omits_no_debug_flag() {
    let config = Config {
        app_debug: true,
        consumer_log: Some(Utf8PathBuf::from("/tmp/consumer.log")),
        ..Config::default()
    };
    let command = ConsumerCommand::from_config(&config);
    assert!(!command.arguments().iter().any(|arg| arg == "--no-debug"));
    assert_eq!(command.log_file.as_deref(), Some(Utf8Path::new("/tmp/consumer.log")));
}

#[rstest]
fn explicit_commands_default_their_pattern() {
    let command = ConsumerCommand::new("worker", ["consume", "--queue=jobs"], ".");
    assert_eq!(command.pattern(), "consume --queue=jobs");
    let bare = ConsumerCommand::new("worker", Vec::<String>::new(), ".");
    assert_eq!(bare.pattern(), "worker");
}

fn pkill_runner(status: i32) -> MockCommandRunner {
    pkill_runner_for("oro:message-queue:consume", status)
}

fn pkill_runner_for(pattern: &str, status: i32) -> MockCommandRunner {
    let pattern = pattern.to_owned();
    let mut runner = MockCommandRunner::new();
    runner
        .expect_run()
        .withf(move |spec| {
            spec.program() == "pkill"
                && spec.arguments() == ["-f", "--", pattern.as_str()]
                && spec.working_dir() == Some(Utf8Path::new("/srv/app"))
        })
        .times(1)
        .returning(move |_| Ok(CommandOutput::exited(status)));
    runner
}

#[rstest]
#[case(0, true)]
#[case(1, false)]
fn pkill_match_outcomes(#[case] status: i32, #[case] expected: bool) {
    let runner = pkill_runner(status);
    let killed = terminate_matching(
        &runner,
        "oro:message-queue:consume",
        Utf8Path::new("/srv/app"),
    )
    .expect("pkill outcome should be accepted");
    assert_eq!(killed, expected);
}

#[rstest]
fn patterns_starting_with_a_dash_are_not_read_as_options() {
    let runner = pkill_runner_for("-queue=jobs", 0);
    let killed = terminate_matching(&runner, "-queue=jobs", Utf8Path::new("/srv/app"))
        .expect("dash-led pattern is matched literally");
    assert!(killed);
}

#[rstest]
fn pkill_errors_other_than_no_match_surface() {
    let runner = pkill_runner(2);
    let error = terminate_matching(
        &runner,
        "oro:message-queue:consume",
        Utf8Path::new("/srv/app"),
    )
    .expect_err("status 2 must surface");
    assert!(matches!(
        error,
        IsolationError::CommandFailed {
            status: Some(2),
            ..
        }
    ));
}

#[rstest]
fn pkill_spawn_failures_surface() {
    let mut runner = MockCommandRunner::new();
    runner.expect_run().times(1).returning(|_| {
        Err(IsolationError::spawn(
            "pkill",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ))
    });
    let error = terminate_matching(&runner, "consume", Utf8Path::new("."))
        .expect_err("missing pkill must surface");
    assert!(matches!(error, IsolationError::CommandSpawn { .. }));
}

#[rstest]
fn stopping_an_unstarted_consumer_succeeds() {
    let mut consumer = ConsumerProcess::new(ConsumerCommand::new("sleep", ["30"], "."));
    consumer.stop().expect("stop without start");
    assert!(!consumer.is_running());
}

#[rstest]
fn missing_program_fails_to_start() {
    let mut consumer = ConsumerProcess::new(ConsumerCommand::new(
        "baseline-missing-consumer",
        Vec::<String>::new(),
        ".",
    ));
    let error = consumer.start().expect_err("spawn must fail");
    assert!(matches!(error, IsolationError::ConsumerSpawn { .. }));
    assert!(consumer.pid().is_none());
}

#[cfg(unix)]
mod process {
    use std::thread;
    use std::time::{Duration, Instant};

    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;

    use super::{Consumer, ConsumerCommand, ConsumerProcess};

    fn wait_until_exited(consumer: &mut ConsumerProcess) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while consumer.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[rstest]
    fn start_is_non_blocking_and_stop_reaps() {
        let mut consumer = ConsumerProcess::new(ConsumerCommand::new("sleep", ["30"], "."));
        let started = Instant::now();
        consumer.start().expect("start sleep");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(consumer.is_running());

        let pid = consumer.pid();
        consumer.start().expect("second start is a no-op");
        assert_eq!(consumer.pid(), pid);

        consumer.stop().expect("stop sleep");
        assert!(!consumer.is_running());
        assert!(consumer.pid().is_none());
    }

    #[rstest]
    fn stop_tolerates_an_exited_process() {
        let mut consumer =
            ConsumerProcess::new(ConsumerCommand::new("true", Vec::<String>::new(), "."));
        consumer.start().expect("start true");
        wait_until_exited(&mut consumer);
        consumer.stop().expect("stop after exit");
        assert!(!consumer.is_running());
    }

    #[rstest]
    fn stubborn_consumers_are_killed_after_grace() {
        let mut consumer = ConsumerProcess::new(ConsumerCommand::new(
            "sh",
            ["-c", "trap '' TERM; exec sleep 30"],
            ".",
        ))
        .with_grace(Duration::from_millis(100));
        consumer.start().expect("start stubborn consumer");
        thread::sleep(Duration::from_millis(100));
        consumer.stop().expect("stop stubborn consumer");
        assert!(!consumer.is_running());
    }

    #[rstest]
    fn output_is_appended_to_the_log_file() {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        let log = root.join("consumer.log");
        std::fs::write(&log, "previous\n").expect("seed log");

        let mut consumer = ConsumerProcess::new(
            ConsumerCommand::new("sh", ["-c", "echo consumed"], root.clone()).with_log_file(log.clone()),
        );
        consumer.start().expect("start echo");
        wait_until_exited(&mut consumer);
        consumer.stop().expect("stop echo");

        let contents = std::fs::read_to_string(&log).expect("read log");
        assert_eq!(contents, "previous\nconsumed\n");
    }
}
