//! Lifecycle of the background message consumer.
//!
//! The consumer is a long-running console command. Starting it never blocks;
//! stopping it is synchronous and tolerates a process that has already
//! exited. Strays left by earlier runs are cleaned up by pattern with
//! `pkill -f`.

use std::fs::{File, OpenOptions};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use baseline_config::Config;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::IsolationError;

/// Tracing target for consumer process management.
pub(crate) const CONSUMER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::consumer");

const STOP_GRACE: Duration = Duration::from_secs(2);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// `pkill` exit status meaning no process matched.
const PKILL_NO_MATCH: i32 = 1;

/// Command line and environment of the consumer daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerCommand {
    program: String,
    args: Vec<String>,
    current_dir: Utf8PathBuf,
    log_file: Option<Utf8PathBuf>,
    pattern: String,
}

impl ConsumerCommand {
    /// Describes a consumer explicitly. The pattern defaults to the
    /// arguments joined by spaces.
    pub fn new<I, S>(program: impl Into<String>, args: I, current_dir: impl Into<Utf8PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program_name: String = program.into();
        let arguments: Vec<String> = args.into_iter().map(Into::into).collect();
        let pattern = if arguments.is_empty() {
            program_name.clone()
        } else {
            arguments.join(" ")
        };
        Self {
            program: program_name,
            args: arguments,
            current_dir: current_dir.into(),
            log_file: None,
            pattern,
        }
    }

    /// Builds `<consumer_command> --env=<app_env>` plus `--no-debug` when the
    /// application is not in debug mode, run from `app_root`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut words = config.consumer_command.split_whitespace().map(str::to_owned);
        let program = words.next().unwrap_or_default();
        let mut arguments: Vec<String> = words.collect();
        arguments.push(format!("--env={}", config.app_env));
        if !config.app_debug {
            arguments.push(String::from("--no-debug"));
        }
        let mut command = Self::new(program, arguments, config.app_root.clone())
            .with_pattern(config.consumer_pattern());
        command.log_file.clone_from(&config.consumer_log);
        command
    }

    /// Appends consumer output to `path` instead of discarding it.
    #[must_use]
    pub fn with_log_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Overrides the pattern used to find stray consumers.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    /// Program that is executed.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory of the consumer.
    #[must_use]
    pub fn working_dir(&self) -> &Utf8Path {
        &self.current_dir
    }

    /// Pattern matched against full command lines by `pkill -f`.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Renders the command line for logs and errors.
    #[must_use]
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn output_streams(&self) -> Result<(Stdio, Stdio), IsolationError> {
        let Some(path) = &self.log_file else {
            return Ok((Stdio::null(), Stdio::null()));
        };
        let file = open_log(path).map_err(|source| self.spawn_error(source))?;
        let duplicate = file.try_clone().map_err(|source| self.spawn_error(source))?;
        Ok((Stdio::from(file), Stdio::from(duplicate)))
    }

    fn spawn_error(&self, source: std::io::Error) -> IsolationError {
        IsolationError::ConsumerSpawn {
            command: self.display_line(),
            source: Arc::new(source),
        }
    }
}

fn open_log(path: &Utf8Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Controls one message-consumer daemon.
pub trait Consumer {
    /// Starts the consumer without waiting for it. Starting a running
    /// consumer is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`IsolationError::ConsumerSpawn`] when the process cannot be
    /// launched.
    fn start(&mut self) -> Result<(), IsolationError>;

    /// Stops the consumer and waits for it to exit. Stopping a consumer that
    /// is not running, or has already exited, succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`IsolationError::ConsumerStop`] when the process cannot be
    /// signalled or reaped.
    fn stop(&mut self) -> Result<(), IsolationError>;

    /// Returns whether the consumer process is alive.
    fn is_running(&mut self) -> bool;

    /// Pattern identifying consumer processes on the host.
    fn pattern(&self) -> &str;

    /// Directory the consumer runs from.
    fn working_dir(&self) -> &Utf8Path;
}

/// [`Consumer`] backed by an operating-system child process.
#[derive(Debug)]
pub struct ConsumerProcess {
    command: ConsumerCommand,
    child: Option<Child>,
    grace: Duration,
}

impl ConsumerProcess {
    /// Creates a stopped consumer for `command`.
    #[must_use]
    pub fn new(command: ConsumerCommand) -> Self {
        Self {
            command,
            child: None,
            grace: STOP_GRACE,
        }
    }

    /// Overrides how long `stop` waits after asking the process to exit.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Process identifier of the running consumer, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn reap(child: &mut Child, grace: Duration) -> Result<(), IsolationError> {
        let pid = child.id();
        let deadline = Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(target: CONSUMER_TARGET, pid, ?status, "consumer exited");
                    return Ok(());
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(STOP_POLL_INTERVAL),
                Ok(None) => break,
                Err(error) => {
                    return Err(IsolationError::ConsumerStop {
                        pid,
                        message: error.to_string(),
                    });
                }
            }
        }

        warn!(
            target: CONSUMER_TARGET,
            pid,
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "consumer ignored termination request, killing"
        );
        if let Err(error) = child.kill() {
            // The process may have exited between the last poll and the kill.
            debug!(target: CONSUMER_TARGET, pid, %error, "kill reported an error");
        }
        child
            .wait()
            .map(|_| ())
            .map_err(|error| IsolationError::ConsumerStop {
                pid,
                message: error.to_string(),
            })
    }
}

#[cfg(unix)]
fn request_exit(child: &Child) -> Result<(), IsolationError> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = child.id();
    let raw = i32::try_from(pid).map_err(|_| IsolationError::ConsumerStop {
        pid,
        message: String::from("process identifier out of range"),
    })?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(IsolationError::ConsumerStop {
            pid,
            message: errno.to_string(),
        }),
    }
}

#[cfg(not(unix))]
fn request_exit(_child: &Child) -> Result<(), IsolationError> {
    Ok(())
}

impl Consumer for ConsumerProcess {
    fn start(&mut self) -> Result<(), IsolationError> {
        if self.is_running() {
            debug!(
                target: CONSUMER_TARGET,
                pid = self.pid(),
                "consumer already running"
            );
            return Ok(());
        }

        let (stdout, stderr) = self.command.output_streams()?;
        let child = Command::new(self.command.program())
            .args(self.command.arguments())
            .current_dir(self.command.working_dir())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| self.command.spawn_error(source))?;

        info!(
            target: CONSUMER_TARGET,
            pid = child.id(),
            command = %self.command.display_line(),
            "consumer started"
        );
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), IsolationError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Ok(Some(status)) = child.try_wait() {
            debug!(
                target: CONSUMER_TARGET,
                pid = child.id(),
                ?status,
                "consumer had already exited"
            );
            return Ok(());
        }
        request_exit(&child)?;
        Self::reap(&mut child, self.grace)?;
        info!(target: CONSUMER_TARGET, pid = child.id(), "consumer stopped");
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    fn pattern(&self) -> &str {
        self.command.pattern()
    }

    fn working_dir(&self) -> &Utf8Path {
        self.command.working_dir()
    }
}

impl Drop for ConsumerProcess {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(target: CONSUMER_TARGET, %error, "failed to stop consumer on drop");
        }
    }
}

/// Kills every process whose command line matches `pattern`.
///
/// Returns `true` when at least one process was signalled and `false` when
/// none matched.
///
/// # Errors
///
/// Spawn failures and exit statuses other than "no process matched" are
/// returned.
pub fn terminate_matching<R>(
    runner: &R,
    pattern: &str,
    working_dir: &Utf8Path,
) -> Result<bool, IsolationError>
where
    R: CommandRunner + ?Sized,
{
    let spec = CommandSpec::new("pkill")
        .args(["-f", "--", pattern])
        .current_dir(working_dir);
    let output = runner.run(&spec)?;
    match output.status {
        Some(0) => {
            info!(target: CONSUMER_TARGET, pattern, "terminated stray consumers");
            Ok(true)
        }
        Some(PKILL_NO_MATCH) => {
            debug!(target: CONSUMER_TARGET, pattern, "no stray consumers found");
            Ok(false)
        }
        status => Err(IsolationError::CommandFailed {
            command: spec.display_line(),
            status,
            stderr: output.stderr.trim().to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests;
