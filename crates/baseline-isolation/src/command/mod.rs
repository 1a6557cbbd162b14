//! External command execution.
//!
//! Isolators describe the commands they need as [`CommandSpec`] values and
//! hand them to a [`CommandRunner`]. Credentials travel as [`Secret`]
//! environment entries so they never appear on the command line or in logs.

use std::fmt;
use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::IsolationError;

/// Tracing target for command execution.
pub(crate) const COMMAND_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::command");

/// A sensitive string whose `Debug` and `Display` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wraps a sensitive value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the wrapped value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

/// Description of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    env: Vec<(String, Secret)>,
    current_dir: Option<Utf8PathBuf>,
}

impl CommandSpec {
    /// Starts a command for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable holding a credential.
    #[must_use]
    pub fn secret_env(mut self, key: impl Into<String>, value: Secret) -> Self {
        self.env.push((key.into(), value));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Environment entries added for the command.
    #[must_use]
    pub fn environment(&self) -> &[(String, Secret)] {
        &self.env
    }

    /// Working directory, if set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.current_dir.as_deref()
    }

    /// Renders the program and arguments for logs and errors.
    #[must_use]
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code, absent when the process was killed by a signal.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Output of a process that exited with `code`.
    #[must_use]
    pub const fn exited(code: i32) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Returns whether the process exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }
}

/// Executes external commands synchronously.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Runs `spec` to completion.
    ///
    /// Non-zero exit statuses are reported through [`CommandOutput`], not as
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns [`IsolationError::CommandSpawn`] when the process cannot be
    /// started or awaited.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, IsolationError>;
}

/// Runner backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, IsolationError> {
        let mut command = Command::new(spec.program());
        command
            .args(spec.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in spec.environment() {
            command.env(key, value.expose());
        }
        if let Some(dir) = spec.working_dir() {
            command.current_dir(dir);
        }

        debug!(
            target: COMMAND_TARGET,
            command = %spec.display_line(),
            "running external command"
        );

        let output = command
            .output()
            .map_err(|source| IsolationError::spawn(spec.program(), source))?;

        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            target: COMMAND_TARGET,
            command = %spec.display_line(),
            status = ?result.status,
            "external command finished"
        );
        Ok(result)
    }
}

/// Runs `spec` and converts a non-zero exit into
/// [`IsolationError::CommandFailed`].
///
/// # Errors
///
/// Propagates spawn failures and reports unsuccessful exits.
pub fn run_checked<R>(runner: &R, spec: &CommandSpec) -> Result<CommandOutput, IsolationError>
where
    R: CommandRunner + ?Sized,
{
    let output = runner.run(spec)?;
    if output.success() {
        Ok(output)
    } else {
        Err(IsolationError::CommandFailed {
            command: spec.display_line(),
            status: output.status,
            stderr: output.stderr.trim().to_owned(),
        })
    }
}

#[cfg(test)]
mod tests;
