//! Domain errors raised by isolators and their collaborators.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O errors are wrapped in `Arc`
//! so the enums stay cheap to clone when collected across a phase.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::hooks::SuiteHook;
use crate::isolator::IsolationPhase;

/// Errors raised by a single isolator or the resources it drives.
#[derive(Debug, Clone, Error)]
pub enum IsolationError {
    /// The queue still held ready messages when the drain budget ran out.
    #[error("queue '{queue}' still held {ready} ready messages after {budget:?}")]
    Timeout {
        /// Queue that was being drained.
        queue: String,
        /// Ready-message count observed at the final poll.
        ready: u64,
        /// Budget that was exhausted.
        budget: Duration,
    },

    /// An external command could not be spawned.
    #[error("failed to run '{program}': {source}")]
    CommandSpawn {
        /// Program that was invoked.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// An external command exited unsuccessfully.
    #[error("'{command}' exited with status {}: {stderr}", display_status(*status))]
    CommandFailed {
        /// Command line that was run, without its environment.
        command: String,
        /// Exit code, absent when the process was killed by a signal.
        status: Option<i32>,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The message broker rejected or failed a request.
    #[error("broker request to {endpoint} failed: {message}")]
    Broker {
        /// Management endpoint that was called.
        endpoint: String,
        /// Human-readable failure description.
        message: String,
    },

    /// The consumer process could not be started.
    #[error("failed to start consumer '{command}': {source}")]
    ConsumerSpawn {
        /// Consumer command line.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The consumer process could not be stopped.
    #[error("failed to stop consumer process {pid}: {message}")]
    ConsumerStop {
        /// Operating system process identifier.
        pid: u32,
        /// Human-readable failure description.
        message: String,
    },

    /// A restore was requested before any snapshot was taken.
    #[error("no snapshot of database '{database}' has been taken")]
    SnapshotMissing {
        /// Database whose snapshot is missing.
        database: String,
    },

    /// A hook was invoked in a state that does not permit it.
    #[error("isolator '{isolator}' cannot run {operation}: {message}")]
    InvalidState {
        /// Isolator name.
        isolator: String,
        /// Operation that was attempted.
        operation: &'static str,
        /// Description of the offending state.
        message: String,
    },

    /// The application kernel failed to boot or shut down.
    #[error("application kernel failed: {message}")]
    Kernel {
        /// Human-readable failure description.
        message: String,
    },

    /// The snapshot cache directory could not be prepared.
    #[error("failed to prepare cache directory {path}: {source}")]
    CacheDirectory {
        /// Directory that was being created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A progress line could not be written to the event output.
    #[error("failed to write progress output: {source}")]
    Output {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

fn display_status(status: Option<i32>) -> String {
    status.map_or_else(|| String::from("signal"), |code| code.to_string())
}

impl IsolationError {
    /// Wraps an I/O error raised while spawning `program`.
    pub(crate) fn spawn(program: &str, source: io::Error) -> Self {
        Self::CommandSpawn {
            program: program.to_owned(),
            source: Arc::new(source),
        }
    }

    /// Wraps an I/O error raised while writing to an event output.
    pub(crate) fn output(source: io::Error) -> Self {
        Self::Output {
            source: Arc::new(source),
        }
    }
}

/// Errors raised while registering isolators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Another isolator already uses the tag.
    #[error("isolator tag '{tag}' is already registered by '{existing}'")]
    DuplicateTag {
        /// Conflicting tag.
        tag: String,
        /// Name of the isolator that registered the tag first.
        existing: String,
    },

    /// The isolator's tag is empty.
    #[error("isolator '{name}' has an empty tag")]
    EmptyTag {
        /// Name of the rejected isolator.
        name: String,
    },
}

/// A single isolator hook failure, naming the isolator and phase.
#[derive(Debug, Clone, Error)]
#[error("isolator '{isolator}' failed during {phase}: {source}")]
pub struct PhaseFailure {
    /// Name of the isolator that failed.
    pub isolator: String,
    /// Phase in which it failed.
    pub phase: IsolationPhase,
    /// Underlying isolator error.
    #[source]
    pub source: IsolationError,
}

/// Errors surfaced by the isolation dispatcher.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// A fatal phase stopped at the first failure.
    #[error("{phase} aborted: {failure}")]
    Aborted {
        /// Phase that was aborted.
        phase: IsolationPhase,
        /// Failure that aborted it.
        failure: Box<PhaseFailure>,
    },

    /// A best-effort phase finished with one or more failures.
    #[error("{phase} finished with {} isolator failure(s): {}", failures.len(), summarise(failures))]
    Incomplete {
        /// Phase that ran.
        phase: IsolationPhase,
        /// Every failure collected during the phase.
        failures: Vec<PhaseFailure>,
    },

    /// A per-test phase was requested before the suite started.
    #[error("cannot run {phase} before the suite has started")]
    NotStarted {
        /// Phase that was requested.
        phase: IsolationPhase,
    },
}

impl DispatchError {
    /// Returns every isolator failure carried by the error.
    #[must_use]
    pub fn failures(&self) -> Vec<&PhaseFailure> {
        match self {
            Self::Aborted { failure, .. } => vec![failure.as_ref()],
            Self::Incomplete { failures, .. } => failures.iter().collect(),
            Self::NotStarted { .. } => Vec::new(),
        }
    }
}

/// Errors a hook subscriber can return from a single hook.
#[derive(Debug, Clone, Error)]
pub enum SubscriberError {
    /// The isolation dispatcher reported failures.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A resource driven directly by the subscriber failed.
    #[error(transparent)]
    Isolation(#[from] IsolationError),
}

/// Errors surfaced by the hook bus.
#[derive(Debug, Clone, Error)]
pub enum HookError {
    /// One subscriber failed while handling a hook.
    #[error("subscriber '{subscriber}' failed on {hook}: {source}")]
    Subscriber {
        /// Name of the failing subscriber.
        subscriber: String,
        /// Hook being delivered.
        hook: SuiteHook,
        /// Underlying subscriber error.
        #[source]
        source: SubscriberError,
    },

    /// Several subscribers failed while handling a teardown hook.
    #[error("{hook} finished with {} subscriber failure(s): {}", errors.len(), summarise(errors))]
    Aggregate {
        /// Hook being delivered.
        hook: SuiteHook,
        /// Every failure, in delivery order.
        errors: Vec<HookError>,
    },
}

fn summarise<E: ToString>(failures: &[E]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
