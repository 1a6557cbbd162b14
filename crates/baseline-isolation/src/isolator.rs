//! The contract every isolation strategy implements.

use std::fmt;
use std::time::Duration;

use crate::environment::IsolationEnvironment;
use crate::error::IsolationError;
use crate::event::{
    AfterFinishTestsEvent, AfterIsolatedTestEvent, BeforeIsolatedTestEvent, BeforeStartTestsEvent,
    RestoreStateEvent,
};

/// A named strategy that resets one kind of durable state between tests.
///
/// Isolators are constructed once at startup and driven through the suite
/// lifecycle by the dispatcher: `start` once, `before_test` and `after_test`
/// around every test unit, then `terminate` once.
pub trait Isolator {
    /// Human-readable name used in logs and failures.
    fn name(&self) -> &str;

    /// Stable identifier; defaults to the slug of [`Isolator::name`].
    fn tag(&self) -> String {
        slugify(self.name())
    }

    /// Returns whether the isolator applies to `environment`.
    ///
    /// Evaluated once per isolator per run.
    fn is_applicable(&self, environment: &IsolationEnvironment) -> bool;

    /// Captures the baseline before any test runs.
    ///
    /// # Errors
    ///
    /// Failures abort the suite.
    fn start(&mut self, event: &BeforeStartTestsEvent) -> Result<(), IsolationError>;

    /// Prepares external state before a test unit.
    ///
    /// # Errors
    ///
    /// Returns the failure so the dispatcher can report it.
    fn before_test(&mut self, event: &BeforeIsolatedTestEvent) -> Result<(), IsolationError>;

    /// Returns external state to the baseline after a test unit.
    ///
    /// # Errors
    ///
    /// Returns the failure so the dispatcher can report it.
    fn after_test(&mut self, event: &AfterIsolatedTestEvent) -> Result<(), IsolationError>;

    /// Releases resources once the suite has finished.
    ///
    /// # Errors
    ///
    /// Failures abort the remaining teardown.
    fn terminate(&mut self, event: &AfterFinishTestsEvent) -> Result<(), IsolationError>;

    /// Reports whether external state has drifted from the baseline.
    fn is_outdated_state(&self) -> bool {
        false
    }

    /// Re-syncs external state to the last known-good baseline without a
    /// fresh `start`. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns the failure so the dispatcher can report it.
    fn restore_state(&mut self, event: &RestoreStateEvent) -> Result<(), IsolationError>;
}

/// An isolator that can block until its message queue has been processed.
pub trait MessageQueueIsolator: Isolator {
    /// Polls the queue until it is empty or `time_limit` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`IsolationError::Timeout`] when messages remain after the
    /// budget, or the broker error that interrupted polling.
    fn wait_while_processing_messages(&mut self, time_limit: Duration)
    -> Result<(), IsolationError>;
}

/// Lifecycle phase in which an isolator hook ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationPhase {
    /// Suite start.
    Start,
    /// Before a test unit.
    BeforeTest,
    /// After a test unit.
    AfterTest,
    /// Suite end.
    Terminate,
    /// On-demand baseline re-sync.
    RestoreState,
}

impl fmt::Display for IsolationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::BeforeTest => "before_test",
            Self::AfterTest => "after_test",
            Self::Terminate => "terminate",
            Self::RestoreState => "restore_state",
        };
        f.write_str(label)
    }
}

/// Converts a display name into a lowercase, underscore-separated tag.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;
    for character in name.chars() {
        if character.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(character.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}
