//! Settles the application once before the database snapshot is taken.
//!
//! The initial-state isolator boots the application kernel and lets the
//! message queue drain so work queued by installation or fixtures lands in
//! the database before it is dumped. It registers above the database
//! isolator so it always runs first during `start`.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::environment::IsolationEnvironment;
use crate::error::IsolationError;
use crate::event::{
    AfterFinishTestsEvent, AfterIsolatedTestEvent, BeforeIsolatedTestEvent, BeforeStartTestsEvent,
    RestoreStateEvent,
};
use crate::isolator::{Isolator, MessageQueueIsolator};
use crate::queue::DEFAULT_DRAIN_TIMEOUT;

/// Tracing target for initial-state events.
pub(crate) const INITIAL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::initial");

/// Progress line written before the settle sequence.
pub const SETTLE_MESSAGE: &str = "Processing messages before database dump";

/// Boots and shuts down the application under test.
pub trait Kernel {
    /// Brings the application up.
    ///
    /// # Errors
    ///
    /// Returns [`IsolationError::Kernel`] when the application cannot boot.
    fn boot(&mut self) -> Result<(), IsolationError>;

    /// Shuts the application down. Must tolerate a kernel that never booted.
    ///
    /// # Errors
    ///
    /// Returns [`IsolationError::Kernel`] when shutdown fails.
    fn shutdown(&mut self) -> Result<(), IsolationError>;
}

/// Kernel for console applications rooted at a directory.
///
/// This is the default [`Kernel`] used by the standard registry. A console
/// application has no resident process to bring up: its work happens in the
/// consumer and in the console commands the other isolators run. Booting
/// therefore only checks that the application root is a directory, so a
/// misconfigured root fails the suite before anything is dumped.
///
/// Applications with a real in-process kernel implement [`Kernel`]
/// themselves and pass it to [`InitialStateIsolator::new`].
#[derive(Debug, Clone)]
pub struct ConsoleKernel {
    root: Utf8PathBuf,
    booted: bool,
}

impl ConsoleKernel {
    /// Creates a kernel for the application at `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            booted: false,
        }
    }

    /// Application root directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns whether the kernel is booted.
    #[must_use]
    pub const fn is_booted(&self) -> bool {
        self.booted
    }
}

impl Kernel for ConsoleKernel {
    fn boot(&mut self) -> Result<(), IsolationError> {
        if !self.root.is_dir() {
            return Err(IsolationError::Kernel {
                message: format!("application root {} is not a directory", self.root),
            });
        }
        self.booted = true;
        info!(target: INITIAL_TARGET, root = %self.root, "application kernel booted");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), IsolationError> {
        if self.booted {
            self.booted = false;
            info!(target: INITIAL_TARGET, root = %self.root, "application kernel shut down");
        }
        Ok(())
    }
}

/// Composite isolator that drains pending messages before the first dump.
pub struct InitialStateIsolator<K, M> {
    kernel: K,
    queue: Option<M>,
    drain_timeout: Duration,
}

impl<K, M> InitialStateIsolator<K, M>
where
    K: Kernel,
    M: MessageQueueIsolator,
{
    /// Creates the isolator. Without a queue isolator only the kernel is
    /// cycled.
    pub const fn new(kernel: K, queue: Option<M>) -> Self {
        Self {
            kernel,
            queue,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Overrides the budget for the settle drain.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// The wrapped kernel.
    #[must_use]
    pub const fn kernel(&self) -> &K {
        &self.kernel
    }

    fn settle(&mut self, event: &BeforeStartTestsEvent) -> Result<(), IsolationError> {
        event
            .output()
            .writeln(SETTLE_MESSAGE)
            .map_err(IsolationError::output)?;
        let Some(queue) = self.queue.as_mut() else {
            info!(target: INITIAL_TARGET, "no message queue to settle");
            return Ok(());
        };
        let budget = self.drain_timeout;
        let waited = queue
            .before_test(&BeforeIsolatedTestEvent::default())
            .and_then(|()| queue.wait_while_processing_messages(budget));
        // The consumer is stopped and strays are swept whatever happened above.
        let finished = queue.after_test(&AfterIsolatedTestEvent::default());
        waited.and(finished)
    }
}

impl<K, M> Isolator for InitialStateIsolator<K, M>
where
    K: Kernel,
    M: MessageQueueIsolator,
{
    fn name(&self) -> &str {
        "Initial Message Queue"
    }

    fn is_applicable(&self, _environment: &IsolationEnvironment) -> bool {
        true
    }

    fn start(&mut self, event: &BeforeStartTestsEvent) -> Result<(), IsolationError> {
        self.kernel.boot()?;
        let settled = self.settle(event);
        let shutdown = self.kernel.shutdown();
        if let (Err(settle_error), Err(shutdown_error)) = (&settled, &shutdown) {
            warn!(
                target: INITIAL_TARGET,
                error = %shutdown_error,
                settle_error = %settle_error,
                "kernel shutdown failed after settle failure"
            );
        }
        settled?;
        shutdown
    }

    fn before_test(&mut self, _event: &BeforeIsolatedTestEvent) -> Result<(), IsolationError> {
        Ok(())
    }

    fn after_test(&mut self, _event: &AfterIsolatedTestEvent) -> Result<(), IsolationError> {
        Ok(())
    }

    fn terminate(&mut self, _event: &AfterFinishTestsEvent) -> Result<(), IsolationError> {
        Ok(())
    }

    fn restore_state(&mut self, _event: &RestoreStateEvent) -> Result<(), IsolationError> {
        Ok(())
    }
}
