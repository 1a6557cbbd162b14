//! Priority-ordered dispatch of lifecycle phases to isolators.
//!
//! Setup phases (`start`, `before_test`) visit isolators in descending
//! priority; teardown phases (`after_test`, `terminate`) visit them in
//! ascending priority. Applicability is evaluated at `start` for every run
//! and isolators that do not apply are never invoked.
//!
//! `start` and `terminate` stop at the first failure. Per-test phases and
//! restores attempt every isolator and then report all collected failures.

use tracing::{debug, error, info};

use crate::environment::IsolationEnvironment;
use crate::error::{DispatchError, IsolationError, PhaseFailure};
use crate::event::{
    AfterFinishTestsEvent, AfterIsolatedTestEvent, BeforeIsolatedTestEvent, BeforeStartTestsEvent,
    RestoreStateEvent,
};
use crate::isolator::{IsolationPhase, Isolator};
use crate::registry::{IsolatorRegistry, RegisteredIsolator};

/// Tracing target for dispatcher events.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

struct DispatchEntry {
    registered: RegisteredIsolator,
    applicable: bool,
}

/// Drives registered isolators through the suite lifecycle.
pub struct IsolationDispatcher {
    entries: Vec<DispatchEntry>,
    started: bool,
}

impl IsolationDispatcher {
    /// Builds a dispatcher over the registry's isolators.
    #[must_use]
    pub fn new(registry: IsolatorRegistry) -> Self {
        let entries = registry
            .into_entries()
            .into_iter()
            .map(|registered| DispatchEntry {
                registered,
                applicable: false,
            })
            .collect();
        Self {
            entries,
            started: false,
        }
    }

    /// Returns whether `start` has completed and `terminate` has not.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Tags of isolators that applied to the current run, in setup order.
    #[must_use]
    pub fn applicable_tags(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.applicable)
            .map(|entry| entry.registered.tag())
            .collect()
    }

    /// Evaluates applicability and starts every applicable isolator.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Aborted`] with the first failure; later
    /// isolators are not started.
    pub fn start(
        &mut self,
        environment: &IsolationEnvironment,
        event: &BeforeStartTestsEvent,
    ) -> Result<(), DispatchError> {
        self.started = false;
        for entry in &mut self.entries {
            entry.applicable = entry.registered.isolator().is_applicable(environment);
            if !entry.applicable {
                info!(
                    target: DISPATCH_TARGET,
                    isolator = entry.registered.name(),
                    os = %environment.os(),
                    driver = environment.database_driver(),
                    transport = environment.message_queue_transport(),
                    "isolator does not apply to this run"
                );
            }
        }

        run_fatal(
            self.entries.iter_mut(),
            IsolationPhase::Start,
            |isolator| isolator.start(event),
        )?;
        self.started = true;
        Ok(())
    }

    /// Runs `before_test` on every applicable isolator in descending priority.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Incomplete`] listing every failure, or
    /// [`DispatchError::NotStarted`] before `start` has succeeded.
    pub fn before_test(&mut self, event: &BeforeIsolatedTestEvent) -> Result<(), DispatchError> {
        self.ensure_started(IsolationPhase::BeforeTest)?;
        run_best_effort(
            self.entries.iter_mut(),
            IsolationPhase::BeforeTest,
            |isolator| isolator.before_test(event),
        )
    }

    /// Runs `after_test` on every applicable isolator in ascending priority.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Incomplete`] listing every failure, or
    /// [`DispatchError::NotStarted`] before `start` has succeeded.
    pub fn after_test(&mut self, event: &AfterIsolatedTestEvent) -> Result<(), DispatchError> {
        self.ensure_started(IsolationPhase::AfterTest)?;
        run_best_effort(
            self.entries.iter_mut().rev(),
            IsolationPhase::AfterTest,
            |isolator| isolator.after_test(event),
        )
    }

    /// Terminates every applicable isolator in ascending priority.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Aborted`] with the first failure, or
    /// [`DispatchError::NotStarted`] before `start` has succeeded.
    pub fn terminate(&mut self, event: &AfterFinishTestsEvent) -> Result<(), DispatchError> {
        self.ensure_started(IsolationPhase::Terminate)?;
        self.started = false;
        run_fatal(
            self.entries.iter_mut().rev(),
            IsolationPhase::Terminate,
            |isolator| isolator.terminate(event),
        )
    }

    /// Restores applicable isolators that report outdated state.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Incomplete`] listing every failure.
    pub fn restore_outdated(&mut self, event: &RestoreStateEvent) -> Result<(), DispatchError> {
        run_best_effort(
            self.entries
                .iter_mut()
                .filter(|entry| entry.registered.isolator().is_outdated_state()),
            IsolationPhase::RestoreState,
            |isolator| isolator.restore_state(event),
        )
    }

    /// Restores every applicable isolator regardless of reported staleness.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Incomplete`] listing every failure.
    pub fn restore_all(&mut self, event: &RestoreStateEvent) -> Result<(), DispatchError> {
        run_best_effort(
            self.entries.iter_mut(),
            IsolationPhase::RestoreState,
            |isolator| isolator.restore_state(event),
        )
    }

    fn ensure_started(&self, phase: IsolationPhase) -> Result<(), DispatchError> {
        if self.started {
            Ok(())
        } else {
            Err(DispatchError::NotStarted { phase })
        }
    }
}

impl std::fmt::Debug for IsolationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolationDispatcher")
            .field("applicable", &self.applicable_tags())
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

fn invoke<F>(
    entry: &mut DispatchEntry,
    phase: IsolationPhase,
    hook: &mut F,
) -> Result<(), PhaseFailure>
where
    F: FnMut(&mut dyn Isolator) -> Result<(), IsolationError>,
{
    debug!(
        target: DISPATCH_TARGET,
        isolator = entry.registered.name(),
        priority = entry.registered.priority(),
        %phase,
        "invoking isolator"
    );
    hook(entry.registered.isolator_mut()).map_err(|source| {
        error!(
            target: DISPATCH_TARGET,
            isolator = entry.registered.name(),
            %phase,
            error = %source,
            "isolator failed"
        );
        PhaseFailure {
            isolator: entry.registered.name().to_owned(),
            phase,
            source,
        }
    })
}

fn run_fatal<'a, I, F>(entries: I, phase: IsolationPhase, mut hook: F) -> Result<(), DispatchError>
where
    I: Iterator<Item = &'a mut DispatchEntry>,
    F: FnMut(&mut dyn Isolator) -> Result<(), IsolationError>,
{
    for entry in entries.filter(|entry| entry.applicable) {
        invoke(entry, phase, &mut hook).map_err(|failure| DispatchError::Aborted {
            phase,
            failure: Box::new(failure),
        })?;
    }
    Ok(())
}

fn run_best_effort<'a, I, F>(
    entries: I,
    phase: IsolationPhase,
    mut hook: F,
) -> Result<(), DispatchError>
where
    I: Iterator<Item = &'a mut DispatchEntry>,
    F: FnMut(&mut dyn Isolator) -> Result<(), IsolationError>,
{
    let failures: Vec<PhaseFailure> = entries
        .filter(|entry| entry.applicable)
        .filter_map(|entry| invoke(entry, phase, &mut hook).err())
        .collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(DispatchError::Incomplete { phase, failures })
    }
}
