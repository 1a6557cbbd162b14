//! Crate-level test doubles and BDD scenarios.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;

use crate::broker::{QueueInspector, QueueSpec};
use crate::clock::ManualClock;
use crate::consumer::Consumer;
use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::environment::IsolationEnvironment;
use crate::error::IsolationError;
use crate::event::{
    AfterFinishTestsEvent, AfterIsolatedTestEvent, BeforeIsolatedTestEvent, BeforeStartTestsEvent,
    RestoreStateEvent,
};
use crate::isolator::{IsolationPhase, Isolator, slugify};
use crate::os::OsFamily;

mod behaviour;
mod drain_behaviour;

/// Shared, ordered record of hook invocations.
pub(crate) type CallLog = Rc<RefCell<Vec<String>>>;

pub(crate) fn call_log() -> CallLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub(crate) fn entries(log: &CallLog) -> Vec<String> {
    log.borrow().clone()
}

pub(crate) fn linux_environment() -> IsolationEnvironment {
    IsolationEnvironment::new(OsFamily::Linux, "pdo_pgsql", "amqp")
}

/// Isolator that records every hook as `<tag>:<phase>`.
pub(crate) struct RecordingIsolator {
    name: String,
    log: CallLog,
    applicable: Rc<Cell<bool>>,
    failing: Vec<IsolationPhase>,
    outdated: bool,
}

impl RecordingIsolator {
    pub(crate) fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_owned(),
            log: Rc::clone(log),
            applicable: Rc::new(Cell::new(true)),
            failing: Vec::new(),
            outdated: false,
        }
    }

    pub(crate) fn not_applicable(self) -> Self {
        self.applicable.set(false);
        self
    }

    pub(crate) fn failing_in(mut self, phase: IsolationPhase) -> Self {
        self.failing.push(phase);
        self
    }

    pub(crate) const fn outdated(mut self) -> Self {
        self.outdated = true;
        self
    }

    pub(crate) fn applicability(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.applicable)
    }

    fn record(&self, phase: IsolationPhase) -> Result<(), IsolationError> {
        self.log
            .borrow_mut()
            .push(format!("{}:{phase}", slugify(&self.name)));
        if self.failing.contains(&phase) {
            Err(IsolationError::Kernel {
                message: format!("{} failed", self.name),
            })
        } else {
            Ok(())
        }
    }
}

impl Isolator for RecordingIsolator {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_applicable(&self, _environment: &IsolationEnvironment) -> bool {
        self.applicable.get()
    }

    fn start(&mut self, _event: &BeforeStartTestsEvent) -> Result<(), IsolationError> {
        self.record(IsolationPhase::Start)
    }

    fn before_test(&mut self, _event: &BeforeIsolatedTestEvent) -> Result<(), IsolationError> {
        self.record(IsolationPhase::BeforeTest)
    }

    fn after_test(&mut self, _event: &AfterIsolatedTestEvent) -> Result<(), IsolationError> {
        self.record(IsolationPhase::AfterTest)
    }

    fn terminate(&mut self, _event: &AfterFinishTestsEvent) -> Result<(), IsolationError> {
        self.record(IsolationPhase::Terminate)
    }

    fn is_outdated_state(&self) -> bool {
        self.outdated
    }

    fn restore_state(&mut self, _event: &RestoreStateEvent) -> Result<(), IsolationError> {
        self.record(IsolationPhase::RestoreState)
    }
}

/// Command runner that records every spec and replays scripted outcomes.
///
/// Commands succeed once the script is exhausted.
#[derive(Clone, Default)]
pub(crate) struct RecordingRunner {
    calls: Rc<RefCell<Vec<CommandSpec>>>,
    outcomes: Rc<RefCell<VecDeque<Result<CommandOutput, IsolationError>>>>,
}

impl RecordingRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn then_exit(self, code: i32) -> Self {
        self.outcomes
            .borrow_mut()
            .push_back(Ok(CommandOutput::exited(code)));
        self
    }

    pub(crate) fn then_fail(self, error: IsolationError) -> Self {
        self.outcomes.borrow_mut().push_back(Err(error));
        self
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(CommandSpec::display_line)
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, IsolationError> {
        self.calls.borrow_mut().push(spec.clone());
        self.outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(CommandOutput::exited(0)))
    }
}

/// Inspector whose queue empties at a fixed rate of simulated time.
pub(crate) struct DrainingInspector {
    clock: Arc<ManualClock>,
    initial: u64,
    per_message: Option<Duration>,
    declarations: Cell<usize>,
}

impl DrainingInspector {
    /// A queue holding `initial` messages, each consumed after `per_message`.
    pub(crate) fn draining(clock: &Arc<ManualClock>, initial: u64, per_message: Duration) -> Self {
        Self {
            clock: Arc::clone(clock),
            initial,
            per_message: Some(per_message),
            declarations: Cell::new(0),
        }
    }

    /// A queue whose depth never changes.
    pub(crate) fn stuck(clock: &Arc<ManualClock>, depth: u64) -> Self {
        Self {
            clock: Arc::clone(clock),
            initial: depth,
            per_message: None,
            declarations: Cell::new(0),
        }
    }

    pub(crate) fn declarations(&self) -> usize {
        self.declarations.get()
    }
}

impl QueueInspector for DrainingInspector {
    fn declare(&self, _queue: &QueueSpec) -> Result<(), IsolationError> {
        self.declarations.set(self.declarations.get() + 1);
        Ok(())
    }

    fn ready_messages(&self, _queue: &QueueSpec) -> Result<u64, IsolationError> {
        let Some(per_message) = self.per_message else {
            return Ok(self.initial);
        };
        let elapsed = self.clock.elapsed().as_millis();
        let consumed = elapsed
            .checked_div(per_message.as_millis())
            .and_then(|count| u64::try_from(count).ok())
            .unwrap_or(u64::MAX);
        Ok(self.initial.saturating_sub(consumed))
    }
}

/// Consumer that records start and stop calls without spawning anything.
pub(crate) struct FakeConsumer {
    log: CallLog,
    running: bool,
    fail_start: bool,
}

impl FakeConsumer {
    pub(crate) fn new(log: &CallLog) -> Self {
        Self {
            log: Rc::clone(log),
            running: false,
            fail_start: false,
        }
    }

    pub(crate) fn failing_to_start(mut self) -> Self {
        self.fail_start = true;
        self
    }
}

impl Consumer for FakeConsumer {
    fn start(&mut self) -> Result<(), IsolationError> {
        self.log.borrow_mut().push(String::from("consumer:start"));
        if self.fail_start {
            return Err(IsolationError::spawn(
                "consume",
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), IsolationError> {
        self.log.borrow_mut().push(String::from("consumer:stop"));
        self.running = false;
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.running
    }

    fn pattern(&self) -> &str {
        "consume"
    }

    fn working_dir(&self) -> &Utf8Path {
        Utf8Path::new(".")
    }
}
