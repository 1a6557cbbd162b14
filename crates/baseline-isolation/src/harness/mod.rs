//! Facade the acceptance-test runner drives at suite and feature boundaries.
//!
//! The harness owns the hook bus. The isolation dispatcher is subscribed on
//! construction; further subscribers, such as the consumer process
//! subscriber, are added with [`Harness::subscribe`].

use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;

use crate::dispatch::{DISPATCH_TARGET, IsolationDispatcher};
use crate::environment::IsolationEnvironment;
use crate::error::{DispatchError, HookError};
use crate::event::{OutputSink, RestoreStateEvent};
use crate::hooks::{HookBus, HookContext, HookSubscriber, SuiteHook};
use crate::registry::IsolatorRegistry;
use crate::subscriber::{IsolationSubscriber, SharedDispatcher};

/// Entry point for a test runner.
#[derive(Debug)]
pub struct Harness {
    bus: HookBus,
    dispatcher: SharedDispatcher,
    output: OutputSink,
}

impl Harness {
    /// Builds a harness dispatching `registry` against `environment`.
    #[must_use]
    pub fn new(
        registry: IsolatorRegistry,
        environment: IsolationEnvironment,
        output: OutputSink,
    ) -> Self {
        let dispatcher = Rc::new(RefCell::new(IsolationDispatcher::new(registry)));
        let mut bus = HookBus::new();
        bus.subscribe(Box::new(IsolationSubscriber::new(
            Rc::clone(&dispatcher),
            environment,
        )));
        Self {
            bus,
            dispatcher,
            output,
        }
    }

    /// Adds another hook subscriber.
    pub fn subscribe(&mut self, subscriber: Box<dyn HookSubscriber>) {
        self.bus.subscribe(subscriber);
    }

    /// Number of hook subscribers, including the isolation subscriber.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.bus.len()
    }

    /// Tags of isolators that apply to the current run.
    #[must_use]
    pub fn applicable_tags(&self) -> Vec<String> {
        self.dispatcher
            .borrow()
            .applicable_tags()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    /// Announces the start of the suite.
    ///
    /// # Errors
    ///
    /// Returns the first subscriber failure; the suite must not continue.
    pub fn begin_suite(&mut self) -> Result<(), HookError> {
        let context = HookContext::suite(self.output.clone());
        self.bus.dispatch(SuiteHook::BeforeSuite, &context)
    }

    /// Announces that the feature `title` is about to run.
    ///
    /// # Errors
    ///
    /// Returns the first subscriber failure.
    pub fn begin_feature(&mut self, title: &str) -> Result<(), HookError> {
        let context = HookContext::feature(title, self.output.clone());
        self.bus.dispatch(SuiteHook::BeforeFeature, &context)
    }

    /// Announces that the feature `title` has finished.
    ///
    /// # Errors
    ///
    /// Returns every subscriber failure once all subscribers have run.
    pub fn end_feature(&mut self, title: &str) -> Result<(), HookError> {
        let context = HookContext::feature(title, self.output.clone());
        self.bus.dispatch(SuiteHook::AfterFeature, &context)
    }

    /// Announces the end of the suite.
    ///
    /// # Errors
    ///
    /// Returns every subscriber failure once all subscribers have run.
    pub fn end_suite(&mut self) -> Result<(), HookError> {
        let context = HookContext::suite(self.output.clone());
        self.bus.dispatch(SuiteHook::AfterSuite, &context)
    }

    /// Re-syncs every applicable isolator to its baseline.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Incomplete`] listing every failure.
    pub fn restore_state(&mut self) -> Result<(), DispatchError> {
        info!(target: DISPATCH_TARGET, "restoring every isolator");
        self.dispatcher
            .borrow_mut()
            .restore_all(&RestoreStateEvent::new(self.output.clone()))
    }

    /// Re-syncs only isolators that report outdated state.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Incomplete`] listing every failure.
    pub fn restore_outdated(&mut self) -> Result<(), DispatchError> {
        self.dispatcher
            .borrow_mut()
            .restore_outdated(&RestoreStateEvent::new(self.output.clone()))
    }
}
