//! Hook subscribers that connect suite boundaries to isolation work.
//!
//! [`IsolationSubscriber`] forwards hooks to the dispatcher.
//! [`ConsumerProcessSubscriber`] keeps a consumer daemon alive across a
//! feature. The priorities interleave the two: isolation sets up first and
//! tears down last, so the consumer only runs against a prepared environment.

use std::cell::RefCell;
use std::rc::Rc;

use baseline_config::ConsumerMode;
use tracing::info;

use crate::consumer::{CONSUMER_TARGET, Consumer};
use crate::dispatch::IsolationDispatcher;
use crate::environment::IsolationEnvironment;
use crate::error::SubscriberError;
use crate::event::{
    AfterFinishTestsEvent, AfterIsolatedTestEvent, BeforeIsolatedTestEvent, BeforeStartTestsEvent,
};
use crate::hooks::{HookContext, HookSubscriber, SuiteHook};

/// Priority of isolation setup hooks.
pub const ISOLATION_SETUP_PRIORITY: i32 = 100;
/// Priority of isolation teardown hooks.
pub const ISOLATION_TEARDOWN_PRIORITY: i32 = -100;
/// Priority at which the consumer starts, after isolation setup.
pub const CONSUMER_START_PRIORITY: i32 = 90;
/// Priority at which the consumer stops, before isolation teardown.
pub const CONSUMER_STOP_PRIORITY: i32 = -90;

/// Dispatcher shared between the hook bus and the harness facade.
pub type SharedDispatcher = Rc<RefCell<IsolationDispatcher>>;

/// Drives the isolation dispatcher from suite and feature hooks.
#[derive(Debug)]
pub struct IsolationSubscriber {
    dispatcher: SharedDispatcher,
    environment: IsolationEnvironment,
}

impl IsolationSubscriber {
    /// Creates a subscriber evaluating applicability against `environment`.
    #[must_use]
    pub const fn new(dispatcher: SharedDispatcher, environment: IsolationEnvironment) -> Self {
        Self {
            dispatcher,
            environment,
        }
    }
}

impl HookSubscriber for IsolationSubscriber {
    fn name(&self) -> &str {
        "isolation"
    }

    fn subscribed_hooks(&self) -> Vec<(SuiteHook, i32)> {
        vec![
            (SuiteHook::BeforeSuite, ISOLATION_SETUP_PRIORITY),
            (SuiteHook::BeforeFeature, ISOLATION_SETUP_PRIORITY),
            (SuiteHook::AfterFeature, ISOLATION_TEARDOWN_PRIORITY),
            (SuiteHook::AfterSuite, ISOLATION_TEARDOWN_PRIORITY),
        ]
    }

    fn handle(&mut self, hook: SuiteHook, context: &HookContext) -> Result<(), SubscriberError> {
        let mut dispatcher = self.dispatcher.borrow_mut();
        let title = context.feature_title().map(str::to_owned);
        match hook {
            SuiteHook::BeforeSuite => dispatcher.start(
                &self.environment,
                &BeforeStartTestsEvent::new(context.output().clone()),
            )?,
            SuiteHook::BeforeFeature => {
                dispatcher.before_test(&BeforeIsolatedTestEvent::new(title))?;
            }
            SuiteHook::AfterFeature => {
                dispatcher.after_test(&AfterIsolatedTestEvent::new(title))?;
            }
            SuiteHook::AfterSuite => dispatcher.terminate(&AfterFinishTestsEvent)?,
        }
        Ok(())
    }
}

/// Starts, stops or restarts a consumer daemon at feature boundaries.
#[derive(Debug)]
pub struct ConsumerProcessSubscriber<C> {
    consumer: C,
    mode: ConsumerMode,
}

impl<C> ConsumerProcessSubscriber<C>
where
    C: Consumer,
{
    /// Creates a subscriber managing `consumer` in `mode`.
    pub const fn new(consumer: C, mode: ConsumerMode) -> Self {
        Self { consumer, mode }
    }

    /// Configured mode.
    #[must_use]
    pub const fn mode(&self) -> ConsumerMode {
        self.mode
    }

    /// Mutable access to the managed consumer.
    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    fn begin_feature(&mut self) -> Result<(), SubscriberError> {
        if self.mode == ConsumerMode::Restart {
            info!(target: CONSUMER_TARGET, "restarting consumer for feature");
            self.consumer.stop()?;
        }
        self.consumer.start()?;
        Ok(())
    }
}

impl<C> HookSubscriber for ConsumerProcessSubscriber<C>
where
    C: Consumer,
{
    fn name(&self) -> &str {
        "consumer process"
    }

    fn subscribed_hooks(&self) -> Vec<(SuiteHook, i32)> {
        match self.mode {
            ConsumerMode::Off => Vec::new(),
            ConsumerMode::Stop => vec![
                (SuiteHook::BeforeFeature, CONSUMER_START_PRIORITY),
                (SuiteHook::AfterFeature, CONSUMER_STOP_PRIORITY),
                (SuiteHook::AfterSuite, CONSUMER_STOP_PRIORITY),
            ],
            ConsumerMode::Restart => vec![
                (SuiteHook::BeforeFeature, CONSUMER_START_PRIORITY),
                (SuiteHook::AfterSuite, CONSUMER_STOP_PRIORITY),
            ],
        }
    }

    fn handle(&mut self, hook: SuiteHook, _context: &HookContext) -> Result<(), SubscriberError> {
        match hook {
            SuiteHook::BeforeFeature => self.begin_feature(),
            SuiteHook::AfterFeature if self.mode == ConsumerMode::Stop => {
                self.consumer.stop()?;
                Ok(())
            }
            SuiteHook::AfterSuite if self.consumer.is_running() => {
                self.consumer.stop()?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
