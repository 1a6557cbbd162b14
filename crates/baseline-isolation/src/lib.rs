//! Test-environment isolation for browser-driven acceptance suites.
//!
//! An isolator resets one kind of durable external state between tests: the
//! relational database is dumped once and restored after every feature, the
//! message queue is drained around every feature, and an initial-state
//! isolator lets pending messages settle before the first dump. The
//! [`IsolationDispatcher`] drives registered isolators through the suite
//! lifecycle in priority order, skipping any whose applicability check
//! fails for the host and configuration.
//!
//! Test runners interact with the [`Harness`], which delivers suite and
//! feature boundaries over a priority-ordered [`HookBus`]:
//!
//! ```no_run
//! use baseline_isolation::bootstrap;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut harness = bootstrap()?;
//! harness.begin_suite()?;
//! harness.begin_feature("Checkout")?;
//! // run the feature
//! harness.end_feature("Checkout")?;
//! harness.end_suite()?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod broker;
pub mod clock;
pub mod command;
pub mod consumer;
pub mod database;
pub mod dispatch;
pub mod environment;
pub mod error;
pub mod event;
pub mod harness;
pub mod hooks;
pub mod initial;
pub mod isolator;
pub mod os;
pub mod queue;
pub mod registry;
pub mod subscriber;
pub mod telemetry;

pub use bootstrap::{
    BootstrapError, ConfigLoader, StaticConfigLoader, SystemConfigLoader, bootstrap,
    bootstrap_with, harness_from_config, standard_registry,
};
pub use dispatch::IsolationDispatcher;
pub use environment::IsolationEnvironment;
pub use error::{
    DispatchError, HookError, IsolationError, PhaseFailure, RegistryError, SubscriberError,
};
pub use event::{
    AfterFinishTestsEvent, AfterIsolatedTestEvent, BeforeIsolatedTestEvent, BeforeStartTestsEvent,
    CapturedOutput, OutputSink, RestoreStateEvent,
};
pub use harness::Harness;
pub use hooks::{HookBus, HookContext, HookSubscriber, SuiteHook};
pub use isolator::{IsolationPhase, Isolator, MessageQueueIsolator};
pub use os::OsFamily;
pub use registry::IsolatorRegistry;

#[cfg(test)]
mod tests;
