//! Priority-ordered delivery of suite and feature boundary hooks.
//!
//! Subscribers declare which hooks they handle and at what priority. Every
//! hook is delivered to higher priorities first; subscribers with equal
//! priority receive it in registration order. Opening hooks
//! (`before_suite`, `before_feature`) stop at the first failure because the
//! environment is not ready. Closing hooks (`after_feature`, `after_suite`)
//! reach every subscriber and report all failures together.

use std::fmt;

use tracing::{debug, error};

use crate::error::{HookError, SubscriberError};
use crate::event::OutputSink;

/// Tracing target for hook delivery.
pub(crate) const HOOKS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::hooks");

/// Suite and feature boundaries announced by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuiteHook {
    /// Once, before the first feature.
    BeforeSuite,
    /// Before each feature.
    BeforeFeature,
    /// After each feature.
    AfterFeature,
    /// Once, after the last feature.
    AfterSuite,
}

impl SuiteHook {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeSuite => "before_suite",
            Self::BeforeFeature => "before_feature",
            Self::AfterFeature => "after_feature",
            Self::AfterSuite => "after_suite",
        }
    }

    /// Returns whether delivery stops at the first failure.
    #[must_use]
    pub const fn is_opening(self) -> bool {
        matches!(self, Self::BeforeSuite | Self::BeforeFeature)
    }
}

impl fmt::Display for SuiteHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data delivered alongside a hook.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    feature: Option<String>,
    output: OutputSink,
}

impl HookContext {
    /// Context for a suite boundary.
    #[must_use]
    pub const fn suite(output: OutputSink) -> Self {
        Self {
            feature: None,
            output,
        }
    }

    /// Context for a feature boundary.
    pub fn feature(title: impl Into<String>, output: OutputSink) -> Self {
        Self {
            feature: Some(title.into()),
            output,
        }
    }

    /// Title of the feature, absent for suite hooks.
    #[must_use]
    pub fn feature_title(&self) -> Option<&str> {
        self.feature.as_deref()
    }

    /// Progress sink.
    #[must_use]
    pub const fn output(&self) -> &OutputSink {
        &self.output
    }
}

/// Reacts to suite and feature boundaries.
pub trait HookSubscriber {
    /// Name used in logs and failures.
    fn name(&self) -> &str;

    /// Hooks this subscriber handles, each with its priority.
    fn subscribed_hooks(&self) -> Vec<(SuiteHook, i32)>;

    /// Handles one hook.
    ///
    /// # Errors
    ///
    /// Returns the failure for the bus to report.
    fn handle(&mut self, hook: SuiteHook, context: &HookContext) -> Result<(), SubscriberError>;
}

/// Delivers hooks to registered subscribers in priority order.
#[derive(Default)]
pub struct HookBus {
    subscribers: Vec<Box<dyn HookSubscriber>>,
}

impl HookBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber.
    pub fn subscribe(&mut self, subscriber: Box<dyn HookSubscriber>) {
        debug!(
            target: HOOKS_TARGET,
            subscriber = subscriber.name(),
            hooks = subscriber.subscribed_hooks().len(),
            "subscriber registered"
        );
        self.subscribers.push(subscriber);
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns `true` when no subscribers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Delivers `hook` to every subscriber that handles it.
    ///
    /// # Errors
    ///
    /// Opening hooks return the first [`HookError::Subscriber`]. Closing hooks
    /// return it alone when one subscriber failed and
    /// [`HookError::Aggregate`] when several did.
    pub fn dispatch(&mut self, hook: SuiteHook, context: &HookContext) -> Result<(), HookError> {
        let mut failures = Vec::new();
        for index in self.delivery_order(hook) {
            let Some(subscriber) = self.subscribers.get_mut(index) else {
                continue;
            };
            debug!(
                target: HOOKS_TARGET,
                subscriber = subscriber.name(),
                %hook,
                "delivering hook"
            );
            if let Err(source) = subscriber.handle(hook, context) {
                error!(
                    target: HOOKS_TARGET,
                    subscriber = subscriber.name(),
                    %hook,
                    error = %source,
                    "subscriber failed"
                );
                let failure = HookError::Subscriber {
                    subscriber: subscriber.name().to_owned(),
                    hook,
                    source,
                };
                if hook.is_opening() {
                    return Err(failure);
                }
                failures.push(failure);
            }
        }
        collect(hook, failures)
    }

    fn delivery_order(&self, hook: SuiteHook) -> Vec<usize> {
        let mut order: Vec<(i32, usize)> = self
            .subscribers
            .iter()
            .enumerate()
            .flat_map(|(index, subscriber)| {
                subscriber
                    .subscribed_hooks()
                    .into_iter()
                    .filter(move |(subscribed, _)| *subscribed == hook)
                    .map(move |(_, priority)| (priority, index))
            })
            .collect();
        order.sort_by(|left, right| right.0.cmp(&left.0));
        order.into_iter().map(|(_, index)| index).collect()
    }
}

impl fmt::Debug for HookBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.subscribers.iter().map(|s| s.name()).collect();
        f.debug_struct("HookBus").field("subscribers", &names).finish()
    }
}

fn collect(hook: SuiteHook, mut failures: Vec<HookError>) -> Result<(), HookError> {
    if failures.len() > 1 {
        return Err(HookError::Aggregate {
            hook,
            errors: failures,
        });
    }
    failures.pop().map_or(Ok(()), Err)
}
