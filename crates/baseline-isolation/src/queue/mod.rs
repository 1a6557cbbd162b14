//! Message-queue drain isolation.
//!
//! Around every test the isolator launches the consumer, waits for the
//! watched queue to empty, and afterwards drains again before stopping the
//! consumer and cleaning up strays. The drain polls at a fixed interval and
//! fails once its budget is exhausted while messages remain.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::broker::{QueueInspector, QueueSpec};
use crate::clock::Clock;
use crate::command::CommandRunner;
use crate::consumer::{Consumer, terminate_matching};
use crate::environment::IsolationEnvironment;
use crate::error::IsolationError;
use crate::event::{
    AfterFinishTestsEvent, AfterIsolatedTestEvent, BeforeIsolatedTestEvent, BeforeStartTestsEvent,
    RestoreStateEvent,
};
use crate::isolator::{Isolator, MessageQueueIsolator};

/// Tracing target for queue isolation.
pub(crate) const QUEUE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::queue");

/// Interval between queue depth reads.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default ceiling on a single drain.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport identifier this isolator applies to.
pub const AMQP_TRANSPORT: &str = "amqp";

/// Drains an AMQP queue around every test.
pub struct AmqpMessageQueueIsolator<I, C, K, R> {
    queue: QueueSpec,
    inspector: I,
    consumer: C,
    clock: K,
    runner: R,
    drain_timeout: Duration,
    poll_interval: Duration,
}

impl<I, C, K, R> AmqpMessageQueueIsolator<I, C, K, R>
where
    I: QueueInspector,
    C: Consumer,
    K: Clock,
    R: CommandRunner,
{
    /// Creates an isolator with the default budget and poll interval.
    pub fn new(queue: QueueSpec, inspector: I, consumer: C, clock: K, runner: R) -> Self {
        Self {
            queue,
            inspector,
            consumer,
            clock,
            runner,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            poll_interval: DRAIN_POLL_INTERVAL,
        }
    }

    /// Overrides the budget used by per-test drains.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Overrides the interval between depth reads.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Budget used by per-test drains.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Mutable access to the managed consumer.
    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    fn drain(&self, time_limit: Duration) -> Result<(), IsolationError> {
        self.inspector.declare(&self.queue)?;
        let mut remaining = time_limit;
        let mut ready = self.inspector.ready_messages(&self.queue)?;
        while ready != 0 {
            if remaining.is_zero() {
                warn!(
                    target: QUEUE_TARGET,
                    queue = self.queue.name(),
                    ready,
                    budget_ms = duration_ms(time_limit),
                    "queue did not drain within budget"
                );
                return Err(IsolationError::Timeout {
                    queue: self.queue.name().to_owned(),
                    ready,
                    budget: time_limit,
                });
            }
            debug!(
                target: QUEUE_TARGET,
                queue = self.queue.name(),
                ready,
                remaining_ms = duration_ms(remaining),
                "waiting for queue to drain"
            );
            self.clock.sleep(self.poll_interval);
            remaining = remaining.saturating_sub(self.poll_interval);
            ready = self.inspector.ready_messages(&self.queue)?;
        }
        debug!(target: QUEUE_TARGET, queue = self.queue.name(), "queue drained");
        Ok(())
    }

    fn stop_consumers(&mut self) -> Result<(), IsolationError> {
        let stopped = self.consumer.stop();
        let swept = terminate_matching(
            &self.runner,
            self.consumer.pattern(),
            self.consumer.working_dir(),
        );
        stopped?;
        swept.map(|_| ())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl<I, C, K, R> Isolator for AmqpMessageQueueIsolator<I, C, K, R>
where
    I: QueueInspector,
    C: Consumer,
    K: Clock,
    R: CommandRunner,
{
    fn name(&self) -> &str {
        "AMQP Message Queue"
    }

    fn is_applicable(&self, environment: &IsolationEnvironment) -> bool {
        environment.message_queue_transport() == AMQP_TRANSPORT
    }

    fn start(&mut self, _event: &BeforeStartTestsEvent) -> Result<(), IsolationError> {
        Ok(())
    }

    fn before_test(&mut self, _event: &BeforeIsolatedTestEvent) -> Result<(), IsolationError> {
        self.consumer.start()?;
        self.drain(self.drain_timeout)
    }

    fn after_test(&mut self, _event: &AfterIsolatedTestEvent) -> Result<(), IsolationError> {
        let drained = self.drain(self.drain_timeout);
        let stopped = self.stop_consumers();
        drained?;
        stopped
    }

    fn terminate(&mut self, _event: &AfterFinishTestsEvent) -> Result<(), IsolationError> {
        Ok(())
    }

    fn restore_state(&mut self, _event: &RestoreStateEvent) -> Result<(), IsolationError> {
        Ok(())
    }
}

impl<I, C, K, R> MessageQueueIsolator for AmqpMessageQueueIsolator<I, C, K, R>
where
    I: QueueInspector,
    C: Consumer,
    K: Clock,
    R: CommandRunner,
{
    fn wait_while_processing_messages(
        &mut self,
        time_limit: Duration,
    ) -> Result<(), IsolationError> {
        info!(
            target: QUEUE_TARGET,
            queue = self.queue.name(),
            budget_ms = duration_ms(time_limit),
            "waiting while messages are processed"
        );
        self.drain(time_limit)
    }
}
