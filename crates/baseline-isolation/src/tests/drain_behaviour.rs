//! Behaviour-driven tests for the bounded queue drain.
#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clarity and assertions"
)]

use std::sync::Arc;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::broker::QueueSpec;
use crate::clock::ManualClock;
use crate::error::IsolationError;
use crate::isolator::MessageQueueIsolator;
use crate::queue::AmqpMessageQueueIsolator;

use super::{DrainingInspector, FakeConsumer, RecordingRunner, call_log};

struct DrainWorld {
    clock: Arc<ManualClock>,
    inspector: Option<DrainingInspector>,
    outcome: Option<Result<(), IsolationError>>,
}

#[fixture]
fn world() -> DrainWorld {
    DrainWorld {
        clock: Arc::new(ManualClock::default()),
        inspector: None,
        outcome: None,
    }
}

fn outcome(world: &DrainWorld) -> &Result<(), IsolationError> {
    world.outcome.as_ref().expect("the isolator has waited")
}

#[given("a queue holding {count:u64} messages consumed every {millis:u64} milliseconds")]
fn given_draining_queue(world: &mut DrainWorld, count: u64, millis: u64) {
    world.inspector = Some(DrainingInspector::draining(
        &world.clock,
        count,
        Duration::from_millis(millis),
    ));
}

#[given("a queue stuck at {count:u64} messages")]
fn given_stuck_queue(world: &mut DrainWorld, count: u64) {
    world.inspector = Some(DrainingInspector::stuck(&world.clock, count));
}

#[when("the isolator waits up to {seconds:u64} seconds")]
fn when_waiting(world: &mut DrainWorld, seconds: u64) {
    let inspector = world.inspector.take().expect("queue configured");
    let log = call_log();
    let mut isolator = AmqpMessageQueueIsolator::new(
        QueueSpec::durable("oro.default", 4),
        inspector,
        FakeConsumer::new(&log),
        Arc::clone(&world.clock),
        RecordingRunner::new(),
    );
    world.outcome = Some(isolator.wait_while_processing_messages(Duration::from_secs(seconds)));
}

#[then("the wait succeeds")]
fn then_success(world: &mut DrainWorld) {
    if let Err(error) = outcome(world) {
        panic!("expected the queue to drain, got {error}");
    }
}

#[then("the wait times out with {ready:u64} messages ready")]
fn then_timeout(world: &mut DrainWorld, ready: u64) {
    match outcome(world) {
        Err(IsolationError::Timeout {
            ready: observed, ..
        }) => assert_eq!(*observed, ready),
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[then("no more than {seconds:u64} seconds elapsed")]
fn then_within_budget(world: &mut DrainWorld, seconds: u64) {
    assert!(world.clock.elapsed() <= Duration::from_secs(seconds));
}

#[then("exactly {seconds:u64} seconds elapsed")]
fn then_elapsed(world: &mut DrainWorld, seconds: u64) {
    assert_eq!(world.clock.elapsed(), Duration::from_secs(seconds));
}

#[scenario(
    path = "tests/features/queue_drain.feature",
    name = "A queue that empties within the budget"
)]
fn drains_within_budget(world: DrainWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/queue_drain.feature",
    name = "A queue that never empties"
)]
fn never_drains(world: DrainWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/queue_drain.feature",
    name = "An empty queue needs no polling"
)]
fn empty_queue(world: DrainWorld) {
    let _ = world;
}
