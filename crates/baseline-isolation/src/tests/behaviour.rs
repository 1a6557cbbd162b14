//! Behaviour-driven tests for priority dispatch and applicability.
#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clarity and assertions"
)]

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::database::{DatabaseTarget, PostgresEngine, PostgresIsolator};
use crate::dispatch::IsolationDispatcher;
use crate::environment::IsolationEnvironment;
use crate::error::DispatchError;
use crate::event::{
    AfterFinishTestsEvent, AfterIsolatedTestEvent, BeforeIsolatedTestEvent, BeforeStartTestsEvent,
};
use crate::isolator::{IsolationPhase, Isolator};
use crate::os::OsFamily;
use crate::registry::IsolatorRegistry;

use super::{CallLog, RecordingIsolator, RecordingRunner, call_log, entries, linux_environment};

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

struct DispatchWorld {
    log: CallLog,
    registry: IsolatorRegistry,
    start_error: Option<DispatchError>,
    host: Option<String>,
}

#[fixture]
fn world() -> DispatchWorld {
    DispatchWorld {
        log: call_log(),
        registry: IsolatorRegistry::new(),
        start_error: None,
        host: None,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn register(world: &mut DispatchWorld, priority: i32, isolator: RecordingIsolator) {
    world
        .registry
        .register(priority, Box::new(isolator))
        .expect("register isolator");
}

fn take_dispatcher(world: &mut DispatchWorld) -> IsolationDispatcher {
    IsolationDispatcher::new(std::mem::take(&mut world.registry))
}

/// Isolator slugs that ran `phase`, in call order.
fn visited(world: &DispatchWorld, phase: IsolationPhase) -> String {
    let suffix = format!(":{phase}");
    entries(&world.log)
        .iter()
        .filter_map(|entry| entry.strip_suffix(&suffix))
        .collect::<Vec<_>>()
        .join(", ")
}

fn postgres_isolator() -> PostgresIsolator<RecordingRunner> {
    PostgresIsolator::new(
        PostgresEngine,
        DatabaseTarget::new("127.0.0.1", None, "postgres", None, "app_test"),
        "/tmp/baseline",
        RecordingRunner::new(),
    )
}

fn host_environment(world: &DispatchWorld) -> IsolationEnvironment {
    let host = world.host.as_deref().expect("host configured");
    IsolationEnvironment::new(OsFamily::from_host_string(host), "pdo_pgsql", "amqp")
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("an isolator \"{name}\" at priority {priority:i32}")]
fn given_isolator(world: &mut DispatchWorld, name: String, priority: i32) {
    let isolator = RecordingIsolator::new(&name, &world.log);
    register(world, priority, isolator);
}

#[given("an inapplicable isolator \"{name}\" at priority {priority:i32}")]
fn given_inapplicable_isolator(world: &mut DispatchWorld, name: String, priority: i32) {
    let isolator = RecordingIsolator::new(&name, &world.log).not_applicable();
    register(world, priority, isolator);
}

#[given("a failing-on-start isolator \"{name}\" at priority {priority:i32}")]
fn given_failing_isolator(world: &mut DispatchWorld, name: String, priority: i32) {
    let isolator = RecordingIsolator::new(&name, &world.log).failing_in(IsolationPhase::Start);
    register(world, priority, isolator);
}

#[given("a host reporting \"{host}\"")]
fn given_host(world: &mut DispatchWorld, host: String) {
    world.host = Some(host);
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("a feature runs through the dispatcher")]
fn when_feature_runs(world: &mut DispatchWorld) {
    let mut dispatcher = take_dispatcher(world);
    dispatcher
        .start(&linux_environment(), &BeforeStartTestsEvent::default())
        .expect("start");
    dispatcher
        .before_test(&BeforeIsolatedTestEvent::new(Some(String::from("Feature"))))
        .expect("before test");
    dispatcher
        .after_test(&AfterIsolatedTestEvent::new(Some(String::from("Feature"))))
        .expect("after test");
    dispatcher
        .terminate(&AfterFinishTestsEvent)
        .expect("terminate");
}

#[when("the suite starts")]
fn when_suite_starts(world: &mut DispatchWorld) {
    let mut dispatcher = take_dispatcher(world);
    world.start_error = dispatcher
        .start(&linux_environment(), &BeforeStartTestsEvent::default())
        .err();
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("setup visits \"{order}\"")]
fn then_setup_order(world: &mut DispatchWorld, order: String) {
    assert_eq!(visited(world, IsolationPhase::Start), order);
    assert_eq!(visited(world, IsolationPhase::BeforeTest), order);
}

#[then("teardown visits \"{order}\"")]
fn then_teardown_order(world: &mut DispatchWorld, order: String) {
    assert_eq!(visited(world, IsolationPhase::AfterTest), order);
    assert_eq!(visited(world, IsolationPhase::Terminate), order);
}

#[then("isolator \"{tag}\" was never invoked")]
fn then_never_invoked(world: &mut DispatchWorld, tag: String) {
    let prefix = format!("{tag}:");
    let calls = entries(&world.log);
    assert!(
        !calls.iter().any(|entry| entry.starts_with(&prefix)),
        "unexpected calls to {tag}: {calls:?}"
    );
}

#[then("the start fails naming \"{name}\"")]
fn then_start_fails(world: &mut DispatchWorld, name: String) {
    let error = world.start_error.as_ref().expect("start should fail");
    let failures = error.failures();
    assert_eq!(failures.len(), 1);
    let failure = failures.first().expect("one failure");
    assert_eq!(failure.isolator, name);
    assert_eq!(failure.phase, IsolationPhase::Start);
}

#[then("the PostgreSQL isolator does not apply")]
fn then_postgres_skipped(world: &mut DispatchWorld) {
    assert!(!postgres_isolator().is_applicable(&host_environment(world)));
}

#[then("the PostgreSQL isolator applies")]
fn then_postgres_applies(world: &mut DispatchWorld) {
    assert!(postgres_isolator().is_applicable(&host_environment(world)));
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/isolation_dispatch.feature",
    name = "Setup runs by descending priority and teardown by ascending priority"
)]
fn stack_ordering(world: DispatchWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/isolation_dispatch.feature",
    name = "Isolators that do not apply are never invoked"
)]
fn inapplicable_isolators_are_skipped(world: DispatchWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/isolation_dispatch.feature",
    name = "A failing start aborts the suite"
)]
fn failing_start_aborts(world: DispatchWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/isolation_dispatch.feature",
    name = "Database snapshots are skipped on Windows hosts"
)]
fn windows_hosts_skip_snapshots(world: DispatchWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/isolation_dispatch.feature",
    name = "Database snapshots run on Linux hosts"
)]
fn linux_hosts_take_snapshots(world: DispatchWorld) {
    let _ = world;
}
