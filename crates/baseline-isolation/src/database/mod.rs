//! Database snapshot isolation.
//!
//! The isolator dumps the database once when the suite starts and after
//! every test replaces it wholesale: drop, create, then reload the dump.
//! Credentials reach the client tools through the environment only.

mod engine;

use std::fs;
use std::sync::Arc;

use camino::Utf8PathBuf;
use tracing::{debug, info};

use crate::command::{CommandRunner, run_checked};
use crate::environment::IsolationEnvironment;
use crate::error::IsolationError;
use crate::event::{
    AfterFinishTestsEvent, AfterIsolatedTestEvent, BeforeIsolatedTestEvent, BeforeStartTestsEvent,
    RestoreStateEvent,
};
use crate::isolator::Isolator;
use crate::os::{OsFamily, is_supported};

pub use engine::{DatabaseTarget, MysqlEngine, PostgresEngine, SnapshotEngine};

/// Tracing target for database isolation.
pub(crate) const DATABASE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::database");

/// Platforms whose client tools the isolator drives.
pub const SUPPORTED_OS: &[OsFamily] = &[OsFamily::Linux, OsFamily::Darwin];

/// Progress of a snapshot isolator through the suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    /// No dump has been taken yet.
    Uninitialized,
    /// A dump exists and the database has not been restored since.
    SnapshotTaken,
    /// The database was restored from the dump at least once.
    RestoredClean,
    /// The suite has finished; no further hooks are accepted.
    Terminated,
}

/// Dumps a database at suite start and restores it after every test.
#[derive(Debug)]
pub struct DbSnapshotIsolator<E, R> {
    name: String,
    engine: E,
    target: DatabaseTarget,
    cache_dir: Utf8PathBuf,
    runner: R,
    state: SnapshotState,
}

/// PostgreSQL snapshot isolator.
pub type PostgresIsolator<R> = DbSnapshotIsolator<PostgresEngine, R>;

/// MySQL snapshot isolator.
pub type MysqlIsolator<R> = DbSnapshotIsolator<MysqlEngine, R>;

impl<E, R> DbSnapshotIsolator<E, R>
where
    E: SnapshotEngine,
    R: CommandRunner,
{
    /// Creates an isolator that stores dumps under `cache_dir`.
    pub fn new(
        engine: E,
        target: DatabaseTarget,
        cache_dir: impl Into<Utf8PathBuf>,
        runner: R,
    ) -> Self {
        Self {
            name: format!("{} database", engine.label()),
            engine,
            target,
            cache_dir: cache_dir.into(),
            runner,
            state: SnapshotState::Uninitialized,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SnapshotState {
        self.state
    }

    /// Path of the dump file, keyed by database name.
    #[must_use]
    pub fn dump_file(&self) -> Utf8PathBuf {
        self.cache_dir.join(format!("{}.sql", self.target.name()))
    }

    fn reject_terminated(&self, operation: &'static str) -> Result<(), IsolationError> {
        if self.state == SnapshotState::Terminated {
            return Err(IsolationError::InvalidState {
                isolator: self.name.clone(),
                operation,
                message: String::from("the suite has already terminated"),
            });
        }
        Ok(())
    }

    fn ensure_cache_dir(&self) -> Result<(), IsolationError> {
        fs::create_dir_all(&self.cache_dir).map_err(|source| IsolationError::CacheDirectory {
            path: self.cache_dir.clone(),
            source: Arc::new(source),
        })
    }

    fn take_snapshot(&mut self) -> Result<(), IsolationError> {
        self.reject_terminated("start")?;
        self.ensure_cache_dir()?;
        let file = self.dump_file();
        run_checked(&self.runner, &self.engine.dump(&self.target, &file))?;
        self.state = SnapshotState::SnapshotTaken;
        info!(
            target: DATABASE_TARGET,
            database = self.target.name(),
            file = %file,
            "database snapshot taken"
        );
        Ok(())
    }

    fn restore(&mut self, operation: &'static str) -> Result<(), IsolationError> {
        self.reject_terminated(operation)?;
        if self.state == SnapshotState::Uninitialized {
            return Err(IsolationError::SnapshotMissing {
                database: self.target.name().to_owned(),
            });
        }
        let file = self.dump_file();
        for spec in [
            self.engine.drop_database(&self.target),
            self.engine.create_database(&self.target),
            self.engine.restore(&self.target, &file),
        ] {
            run_checked(&self.runner, &spec)?;
        }
        self.state = SnapshotState::RestoredClean;
        debug!(
            target: DATABASE_TARGET,
            database = self.target.name(),
            file = %file,
            "database restored from snapshot"
        );
        Ok(())
    }
}

impl<E, R> Isolator for DbSnapshotIsolator<E, R>
where
    E: SnapshotEngine,
    R: CommandRunner,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_applicable(&self, environment: &IsolationEnvironment) -> bool {
        is_supported(environment.os(), SUPPORTED_OS)
            && self.engine.supports_driver(environment.database_driver())
    }

    fn start(&mut self, _event: &BeforeStartTestsEvent) -> Result<(), IsolationError> {
        debug!(
            target: DATABASE_TARGET,
            cache_dir = %self.cache_dir,
            "preparing database snapshot"
        );
        self.take_snapshot()
    }

    fn before_test(&mut self, _event: &BeforeIsolatedTestEvent) -> Result<(), IsolationError> {
        self.reject_terminated("before_test")
    }

    fn after_test(&mut self, _event: &AfterIsolatedTestEvent) -> Result<(), IsolationError> {
        self.restore("after_test")
    }

    fn terminate(&mut self, _event: &AfterFinishTestsEvent) -> Result<(), IsolationError> {
        self.reject_terminated("terminate")?;
        self.state = SnapshotState::Terminated;
        Ok(())
    }

    fn restore_state(&mut self, event: &RestoreStateEvent) -> Result<(), IsolationError> {
        event
            .output()
            .writeln(&format!("Restoring database '{}'", self.target.name()))
            .map_err(IsolationError::output)?;
        self.restore("restore_state")
    }
}
