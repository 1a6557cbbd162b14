//! Harness bootstrap orchestration.
//!
//! Loads configuration, installs telemetry and wires the standard isolators
//! against the real database tools, broker and consumer.

use std::sync::Arc;

use baseline_config::{Config, ConsumerMode};
use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;
use tracing::info;

use crate::broker::{ManagementEndpoint, QueueSpec, RabbitManagementClient};
use crate::clock::SystemClock;
use crate::command::SystemCommandRunner;
use crate::consumer::{ConsumerCommand, ConsumerProcess};
use crate::database::{DatabaseTarget, MysqlEngine, MysqlIsolator, PostgresEngine, PostgresIsolator};
use crate::dispatch::DISPATCH_TARGET;
use crate::environment::IsolationEnvironment;
use crate::error::RegistryError;
use crate::event::OutputSink;
use crate::harness::Harness;
use crate::initial::{ConsoleKernel, InitialStateIsolator};
use crate::queue::{AMQP_TRANSPORT, AmqpMessageQueueIsolator};
use crate::registry::{
    DATABASE_PRIORITY, INITIAL_STATE_PRIORITY, IsolatorRegistry, MESSAGE_QUEUE_PRIORITY,
};
use crate::subscriber::ConsumerProcessSubscriber;
use crate::telemetry::{self, TelemetryError};

/// Queue isolator wired to the management API, a child-process consumer and
/// the system clock.
pub type SystemQueueIsolator = AmqpMessageQueueIsolator<
    Arc<RabbitManagementClient>,
    ConsumerProcess,
    SystemClock,
    SystemCommandRunner,
>;

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the harness configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader error when a layer cannot be read or parsed.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that returns a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader(pub Config);

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.0.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The standard isolators could not be registered.
    #[error("failed to register isolators: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
}

/// Registers the initial-state, database and message-queue isolators for
/// `config`.
///
/// Every isolator is registered; applicability decides at suite start which
/// of them run.
///
/// # Errors
///
/// Returns [`RegistryError`] when two isolators share a tag.
pub fn standard_registry(config: &Config) -> Result<IsolatorRegistry, RegistryError> {
    let inspector = Arc::new(RabbitManagementClient::new(ManagementEndpoint::from_config(
        config,
    )));
    let queue_isolator = || -> SystemQueueIsolator {
        AmqpMessageQueueIsolator::new(
            QueueSpec::from_config(config),
            Arc::clone(&inspector),
            ConsumerProcess::new(ConsumerCommand::from_config(config)),
            SystemClock,
            SystemCommandRunner,
        )
        .with_drain_timeout(config.drain_timeout())
    };

    let settle_queue =
        (config.message_queue_transport == AMQP_TRANSPORT).then(&queue_isolator);
    let initial = InitialStateIsolator::new(ConsoleKernel::new(config.app_root().to_path_buf()), settle_queue)
        .with_drain_timeout(config.drain_timeout());

    let mut registry = IsolatorRegistry::new();
    registry.register(INITIAL_STATE_PRIORITY, Box::new(initial))?;
    registry.register(
        DATABASE_PRIORITY,
        Box::new(PostgresIsolator::new(
            PostgresEngine,
            DatabaseTarget::from_config(config),
            config.cache_dir().to_path_buf(),
            SystemCommandRunner,
        )),
    )?;
    registry.register(
        DATABASE_PRIORITY,
        Box::new(MysqlIsolator::new(
            MysqlEngine,
            DatabaseTarget::from_config(config),
            config.cache_dir().to_path_buf(),
            SystemCommandRunner,
        )),
    )?;
    registry.register(MESSAGE_QUEUE_PRIORITY, Box::new(queue_isolator()))?;
    Ok(registry)
}

/// Builds a harness from `config` without touching global telemetry.
///
/// # Errors
///
/// Returns [`BootstrapError::Registry`] when the isolators cannot be
/// registered.
pub fn harness_from_config(config: &Config, output: OutputSink) -> Result<Harness, BootstrapError> {
    let registry =
        standard_registry(config).map_err(|source| BootstrapError::Registry { source })?;
    let environment = IsolationEnvironment::from_config(config);
    let os = environment.os();
    let mut harness = Harness::new(registry, environment, output);
    if config.consumer_mode() != ConsumerMode::Off {
        harness.subscribe(Box::new(ConsumerProcessSubscriber::new(
            ConsumerProcess::new(ConsumerCommand::from_config(config)),
            config.consumer_mode(),
        )));
    }
    info!(
        target: DISPATCH_TARGET,
        %os,
        driver = config.database_driver.as_str(),
        transport = config.message_queue_transport.as_str(),
        consumer_mode = %config.consumer_mode(),
        "harness ready"
    );
    Ok(harness)
}

/// Bootstraps the harness using the supplied loader.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration, telemetry or registration
/// fails.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    output: OutputSink,
) -> Result<Harness, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    harness_from_config(&config, output)
}

/// Bootstraps the harness from the layered system configuration, writing
/// progress to standard output.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration, telemetry or registration
/// fails.
pub fn bootstrap() -> Result<Harness, BootstrapError> {
    bootstrap_with(&SystemConfigLoader, OutputSink::stdout())
}

#[cfg(test)]
#[expect(
    clippy::expect_used,
    reason = "test code uses expect for clarity and assertions"
)]
mod tests {
    use std::ffi::OsString;

    use super::*;
    use rstest::rstest;

    #[rstest]
    fn standard_registry_orders_isolators_by_priority() {
        let registry = standard_registry(&Config::default()).expect("registry");
        assert_eq!(
            registry.tags(),
            vec![
                "initial_message_queue",
                "postgresql_database",
                "mysql_database",
                "amqp_message_queue",
            ]
        );
    }

    #[rstest]
    fn consumer_subscriber_follows_the_configured_mode() {
        let quiet = harness_from_config(&Config::default(), OutputSink::discard())
            .expect("default harness");
        assert_eq!(quiet.subscriber_count(), 1);

        let config = Config {
            consumer_mode: ConsumerMode::Stop,
            ..Config::default()
        };
        let managed = harness_from_config(&config, OutputSink::discard()).expect("harness");
        assert_eq!(managed.subscriber_count(), 2);
    }

    #[rstest]
    fn static_loader_bootstraps() {
        let harness = bootstrap_with(
            &StaticConfigLoader(Config::default()),
            OutputSink::discard(),
        )
        .expect("bootstrap");
        assert!(harness.applicable_tags().is_empty());
    }

    struct FailingConfigLoader;

    impl ConfigLoader for FailingConfigLoader {
        fn load(&self) -> Result<Config, Arc<OrthoError>> {
            Config::load_from_iter([
                OsString::from("baseline"),
                OsString::from("--drain-timeout-secs"),
                OsString::from("soon"),
            ])
        }
    }

    #[rstest]
    fn configuration_errors_surface() {
        let error = bootstrap_with(&FailingConfigLoader, OutputSink::discard())
            .expect_err("invalid timeout must fail");
        assert!(matches!(error, BootstrapError::Configuration { .. }));
    }
}
