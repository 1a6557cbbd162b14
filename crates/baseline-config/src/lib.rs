//! Shared configuration for the baseline test-isolation harness.
//!
//! Settings are layered by `ortho_config`: built-in defaults, then a
//! `.baseline.toml` file, then `BASELINE_*` environment variables, then
//! command-line flags. The resolved [`Config`] describes the database,
//! message broker, and application console that isolators operate on.

mod consumer;
mod defaults;
mod logging;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use consumer::{ConsumerMode, ConsumerModeParseError};
pub use defaults::{
    DEFAULT_BROKER_MANAGEMENT_PORT, DEFAULT_CONSUMER_COMMAND, DEFAULT_DATABASE_DRIVER,
    DEFAULT_DRAIN_TIMEOUT_SECS, DEFAULT_LOG_FILTER, DEFAULT_MESSAGE_QUEUE_MAX_PRIORITY,
    DEFAULT_MESSAGE_QUEUE_NAME, DEFAULT_MESSAGE_QUEUE_TRANSPORT, default_cache_dir,
    default_consumer_mode, default_log_filter, default_log_filter_string, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "BASELINE")]
pub struct Config {
    /// Tracing filter expression applied to the subscriber.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Host platform string used instead of the detected one.
    pub os_override: Option<String>,
    /// Database driver identifier, for example `pdo_pgsql` or `pdo_mysql`.
    #[ortho_config(default = String::from(defaults::DEFAULT_DATABASE_DRIVER))]
    pub database_driver: String,
    /// Database server host.
    #[ortho_config(default = String::from("127.0.0.1"))]
    pub database_host: String,
    /// Database server port; the engine default applies when unset.
    pub database_port: Option<u16>,
    /// Database account name.
    #[ortho_config(default = String::from("postgres"))]
    pub database_user: String,
    /// Database account password.
    pub database_password: Option<String>,
    /// Name of the database that is snapshotted and restored.
    #[ortho_config(default = String::from("app_test"))]
    pub database_name: String,
    /// Directory that receives database dumps.
    #[ortho_config(default = defaults::default_cache_dir())]
    pub cache_dir: Utf8PathBuf,
    /// Message queue transport identifier.
    #[ortho_config(default = String::from(defaults::DEFAULT_MESSAGE_QUEUE_TRANSPORT))]
    pub message_queue_transport: String,
    /// Message broker host.
    #[ortho_config(default = String::from("127.0.0.1"))]
    pub broker_host: String,
    /// Port of the broker's HTTP management API.
    #[ortho_config(default = defaults::DEFAULT_BROKER_MANAGEMENT_PORT)]
    pub broker_management_port: u16,
    /// Broker account name.
    #[ortho_config(default = String::from("guest"))]
    pub broker_user: String,
    /// Broker account password.
    #[ortho_config(default = String::from("guest"))]
    pub broker_password: String,
    /// Broker virtual host.
    #[ortho_config(default = String::from("/"))]
    pub broker_vhost: String,
    /// Queue drained between tests.
    #[ortho_config(default = String::from(defaults::DEFAULT_MESSAGE_QUEUE_NAME))]
    pub message_queue_name: String,
    /// Maximum message priority declared on the queue.
    #[ortho_config(default = defaults::DEFAULT_MESSAGE_QUEUE_MAX_PRIORITY)]
    pub message_queue_max_priority: u8,
    /// Ceiling on a single drain wait, in seconds.
    #[ortho_config(default = defaults::DEFAULT_DRAIN_TIMEOUT_SECS)]
    pub drain_timeout_secs: u64,
    /// Application root used as the consumer's working directory.
    #[ortho_config(default = Utf8PathBuf::from("."))]
    pub app_root: Utf8PathBuf,
    /// Application environment passed to console commands.
    #[ortho_config(default = String::from("test"))]
    pub app_env: String,
    /// Runs console commands in debug mode when set.
    #[ortho_config(default = false)]
    pub app_debug: bool,
    /// Console command line that runs the message consumer.
    #[ortho_config(default = String::from(defaults::DEFAULT_CONSUMER_COMMAND))]
    pub consumer_command: String,
    /// Pattern used to find stray consumer processes; derived when unset.
    pub consumer_pattern: Option<String>,
    /// File that receives consumer output; discarded when unset.
    pub consumer_log: Option<Utf8PathBuf>,
    /// Whether the consumer subscriber stops or restarts the consumer.
    #[ortho_config(default = defaults::default_consumer_mode())]
    pub consumer_mode: ConsumerMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
            os_override: None,
            database_driver: String::from(defaults::DEFAULT_DATABASE_DRIVER),
            database_host: String::from("127.0.0.1"),
            database_port: None,
            database_user: String::from("postgres"),
            database_password: None,
            database_name: String::from("app_test"),
            cache_dir: defaults::default_cache_dir(),
            message_queue_transport: String::from(defaults::DEFAULT_MESSAGE_QUEUE_TRANSPORT),
            broker_host: String::from("127.0.0.1"),
            broker_management_port: defaults::DEFAULT_BROKER_MANAGEMENT_PORT,
            broker_user: String::from("guest"),
            broker_password: String::from("guest"),
            broker_vhost: String::from("/"),
            message_queue_name: String::from(defaults::DEFAULT_MESSAGE_QUEUE_NAME),
            message_queue_max_priority: defaults::DEFAULT_MESSAGE_QUEUE_MAX_PRIORITY,
            drain_timeout_secs: defaults::DEFAULT_DRAIN_TIMEOUT_SECS,
            app_root: Utf8PathBuf::from("."),
            app_env: String::from("test"),
            app_debug: false,
            consumer_command: String::from(defaults::DEFAULT_CONSUMER_COMMAND),
            consumer_pattern: None,
            consumer_log: None,
            consumer_mode: defaults::default_consumer_mode(),
        }
    }
}

impl Config {
    /// Returns the tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the structured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the host platform override, if any.
    #[must_use]
    pub fn os_override(&self) -> Option<&str> {
        self.os_override.as_deref()
    }

    /// Returns the directory that receives database dumps.
    #[must_use]
    pub fn cache_dir(&self) -> &Utf8Path {
        &self.cache_dir
    }

    /// Returns the application root directory.
    #[must_use]
    pub fn app_root(&self) -> &Utf8Path {
        &self.app_root
    }

    /// Returns the consumer subscriber mode.
    #[must_use]
    pub const fn consumer_mode(&self) -> ConsumerMode {
        self.consumer_mode
    }

    /// Returns the pattern that identifies consumer processes.
    ///
    /// Falls back to the consumer command without its leading program, so
    /// `./console oro:message-queue:consume` yields
    /// `oro:message-queue:consume`.
    #[must_use]
    pub fn consumer_pattern(&self) -> String {
        if let Some(pattern) = self.consumer_pattern.as_deref() {
            return pattern.to_owned();
        }
        let mut words = self.consumer_command.split_whitespace();
        let program = words.next().unwrap_or_default();
        let rest = words.collect::<Vec<_>>().join(" ");
        if rest.is_empty() {
            program.to_owned()
        } else {
            rest
        }
    }

    /// Returns the drain ceiling as a [`std::time::Duration`].
    #[must_use]
    pub const fn drain_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.drain_timeout_secs)
    }
}
