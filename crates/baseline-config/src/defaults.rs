use camino::Utf8PathBuf;
use std::env;

use crate::consumer::ConsumerMode;
use crate::logging::LogFormat;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Driver identifier selecting the PostgreSQL snapshot engine.
pub const DEFAULT_DATABASE_DRIVER: &str = "pdo_pgsql";

/// Transport identifier selecting the AMQP queue isolator.
pub const DEFAULT_MESSAGE_QUEUE_TRANSPORT: &str = "amqp";

/// Queue drained by the message-queue isolator.
pub const DEFAULT_MESSAGE_QUEUE_NAME: &str = "oro.default";

/// Highest message priority the drained queue is declared with.
pub const DEFAULT_MESSAGE_QUEUE_MAX_PRIORITY: u8 = 4;

/// Port of the RabbitMQ HTTP management plugin.
pub const DEFAULT_BROKER_MANAGEMENT_PORT: u16 = 15672;

/// Ceiling on a single drain wait, in seconds.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 60;

/// Console command that runs the message consumer daemon.
pub const DEFAULT_CONSUMER_COMMAND: &str = "./console oro:message-queue:consume";

/// Default log filter expression.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default consumer subscriber mode.
pub fn default_consumer_mode() -> ConsumerMode {
    ConsumerMode::Off
}

/// Directory that receives database dumps when none is configured.
///
/// Prefers the user cache directory and falls back to the system temporary
/// directory when the platform has none or it is not valid UTF-8.
pub fn default_cache_dir() -> Utf8PathBuf {
    let base = dirs::cache_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory);
    base.join("baseline")
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
