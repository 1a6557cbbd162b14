//! Message broker inspection through the RabbitMQ management API.
//!
//! The drain isolator only needs two operations: declare the queue it
//! watches and read its ready-message count. [`QueueInspector`] captures
//! both; [`RabbitManagementClient`] implements them over HTTP.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use tracing::debug;

use baseline_config::Config;

use crate::command::Secret;
use crate::error::IsolationError;

/// Tracing target for broker requests.
pub(crate) const BROKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::queue");

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Declaration of the queue the drain isolator watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    name: String,
    durable: bool,
    exclusive: bool,
    auto_delete: bool,
    max_priority: u8,
}

impl QueueSpec {
    /// A durable, non-exclusive, non-auto-delete priority queue.
    pub fn durable(name: impl Into<String>, max_priority: u8) -> Self {
        Self {
            name: name.into(),
            durable: true,
            exclusive: false,
            auto_delete: false,
            max_priority,
        }
    }

    /// Builds the queue declared by `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::durable(
            config.message_queue_name.clone(),
            config.message_queue_max_priority,
        )
    }

    /// Queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Highest message priority the queue accepts.
    #[must_use]
    pub const fn max_priority(&self) -> u8 {
        self.max_priority
    }

    /// JSON body for a management API declaration.
    #[must_use]
    pub fn declaration_body(&self) -> serde_json::Value {
        serde_json::json!({
            "durable": self.durable,
            "exclusive": self.exclusive,
            "auto_delete": self.auto_delete,
            "arguments": { "x-max-priority": self.max_priority },
        })
    }
}

/// Reads queue depth from a message broker.
pub trait QueueInspector {
    /// Declares `queue`, creating it when absent.
    ///
    /// # Errors
    ///
    /// Returns [`IsolationError::Broker`] when the broker rejects the request.
    fn declare(&self, queue: &QueueSpec) -> Result<(), IsolationError>;

    /// Returns the number of messages ready for delivery on `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`IsolationError::Broker`] when the count cannot be read.
    fn ready_messages(&self, queue: &QueueSpec) -> Result<u64, IsolationError>;
}

impl<T> QueueInspector for Arc<T>
where
    T: QueueInspector + ?Sized,
{
    fn declare(&self, queue: &QueueSpec) -> Result<(), IsolationError> {
        (**self).declare(queue)
    }

    fn ready_messages(&self, queue: &QueueSpec) -> Result<u64, IsolationError> {
        (**self).ready_messages(queue)
    }
}

/// Location and credentials of the broker's management API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementEndpoint {
    host: String,
    port: u16,
    user: String,
    password: Secret,
    vhost: String,
}

impl ManagementEndpoint {
    /// Describes an endpoint explicitly.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: Secret,
        vhost: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password,
            vhost: vhost.into(),
        }
    }

    /// Reads the endpoint from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.broker_host.clone(),
            config.broker_management_port,
            config.broker_user.clone(),
            Secret::new(config.broker_password.clone()),
            config.broker_vhost.clone(),
        )
    }

    /// URL of `queue` in the management API.
    #[must_use]
    pub fn queue_url(&self, queue: &str) -> String {
        format!(
            "http://{}:{}/api/queues/{}/{}",
            self.host,
            self.port,
            utf8_percent_encode(&self.vhost, PATH_SEGMENT),
            utf8_percent_encode(queue, PATH_SEGMENT),
        )
    }

    fn authorization(&self) -> String {
        let credentials = format!("{}:{}", self.user, self.password.expose());
        format!("Basic {}", STANDARD.encode(credentials))
    }
}

#[derive(Debug, Deserialize)]
struct QueueStatus {
    messages_ready: Option<u64>,
}

/// Parses the ready count from a management API queue document.
///
/// Freshly declared queues have no sampled statistics yet; a missing count
/// is read as zero.
pub(crate) fn parse_ready_messages(body: &str) -> Result<u64, serde_json::Error> {
    let status: QueueStatus = serde_json::from_str(body)?;
    Ok(status.messages_ready.unwrap_or(0))
}

/// [`QueueInspector`] backed by the RabbitMQ HTTP management plugin.
#[derive(Debug)]
pub struct RabbitManagementClient {
    endpoint: ManagementEndpoint,
    agent: ureq::Agent,
}

impl RabbitManagementClient {
    /// Creates a client for `endpoint`.
    #[must_use]
    pub fn new(endpoint: ManagementEndpoint) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();
        Self {
            endpoint,
            agent: ureq::Agent::new_with_config(config),
        }
    }

    fn broker_error(url: &str, message: impl Into<String>) -> IsolationError {
        IsolationError::Broker {
            endpoint: url.to_owned(),
            message: message.into(),
        }
    }
}

impl QueueInspector for RabbitManagementClient {
    fn declare(&self, queue: &QueueSpec) -> Result<(), IsolationError> {
        let url = self.endpoint.queue_url(queue.name());
        let body = serde_json::to_vec(&queue.declaration_body())
            .map_err(|error| Self::broker_error(&url, error.to_string()))?;

        debug!(
            target: BROKER_TARGET,
            queue = queue.name(),
            max_priority = queue.max_priority(),
            "declaring queue"
        );

        self.agent
            .put(&url)
            .header("Authorization", &self.endpoint.authorization())
            .header("Content-Type", "application/json")
            .send(body.as_slice())
            .map_err(|error| Self::broker_error(&url, error.to_string()))?;
        Ok(())
    }

    fn ready_messages(&self, queue: &QueueSpec) -> Result<u64, IsolationError> {
        let url = self.endpoint.queue_url(queue.name());
        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &self.endpoint.authorization())
            .call()
            .map_err(|error| Self::broker_error(&url, error.to_string()))?;
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|error| Self::broker_error(&url, error.to_string()))?;
        let ready = parse_ready_messages(&text)
            .map_err(|error| Self::broker_error(&url, format!("invalid queue document: {error}")))?;

        debug!(target: BROKER_TARGET, queue = queue.name(), ready, "read queue depth");
        Ok(ready)
    }
}
