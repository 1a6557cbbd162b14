//! Inputs to isolator applicability checks.

use baseline_config::Config;

use crate::os::OsFamily;

/// Snapshot of the facts isolators inspect when deciding whether they apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationEnvironment {
    os: OsFamily,
    database_driver: String,
    message_queue_transport: String,
}

impl IsolationEnvironment {
    /// Builds an environment from explicit values.
    pub fn new(
        os: OsFamily,
        database_driver: impl Into<String>,
        message_queue_transport: impl Into<String>,
    ) -> Self {
        Self {
            os,
            database_driver: database_driver.into(),
            message_queue_transport: message_queue_transport.into(),
        }
    }

    /// Resolves the environment for the running host from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            OsFamily::resolve(config.os_override()),
            config.database_driver.clone(),
            config.message_queue_transport.clone(),
        )
    }

    /// Operating-system family of the host.
    #[must_use]
    pub const fn os(&self) -> OsFamily {
        self.os
    }

    /// Configured database driver identifier.
    #[must_use]
    pub fn database_driver(&self) -> &str {
        &self.database_driver
    }

    /// Configured message queue transport identifier.
    #[must_use]
    pub fn message_queue_transport(&self) -> &str {
        &self.message_queue_transport
    }
}
