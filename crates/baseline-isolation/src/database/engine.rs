//! Command builders for the supported database servers.

use camino::Utf8Path;

use baseline_config::Config;

use crate::command::{CommandSpec, Secret};

/// Connection details of the database under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    host: String,
    port: Option<u16>,
    user: String,
    password: Option<Secret>,
    name: String,
}

impl DatabaseTarget {
    /// Describes a target explicitly.
    pub fn new(
        host: impl Into<String>,
        port: Option<u16>,
        user: impl Into<String>,
        password: Option<Secret>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password,
            name: name.into(),
        }
    }

    /// Reads the target from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.database_host.clone(),
            config.database_port,
            config.database_user.clone(),
            config.database_password.clone().map(Secret::new),
            config.database_name.clone(),
        )
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builds the dump, drop, create, and reload commands for one server type.
pub trait SnapshotEngine {
    /// Server label used in isolator names, for example `PostgreSQL`.
    fn label(&self) -> &'static str;

    /// Returns whether `driver` selects this engine.
    fn supports_driver(&self, driver: &str) -> bool;

    /// Writes a plain-text dump of the database to `file`.
    fn dump(&self, target: &DatabaseTarget, file: &Utf8Path) -> CommandSpec;

    /// Drops the database if it exists.
    fn drop_database(&self, target: &DatabaseTarget) -> CommandSpec;

    /// Creates an empty database.
    fn create_database(&self, target: &DatabaseTarget) -> CommandSpec;

    /// Loads the dump at `file` into the database.
    fn restore(&self, target: &DatabaseTarget, file: &Utf8Path) -> CommandSpec;
}

const POSTGRES_DRIVERS: &[&str] = &["pdo_pgsql", "pgsql", "postgres", "postgresql"];
const MYSQL_DRIVERS: &[&str] = &["pdo_mysql", "mysql"];

fn supports(drivers: &[&str], driver: &str) -> bool {
    drivers
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(driver))
}

fn quote_identifier(name: &str, quote: char) -> String {
    let doubled = format!("{quote}{quote}");
    format!("{quote}{}{quote}", name.replace(quote, &doubled))
}

/// PostgreSQL through `pg_dump` and `psql`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresEngine;

impl PostgresEngine {
    const MAINTENANCE_DATABASE: &'static str = "postgres";

    fn connect(program: &str, target: &DatabaseTarget) -> CommandSpec {
        let mut spec = CommandSpec::new(program).args(["-h", target.host.as_str()]);
        if let Some(port) = target.port {
            spec = spec.arg("-p").arg(port.to_string());
        }
        spec = spec.args(["-U", target.user.as_str()]);
        match &target.password {
            Some(password) => spec.secret_env("PGPASSWORD", password.clone()),
            None => spec,
        }
    }

    fn maintenance(target: &DatabaseTarget, statement: String) -> CommandSpec {
        Self::connect("psql", target)
            .args(["-d", Self::MAINTENANCE_DATABASE])
            .args(["-v", "ON_ERROR_STOP=1", "-c"])
            .arg(statement)
    }
}

impl SnapshotEngine for PostgresEngine {
    fn label(&self) -> &'static str {
        "PostgreSQL"
    }

    fn supports_driver(&self, driver: &str) -> bool {
        supports(POSTGRES_DRIVERS, driver)
    }

    fn dump(&self, target: &DatabaseTarget, file: &Utf8Path) -> CommandSpec {
        Self::connect("pg_dump", target)
            .arg("--file")
            .arg(file.as_str())
            .arg(target.name.as_str())
    }

    fn drop_database(&self, target: &DatabaseTarget) -> CommandSpec {
        Self::maintenance(
            target,
            format!("DROP DATABASE IF EXISTS {}", quote_identifier(&target.name, '"')),
        )
    }

    fn create_database(&self, target: &DatabaseTarget) -> CommandSpec {
        Self::maintenance(
            target,
            format!("CREATE DATABASE {}", quote_identifier(&target.name, '"')),
        )
    }

    fn restore(&self, target: &DatabaseTarget, file: &Utf8Path) -> CommandSpec {
        Self::connect("psql", target)
            .args(["-d", target.name.as_str()])
            .args(["-v", "ON_ERROR_STOP=1", "--single-transaction", "-q"])
            .args(["-f", file.as_str()])
    }
}

/// MySQL and MariaDB through `mysqldump` and `mysql`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MysqlEngine;

impl MysqlEngine {
    fn connect(program: &str, target: &DatabaseTarget) -> CommandSpec {
        let mut spec = CommandSpec::new(program).args(["-h", target.host.as_str()]);
        if let Some(port) = target.port {
            spec = spec.arg("-P").arg(port.to_string());
        }
        spec = spec.args(["-u", target.user.as_str()]);
        match &target.password {
            Some(password) => spec.secret_env("MYSQL_PWD", password.clone()),
            None => spec,
        }
    }
}

impl SnapshotEngine for MysqlEngine {
    fn label(&self) -> &'static str {
        "MySQL"
    }

    fn supports_driver(&self, driver: &str) -> bool {
        supports(MYSQL_DRIVERS, driver)
    }

    fn dump(&self, target: &DatabaseTarget, file: &Utf8Path) -> CommandSpec {
        Self::connect("mysqldump", target)
            .arg(format!("--result-file={file}"))
            .arg(target.name.as_str())
    }

    fn drop_database(&self, target: &DatabaseTarget) -> CommandSpec {
        Self::connect("mysql", target).arg("-e").arg(format!(
            "DROP DATABASE IF EXISTS {}",
            quote_identifier(&target.name, '`')
        ))
    }

    fn create_database(&self, target: &DatabaseTarget) -> CommandSpec {
        Self::connect("mysql", target)
            .arg("-e")
            .arg(format!("CREATE DATABASE {}", quote_identifier(&target.name, '`')))
    }

    fn restore(&self, target: &DatabaseTarget, file: &Utf8Path) -> CommandSpec {
        Self::connect("mysql", target)
            .arg(target.name.as_str())
            .arg("-e")
            .arg(format!("source {file}"))
    }
}
