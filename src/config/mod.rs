//! Connection and runner settings.
//!
//! Values come from CLI flags or the environment (optionally seeded from a
//! `.env` file by the binary). Empty environment values count as unset.

use crate::utils::MIGRATIONS_COLLECTION;
use clap::Args;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid MongoDB settings: {0}")]
    InvalidMongoSettings(String),

    #[error("Invalid runner settings: {0}")]
    InvalidRunnerSettings(String),
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// MongoDB connection settings
#[derive(Debug, Clone, Args)]
pub struct MongoSettings {
    /// Host of a standalone server, ignored when replica set hosts are given
    #[arg(long = "mongodb-host", env = "MONGODB_HOST", global = true, default_value = "localhost")]
    pub host: String,

    #[arg(long = "mongodb-port", env = "MONGODB_PORT", global = true, default_value_t = 27017)]
    pub port: u16,

    /// Comma-separated host:port list of replica set members
    #[arg(long = "mongodb-replica-set-hosts", env = "MONGODB_REPLICA_SET_HOSTS", global = true)]
    pub replica_set_hosts: Option<String>,

    #[arg(long = "mongodb-database", env = "MONGODB_DATABASE", global = true, default_value = "test")]
    pub database: String,

    #[arg(long = "mongodb-username", env = "MONGODB_USERNAME", global = true)]
    pub username: Option<String>,

    #[arg(long = "mongodb-password", env = "MONGODB_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Database holding the user's credentials
    #[arg(
        long = "mongodb-authentication-database",
        env = "MONGODB_AUTHENTICATION_DATABASE",
        global = true
    )]
    pub auth_database: Option<String>,

    #[arg(long = "mongodb-replica-set-name", env = "MONGODB_REPLICA_SET_NAME", global = true)]
    pub replica_set_name: Option<String>,
}

impl MongoSettings {
    /// Connection string without credentials or options.
    pub fn connection_uri(&self) -> String {
        let hosts = match non_empty(&self.replica_set_hosts) {
            Some(hosts) => hosts.to_string(),
            None => format!("{}:{}", self.host, self.port),
        };
        format!("mongodb://{hosts}")
    }

    pub fn username(&self) -> Option<&str> {
        non_empty(&self.username)
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn auth_database(&self) -> Option<&str> {
        non_empty(&self.auth_database)
    }

    pub fn replica_set_name(&self) -> Option<&str> {
        non_empty(&self.replica_set_name)
    }

    /// Loggable description of the target; never includes the password.
    pub fn redacted(&self) -> String {
        let mut target = format!("{}/{}", self.connection_uri(), self.database);
        if let Some(user) = self.username() {
            target.push_str(&format!(" (user {user})"));
        }
        if let Some(name) = self.replica_set_name() {
            target.push_str(&format!(" (replica set {name})"));
        }
        target
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::InvalidMongoSettings(
                "database name must not be empty".to_string(),
            ));
        }
        if non_empty(&self.replica_set_hosts).is_none() && self.host.trim().is_empty() {
            return Err(ConfigError::InvalidMongoSettings(
                "either a host or replica set hosts must be given".to_string(),
            ));
        }
        if self.password().is_some() && self.username().is_none() {
            return Err(ConfigError::InvalidMongoSettings(
                "a password was given without a username".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings of the migration run itself
#[derive(Debug, Clone, Args)]
pub struct RunnerSettings {
    /// Collection that records applied migrations
    #[arg(long, env = "MIGRATION_COLLECTION", global = true, default_value = MIGRATIONS_COLLECTION)]
    pub ledger_collection: String,

    /// Deadline for a single migration's up or down step, in seconds
    #[arg(long, env = "MIGRATION_UNIT_TIMEOUT_SECS", global = true)]
    pub unit_timeout_secs: Option<u64>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            ledger_collection: MIGRATIONS_COLLECTION.to_string(),
            unit_timeout_secs: None,
        }
    }
}

impl RunnerSettings {
    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger_collection.trim().is_empty() {
            return Err(ConfigError::InvalidRunnerSettings(
                "ledger collection name must not be empty".to_string(),
            ));
        }
        if self.unit_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidRunnerSettings(
                "unit timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MongoSettings {
        MongoSettings {
            host: "localhost".to_string(),
            port: 27017,
            replica_set_hosts: None,
            database: "app".to_string(),
            username: None,
            password: None,
            auth_database: None,
            replica_set_name: None,
        }
    }

    #[test]
    fn test_standalone_uri() {
        assert_eq!(settings().connection_uri(), "mongodb://localhost:27017");
    }

    #[test]
    fn test_replica_set_hosts_take_precedence() {
        let mut s = settings();
        s.replica_set_hosts = Some("db1:27017,db2:27017".to_string());
        assert_eq!(s.connection_uri(), "mongodb://db1:27017,db2:27017");

        s.replica_set_hosts = Some("  ".to_string());
        assert_eq!(s.connection_uri(), "mongodb://localhost:27017");
    }

    #[test]
    fn test_redacted_hides_password() {
        let mut s = settings();
        s.username = Some("admin".to_string());
        s.password = Some("hunter2".to_string());
        s.replica_set_name = Some("rs0".to_string());

        let redacted = s.redacted();
        assert!(redacted.contains("admin"));
        assert!(redacted.contains("rs0"));
        assert!(!redacted.contains("hunter2"));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let mut s = settings();
        s.username = Some(String::new());
        s.auth_database = Some(String::new());
        assert_eq!(s.username(), None);
        assert_eq!(s.auth_database(), None);
    }

    #[test]
    fn test_validate() {
        assert!(settings().validate().is_ok());

        let mut s = settings();
        s.database = String::new();
        assert!(s.validate().is_err());

        let mut s = settings();
        s.password = Some("secret".to_string());
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_runner_settings() {
        let runner = RunnerSettings::default();
        assert_eq!(runner.ledger_collection, "migrations");
        assert_eq!(runner.unit_timeout(), None);
        assert!(runner.validate().is_ok());

        let runner = RunnerSettings {
            unit_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(runner.validate().is_err());

        let runner = RunnerSettings {
            unit_timeout_secs: Some(30),
            ..Default::default()
        };
        assert_eq!(runner.unit_timeout(), Some(Duration::from_secs(30)));
    }
}
