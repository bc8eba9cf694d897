//! Database connection configuration.
//!
//! Configs are stored as a list in YAML (`.yaml`/`.yml`) or JSON (`.json`):
//!
//! ```yaml
//! - ConnectionName: main
//!   DatabaseName: shop
//!   ServerName: localhost
//!   DatabaseType: Postgres
//!   Credentials:
//!     UserId: app
//!     Password: secret
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};

/// Supported relational database kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DatabaseType {
    #[default]
    #[serde(rename = "SQLite", alias = "sqlite", alias = "Sqlite")]
    Sqlite,
    #[serde(alias = "mssql")]
    MsSql,
    #[serde(alias = "mysql")]
    MySql,
    #[serde(alias = "postgres", alias = "postgresql")]
    Postgres,
}

impl DatabaseType {
    pub const fn as_str(self) -> &'static str {
        match self {
            DatabaseType::Sqlite => "SQLite",
            DatabaseType::MsSql => "MsSql",
            DatabaseType::MySql => "MySql",
            DatabaseType::Postgres => "Postgres",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login credentials. The password is redacted from `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    #[serde(alias = "user_id")]
    pub user_id: String,
    #[serde(alias = "password")]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("password", &"***")
            .finish()
    }
}

/// One named database connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseConfig {
    #[serde(alias = "connection_name")]
    pub connection_name: String,
    #[serde(default, alias = "database_name")]
    pub database_name: String,
    #[serde(default, alias = "server_name")]
    pub server_name: String,
    #[serde(default, alias = "credentials")]
    pub credentials: Option<Credentials>,
    #[serde(default, alias = "database_type")]
    pub database_type: DatabaseType,
}

impl DatabaseConfig {
    /// Parse a YAML list of configs.
    pub fn from_yaml_str(content: &str) -> Result<Vec<Self>> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parse a JSON array of configs.
    pub fn from_json_str(content: &str) -> Result<Vec<Self>> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load all configs from a file, choosing the format by extension.
    pub fn load_configs(path: impl AsRef<Path>) -> Result<Vec<Self>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("failed to read {}: {}", path.display(), e),
                source: Some(Box::new(e)),
            })
        })?;

        let configs = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            other => {
                return Err(Error::Config(ConfigError {
                    message: format!(
                        "unsupported config format {:?} for {}",
                        other.unwrap_or(""),
                        path.display()
                    ),
                    source: None,
                }));
            }
        };
        tracing::debug!(path = %path.display(), count = configs.len(), "Loaded database configs");
        Ok(configs)
    }

    /// The first config in the file, if any.
    pub fn first(path: impl AsRef<Path>) -> Result<Option<Self>> {
        Ok(Self::load_configs(path)?.into_iter().next())
    }

    /// Find a config by connection name.
    pub fn find<'a>(configs: &'a [Self], connection_name: &str) -> Option<&'a Self> {
        configs.iter().find(|c| c.connection_name == connection_name)
    }
}
