//! Configuration manager for the bridge.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_TIMEOUT: u64 = 8; // seconds.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Public URL of current instance, used as token issuer.
    #[serde(default)]
    pub url: String,
    /// Listening socket address.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub environment: Environment,
    /// Budget for a whole directory round trip, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(skip)]
    path: PathBuf,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing)]
    pub token: Option<Token>,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_owned()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: String::default(),
            url: String::default(),
            address: default_address(),
            environment: Environment::default(),
            timeout: DEFAULT_TIMEOUT,
            path: PathBuf::default(),
            token: None,
            postgres: None,
            argon2: None,
        }
    }
}

/// Deployment kind. Internal error details only leave the server outside
/// production.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Json Web Token configuration.
#[derive(PartialEq, Clone, Serialize, Deserialize)]
pub struct Token {
    pub private_key_pem: String,
    /// Update token audience.
    pub audience: Option<String>,
    /// Session lifetime in seconds.
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("private_key_pem", &"<redacted>")
            .field("audience", &self.audience)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Whether internal error details must be hidden from callers.
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Directory round-trip budget.
    pub fn directory_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                if !config.url.is_empty() {
                    config.url = self.normalize_url(&config.url)?;
                }

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml() {
        let config: Configuration = serde_yaml::from_str(
            r#"
name: Acme CRM
url: crm.acme.com
environment: development
timeout: 5
postgres:
  address: localhost:5432
  pool_size: 4
"#,
        )
        .unwrap();

        assert_eq!(config.name, "Acme CRM");
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert!(!config.is_production());
        assert_eq!(config.directory_timeout(), Duration::from_secs(5));
        assert_eq!(config.postgres.unwrap().pool_size, Some(4));
        assert!(config.token.is_none());
    }

    #[test]
    fn test_defaults_are_safe() {
        let config = Configuration::default();
        assert!(config.is_production());
        assert_eq!(config.directory_timeout(), Duration::from_secs(DEFAULT_TIMEOUT));
    }

    #[test]
    fn test_normalize_url() {
        let config = Configuration::default();
        assert_eq!(
            config.normalize_url("crm.acme.com").unwrap(),
            "https://crm.acme.com/"
        );
        assert_eq!(
            config.normalize_url("http://localhost:8080").unwrap(),
            "http://localhost:8080/"
        );
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Configuration::default()
            .path(PathBuf::from("/nonexistent/config.yaml"))
            .read()
            .unwrap();
        assert_eq!(*config, Configuration::default());
    }
}
