//! Auth SSO Configuration
//!
//! Loads the service configuration from a TOML file and applies `SSO_*`
//! environment overrides on top of it:
//!
//! | Variable | Key |
//! |----------|-----|
//! | `SSO_ENV` | `env` |
//! | `SSO_TOKEN_TTL_SECS` | `token_ttl_secs` |
//! | `SSO_DATABASE_URI` | `database.uri` |
//! | `SSO_DATABASE_NAME` | `database.database_name` |
//! | `SSO_API_PORT` | `api.port` |
//! | `SSO_REDIS_ADDRESS` | `redis.address` |
//! | `SSO_QUEUE_BACKEND` | `queue.backend` |
//! | `SSO_QUEUE_CONCURRENCY` | `queue.concurrency` |

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use sso_common::Environment;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {key}")]
    Override { key: String, value: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Largest accepted `queue.concurrency`.
pub const MAX_QUEUE_CONCURRENCY: usize = 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub env: Environment,

    /// Lifetime of issued session tokens
    pub token_ttl_secs: u64,

    pub database: DatabaseConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub password: PasswordConfig,

    #[serde(default)]
    pub verification: VerificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub database_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 44044,
            timeout_secs: 7200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub address: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6379".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// In-process queue; work is lost when the process exits
    #[default]
    Embedded,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Run the verification worker inside the server process
    pub run_worker: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Embedded,
            concurrency: 10,
            max_attempts: 5,
            retry_delay_ms: 1000,
            run_worker: true,
        }
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub stages: Vec<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            stages: vec!["profile".to_string(), "document".to_string()],
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, then apply `SSO_*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_toml(&raw)?;
        config.apply_overrides(std::env::vars())?;
        config.validate()?;

        debug!(path = %path.display(), env = %config.env, "Configuration loaded");
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from `(key, value)` pairs; unrelated keys are ignored.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "SSO_ENV" => self.env = parse_override(&key, &value)?,
                "SSO_TOKEN_TTL_SECS" => self.token_ttl_secs = parse_override(&key, &value)?,
                "SSO_DATABASE_URI" => self.database.uri = value,
                "SSO_DATABASE_NAME" => self.database.database_name = value,
                "SSO_API_PORT" => self.api.port = parse_override(&key, &value)?,
                "SSO_REDIS_ADDRESS" => self.redis.address = value,
                "SSO_QUEUE_BACKEND" => {
                    self.queue.backend = match value.to_ascii_lowercase().as_str() {
                        "embedded" => QueueBackend::Embedded,
                        "redis" => QueueBackend::Redis,
                        _ => return Err(ConfigError::Override { key, value }),
                    }
                }
                "SSO_QUEUE_CONCURRENCY" => self.queue.concurrency = parse_override(&key, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.token_ttl_secs == 0 {
            problems.push("token_ttl_secs must be greater than zero");
        }
        if self.database.uri.trim().is_empty() {
            problems.push("database.uri is required");
        }
        if self.database.database_name.trim().is_empty() {
            problems.push("database.database_name is required");
        }
        if self.queue.concurrency == 0 || self.queue.concurrency > MAX_QUEUE_CONCURRENCY {
            problems.push("queue.concurrency must be between 1 and 1024");
        }
        if self.queue.max_attempts == 0 {
            problems.push("queue.max_attempts must be greater than zero");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                message: problems.join("; "),
            })
        }
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.queue.retry_delay_ms)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| ConfigError::Override {
        key: key.to_string(),
        value: value.to_string(),
    })
}
