use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Work Items
// ============================================================================

/// A unit of asynchronous work handed to the dispatcher.
///
/// The payload is a value snapshot taken at enqueue time. Handlers must not
/// assume the records it was built from are unchanged by the time they run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub payload: serde_json::Value,
    /// Zero-based delivery attempt, incremented on every redelivery
    #[serde(default)]
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Task {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            payload,
            attempt: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Decode the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// The same task, scheduled for its next delivery attempt.
    pub fn redelivery(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

// ============================================================================
// Runtime Environment
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Dev,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Dev => "dev",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown environment '{0}', expected one of: local, dev, production")]
pub struct UnknownEnvironment(pub String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dev" => Ok(Self::Dev),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(UnknownEnvironment(s.to_string())),
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Install the global tracing subscriber for the given environment.
///
/// `local` and `dev` log at debug level in human-readable form, `production`
/// logs at info level as JSON. `RUST_LOG` takes precedence when set.
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_tracing(env: Environment) {
    let default_directive = match env {
        Environment::Local | Environment::Dev => "debug",
        Environment::Production => "info",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let result = match env {
        Environment::Production => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
        Environment::Local | Environment::Dev => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
