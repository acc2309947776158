//! Application Entity
//!
//! A relying application. Tokens issued for it are signed with its secret.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Serialize, Deserialize)]
pub struct Application {
    #[serde(rename = "appID")]
    pub id: i32,

    pub name: String,

    /// HMAC signing secret
    pub secret: String,
}

impl Application {
    pub fn new(id: i32, name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
