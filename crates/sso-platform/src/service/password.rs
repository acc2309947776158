//! Argon2id password hashing. Hashing runs on the blocking pool.

use argon2::password_hash::{self, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;

use crate::domain::PasswordHash;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Invalid Argon2 parameters: {0}")]
    Params(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Stored hash is not a valid PHC string")]
    InvalidHash,

    #[error("Hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct Argon2Config {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new(config: &Argon2Config) -> Result<Self, PasswordError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| PasswordError::Params(e.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub async fn hash_password(&self, password: &str) -> Result<PasswordHash, PasswordError> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut rand::thread_rng());
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| PasswordHash::new(hash.to_string()))
                .map_err(|e| PasswordError::Hash(e.to_string()))
        })
        .await?
    }

    /// `Ok(false)` on mismatch; `Err` when the stored hash cannot be used.
    pub async fn verify_password(&self, password: &str, stored: &PasswordHash) -> Result<bool, PasswordError> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        let stored = stored.as_str().to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed = password_hash::PasswordHash::new(&stored).map_err(|_| PasswordError::InvalidHash)?;
            match argon2.verify_password(password.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(password_hash::Error::Password) => Ok(false),
                Err(e) => Err(PasswordError::Hash(e.to_string())),
            }
        })
        .await?
    }
}
