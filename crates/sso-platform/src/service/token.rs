//! Token Issuer
//!
//! HS512 session tokens signed with the relying application's secret.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Application, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject user id
    pub uid: String,
    pub email: String,
    pub app_id: i32,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token TTL must be positive")]
    InvalidTtl,

    #[error("Application {0} has no signing secret")]
    EmptySecret(i32),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

pub struct TokenIssuer;

impl TokenIssuer {
    pub fn issue(user: &User, app: &Application, ttl: Duration) -> Result<String, TokenError> {
        Self::issue_at(user, app, ttl, Utc::now())
    }

    /// Issue as of `now`. Only the clock differs from [`TokenIssuer::issue`].
    pub fn issue_at(
        user: &User,
        app: &Application,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        if ttl.is_zero() {
            return Err(TokenError::InvalidTtl);
        }
        if app.secret.is_empty() {
            return Err(TokenError::EmptySecret(app.id));
        }

        let iat = now.timestamp();
        let claims = TokenClaims {
            uid: user.id.clone(),
            email: user.email.clone(),
            app_id: app.id,
            exp: iat.saturating_add(ttl_seconds(ttl)),
            iat,
        };

        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(app.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Decode and check signature and expiry against `app`'s secret.
    pub fn verify(token: &str, app: &Application) -> Result<TokenClaims, TokenError> {
        if app.secret.is_empty() {
            return Err(TokenError::EmptySecret(app.id));
        }

        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;

        let data = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(app.secret.as_bytes()),
            &validation,
        )?;
        Ok(data.claims)
    }
}

/// Whole seconds for `exp`, rounded up so a sub-second TTL still expires
/// after `iat`.
fn ttl_seconds(ttl: Duration) -> i64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    i64::try_from(secs).unwrap_or(i64::MAX)
}
