//! Signed password-reset tokens.
//!
//! Tokens are HS256 JWTs carrying `{userId, email, type, exp}`. The `type` claim records which
//! stage of the reset protocol the token was issued for, so a token from the initial request can
//! never be replayed where the final confirmation token is expected. Expiry is checked against
//! the injected [`Clock`] rather than the system time.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{clock::Clock, types::UserId};

/// Supplies the process-wide signing secret.
pub trait SigningKeyProvider: Send + Sync {
    fn signing_key(&self) -> &[u8];
}

/// A secret fixed at startup.
pub struct StaticSigningKey(Vec<u8>);

impl StaticSigningKey {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }
}

impl SigningKeyProvider for StaticSigningKey {
    fn signing_key(&self) -> &[u8] {
        &self.0
    }
}

/// Stage a reset token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStage {
    #[serde(rename = "password_reset_initial")]
    Initial,
    #[serde(rename = "password_reset_final")]
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetClaims {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub email: String,
    #[serde(rename = "type")]
    pub stage: TokenStage,
    pub exp: i64,
}

impl ResetClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed or has a bad signature")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Issues and verifies reset tokens.
#[derive(Clone)]
pub struct ResetTokenSigner {
    keys: Arc<dyn SigningKeyProvider>,
    clock: Arc<dyn Clock>,
}

impl ResetTokenSigner {
    pub fn new(keys: Arc<dyn SigningKeyProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { keys, clock }
    }

    /// Sign a token for `stage` that expires `ttl` from now.
    pub fn issue(&self, user_id: UserId, email: &str, stage: TokenStage, ttl: Duration) -> Result<(String, DateTime<Utc>), TokenError> {
        let expires_at = self.clock.now() + ttl;
        let claims = ResetClaims {
            user_id,
            email: email.to_string(),
            stage,
            exp: expires_at.timestamp(),
        };

        let key = EncodingKey::from_secret(self.keys.signing_key());
        let token = encode(&Header::new(Algorithm::HS256), &claims, &key).map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok((token, expires_at))
    }

    /// Check signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<ResetClaims, TokenError> {
        let key = DecodingKey::from_secret(self.keys.signing_key());
        let mut validation = Validation::new(Algorithm::HS256);
        // exp is checked below against the injected clock
        validation.validate_exp = false;

        let data = decode::<ResetClaims>(token, &key, &validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidKeyFormat | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidRsaKey(_) => {
                TokenError::Signing(e.to_string())
            }
            _ => TokenError::Invalid,
        })?;

        if data.claims.exp <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }
}
