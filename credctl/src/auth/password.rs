//! Password hashing and verification.

use std::sync::Arc;

use argon2::{
    ARGON2ID_IDENT, Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use thiserror::Error;

use super::random::RandomSource;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Derived key length in bytes.
pub const OUTPUT_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("password does not match")]
    InvalidPassword,
    #[error("malformed password hash")]
    MalformedHash,
    #[error("unsupported argon2 version")]
    UnsupportedVersion,
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    fn to_params(self) -> Result<Params, HashError> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, Some(OUTPUT_LEN))
            .map_err(|e| HashError::InvalidInput(format!("argon2 params: {e}")))
    }

    /// Check the parameters are accepted by argon2.
    pub fn validate(self) -> Result<(), HashError> {
        self.to_params().map(|_| ())
    }
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MiB
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// Argon2id hasher bound to the currently configured parameters.
///
/// Verification always uses the parameters embedded in the stored hash, so hashes written under
/// older settings keep verifying; [`PasswordHasher::needs_rehash`] reports when they should be
/// upgraded.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Argon2Params,
    random: Arc<dyn RandomSource>,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").field("params", &self.params).finish_non_exhaustive()
    }
}

impl PasswordHasher {
    pub fn new(params: Argon2Params, random: Arc<dyn RandomSource>) -> Self {
        Self { params, random }
    }

    pub fn params(&self) -> Argon2Params {
        self.params
    }

    /// Hash a password into a PHC string:
    /// `$argon2id$v=19$m=<kib>,t=<iterations>,p=<parallelism>$<salt>$<hash>`.
    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        if password.is_empty() {
            return Err(HashError::InvalidInput("password is empty".to_string()));
        }

        let mut salt_bytes = [0u8; SALT_LEN];
        self.random.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| HashError::InvalidInput(format!("salt: {e}")))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.to_params()?);
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| HashError::InvalidInput(format!("hash password: {e}")))?;

        Ok(hash.to_string())
    }

    /// Verify a password against a stored hash. The comparison is constant time.
    pub fn verify(&self, encoded: &str, password: &str) -> Result<(), HashError> {
        let parsed = parse_argon2id(encoded)?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(()),
            Err(password_hash::Error::Password) => Err(HashError::InvalidPassword),
            Err(_) => Err(HashError::MalformedHash),
        }
    }

    /// True when the stored hash was produced with different parameters than the current ones,
    /// or cannot be parsed at all.
    pub fn needs_rehash(&self, encoded: &str) -> bool {
        let Ok(parsed) = parse_argon2id(encoded) else {
            return true;
        };
        let Ok(stored) = Params::try_from(&parsed) else {
            return true;
        };

        stored.m_cost() != self.params.memory_kib
            || stored.t_cost() != self.params.iterations
            || stored.p_cost() != self.params.parallelism
            || parsed.hash.map(|h| h.len()) != Some(OUTPUT_LEN)
    }
}

fn parse_argon2id(encoded: &str) -> Result<PasswordHash<'_>, HashError> {
    let parsed = PasswordHash::new(encoded).map_err(|_| HashError::MalformedHash)?;
    if parsed.algorithm != ARGON2ID_IDENT {
        return Err(HashError::MalformedHash);
    }
    match parsed.version {
        Some(v) if v != u32::from(Version::V0x13) => Err(HashError::UnsupportedVersion),
        _ => Ok(parsed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::random::SystemRandom;

    fn fast_params() -> Argon2Params {
        Argon2Params {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn hasher(params: Argon2Params) -> PasswordHasher {
        PasswordHasher::new(params, Arc::new(SystemRandom))
    }

    #[test]
    fn test_hash_round_trip() {
        let hasher = hasher(fast_params());
        let hash = hasher.hash("test_password_123").unwrap();

        assert!(hasher.verify(&hash, "test_password_123").is_ok());
        assert_eq!(hasher.verify(&hash, "wrong_password"), Err(HashError::InvalidPassword));
    }

    #[test]
    fn test_hash_format() {
        let hash = hasher(fast_params()).hash("secret123").unwrap();
        let parts: Vec<&str> = hash.split('$').collect();

        assert_eq!(parts[0], "");
        assert_eq!(parts[1], "argon2id");
        assert_eq!(parts[2], "v=19");
        assert_eq!(parts[3], "m=256,t=1,p=1");
        // 16-byte salt and 32-byte key, base64 without padding
        assert_eq!(parts[4].len(), 22);
        assert_eq!(parts[5].len(), 43);
        assert!(!parts[4].contains('=') && !parts[5].contains('='));
    }

    #[test]
    fn test_same_input_different_hashes() {
        let hasher = hasher(fast_params());
        let hash1 = hasher.hash("same_password").unwrap();
        let hash2 = hasher.hash("same_password").unwrap();

        assert_ne!(hash1, hash2);
        assert!(hasher.verify(&hash1, "same_password").is_ok());
        assert!(hasher.verify(&hash2, "same_password").is_ok());
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(matches!(hasher(fast_params()).hash(""), Err(HashError::InvalidInput(_))));
    }

    #[test]
    fn test_verify_uses_embedded_params() {
        let old = hasher(fast_params());
        let hash = old.hash("password").unwrap();

        let upgraded = hasher(Argon2Params {
            memory_kib: 512,
            iterations: 2,
            parallelism: 1,
        });
        assert!(upgraded.verify(&hash, "password").is_ok());
    }

    #[test]
    fn test_malformed_hashes() {
        let hasher = hasher(fast_params());
        let good = hasher.hash("password").unwrap();
        let argon2i = good.replacen("argon2id", "argon2i", 1);

        for bad in ["", "not-a-hash", "argon2id$v=19", argon2i.as_str()] {
            assert_eq!(hasher.verify(bad, "password"), Err(HashError::MalformedHash), "input: {bad:?}");
        }
    }

    #[test]
    fn test_unsupported_version() {
        let hasher = hasher(fast_params());
        let hash = hasher.hash("password").unwrap().replacen("v=19", "v=16", 1);
        assert_eq!(hasher.verify(&hash, "password"), Err(HashError::UnsupportedVersion));
    }

    #[test]
    fn test_needs_rehash() {
        let current = hasher(fast_params());
        let hash = current.hash("password").unwrap();
        assert!(!current.needs_rehash(&hash));

        let changed = hasher(Argon2Params {
            memory_kib: 512,
            ..fast_params()
        });
        assert!(changed.needs_rehash(&hash));

        assert!(current.needs_rehash("garbage"));
    }

    #[test]
    fn test_default_params() {
        let params = Argon2Params::default();
        assert_eq!((params.memory_kib, params.iterations, params.parallelism), (65536, 3, 4));
        assert!(params.validate().is_ok());
    }
}
