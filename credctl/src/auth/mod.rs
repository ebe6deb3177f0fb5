//! Credential primitives used by the services.
//!
//! - [`password`]: Argon2id hashing, verification and rehash detection
//! - [`tokens`]: signed password-reset tokens and the signing-key provider
//! - [`random`]: the injected entropy source plus unbiased code and password generators
//! - [`current_user`]: the requester extractor for admin routes

pub mod current_user;
pub mod password;
pub mod random;
pub mod tokens;
