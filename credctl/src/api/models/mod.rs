//! API request and response data models.
//!
//! Request bodies live here; response bodies are the service result types, which already derive
//! `Serialize` and `ToSchema`, re-exported for the OpenAPI document.
//!
//! - [`auth`]: sign-in and sign-up
//! - [`password_resets`]: the three reset steps and the account lookup
//! - [`users`]: provisioning and change-password

pub mod auth;
pub mod password_resets;
pub mod users;
