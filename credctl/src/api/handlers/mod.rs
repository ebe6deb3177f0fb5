//! HTTP request handlers.
//!
//! Handlers only translate between HTTP and the services: they deserialize the body, pull the
//! [`Requester`](crate::auth::current_user::Requester) where one is needed, call one service
//! operation and serialize its result. Errors become responses through
//! [`Error`](crate::errors::Error)'s `IntoResponse` impl.
//!
//! - [`auth`]: sign-in and sign-up
//! - [`password_resets`]: request, validate, confirm and account lookup
//! - [`users`]: provisioning, listing and change-password

pub mod auth;
pub mod password_resets;
pub mod users;
