//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: request bodies
//!
//! # API Structure
//!
//! - **Authentication** (`/authentication/*`): sign-in, sign-up, password resets and account
//!   lookup. Unauthenticated.
//! - **Users** (`/admin/api/v1/users/*`): provisioning, listing and change-password. The caller
//!   is identified by the trusted requester header.
//!
//! # OpenAPI Documentation
//!
//! The document is served at `/admin/api/v1/openapi.json` and rendered at `/admin/docs`.

pub mod handlers;
pub mod models;
