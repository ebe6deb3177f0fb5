//! Postgres repositories.
//!
//! Each repository wraps a `&mut PgConnection`, normally the connection of an open transaction,
//! and exposes typed queries for one table. They are composed into a unit of work by
//! [`crate::db::postgres::PgUnitOfWork`].
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let user = Users::new(&mut tx).get_user_by_email("a@x.com").await?;
//! tx.commit().await?;
//! ```

pub mod password_reset_tokens;
pub mod users;

pub use password_reset_tokens::PasswordResetTokens;
pub use users::Users;
