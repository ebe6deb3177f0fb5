//! Row and request structures for the persisted entities.

pub mod password_reset_tokens;
pub mod users;
