//! Database models for password reset tokens.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{ResetTokenId, UserId};

/// Position of a reset row in the request → validate → confirm protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStage {
    /// Code issued, not yet checked.
    Requested,
    /// Code checked, final token issued.
    Validated,
    /// Password changed. Terminal.
    Consumed,
}

/// One reset attempt.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PasswordResetToken {
    pub id: ResetTokenId,
    /// Store-assigned, strictly increasing. Breaks ties between rows with equal `created_at`.
    pub seq: i64,
    pub user_id: UserId,
    pub email: String,
    pub code: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Unix seconds of the last time a code was handed out for this row.
    pub last_sent_at: Option<i64>,
    pub is_used: bool,
    pub is_validated: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    pub fn stage(&self) -> ResetStage {
        match (self.is_validated, self.is_used) {
            (_, true) => ResetStage::Consumed,
            (true, false) => ResetStage::Validated,
            (false, false) => ResetStage::Requested,
        }
    }

    /// Unused and not yet expired at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct PasswordResetTokenCreateRequest {
    pub user_id: UserId,
    pub email: String,
    pub code: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub last_sent_at: i64,
    pub created_at: DateTime<Utc>,
}

/// `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct PasswordResetTokenUpdateRequest {
    pub token: Option<String>,
    pub is_validated: Option<bool>,
    pub is_used: Option<bool>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Lookup for the row a final token refers to.
#[derive(Debug, Clone)]
pub struct PasswordResetTokenFlags {
    pub user_id: UserId,
    pub email: String,
    pub is_validated: bool,
    pub is_used: bool,
    /// Only rows expiring after this instant match.
    pub live_at: DateTime<Utc>,
}

impl PasswordResetTokenFlags {
    pub fn matches(&self, row: &PasswordResetToken) -> bool {
        row.user_id == self.user_id
            && row.email == self.email
            && row.is_validated == self.is_validated
            && row.is_used == self.is_used
            && row.expires_at > self.live_at
    }
}
