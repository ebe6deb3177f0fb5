//! In-process [`Database`].
//!
//! A unit of work holds the store-wide lock for its whole lifetime and edits a private copy of
//! the state; `commit` publishes the copy. Units of work are therefore fully serialized, and a
//! dropped one leaves the shared state untouched.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    CredentialStore, Database, ResetTokenStore, UnitOfWork,
    errors::{DbError, Result},
    models::{
        password_reset_tokens::{PasswordResetToken, PasswordResetTokenCreateRequest, PasswordResetTokenFlags, PasswordResetTokenUpdateRequest},
        users::{UserCreateDBRequest, UserDBResponse, UserFilter, UserUpdateDBRequest},
    },
};
use crate::types::{ResetTokenId, UserId};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: Vec<UserDBResponse>,
    reset_tokens: Vec<PasswordResetToken>,
    next_seq: i64,
}

impl MemoryState {
    fn latest_token(&self, pred: impl Fn(&PasswordResetToken) -> bool) -> Option<PasswordResetToken> {
        self.reset_tokens
            .iter()
            .filter(|t| pred(t))
            .max_by_key(|t| (t.created_at, t.seq))
            .cloned()
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn users(&mut self) -> &mut dyn CredentialStore {
        self
    }

    fn reset_tokens(&mut self) -> &mut dyn ResetTokenStore {
        self
    }

    async fn lock_user(&mut self, _id: UserId) -> Result<()> {
        // the unit of work already holds the store-wide lock
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryUnitOfWork {
    async fn find_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        Ok(self.working.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&mut self, id: UserId) -> Result<Option<UserDBResponse>> {
        Ok(self.working.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        if self.working.users.iter().any(|u| u.email == request.email) {
            return Err(DbError::UniqueViolation {
                constraint: Some("users_email_unique".to_string()),
                table: Some("users".to_string()),
                message: "duplicate key value violates unique constraint \"users_email_unique\"".to_string(),
            });
        }

        let user = UserDBResponse {
            id: Uuid::new_v4(),
            email: request.email.clone(),
            name: request.name.clone(),
            image: request.image.clone(),
            password_hash: request.password_hash.clone(),
            role: request.role,
            office: request.office.clone(),
            phone: request.phone.clone(),
            is_active: request.is_active,
            email_verified: request.email_verified,
            last_login: None,
            created_by: request.created_by,
            created_at: request.created_at,
            updated_at: request.created_at,
        };
        self.working.users.push(user.clone());
        Ok(user)
    }

    async fn update(&mut self, id: UserId, request: &UserUpdateDBRequest) -> Result<UserDBResponse> {
        let user = self.working.users.iter_mut().find(|u| u.id == id).ok_or(DbError::NotFound)?;
        if let Some(hash) = &request.password_hash {
            user.password_hash = Some(hash.clone());
        }
        if let Some(at) = request.last_login {
            user.last_login = Some(at);
        }
        if let Some(active) = request.is_active {
            user.is_active = active;
        }
        user.updated_at = request.updated_at;
        Ok(user.clone())
    }

    async fn count_all(&mut self) -> Result<i64> {
        Ok(self.working.users.len() as i64)
    }

    async fn list(&mut self, filter: &UserFilter) -> Result<Vec<UserDBResponse>> {
        let mut users: Vec<UserDBResponse> = self.working.users.iter().filter(|u| filter.matches(u)).cloned().collect();
        users.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(users)
    }
}

#[async_trait]
impl ResetTokenStore for MemoryUnitOfWork {
    async fn find_latest_by_email(&mut self, email: &str) -> Result<Option<PasswordResetToken>> {
        Ok(self.working.latest_token(|t| t.email == email))
    }

    async fn find_live_by_code(&mut self, email: &str, code: &str, now: DateTime<Utc>) -> Result<Option<PasswordResetToken>> {
        Ok(self.working.latest_token(|t| t.email == email && t.code == code && t.is_live(now)))
    }

    async fn find_by_user_and_flags(&mut self, flags: &PasswordResetTokenFlags) -> Result<Option<PasswordResetToken>> {
        Ok(self.working.latest_token(|t| flags.matches(t)))
    }

    async fn create(&mut self, request: &PasswordResetTokenCreateRequest) -> Result<PasswordResetToken> {
        if !self.working.users.iter().any(|u| u.id == request.user_id) {
            return Err(DbError::ForeignKeyViolation {
                constraint: Some("password_reset_tokens_user_id_fkey".to_string()),
                table: Some("password_reset_tokens".to_string()),
                message: "user does not exist".to_string(),
            });
        }

        self.working.next_seq += 1;
        let token = PasswordResetToken {
            id: Uuid::new_v4(),
            seq: self.working.next_seq,
            user_id: request.user_id,
            email: request.email.clone(),
            code: request.code.clone(),
            token: request.token.clone(),
            expires_at: request.expires_at,
            last_sent_at: Some(request.last_sent_at),
            is_used: false,
            is_validated: false,
            used_at: None,
            created_at: request.created_at,
        };
        self.working.reset_tokens.push(token.clone());
        Ok(token)
    }

    async fn update(&mut self, id: ResetTokenId, request: &PasswordResetTokenUpdateRequest) -> Result<PasswordResetToken> {
        let token = self.working.reset_tokens.iter_mut().find(|t| t.id == id).ok_or(DbError::NotFound)?;
        if let Some(value) = &request.token {
            token.token = value.clone();
        }
        if let Some(value) = request.is_validated {
            token.is_validated = value;
        }
        if let Some(value) = request.is_used {
            token.is_used = value;
        }
        if let Some(value) = request.used_at {
            token.used_at = Some(value);
        }
        Ok(token.clone())
    }

    async fn bulk_expire_except(&mut self, user_id: UserId, except: Option<ResetTokenId>, expires_at: DateTime<Utc>) -> Result<u64> {
        let mut changed = 0;
        for token in self.working.reset_tokens.iter_mut() {
            if token.user_id == user_id && !token.is_used && token.expires_at > expires_at && Some(token.id) != except {
                token.expires_at = expires_at;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use chrono::Duration;

    fn user_request(email: &str, role: Role, created_at: DateTime<Utc>) -> UserCreateDBRequest {
        UserCreateDBRequest {
            email: email.to_string(),
            name: None,
            image: None,
            password_hash: None,
            role,
            office: Some("Lima".to_string()),
            phone: None,
            is_active: true,
            email_verified: None,
            created_by: None,
            created_at,
        }
    }

    fn token_request(user_id: UserId, code: &str, now: DateTime<Utc>) -> PasswordResetTokenCreateRequest {
        PasswordResetTokenCreateRequest {
            user_id,
            email: "a@x.com".to_string(),
            code: code.to_string(),
            token: "signed".to_string(),
            expires_at: now + Duration::minutes(15),
            last_sent_at: now.timestamp(),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_work_is_rolled_back() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();

        let mut uow = db.begin().await.unwrap();
        uow.users().create(&user_request("a@x.com", Role::Employee, now)).await.unwrap();
        drop(uow);

        let mut uow = db.begin().await.unwrap();
        assert!(uow.users().find_by_email("a@x.com").await.unwrap().is_none());
        uow.users().create(&user_request("a@x.com", Role::Employee, now)).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = db.begin().await.unwrap();
        assert!(uow.users().find_by_email("a@x.com").await.unwrap().is_some());
        assert_eq!(uow.users().count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let mut uow = db.begin().await.unwrap();
        uow.users().create(&user_request("a@x.com", Role::Employee, now)).await.unwrap();

        let err = uow.users().create(&user_request("a@x.com", Role::Manager, now)).await.unwrap_err();
        assert!(err.is_email_conflict());
    }

    #[tokio::test]
    async fn test_update_missing_user_is_not_found() {
        let db = InMemoryDatabase::new();
        let mut uow = db.begin().await.unwrap();
        let err = uow
            .users()
            .update(Uuid::new_v4(), &UserUpdateDBRequest::at(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_filtered() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let mut uow = db.begin().await.unwrap();
        let old = uow.users().create(&user_request("old@x.com", Role::Employee, now)).await.unwrap();
        let new = uow
            .users()
            .create(&user_request("new@x.com", Role::Employee, now + Duration::seconds(1)))
            .await
            .unwrap();
        uow.users().create(&user_request("admin@x.com", Role::Admin, now)).await.unwrap();

        let filter = UserFilter {
            roles: vec![Role::Employee],
            ..Default::default()
        };
        let ids: Vec<UserId> = uow.users().list(&filter).await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![new.id, old.id]);
    }

    #[tokio::test]
    async fn test_latest_token_breaks_ties_by_seq() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let mut uow = db.begin().await.unwrap();
        let user = uow.users().create(&user_request("a@x.com", Role::Employee, now)).await.unwrap();

        uow.reset_tokens().create(&token_request(user.id, "111111", now)).await.unwrap();
        let second = uow.reset_tokens().create(&token_request(user.id, "222222", now)).await.unwrap();

        let latest = uow.reset_tokens().find_latest_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn test_bulk_expire_spares_excepted_row() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let mut uow = db.begin().await.unwrap();
        let user = uow.users().create(&user_request("a@x.com", Role::Employee, now)).await.unwrap();

        let first = uow.reset_tokens().create(&token_request(user.id, "111111", now)).await.unwrap();
        let second = uow.reset_tokens().create(&token_request(user.id, "222222", now)).await.unwrap();

        let changed = uow
            .reset_tokens()
            .bulk_expire_except(user.id, Some(second.id), DateTime::<Utc>::UNIX_EPOCH)
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let store = uow.reset_tokens();
        assert!(store.find_live_by_code("a@x.com", "111111", now).await.unwrap().is_none());
        let live = store.find_live_by_code("a@x.com", "222222", now).await.unwrap().unwrap();
        assert_eq!(live.id, second.id);
        assert_ne!(live.id, first.id);
    }
}
