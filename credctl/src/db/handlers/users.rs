//! Database repository for users.

use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::{DbError, Result},
        models::users::{UserCreateDBRequest, UserDBResponse, UserFilter, UserUpdateDBRequest},
    },
    types::{UserId, abbrev_uuid},
};

const USER_COLUMNS: &str = "id, email, name, image, password_hash, role, office, phone, is_active, \
                            email_verified, last_login, created_by, created_at, updated_at";

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(role = %request.role), err)]
    pub async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let query = format!(
            "INSERT INTO users (id, email, name, image, password_hash, role, office, phone, is_active, email_verified, \
             created_by, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
             RETURNING {USER_COLUMNS}"
        );

        let user = sqlx::query_as::<_, UserDBResponse>(&query)
            .bind(Uuid::new_v4())
            .bind(&request.email)
            .bind(&request.name)
            .bind(&request.image)
            .bind(&request.password_hash)
            .bind(request.role)
            .bind(&request.office)
            .bind(&request.phone)
            .bind(request.is_active)
            .bind(request.email_verified)
            .bind(request.created_by)
            .bind(request.created_at)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: UserId) -> Result<Option<UserDBResponse>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, UserDBResponse>(&query)
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, UserDBResponse>(&query)
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn update(&mut self, id: UserId, request: &UserUpdateDBRequest) -> Result<UserDBResponse> {
        let query = format!(
            "UPDATE users SET
                password_hash = COALESCE($2, password_hash),
                last_login = COALESCE($3, last_login),
                is_active = COALESCE($4, is_active),
                updated_at = $5
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, UserDBResponse>(&query)
            .bind(id)
            .bind(&request.password_hash)
            .bind(request.last_login)
            .bind(request.is_active)
            .bind(request.updated_at)
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    #[instrument(skip(self, filter), fields(roles = filter.roles.len(), active_only = filter.active_only), err)]
    pub async fn list(&mut self, filter: &UserFilter) -> Result<Vec<UserDBResponse>> {
        let mut query = format!("SELECT {USER_COLUMNS} FROM users WHERE 1=1");
        let mut params = 0;

        if filter.active_only {
            query.push_str(" AND is_active = TRUE");
        }
        if !filter.roles.is_empty() {
            params += 1;
            query.push_str(&format!(" AND role::text = ANY(${params})"));
        }
        if filter.office.is_some() {
            params += 1;
            query.push_str(&format!(" AND office = ${params}"));
        }
        if filter.exclude_id.is_some() {
            params += 1;
            query.push_str(&format!(" AND id <> ${params}"));
        }
        query.push_str(" ORDER BY created_at DESC, id DESC");

        let mut sql_query = sqlx::query_as::<_, UserDBResponse>(&query);
        if !filter.roles.is_empty() {
            let roles: Vec<String> = filter.roles.iter().map(|r| r.as_str().to_string()).collect();
            sql_query = sql_query.bind(roles);
        }
        if let Some(office) = &filter.office {
            sql_query = sql_query.bind(office);
        }
        if let Some(exclude_id) = filter.exclude_id {
            sql_query = sql_query.bind(exclude_id);
        }

        let users = sql_query.fetch_all(&mut *self.db).await?;
        Ok(users)
    }

    /// Row-lock the user until the surrounding transaction ends.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn lock(&mut self, id: UserId) -> Result<()> {
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }
}
