//! # credctl: credential lifecycle service
//!
//! `credctl` owns the parts of account management whose bugs are security incidents: password
//! hashing, sign-in and sign-up, role-scoped provisioning of accounts, and a code-based password
//! reset built on short-lived signed tokens.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer and
//! uses PostgreSQL for persistence, with an in-process store for tests and local runs.
//!
//! The **services** ([`services`]) hold all of the rules. They take their collaborators by
//! injection: a [`db::Database`] to open units of work against, a [`clock::Clock`], a
//! [`auth::random::RandomSource`] and a [`auth::tokens::SigningKeyProvider`]. Nothing in them
//! reads the environment or a global.
//!
//! The **credential primitives** ([`auth`]) are Argon2id hashing, HS256 reset tokens, and
//! unbiased code and password generation.
//!
//! The **database layer** ([`db`]) exposes narrow store traits. Each service operation runs in
//! one transaction; reset operations additionally lock the user row.
//!
//! The **API layer** ([`api`]) is a thin adapter mapping HTTP onto single service calls. Admin
//! routes identify the caller from a header set by the gateway in front of this service.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use credctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = credctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     credctl::telemetry::init_telemetry(config.log_format)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod services;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

use crate::{
    auth::{
        password::PasswordHasher,
        random::{RandomSource, SystemRandom},
        tokens::{ResetTokenSigner, SigningKeyProvider, StaticSigningKey},
    },
    clock::{Clock, SystemClock},
    config::DatabaseConfig,
    db::{
        Database, InMemoryDatabase, PgDatabase,
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    openapi::ApiDoc,
    services::{AuthService, PasswordResetFlow, ProvisioningService, hash_password},
    types::{Role, UserId, abbrev_uuid},
};

/// Shared state handed to every handler.
#[derive(Clone, Builder)]
pub struct AppState {
    pub auth: AuthService,
    pub provisioning: ProvisioningService,
    pub password_resets: PasswordResetFlow,
    pub config: Arc<Config>,
}

/// Get the credctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Wire the services to their collaborators.
pub fn build_app_state(
    config: Config,
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    keys: Arc<dyn SigningKeyProvider>,
) -> AppState {
    let hasher = PasswordHasher::new(config.auth.password.argon2_params(), random.clone());
    let signer = ResetTokenSigner::new(keys, clock.clone());

    AppState::builder()
        .auth(AuthService::new(
            db.clone(),
            hasher.clone(),
            clock.clone(),
            config.auth.password.clone(),
        ))
        .provisioning(ProvisioningService::new(
            db.clone(),
            hasher.clone(),
            random.clone(),
            clock.clone(),
            config.provisioning.clone(),
        ))
        .password_resets(PasswordResetFlow::new(
            db,
            hasher,
            signer,
            random,
            clock,
            config.auth.password.clone(),
            config.auth.password_reset.clone(),
        ))
        .config(Arc::new(config))
        .build()
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: an existing account with this email keeps its id and role, and only has its
/// password replaced when `password` is given. With no password the admin can only sign in
/// through a federated identity provider.
#[instrument(skip_all, err)]
pub async fn create_initial_admin_user(
    email: &str,
    password: Option<&str>,
    db: &dyn Database,
    hasher: &PasswordHasher,
    clock: &dyn Clock,
) -> errors::Result<UserId> {
    let password_hash = match password {
        Some(password) => Some(hash_password(hasher, password).await?),
        None => None,
    };

    let mut uow = db.begin().await?;
    let now = clock.now();

    if let Some(existing) = uow.users().find_by_email(email).await? {
        if let Some(password_hash) = password_hash {
            uow.users()
                .update(existing.id, &UserUpdateDBRequest::at(now).password_hash(password_hash))
                .await?;
        }
        if existing.role != Role::Admin {
            warn!(user_id = %abbrev_uuid(&existing.id), role = %existing.role, "Configured admin email belongs to a non-admin account");
        }
        uow.commit().await?;
        return Ok(existing.id);
    }

    let created = uow
        .users()
        .create(&UserCreateDBRequest {
            email: email.to_string(),
            name: None,
            image: None,
            password_hash,
            role: Role::Admin,
            office: None,
            phone: None,
            is_active: true,
            email_verified: Some(now),
            created_by: None,
            created_at: now,
        })
        .await?;
    uow.commit().await?;

    info!(user_id = %abbrev_uuid(&created.id), "Created initial admin user");
    Ok(created.id)
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Authentication routes (at root level, can be masked when deployed behind SSO proxy)
    let auth_routes = Router::new()
        .route("/authentication/signin", post(api::handlers::auth::signin))
        .route("/authentication/signup", post(api::handlers::auth::signup))
        .route(
            "/authentication/password-resets",
            post(api::handlers::password_resets::request_password_reset),
        )
        .route(
            "/authentication/password-resets/validate",
            post(api::handlers::password_resets::validate_password_reset),
        )
        .route(
            "/authentication/password-resets/confirm",
            post(api::handlers::password_resets::confirm_password_reset),
        )
        .route("/authentication/accounts/lookup", get(api::handlers::password_resets::lookup_account))
        .with_state(state.clone());

    // API routes
    let api_routes = Router::new()
        .route(
            "/users",
            get(api::handlers::users::list_users).post(api::handlers::users::create_user),
        )
        .route("/users/me/password", post(api::handlers::users::change_password))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state);

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(auth_routes)
        .nest("/admin/api/v1", api_routes)
        .merge(Scalar::with_url("/admin/docs", ApiDoc::openapi()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

async fn setup_database(config: &Config) -> anyhow::Result<(Arc<dyn Database>, Option<PgPool>)> {
    match &config.database {
        DatabaseConfig::Postgres { url, pool } => {
            info!(
                "Connecting to database (max_connections: {}, min_connections: {})",
                pool.max_connections, pool.min_connections
            );
            let pg_pool = PgPoolOptions::new()
                .max_connections(pool.max_connections)
                .min_connections(pool.min_connections)
                .acquire_timeout(pool.acquire_timeout)
                .idle_timeout((!pool.idle_timeout.is_zero()).then_some(pool.idle_timeout))
                .max_lifetime((!pool.max_lifetime.is_zero()).then_some(pool.max_lifetime))
                .connect(url)
                .await?;

            migrator().run(&pg_pool).await?;
            Ok((Arc::new(PgDatabase::new(pg_pool.clone())), Some(pg_pool)))
        }
        DatabaseConfig::Memory => {
            warn!("Using the in-memory store; all data is lost on shutdown");
            Ok((Arc::new(InMemoryDatabase::new()), None))
        }
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects the store, runs migrations, ensures the initial
///    admin exists and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!(
            bind = %config.bind_address(),
            memory_store = matches!(config.database, DatabaseConfig::Memory),
            admin_email = %config.admin_email,
            "Starting credctl"
        );
        config.validate()?;

        let secret = config
            .secret_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("secret_key is not configured"))?;

        let (db, pool) = setup_database(&config).await?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let random: Arc<dyn RandomSource> = Arc::new(SystemRandom);

        let hasher = PasswordHasher::new(config.auth.password.argon2_params(), random.clone());
        create_initial_admin_user(
            &config.admin_email,
            config.admin_password.as_deref(),
            db.as_ref(),
            &hasher,
            clock.as_ref(),
        )
        .await?;

        let state = build_app_state(config.clone(), db, clock, random, Arc::new(StaticSigningKey::new(secret)));
        let router = build_router(state);

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("credctl listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::{Application, create_initial_admin_user};
    use crate::{
        auth::{password::PasswordHasher, random::SystemRandom},
        db::{Database, InMemoryDatabase},
        test_utils::{ManualClock, create_test_config, fast_params},
        types::Role,
    };

    #[tokio::test]
    async fn test_create_initial_admin_user_is_idempotent() {
        let db = InMemoryDatabase::new();
        let clock = ManualClock::default();
        let hasher = PasswordHasher::new(fast_params(), Arc::new(SystemRandom));

        let first = create_initial_admin_user("admin@x.com", Some("first-pass"), &db, &hasher, &clock)
            .await
            .unwrap();
        let second = create_initial_admin_user("admin@x.com", Some("second-pass"), &db, &hasher, &clock)
            .await
            .unwrap();
        assert_eq!(first, second);

        let mut uow = db.begin().await.unwrap();
        assert_eq!(uow.users().count_all().await.unwrap(), 1);
        let admin = uow.users().find_by_id(first).await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(hasher.verify(admin.password_hash().unwrap(), "second-pass").is_ok());
    }

    #[tokio::test]
    async fn test_admin_without_password_is_federated_only() {
        let db = InMemoryDatabase::new();
        let clock = ManualClock::default();
        let hasher = PasswordHasher::new(fast_params(), Arc::new(SystemRandom));

        let id = create_initial_admin_user("admin@x.com", None, &db, &hasher, &clock).await.unwrap();
        let mut uow = db.begin().await.unwrap();
        assert!(uow.users().find_by_id(id).await.unwrap().unwrap().password_hash().is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_application_bootstraps_admin_over_memory_store() {
        let mut config = create_test_config();
        config.admin_email = "root@x.com".to_string();
        config.admin_password = Some("rootpass1".to_string());

        let server = Application::new(config).await.unwrap().into_test_server();

        server.get("/healthz").await.assert_status_ok();

        let response = server
            .post("/authentication/signin")
            .json(&json!({"email": "root@x.com", "password": "rootpass1"}))
            .await;
        response.assert_status_ok();
        let admin: Value = response.json();
        assert_eq!(admin["role"], "ADMIN");

        let response = server
            .post("/admin/api/v1/users")
            .add_header("x-credctl-user-id", admin["id"].as_str().unwrap())
            .json(&json!({"email": "m@x.com", "role": "MANAGER", "office": "Lima"}))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_openapi_json_endpoint() {
        let server = Application::new(create_test_config()).await.unwrap().into_test_server();

        let response = server.get("/admin/api/v1/openapi.json").await;
        response.assert_status_ok();
        let content = response.text();
        assert!(content.contains("\"openapi\""));
        assert!(content.contains("/authentication/password-resets"));

        server.get("/admin/docs").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_missing_secret_fails_startup() {
        let config = crate::Config {
            secret_key: None,
            ..create_test_config()
        };
        assert!(Application::new(config).await.is_err());
    }
}
