//! Test utilities shared by unit and HTTP tests.

use std::sync::{Arc, Mutex};

use axum_test::TestServer;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    AppState,
    auth::{
        password::{Argon2Params, PasswordHasher},
        random::{RandomSource, SystemRandom},
        tokens::StaticSigningKey,
    },
    build_app_state, build_router,
    clock::Clock,
    config::Config,
    db::{Database, InMemoryDatabase, models::users::UserCreateDBRequest},
    services::{AuthService, PasswordResetFlow, ProvisioningService},
    types::{Role, UserId},
};

pub const TEST_SECRET: &str = "test-secret-key-for-reset-tokens-0123456789";

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Replays a fixed byte sequence, cycling when exhausted.
pub struct ScriptedRandom {
    bytes: Vec<u8>,
    pos: Mutex<usize>,
}

impl ScriptedRandom {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, pos: Mutex::new(0) }
    }
}

impl RandomSource for ScriptedRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        let mut pos = self.pos.lock().unwrap();
        for b in dest.iter_mut() {
            *b = self.bytes[*pos % self.bytes.len()];
            *pos += 1;
        }
    }
}

/// Argon2 parameters cheap enough to hash hundreds of times in a test run.
pub fn fast_params() -> Argon2Params {
    Argon2Params {
        memory_kib: 256,
        iterations: 1,
        parallelism: 1,
    }
}

pub fn create_test_config() -> Config {
    let mut config = Config {
        secret_key: Some(TEST_SECRET.to_string()),
        database: crate::config::DatabaseConfig::Memory,
        ..Default::default()
    };
    let params = fast_params();
    config.auth.password.argon2_memory_kib = params.memory_kib;
    config.auth.password.argon2_iterations = params.iterations;
    config.auth.password.argon2_parallelism = params.parallelism;
    config
}

/// Everything a test needs to drive the services against the in-memory store.
pub struct TestContext {
    pub db: InMemoryDatabase,
    pub clock: Arc<ManualClock>,
    pub hasher: PasswordHasher,
    pub state: AppState,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(create_test_config())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_random(config, Arc::new(SystemRandom))
    }

    /// Services draw codes, salts and generated passwords from `random`.
    pub fn with_random(config: Config, random: Arc<dyn RandomSource>) -> Self {
        let db = InMemoryDatabase::new();
        let clock = Arc::new(ManualClock::default());
        let hasher = PasswordHasher::new(config.auth.password.argon2_params(), Arc::new(SystemRandom));
        let state = build_app_state(
            config,
            Arc::new(db.clone()),
            clock.clone(),
            random,
            Arc::new(StaticSigningKey::new(TEST_SECRET)),
        );
        Self { db, clock, hasher, state }
    }

    pub fn auth(&self) -> &AuthService {
        &self.state.auth
    }

    pub fn provisioning(&self) -> &ProvisioningService {
        &self.state.provisioning
    }

    pub fn resets(&self) -> &PasswordResetFlow {
        &self.state.password_resets
    }

    pub fn server(&self) -> TestServer {
        let router = build_router(self.state.clone());
        TestServer::new(router).expect("Failed to create test server")
    }

    /// Insert a user directly, bypassing the services.
    pub async fn create_user(&self, email: &str, role: Role, office: Option<&str>, password: Option<&str>) -> UserId {
        self.insert_user(email, role, office, password, true).await
    }

    pub async fn create_inactive_user(&self, email: &str, role: Role, office: Option<&str>) -> UserId {
        self.insert_user(email, role, office, Some("password123"), false).await
    }

    async fn insert_user(&self, email: &str, role: Role, office: Option<&str>, password: Option<&str>, is_active: bool) -> UserId {
        let password_hash = password.map(|p| self.hasher.hash(p).expect("hash test password"));
        let mut uow = self.db.begin().await.expect("begin");
        let user = uow
            .users()
            .create(&UserCreateDBRequest {
                email: email.to_string(),
                name: Some(format!("{role} user")),
                image: None,
                password_hash,
                role,
                office: office.map(str::to_string),
                phone: None,
                is_active,
                email_verified: Some(self.clock.now()),
                created_by: None,
                created_at: self.clock.now(),
            })
            .await
            .expect("create test user");
        uow.commit().await.expect("commit");
        // keep created_at distinct between consecutive inserts
        self.clock.advance(Duration::seconds(1));
        user.id
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
