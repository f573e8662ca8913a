#![allow(dead_code)]

use std::time::Duration;

use safeher::accounts::Account;
use safeher::auth::session::SessionContext;
use safeher::auth::SignupRequest;
use safeher::config::Config;
use safeher::db;
use safeher::state::{AppState, Client};
use tempfile::TempDir;

pub const PASSWORD: &str = "s3cret-pass";
pub const ADMIN_EMAIL: &str = "admin@app.com";

/// Shared backend on a throwaway database. Keep it alive for the whole test.
pub struct TestBackend {
    pub state: AppState,
    _dir: TempDir,
}

pub fn backend() -> TestBackend {
    let mut config = Config::default();
    config.identity.bcrypt_cost = 4;
    backend_with(config)
}

pub fn backend_with(config: Config) -> TestBackend {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("test.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    TestBackend {
        state: AppState::with_pool(pool, config),
        _dir: dir,
    }
}

pub fn signup_request(email: &str, name: &str) -> SignupRequest {
    SignupRequest {
        email: email.to_string(),
        password: PASSWORD.to_string(),
        full_name: name.to_string(),
        phone: "+923001234567".to_string(),
        national_id: "35202-1234567-1".to_string(),
    }
}

/// New client signed up and signed in as `email`.
pub async fn signed_up(backend: &TestBackend, email: &str, name: &str) -> (Client, Account) {
    let client = backend.state.client();
    let account = client
        .access
        .signup(signup_request(email, name))
        .await
        .expect("signup failed");
    (client, account)
}

pub async fn admin(backend: &TestBackend) -> (Client, Account) {
    signed_up(backend, ADMIN_EMAIL, "Admin").await
}

/// Wait until the session is empty, failing the test after a few seconds.
pub async fn wait_for_logout(session: &SessionContext) {
    let mut rx = session.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|current| current.is_none()))
        .await
        .expect("session was not cleared in time")
        .expect("session channel closed");
}
