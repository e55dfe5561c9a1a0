#![allow(dead_code)]

use std::time::Duration;

use portcullis::{
    AbuseGuardConfig, NewUser, Portcullis, PortcullisBuilder, SqliteRepositoryProvider,
    TokenConfig, User, hash_password,
};
use portcullis_core::repositories::UserRepositoryProvider;

pub const ACCESS_SECRET: &[u8] = b"access-secret-for-integration-tests-only";
pub const REFRESH_SECRET: &[u8] = b"refresh-secret-for-integration-tests-only";

pub type TestPortcullis = Portcullis<SqliteRepositoryProvider>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("portcullis=debug,portcullis_core=debug")
        .with_test_writer()
        .try_init();
}

pub fn token_config() -> TokenConfig {
    TokenConfig::new(ACCESS_SECRET, REFRESH_SECRET).unwrap()
}

/// The default policy with a short lockout so tests can wait it out
pub fn abuse_config() -> AbuseGuardConfig {
    AbuseGuardConfig::default().with_user_lockout(
        5,
        Duration::from_secs(15 * 60),
        Duration::from_millis(400),
    )
}

pub async fn setup() -> TestPortcullis {
    setup_with(token_config(), abuse_config()).await
}

pub async fn setup_with(tokens: TokenConfig, abuse: AbuseGuardConfig) -> TestPortcullis {
    init_tracing();

    PortcullisBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .expect("Failed to connect to SQLite")
        .with_token_config(tokens)
        .with_abuse_guard(abuse)
        .apply_migrations(true)
        .build()
        .await
        .expect("Failed to build Portcullis")
}

pub async fn seed_user(portcullis: &TestPortcullis, username: &str, password: &str) -> User {
    portcullis
        .repositories()
        .user()
        .create_user(NewUser::new(username, hash_password(password)).with_fullname(username))
        .await
        .expect("Failed to create user")
}
