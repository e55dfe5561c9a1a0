//! Coarse check that every login branch pays for a full password comparison
#![cfg(feature = "sqlite")]

mod common;

use std::time::{Duration, Instant};

use common::{TestPortcullis, seed_user, setup};
use portcullis::LoginRequest;
use portcullis_core::crypto::dummy_hash_ready;

const SAMPLES: usize = 5;

async fn median_login_time(portcullis: &TestPortcullis, username: &str, password: &str) -> Duration {
    let mut samples = Vec::with_capacity(SAMPLES);

    for _ in 0..SAMPLES {
        let started = Instant::now();
        let _ = portcullis
            .login(LoginRequest::new(username, password), "203.0.113.50")
            .await;
        samples.push(started.elapsed());
        portcullis.wait_idle().await;
    }

    samples.sort();
    samples[SAMPLES / 2]
}

#[tokio::test]
async fn test_login_branches_take_comparable_time() {
    let portcullis = setup().await;
    // Built instances never generate the dummy hash inside a login
    assert!(dummy_hash_ready());

    seed_user(&portcullis, "alice", "correct horse").await;
    seed_user(&portcullis, "carol", "correct horse").await;

    let unknown_user = median_login_time(&portcullis, "nobody", "wrong").await;
    let wrong_password = median_login_time(&portcullis, "alice", "wrong").await;

    for _ in 0..5 {
        let _ = portcullis
            .login(LoginRequest::new("carol", "wrong"), "203.0.113.51")
            .await;
        portcullis.wait_idle().await;
    }
    assert!(portcullis.abuse_guard().is_user_locked("carol").await.unwrap());
    let locked_user = median_login_time(&portcullis, "carol", "correct horse").await;

    // No branch may skip the hash; allow generous scheduling noise
    let floor = wrong_password / 3;
    assert!(
        unknown_user >= floor,
        "unknown user took {unknown_user:?}, wrong password took {wrong_password:?}"
    );
    assert!(
        locked_user >= floor,
        "locked user took {locked_user:?}, wrong password took {wrong_password:?}"
    );
}
