// Common test utilities for integration tests
// Every test file pulls this in with `mod common;`, so not every helper is used everywhere.
#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use log::LevelFilter;
use tokio::time::timeout;

use chatapp::backend::MemoryBackend;
use chatapp::client::Subscription;
use chatapp::{ChatClient, ChatConfig, User};

pub const PASSWORD: &str = "secret1";

/// Upper bound for anything a subscription should deliver
pub const WAIT: Duration = Duration::from_secs(2);

static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

/// Short timers so typing expiry can be observed quickly
pub fn test_config() -> ChatConfig {
    ChatConfig {
        typing_timeout_ms: 200,
        typing_idle_ms: 100,
        ..ChatConfig::default()
    }
}

pub fn email_for(name: &str) -> String {
    format!("{}@example.com", name.to_lowercase())
}

/// A fresh client on the shared backend, not signed in
pub fn client_on(backend: &MemoryBackend) -> ChatClient {
    ChatClient::new(backend.backend(), test_config())
}

/// Register `name` on the shared backend and return the signed-in client
pub async fn signed_in_client(backend: &MemoryBackend, name: &str) -> (ChatClient, User) {
    let client = client_on(backend);
    let user = client
        .register(&email_for(name), PASSWORD, name, None)
        .await
        .expect("registration succeeds");
    (client, user)
}

/// Pull snapshots until one satisfies `accept`, failing the test after `WAIT`
pub async fn next_matching<T, F>(subscription: &mut Subscription<T>, accept: F) -> T
where
    F: Fn(&T) -> bool,
{
    let result = timeout(WAIT, async {
        loop {
            match subscription.next().await {
                Some(snapshot) if accept(&snapshot) => return snapshot,
                Some(_) => continue,
                None => panic!("subscription ended early"),
            }
        }
    })
    .await;
    result.expect("timed out waiting for a matching snapshot")
}
