// Notification relay tests: token acquisition, registration and rendering

mod common;
use common::{setup_logging, signed_in_client, test_config, WAIT};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use chatapp::backend::memory::{MemoryNotifier, MemoryPush};
use chatapp::backend::{MemoryBackend, RemoteMessage, RemoteNotification};
use chatapp::client::notifications::{DEFAULT_BODY, DEFAULT_TITLE};
use chatapp::client::NotificationRelay;
use chatapp::{ChatClient, ChatError};

#[tokio::test]
async fn test_token_retry_happens_once() {
    setup_logging();
    let backend = MemoryBackend::new();
    let relay = NotificationRelay::new(&backend.backend(), &test_config());

    backend.push.fail_next_token_requests(1);
    assert!(relay.initialize().await.is_some());

    backend.push.fail_next_token_requests(2);
    assert_eq!(relay.initialize().await, None);

    // the script is used up, so the next call succeeds first time
    assert!(relay.initialize().await.is_some());
}

#[tokio::test]
async fn test_enable_notifications_stores_token_on_profile() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (client, user) = signed_in_client(&backend, "Alice").await;

    let token = client.enable_notifications().await.unwrap().expect("token issued");
    assert_eq!(client.current_user().and_then(|u| u.push_token), Some(token.clone()));

    let stored = client.user(&user.uid).await.unwrap().unwrap();
    assert_eq!(stored.push_token, Some(token));

    backend.push.fail_next_token_requests(2);
    assert_eq!(client.enable_notifications().await, Ok(None));
}

#[tokio::test]
async fn test_register_token_needs_a_session() {
    setup_logging();
    let backend = MemoryBackend::new();
    let client = common::client_on(&backend);
    assert_eq!(client.register_push_token("abc").await, Err(ChatError::NotSignedIn));
}

#[tokio::test]
async fn test_incoming_payloads_become_local_notifications() {
    setup_logging();
    let shared = MemoryBackend::new();
    let push = Arc::new(MemoryPush::new());
    let tray = Arc::new(MemoryNotifier::new());
    let device = shared.backend().with_device(push.clone(), tray.clone());
    let client = ChatClient::new(device, test_config());

    let handle = client.notification_relay().start();

    let mut data = HashMap::new();
    data.insert("conversationId".to_string(), "a_b".to_string());
    push.deliver(RemoteMessage {
        from: Some("server".to_string()),
        notification: None,
        data: data.clone(),
    });
    push.deliver(RemoteMessage {
        notification: Some(RemoteNotification {
            title: Some("Bob".to_string()),
            body: Some("lunch?".to_string()),
        }),
        ..RemoteMessage::default()
    });

    let shown = timeout(WAIT, async {
        loop {
            let shown = tray.displayed();
            if shown.len() == 2 {
                return shown;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("both payloads displayed");

    assert_eq!(shown[0].title, DEFAULT_TITLE);
    assert_eq!(shown[0].body, DEFAULT_BODY);
    assert_eq!(shown[0].channel_id, "chat-messages");
    assert_eq!(shown[0].data, data);
    assert_eq!(shown[1].title, "Bob");
    assert_eq!(shown[1].body, "lunch?");

    // the shared backend's own tray saw nothing
    assert!(shared.notifier.displayed().is_empty());

    client.notification_relay().cancel_all().unwrap();
    assert!(tray.displayed().is_empty());
    handle.abort();
}
