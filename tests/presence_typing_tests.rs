// Presence and typing indicator tests

mod common;
use common::{next_matching, setup_logging, signed_in_client};

use std::time::Duration;

use tokio::time::sleep;

use chatapp::backend::MemoryBackend;
use chatapp::{ChatError, PresenceState};

#[tokio::test]
async fn test_connection_loss_flips_presence_offline() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (alice, a) = signed_in_client(&backend, "Alice").await;
    let (bob, _) = signed_in_client(&backend, "Bob").await;

    let mut presence = bob.subscribe_to_presence(&a.uid);
    next_matching(&mut presence, |p| p.as_ref().map(|p| p.is_online()).unwrap_or(false)).await;

    alice.drop_connection().await.unwrap();

    let offline = next_matching(&mut presence, |p| {
        p.as_ref().map(|p| p.state == PresenceState::Offline).unwrap_or(false)
    })
    .await
    .unwrap();
    assert!(offline.last_seen > 0);

    // still signed in on the fresh connection
    assert!(alice.is_signed_in());
}

#[tokio::test]
async fn test_signing_in_again_rearms_the_disconnect_hook() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (alice, a) = signed_in_client(&backend, "Alice").await;

    alice.drop_connection().await.unwrap();
    alice.deauthenticate().await.unwrap();
    alice
        .authenticate(&common::email_for("Alice"), common::PASSWORD)
        .await
        .unwrap();
    assert!(alice.presence_of(&a.uid).await.unwrap().unwrap().is_online());

    alice.drop_connection().await.unwrap();
    let presence = alice.presence_of(&a.uid).await.unwrap().unwrap();
    assert_eq!(presence.state, PresenceState::Offline);
}

#[tokio::test]
async fn test_typing_flag_expires_by_itself() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (alice, a) = signed_in_client(&backend, "Alice").await;
    let (bob, b) = signed_in_client(&backend, "Bob").await;
    let chat = alice.conversation_with(&b.uid).await.unwrap();

    alice.set_typing(&chat, true).await.unwrap();
    assert!(bob.is_typing(&chat, &a.uid).await.unwrap());

    // typing_timeout is 200ms in the test config
    sleep(Duration::from_millis(400)).await;
    assert!(!bob.is_typing(&chat, &a.uid).await.unwrap());
}

#[tokio::test]
async fn test_typing_flag_is_renewed_by_each_keystroke() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (alice, a) = signed_in_client(&backend, "Alice").await;
    let (_bob, b) = signed_in_client(&backend, "Bob").await;
    let chat = alice.conversation_with(&b.uid).await.unwrap();

    alice.set_typing(&chat, true).await.unwrap();
    sleep(Duration::from_millis(120)).await;
    alice.set_typing(&chat, true).await.unwrap();
    sleep(Duration::from_millis(120)).await;
    // past the first timer, within the second
    assert!(alice.is_typing(&chat, &a.uid).await.unwrap());

    sleep(Duration::from_millis(250)).await;
    assert!(!alice.is_typing(&chat, &a.uid).await.unwrap());
}

#[tokio::test]
async fn test_sending_clears_typing() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (alice, a) = signed_in_client(&backend, "Alice").await;
    let (bob, b) = signed_in_client(&backend, "Bob").await;
    let chat = alice.conversation_with(&b.uid).await.unwrap();

    let mut typing = bob.subscribe_to_typing(&chat, &a.uid);
    assert!(!next_matching(&mut typing, |_| true).await);

    alice.set_typing(&chat, true).await.unwrap();
    next_matching(&mut typing, |t| *t).await;

    alice.send_text(&chat, &b.uid, "done typing").await.unwrap();
    next_matching(&mut typing, |t| !*t).await;
    assert!(!bob.is_typing(&chat, &a.uid).await.unwrap());
}

#[tokio::test]
async fn test_connection_loss_removes_typing_flag() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (alice, a) = signed_in_client(&backend, "Alice").await;
    let (_bob, b) = signed_in_client(&backend, "Bob").await;
    let chat = alice.conversation_with(&b.uid).await.unwrap();

    alice.set_typing(&chat, true).await.unwrap();
    alice.drop_connection().await.unwrap();
    assert!(!alice.is_typing(&chat, &a.uid).await.unwrap());
}

#[tokio::test]
async fn test_typing_notifier_debounces_keystrokes() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (alice, a) = signed_in_client(&backend, "Alice").await;
    let (bob, b) = signed_in_client(&backend, "Bob").await;
    let chat = alice.conversation_with(&b.uid).await.unwrap();

    let mut notifier = alice.typing_notifier(&chat);
    notifier.keystroke("").await.unwrap();
    assert!(!notifier.is_typing());
    assert!(!bob.is_typing(&chat, &a.uid).await.unwrap());

    notifier.keystroke("h").await.unwrap();
    notifier.keystroke("he").await.unwrap();
    assert!(notifier.is_typing());
    assert!(bob.is_typing(&chat, &a.uid).await.unwrap());

    // typing_idle is 100ms in the test config
    sleep(Duration::from_millis(180)).await;
    assert!(!notifier.is_typing());
    assert!(!bob.is_typing(&chat, &a.uid).await.unwrap());

    notifier.keystroke("hello").await.unwrap();
    notifier.clear().await.unwrap();
    assert!(!notifier.is_typing());
    assert!(!bob.is_typing(&chat, &a.uid).await.unwrap());
}

#[tokio::test]
async fn test_typing_requires_a_session() {
    setup_logging();
    let backend = MemoryBackend::new();
    let client = common::client_on(&backend);
    assert_eq!(client.set_typing("a_b", true).await, Err(ChatError::NotSignedIn));
}
