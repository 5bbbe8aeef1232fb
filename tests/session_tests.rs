// Session tests: sign-up, sign-in, sign-out and profile edits

mod common;
use common::{client_on, email_for, setup_logging, signed_in_client, PASSWORD};

use chatapp::backend::MemoryBackend;
use chatapp::client::SignUpForm;
use chatapp::{ChatClient, ChatError, ProfileUpdate, PresenceState};

#[tokio::test]
async fn test_register_creates_profile_and_session() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (client, user) = signed_in_client(&backend, "Alice").await;

    assert_eq!(client.current_user(), Some(user.clone()));
    assert_eq!(user.email, "alice@example.com");
    assert_eq!(user.status, client.config().default_status);
    assert!(backend.identity.is_signed_in(&user.uid).await);

    let stored = client.user(&user.uid).await.unwrap();
    assert_eq!(stored, Some(user.clone()));

    let presence = client.presence_of(&user.uid).await.unwrap().expect("presence published");
    assert_eq!(presence.state, PresenceState::Online);
    assert!(presence.last_seen > 0);
}

#[tokio::test]
async fn test_register_rejections() {
    setup_logging();
    let backend = MemoryBackend::new();
    signed_in_client(&backend, "Bob").await;
    let client = client_on(&backend);

    let duplicate = client.register(&email_for("Bob"), PASSWORD, "Bob Again", None).await;
    assert_eq!(duplicate, Err(ChatError::DuplicateEmail));
    assert_eq!(ChatError::DuplicateEmail.code(), "auth/email-already-in-use");

    let weak = client.register("carol@example.com", "123", "Carol", None).await;
    assert_eq!(weak, Err(ChatError::WeakCredential));

    let malformed = client.register("carol.example.com", PASSWORD, "Carol", None).await;
    assert_eq!(malformed, Err(ChatError::InvalidEmail));

    let nameless = client.register("carol@example.com", PASSWORD, "   ", None).await;
    assert!(matches!(nameless, Err(ChatError::Validation(_))));

    assert!(!client.is_signed_in());
}

#[tokio::test]
async fn test_register_with_form_checks_confirmation() {
    setup_logging();
    let client = client_on(&MemoryBackend::new());
    let form = SignUpForm {
        email: "dora@example.com".to_string(),
        password: "secret1".to_string(),
        confirm_password: "secret2".to_string(),
        display_name: "Dora".to_string(),
        photo_url: None,
    };
    assert_eq!(
        client.register_with_form(&form).await,
        Err(ChatError::Validation("Passwords do not match".to_string()))
    );

    let form = SignUpForm {
        confirm_password: "secret1".to_string(),
        ..form
    };
    let user = client.register_with_form(&form).await.unwrap();
    assert_eq!(user.display_name, "Dora");
}

#[tokio::test]
async fn test_authenticate() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (first, user) = signed_in_client(&backend, "Erin").await;
    first.deauthenticate().await.unwrap();

    let client = client_on(&backend);
    assert_eq!(
        client.authenticate(&email_for("Erin"), "wrong-password").await,
        Err(ChatError::InvalidCredential)
    );
    assert_eq!(
        client.authenticate("nobody@example.com", PASSWORD).await,
        Err(ChatError::InvalidCredential)
    );
    assert!(!client.is_signed_in());

    let signed_in = client.authenticate(&email_for("Erin"), PASSWORD).await.unwrap();
    assert_eq!(signed_in.uid, user.uid);
    assert_eq!(client.current_user().map(|u| u.uid), Some(user.uid.clone()));

    let presence = client.presence_of(&user.uid).await.unwrap().unwrap();
    assert!(presence.is_online());
}

#[tokio::test]
async fn test_deauthenticate_goes_offline_then_clears_session() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (client, user) = signed_in_client(&backend, "Finn").await;
    let mut session = client.watch_session();

    client.deauthenticate().await.unwrap();

    assert!(!client.is_signed_in());
    assert!(session.has_changed().unwrap());
    assert_eq!(*session.borrow_and_update(), None);
    assert!(!backend.identity.is_signed_in(&user.uid).await);

    let presence = client.presence_of(&user.uid).await.unwrap().unwrap();
    assert_eq!(presence.state, PresenceState::Offline);

    // nothing to do the second time round
    assert_eq!(client.deauthenticate().await, Ok(()));
}

#[tokio::test]
async fn test_edit_profile() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (client, user) = signed_in_client(&backend, "Gina").await;

    let empty_name = ProfileUpdate {
        display_name: Some("  ".to_string()),
        ..ProfileUpdate::default()
    };
    assert!(matches!(client.edit_profile(empty_name).await, Err(ChatError::Validation(_))));

    let unchanged = client.edit_profile(ProfileUpdate::default()).await.unwrap();
    assert_eq!(unchanged, user);

    let update = ProfileUpdate {
        display_name: Some(" Gina G ".to_string()),
        status: Some("Busy".to_string()),
        ..ProfileUpdate::default()
    };
    let updated = client.edit_profile(update).await.unwrap();
    assert_eq!(updated.display_name, "Gina G");
    assert_eq!(updated.status, "Busy");
    assert_eq!(updated.email, user.email);
    assert_eq!(client.current_user(), Some(updated.clone()));
    assert_eq!(client.user(&user.uid).await.unwrap(), Some(updated));
}

#[tokio::test]
async fn test_profile_edits_need_a_session() {
    setup_logging();
    let client = client_on(&MemoryBackend::new());
    let update = ProfileUpdate {
        status: Some("hello".to_string()),
        ..ProfileUpdate::default()
    };
    assert_eq!(client.edit_profile(update).await, Err(ChatError::NotSignedIn));
}

#[tokio::test]
async fn test_upload_profile_image() {
    setup_logging();
    let backend = MemoryBackend::new();
    let (client, user) = signed_in_client(&backend, "Hana").await;

    let path = ChatClient::profile_image_path(&user.uid);
    let url = client.upload_image(&path, vec![0xFF, 0xD8, 0xFF]).await.unwrap();
    assert!(url.starts_with("memory://"));
    assert_eq!(backend.blobs.read(&path).await, Some(vec![0xFF, 0xD8, 0xFF]));

    let update = ProfileUpdate {
        photo_url: Some(url.clone()),
        ..ProfileUpdate::default()
    };
    let updated = client.edit_profile(update).await.unwrap();
    assert_eq!(updated.photo_url, Some(url));
}
