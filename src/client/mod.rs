// Chat client for the managed backend
// This file holds the session context itself; each feature area extends
// ChatClient from its own module.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use tokio::sync::watch;

use crate::backend::Backend;
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::models::User;

pub mod conversation;
pub mod directory;
pub mod notifications;
pub mod presence;
pub mod session;
pub mod subscription;
pub mod typing;

pub use conversation::ConversationFeed;
pub use notifications::NotificationRelay;
pub use session::SignUpForm;
pub use subscription::Subscription;
pub use typing::TypingNotifier;

/// Explicit session/context object. Lives from process start to sign-out;
/// clones share the same session, connection and typing state.
#[derive(Clone)]
pub struct ChatClient {
    backend: Backend,
    config: ChatConfig,
    session: Arc<watch::Sender<Option<User>>>,
    // realtime connection our on-disconnect writes are attached to
    connection: Arc<Mutex<String>>,
    // conversation id -> generation of our latest typing write
    typing_generations: Arc<Mutex<HashMap<String, u64>>>,
}

impl ChatClient {
    pub fn new(backend: Backend, config: ChatConfig) -> Self {
        let connection = backend.realtime.connect();
        let (session, _) = watch::channel(None);
        info!("Chat client created on realtime connection {}", connection);

        ChatClient {
            backend,
            config,
            session: Arc::new(session),
            connection: Arc::new(Mutex::new(connection)),
            typing_generations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// The signed-in user's profile, if any
    pub fn current_user(&self) -> Option<User> {
        self.session.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.borrow().is_some()
    }

    /// Observe sign-in, sign-out and profile changes
    pub fn watch_session(&self) -> watch::Receiver<Option<User>> {
        self.session.subscribe()
    }

    pub(crate) fn require_user(&self) -> Result<User> {
        self.current_user().ok_or(ChatError::NotSignedIn)
    }

    pub(crate) fn set_session(&self, user: Option<User>) {
        match &user {
            Some(u) => debug!("Session now belongs to {}", u.uid),
            None => debug!("Session cleared"),
        }
        self.session.send_replace(user);
    }

    pub(crate) fn connection_id(&self) -> String {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a fresh realtime connection, returning the old one
    pub(crate) fn replace_connection(&self) -> String {
        let fresh = self.backend.realtime.connect();
        let mut current = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, fresh)
    }
}
