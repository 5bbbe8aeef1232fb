// Managed backend contract
// The client never talks to a concrete service directly; it goes through
// these traits so the same chat logic runs against the hosted services or
// the in-process implementation in `memory`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::{Conversation, DeliveryStatus, Message, MessageDraft, ProfileUpdate, User};

pub mod memory;

pub use memory::MemoryBackend;

/// Shortest password the identity service accepts
pub const MIN_PASSWORD_LEN: usize = 6;

/// Identity record as the identity service sees it
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_user(&self, email: &str, password: &str) -> Result<AuthUser>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser>;
    async fn sign_out(&self, uid: &str) -> Result<()>;
    async fn update_profile(
        &self,
        uid: &str,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<AuthUser>;
}

/// Emitted by a document store after every committed write
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentChange {
    User { uid: String },
    Conversation { id: String, participants: [String; 2] },
    Message { conversation_id: String, message_id: String },
}

/// Document database holding profiles, conversations and their messages
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, uid: &str) -> Result<Option<User>>;
    async fn update_user(&self, uid: &str, update: &ProfileUpdate) -> Result<User>;
    async fn list_users(&self) -> Result<Vec<User>>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;
    /// Create the conversation unless it exists; always returns the stored record
    async fn create_conversation(&self, id: &str, participants: [String; 2]) -> Result<Conversation>;
    /// Conversations containing `uid`, most recent message first
    async fn conversations_for(&self, uid: &str) -> Result<Vec<Conversation>>;

    /// Append with a server-assigned id, timestamp and `Sent` status
    async fn append_message(&self, conversation_id: &str, draft: MessageDraft) -> Result<Message>;
    /// Set the preview and last-message time, and bump the receiver's unread count
    async fn record_send(&self, conversation_id: &str, preview: &str, receiver_id: &str) -> Result<Conversation>;
    /// Messages in server timestamp order
    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>>;
    /// Move a message's status forward; returns the status actually stored
    async fn advance_status(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: DeliveryStatus,
    ) -> Result<DeliveryStatus>;
    /// Batch: mark every unread message addressed to `reader_id` as read and
    /// zero the reader's unread count. Returns how many messages flipped.
    async fn commit_read_receipts(&self, conversation_id: &str, reader_id: &str) -> Result<usize>;

    fn changes(&self) -> broadcast::Receiver<DocumentChange>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeChange {
    pub path: String,
    pub value: Option<Value>,
}

/// Realtime key-value tree with connection-scoped on-disconnect writes
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Open a connection handle that on-disconnect writes hang off
    fn connect(&self) -> String;
    /// Drop a connection as if the network went away, firing its on-disconnect writes
    async fn disconnect(&self, connection: &str) -> Result<()>;

    async fn set(&self, path: &str, value: Value) -> Result<()>;
    async fn remove(&self, path: &str) -> Result<()>;
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    async fn on_disconnect_set(&self, connection: &str, path: &str, value: Value) -> Result<()>;
    async fn on_disconnect_remove(&self, connection: &str, path: &str) -> Result<()>;

    fn changes(&self) -> broadcast::Receiver<RealtimeChange>;
}

/// Placeholder the realtime store replaces with its own clock (milliseconds)
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()>;
    async fn download_url(&self, path: &str) -> Result<String>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteNotification {
    pub title: Option<String>,
    pub body: Option<String>,
}

/// Payload delivered by the push-messaging service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteMessage {
    pub from: Option<String>,
    pub notification: Option<RemoteNotification>,
    pub data: HashMap<String, String>,
}

#[async_trait]
pub trait PushMessaging: Send + Sync {
    async fn get_token(&self) -> Result<String>;
    async fn delete_token(&self) -> Result<()>;
    fn incoming(&self) -> broadcast::Receiver<RemoteMessage>;
}

/// Notification as rendered on the device
#[derive(Debug, Clone, PartialEq)]
pub struct LocalNotification {
    pub title: String,
    pub body: String,
    pub channel_id: String,
    pub data: HashMap<String, String>,
}

pub trait NotificationSink: Send + Sync {
    fn display(&self, notification: &LocalNotification) -> Result<()>;
    fn cancel_all(&self) -> Result<()>;
}

/// Every service the client needs, bundled so it can be cloned into tasks
#[derive(Clone)]
pub struct Backend {
    pub identity: Arc<dyn IdentityProvider>,
    pub documents: Arc<dyn DocumentStore>,
    pub realtime: Arc<dyn RealtimeStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub push: Arc<dyn PushMessaging>,
    pub notifications: Arc<dyn NotificationSink>,
}

impl Backend {
    /// Fresh in-process backend with nothing shared
    pub fn in_memory() -> Self {
        MemoryBackend::new().backend()
    }

    /// Same services, different device-local push and notification surfaces
    pub fn with_device(
        &self,
        push: Arc<dyn PushMessaging>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Backend {
            push,
            notifications,
            ..self.clone()
        }
    }
}
