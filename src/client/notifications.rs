// Push notifications
// The relay owns the device token and turns incoming push payloads into
// local notifications. Delivery itself is the push service's business.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::ChatClient;
use crate::backend::{Backend, DocumentStore, LocalNotification, NotificationSink, PushMessaging, RemoteMessage};
use crate::config::ChatConfig;
use crate::error::Result;
use crate::models::{ProfileUpdate, User};

pub const DEFAULT_TITLE: &str = "New Message";
pub const DEFAULT_BODY: &str = "You have a new message";

#[derive(Clone)]
pub struct NotificationRelay {
    push: Arc<dyn PushMessaging>,
    sink: Arc<dyn NotificationSink>,
    documents: Arc<dyn DocumentStore>,
    channel_id: String,
}

impl NotificationRelay {
    pub fn new(backend: &Backend, config: &ChatConfig) -> Self {
        NotificationRelay {
            push: backend.push.clone(),
            sink: backend.notifications.clone(),
            documents: backend.documents.clone(),
            channel_id: config.notification_channel.clone(),
        }
    }

    /// Acquire the device token. A failed request gets exactly one retry
    /// after the stale token is deleted; a second failure yields `None`.
    pub async fn initialize(&self) -> Option<String> {
        match self.push.get_token().await {
            Ok(token) => return Some(token),
            Err(e) => warn!("Failed to get push token, refreshing: {}", e),
        }

        if let Err(e) = self.push.delete_token().await {
            warn!("Failed to delete stale push token: {}", e);
        }
        match self.push.get_token().await {
            Ok(token) => {
                info!("Push token acquired after refresh");
                Some(token)
            }
            Err(e) => {
                error!("Push token unavailable: {}", e);
                None
            }
        }
    }

    /// Persist `token` on the user's profile so senders can address this device
    pub async fn register_token(&self, uid: &str, token: &str) -> Result<User> {
        let update = ProfileUpdate {
            push_token: Some(token.to_string()),
            ..ProfileUpdate::default()
        };
        let user = self.documents.update_user(uid, &update).await?;
        debug!("Registered push token for {}", uid);
        Ok(user)
    }

    pub fn render(&self, message: &RemoteMessage) -> LocalNotification {
        let notification = message.notification.clone().unwrap_or_default();
        LocalNotification {
            title: notification.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: notification.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            channel_id: self.channel_id.clone(),
            data: message.data.clone(),
        }
    }

    pub fn display(&self, message: &RemoteMessage) -> Result<LocalNotification> {
        let notification = self.render(message);
        self.sink.display(&notification)?;
        Ok(notification)
    }

    /// Spawn the handler loop; abort the handle to stop relaying
    pub fn start(&self) -> JoinHandle<()> {
        let mut incoming = self.push.incoming();
        let relay = self.clone();

        tokio::spawn(async move {
            loop {
                match incoming.recv().await {
                    Ok(message) => {
                        debug!("Push payload from {:?}", message.from);
                        if let Err(e) = relay.display(&message) {
                            warn!("Failed to display notification: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => warn!("Dropped {} push payloads", skipped),
                    Err(RecvError::Closed) => {
                        debug!("Push feed closed");
                        return;
                    }
                }
            }
        })
    }

    pub fn cancel_all(&self) -> Result<()> {
        self.sink.cancel_all()
    }
}

impl ChatClient {
    pub fn notification_relay(&self) -> NotificationRelay {
        NotificationRelay::new(&self.backend, &self.config)
    }

    /// Save a device token on the signed-in user's profile
    pub async fn register_push_token(&self, token: &str) -> Result<User> {
        let me = self.require_user()?;
        let user = self.notification_relay().register_token(&me.uid, token).await?;
        self.set_session(Some(user.clone()));
        Ok(user)
    }

    /// Initialize the relay and, when a token comes back, store it on our profile
    pub async fn enable_notifications(&self) -> Result<Option<String>> {
        let relay = self.notification_relay();
        let token = match relay.initialize().await {
            Some(token) => token,
            None => return Ok(None),
        };
        self.register_push_token(&token).await?;
        Ok(Some(token))
    }
}
