use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::{broadcast, Mutex as TokioMutex};
use uuid::Uuid;

use super::CHANGE_FEED_CAPACITY;
use crate::backend::{LocalNotification, NotificationSink, PushMessaging, RemoteMessage};
use crate::error::{ChatError, Result};

/// Device-side push messaging: hands out a token and feeds delivered payloads
pub struct MemoryPush {
    token: TokioMutex<Option<String>>,
    failures_remaining: AtomicUsize,
    incoming: broadcast::Sender<RemoteMessage>,
}

impl MemoryPush {
    pub fn new() -> Self {
        let (incoming, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        MemoryPush {
            token: TokioMutex::new(None),
            failures_remaining: AtomicUsize::new(0),
            incoming,
        }
    }

    /// Make the next `count` token requests fail
    pub fn fail_next_token_requests(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Deliver a payload to this device; returns how many handlers saw it
    pub fn deliver(&self, message: RemoteMessage) -> usize {
        self.incoming.send(message).unwrap_or(0)
    }
}

impl Default for MemoryPush {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushMessaging for MemoryPush {
    async fn get_token(&self) -> Result<String> {
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            debug!("Token request failed on purpose");
            return Err(ChatError::Unavailable("messaging/unknown: token service unreachable".to_string()));
        }

        let mut token = self.token.lock().await;
        let value = token.get_or_insert_with(|| Uuid::new_v4().simple().to_string());
        Ok(value.clone())
    }

    async fn delete_token(&self) -> Result<()> {
        if self.token.lock().await.take().is_some() {
            info!("Device token deleted");
        }
        Ok(())
    }

    fn incoming(&self) -> broadcast::Receiver<RemoteMessage> {
        self.incoming.subscribe()
    }
}

/// Notification tray that just remembers what it was asked to show
#[derive(Default)]
pub struct MemoryNotifier {
    shown: Mutex<Vec<LocalNotification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn displayed(&self) -> Vec<LocalNotification> {
        self.shown.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl NotificationSink for MemoryNotifier {
    fn display(&self, notification: &LocalNotification) -> Result<()> {
        debug!("Displaying notification '{}'", notification.title);
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }

    fn cancel_all(&self) -> Result<()> {
        self.shown.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }
}
