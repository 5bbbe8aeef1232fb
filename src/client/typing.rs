// Typing indicators
// typing/<conversation>/<uid> holds `true` while a participant is composing.
// The flag removes itself after the configured timeout, is removed by the
// server if our connection drops, and is cleared explicitly on send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use log::{debug, warn};
use serde_json::Value;
use tokio::task::JoinHandle;

use super::subscription::{spawn_snapshots, Subscription};
use super::ChatClient;
use crate::backend::RealtimeChange;
use crate::error::Result;

fn typing_path(conversation_id: &str, uid: &str) -> String {
    format!("typing/{}/{}", conversation_id, uid)
}

impl ChatClient {
    /// Publish or clear our typing flag in a conversation.
    /// Each `true` renews the flag; it expires `typing_timeout` after the last one.
    pub async fn set_typing(&self, conversation_id: &str, is_typing: bool) -> Result<()> {
        let user = self.require_user()?;
        let path = typing_path(conversation_id, &user.uid);
        let generation = self.bump_typing_generation(conversation_id);
        let realtime = &self.backend.realtime;

        if !is_typing {
            return realtime.remove(&path).await;
        }

        realtime.set(&path, Value::Bool(true)).await?;
        realtime.on_disconnect_remove(&self.connection_id(), &path).await?;

        let client = self.clone();
        let conversation_id = conversation_id.to_string();
        let timeout = self.config.typing_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            // a newer set_typing owns the flag now
            if client.typing_generation(&conversation_id) != generation {
                return;
            }
            debug!("Typing flag at {} expired", path);
            if let Err(e) = client.backend.realtime.remove(&path).await {
                warn!("Failed to expire typing flag at {}: {}", path, e);
            }
        });
        Ok(())
    }

    pub async fn is_typing(&self, conversation_id: &str, uid: &str) -> Result<bool> {
        let value = self.backend.realtime.get(&typing_path(conversation_id, uid)).await?;
        Ok(matches!(value, Some(Value::Bool(true))))
    }

    /// Live typing flag of `uid` in a conversation
    pub fn subscribe_to_typing(&self, conversation_id: &str, uid: &str) -> Subscription<bool> {
        let path = typing_path(conversation_id, uid);
        let watched = path.clone();
        let realtime = self.backend.realtime.clone();

        spawn_snapshots(
            realtime.changes(),
            self.config.subscription_buffer,
            move |change: &RealtimeChange| change.path == watched,
            move || {
                let realtime = realtime.clone();
                let path = path.clone();
                async move { Ok(matches!(realtime.get(&path).await?, Some(Value::Bool(true)))) }
            },
        )
    }

    /// Keystroke-driven typing flag for one conversation
    pub fn typing_notifier(&self, conversation_id: &str) -> TypingNotifier {
        TypingNotifier::new(self.clone(), conversation_id)
    }

    fn bump_typing_generation(&self, conversation_id: &str) -> u64 {
        let mut generations = self
            .typing_generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let generation = generations.entry(conversation_id.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn typing_generation(&self, conversation_id: &str) -> u64 {
        self.typing_generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .copied()
            .unwrap_or(0)
    }
}

/// Turns keystrokes into typing flags: the flag goes up with the first
/// non-empty keystroke and comes down after `typing_idle` without input.
pub struct TypingNotifier {
    client: ChatClient,
    conversation_id: String,
    typing: Arc<AtomicBool>,
    idle_timer: Option<JoinHandle<()>>,
}

impl TypingNotifier {
    pub fn new(client: ChatClient, conversation_id: &str) -> Self {
        TypingNotifier {
            client,
            conversation_id: conversation_id.to_string(),
            typing: Arc::new(AtomicBool::new(false)),
            idle_timer: None,
        }
    }

    /// Feed the current input text after each edit
    pub async fn keystroke(&mut self, text: &str) -> Result<()> {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }

        if text.trim().is_empty() {
            return self.clear().await;
        }

        // every keystroke renews the flag so long bursts outlive typing_timeout
        let was_typing = self.typing.swap(true, Ordering::SeqCst);
        if let Err(e) = self.client.set_typing(&self.conversation_id, true).await {
            self.typing.store(was_typing, Ordering::SeqCst);
            return Err(e);
        }

        let client = self.client.clone();
        let conversation_id = self.conversation_id.clone();
        let typing = self.typing.clone();
        let idle = self.client.config.typing_idle();
        self.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            typing.store(false, Ordering::SeqCst);
            if let Err(e) = client.set_typing(&conversation_id, false).await {
                warn!("Failed to clear idle typing flag: {}", e);
            }
        }));
        Ok(())
    }

    /// Drop the flag now, e.g. after sending or leaving the screen
    pub async fn clear(&mut self) -> Result<()> {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
        if self.typing.swap(false, Ordering::SeqCst) {
            self.client.set_typing(&self.conversation_id, false).await?;
        }
        Ok(())
    }

    pub fn is_typing(&self) -> bool {
        self.typing.load(Ordering::SeqCst)
    }
}

impl Drop for TypingNotifier {
    fn drop(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }
}
