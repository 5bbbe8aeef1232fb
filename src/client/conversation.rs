// Conversation channel
// Two-party conversations keyed by the sorted participant pair, an
// append-only message log per conversation, and the delivery-state
// transitions the receiving side drives (sent -> delivered -> read).

use log::{debug, info, warn};

use super::subscription::{spawn_snapshots, Subscription};
use super::ChatClient;
use crate::backend::DocumentChange;
use crate::error::{ChatError, Result};
use crate::models::{
    Conversation, DeliveryStatus, Location, Message, MessageBody, MessageDraft, Presence,
    LOCATION_PREVIEW,
};

/// Everything a chat screen listens to while a conversation is open
pub struct ConversationFeed {
    pub conversation: Conversation,
    pub counterpart_id: String,
    pub messages: Subscription<Vec<Message>>,
    pub typing: Subscription<bool>,
    pub presence: Subscription<Option<Presence>>,
}

fn validate_location(location: &Location) -> Result<()> {
    let valid = location.latitude.is_finite()
        && location.longitude.is_finite()
        && (-90.0..=90.0).contains(&location.latitude)
        && (-180.0..=180.0).contains(&location.longitude);
    if !valid {
        return Err(ChatError::validation("Location is out of range"));
    }
    Ok(())
}

fn draft_for(sender_id: &str, receiver_id: &str, body: MessageBody) -> Result<MessageDraft> {
    let kind = body.kind();
    let (body, location) = match body {
        MessageBody::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(ChatError::validation("Message cannot be empty"));
            }
            (text.to_string(), None)
        }
        MessageBody::Location(location) => {
            validate_location(&location)?;
            (LOCATION_PREVIEW.to_string(), Some(location))
        }
    };

    Ok(MessageDraft {
        sender_id: sender_id.to_string(),
        receiver_id: receiver_id.to_string(),
        body,
        kind,
        location,
    })
}

impl ChatClient {
    /// Deterministic conversation id for the pair; creates the record on first contact
    pub async fn get_or_create_conversation(&self, user_a: &str, user_b: &str) -> Result<String> {
        let id = Conversation::id_for(user_a, user_b);
        let documents = &self.backend.documents;

        if documents.get_conversation(&id).await?.is_none() {
            documents
                .create_conversation(&id, [user_a.to_string(), user_b.to_string()])
                .await?;
            info!("Created conversation {}", id);
        }
        Ok(id)
    }

    /// Conversation between the signed-in user and `other_uid`
    pub async fn conversation_with(&self, other_uid: &str) -> Result<String> {
        let user = self.require_user()?;
        self.get_or_create_conversation(&user.uid, other_uid).await
    }

    pub async fn conversation(&self, conversation_id: &str) -> Result<Conversation> {
        self.backend
            .documents
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("conversation {}", conversation_id)))
    }

    /// Append a message from the signed-in user and update the conversation summary.
    /// Failures are returned as-is; nothing is queued for retry.
    pub async fn send(&self, conversation_id: &str, receiver_id: &str, body: MessageBody) -> Result<Message> {
        let user = self.require_user()?;
        let draft = draft_for(&user.uid, receiver_id, body)?;

        let conversation = self.conversation(conversation_id).await?;
        if conversation.counterpart(&user.uid) != Some(receiver_id) {
            return Err(ChatError::validation(format!(
                "{} is not the other participant of {} for {}",
                receiver_id, conversation_id, user.uid
            )));
        }

        // Sending ends composing
        if let Err(e) = self.set_typing(conversation_id, false).await {
            warn!("Failed to clear typing flag before send: {}", e);
        }

        let documents = &self.backend.documents;
        let message = documents.append_message(conversation_id, draft).await?;
        documents
            .record_send(conversation_id, message.preview(), receiver_id)
            .await?;

        info!("Sent {:?} message {} in {}", message.kind, message.id, conversation_id);
        Ok(message)
    }

    pub async fn send_text(&self, conversation_id: &str, receiver_id: &str, text: &str) -> Result<Message> {
        self.send(conversation_id, receiver_id, MessageBody::Text(text.to_string()))
            .await
    }

    pub async fn send_location(
        &self,
        conversation_id: &str,
        receiver_id: &str,
        location: Location,
    ) -> Result<Message> {
        self.send(conversation_id, receiver_id, MessageBody::Location(location))
            .await
    }

    /// Messages in server timestamp order
    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.backend.documents.messages(conversation_id).await
    }

    /// Forward-only status change; returns the status now stored, which may be
    /// later than `status` if another update got there first
    pub async fn update_message_status(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: DeliveryStatus,
    ) -> Result<DeliveryStatus> {
        self.backend
            .documents
            .advance_status(conversation_id, message_id, status)
            .await
    }

    /// Mark messages addressed to us that are still `Sent` as delivered
    pub async fn acknowledge_delivery(&self, conversation_id: &str, messages: &[Message]) -> Result<usize> {
        let user = self.require_user()?;
        acknowledge(self, conversation_id, &user.uid, messages).await
    }

    /// Read-receipt flush: everything addressed to us becomes read and our
    /// unread count goes back to zero
    pub async fn mark_read(&self, conversation_id: &str) -> Result<usize> {
        let user = self.require_user()?;
        let flipped = self
            .backend
            .documents
            .commit_read_receipts(conversation_id, &user.uid)
            .await?;
        debug!("Marked {} messages read in {}", flipped, conversation_id);
        Ok(flipped)
    }

    /// Live, ordered message log of a conversation
    pub fn subscribe_to_messages(&self, conversation_id: &str) -> Subscription<Vec<Message>> {
        self.message_feed(conversation_id, None)
    }

    /// Open a conversation the way a chat screen does: flush read receipts,
    /// then follow messages (acknowledging delivery as they arrive), the
    /// counterpart's typing flag and the counterpart's presence
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<ConversationFeed> {
        let user = self.require_user()?;
        let conversation = self.conversation(conversation_id).await?;
        let counterpart_id = conversation
            .counterpart(&user.uid)
            .ok_or_else(|| ChatError::PermissionDenied(format!("not a participant of {}", conversation_id)))?
            .to_string();

        let messages = self.message_feed(conversation_id, Some(user.uid.clone()));
        let typing = self.subscribe_to_typing(conversation_id, &counterpart_id);
        let presence = self.subscribe_to_presence(&counterpart_id);

        self.mark_read(conversation_id).await?;

        Ok(ConversationFeed {
            conversation,
            counterpart_id,
            messages,
            typing,
            presence,
        })
    }

    fn message_feed(&self, conversation_id: &str, acknowledge_as: Option<String>) -> Subscription<Vec<Message>> {
        let watched = conversation_id.to_string();
        let conversation_id = conversation_id.to_string();
        let client = self.clone();

        spawn_snapshots(
            self.backend.documents.changes(),
            self.config.subscription_buffer,
            move |change: &DocumentChange| {
                matches!(change, DocumentChange::Message { conversation_id: id, .. } if *id == watched)
            },
            move || {
                let client = client.clone();
                let conversation_id = conversation_id.clone();
                let acknowledge_as = acknowledge_as.clone();
                async move {
                    let messages = client.messages(&conversation_id).await?;
                    if let Some(uid) = acknowledge_as {
                        // the status writes come back through the feed as a fresh snapshot
                        if let Err(e) = acknowledge(&client, &conversation_id, &uid, &messages).await {
                            warn!("Failed to acknowledge delivery in {}: {}", conversation_id, e);
                        }
                    }
                    Ok(messages)
                }
            },
        )
    }
}

async fn acknowledge(client: &ChatClient, conversation_id: &str, uid: &str, messages: &[Message]) -> Result<usize> {
    let mut acknowledged = 0;
    for message in messages
        .iter()
        .filter(|m| m.receiver_id == uid && m.status == DeliveryStatus::Sent)
    {
        client
            .update_message_status(conversation_id, &message.id, DeliveryStatus::Delivered)
            .await?;
        acknowledged += 1;
    }
    Ok(acknowledged)
}
