use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::{broadcast, Mutex as TokioMutex};

use super::{push_id, ServerClock, CHANGE_FEED_CAPACITY};
use crate::backend::{DocumentChange, DocumentStore};
use crate::error::{ChatError, Result};
use crate::models::{Conversation, DeliveryStatus, Message, MessageDraft, ProfileUpdate, User};

struct ConversationRecord {
    conversation: Conversation,
    // kept in server timestamp order
    messages: Vec<Message>,
}

#[derive(Default)]
struct Collections {
    users: HashMap<String, User>,
    conversations: HashMap<String, ConversationRecord>,
}

pub struct MemoryDocuments {
    data: TokioMutex<Collections>,
    clock: Arc<ServerClock>,
    changes: broadcast::Sender<DocumentChange>,
    reject_writes: AtomicBool,
}

/// Most recent message first; conversations without messages go last
fn by_last_message_desc(a: &Conversation, b: &Conversation) -> CmpOrdering {
    match (&a.last_message_time, &b.last_message_time) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => b.created_at.cmp(&a.created_at),
    }
}

impl MemoryDocuments {
    pub fn new(clock: Arc<ServerClock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        MemoryDocuments {
            data: TokioMutex::new(Collections::default()),
            clock,
            changes,
            reject_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail, as a backend outage or rules rejection would
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            warn!("Document write rejected");
            return Err(ChatError::Write("the backend rejected the write".to_string()));
        }
        Ok(())
    }

    fn notify(&self, change: DocumentChange) {
        if self.changes.send(change).is_err() {
            debug!("No document listeners");
        }
    }

    fn conversation_missing(id: &str) -> ChatError {
        ChatError::NotFound(format!("conversation {}", id))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    async fn put_user(&self, user: &User) -> Result<()> {
        self.check_writable()?;
        self.data.lock().await.users.insert(user.uid.clone(), user.clone());
        self.notify(DocumentChange::User { uid: user.uid.clone() });
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> Result<Option<User>> {
        Ok(self.data.lock().await.users.get(uid).cloned())
    }

    async fn update_user(&self, uid: &str, update: &ProfileUpdate) -> Result<User> {
        self.check_writable()?;
        let updated = {
            let mut data = self.data.lock().await;
            let user = data
                .users
                .get_mut(uid)
                .ok_or_else(|| ChatError::NotFound(format!("user {}", uid)))?;
            update.apply_to(user);
            user.clone()
        };
        self.notify(DocumentChange::User { uid: uid.to_string() });
        Ok(updated)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.data.lock().await.users.values().cloned().collect();
        users.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
                .then_with(|| a.uid.cmp(&b.uid))
        });
        Ok(users)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self
            .data
            .lock()
            .await
            .conversations
            .get(id)
            .map(|record| record.conversation.clone()))
    }

    async fn create_conversation(&self, id: &str, participants: [String; 2]) -> Result<Conversation> {
        let mut data = self.data.lock().await;
        if let Some(existing) = data.conversations.get(id) {
            return Ok(existing.conversation.clone());
        }
        self.check_writable()?;

        let conversation = Conversation {
            id: id.to_string(),
            participants: participants.clone(),
            created_at: self.clock.now(),
            last_message: None,
            last_message_time: None,
            unread_count: HashMap::new(),
        };
        data.conversations.insert(
            id.to_string(),
            ConversationRecord {
                conversation: conversation.clone(),
                messages: Vec::new(),
            },
        );
        drop(data);

        self.notify(DocumentChange::Conversation {
            id: id.to_string(),
            participants,
        });
        Ok(conversation)
    }

    async fn conversations_for(&self, uid: &str) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = self
            .data
            .lock()
            .await
            .conversations
            .values()
            .filter(|record| record.conversation.has_participant(uid))
            .map(|record| record.conversation.clone())
            .collect();
        conversations.sort_by(by_last_message_desc);
        Ok(conversations)
    }

    async fn append_message(&self, conversation_id: &str, draft: MessageDraft) -> Result<Message> {
        self.check_writable()?;
        let message = {
            let mut data = self.data.lock().await;
            let record = data
                .conversations
                .get_mut(conversation_id)
                .ok_or_else(|| Self::conversation_missing(conversation_id))?;

            // Stamped under the lock so timestamp order matches append order
            let message = Message {
                id: push_id(),
                sender_id: draft.sender_id,
                receiver_id: draft.receiver_id,
                body: draft.body,
                kind: draft.kind,
                location: draft.location,
                timestamp: self.clock.now(),
                status: DeliveryStatus::Sent,
            };
            record.messages.push(message.clone());
            message
        };

        self.notify(DocumentChange::Message {
            conversation_id: conversation_id.to_string(),
            message_id: message.id.clone(),
        });
        Ok(message)
    }

    async fn record_send(&self, conversation_id: &str, preview: &str, receiver_id: &str) -> Result<Conversation> {
        self.check_writable()?;
        let conversation = {
            let mut data = self.data.lock().await;
            let record = data
                .conversations
                .get_mut(conversation_id)
                .ok_or_else(|| Self::conversation_missing(conversation_id))?;

            let conversation = &mut record.conversation;
            conversation.last_message = Some(preview.to_string());
            conversation.last_message_time = Some(self.clock.now());
            *conversation
                .unread_count
                .entry(receiver_id.to_string())
                .or_insert(0) += 1;
            conversation.clone()
        };

        self.notify(DocumentChange::Conversation {
            id: conversation.id.clone(),
            participants: conversation.participants.clone(),
        });
        Ok(conversation)
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let data = self.data.lock().await;
        let record = data
            .conversations
            .get(conversation_id)
            .ok_or_else(|| Self::conversation_missing(conversation_id))?;
        Ok(record.messages.clone())
    }

    async fn advance_status(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: DeliveryStatus,
    ) -> Result<DeliveryStatus> {
        self.check_writable()?;
        let (stored, changed) = {
            let mut data = self.data.lock().await;
            let record = data
                .conversations
                .get_mut(conversation_id)
                .ok_or_else(|| Self::conversation_missing(conversation_id))?;
            let message = record
                .messages
                .iter_mut()
                .find(|m| m.id == message_id)
                .ok_or_else(|| ChatError::NotFound(format!("message {}", message_id)))?;

            let next = message.status.advance(status);
            let changed = next != message.status;
            message.status = next;
            (next, changed)
        };

        if changed {
            self.notify(DocumentChange::Message {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
            });
        }
        Ok(stored)
    }

    async fn commit_read_receipts(&self, conversation_id: &str, reader_id: &str) -> Result<usize> {
        self.check_writable()?;
        let (flipped, conversation) = {
            let mut data = self.data.lock().await;
            let record = data
                .conversations
                .get_mut(conversation_id)
                .ok_or_else(|| Self::conversation_missing(conversation_id))?;
            if !record.conversation.has_participant(reader_id) {
                return Err(ChatError::PermissionDenied(format!(
                    "{} is not a participant of {}",
                    reader_id, conversation_id
                )));
            }

            let mut flipped = Vec::new();
            for message in record
                .messages
                .iter_mut()
                .filter(|m| m.receiver_id == reader_id && m.status < DeliveryStatus::Read)
            {
                message.status = DeliveryStatus::Read;
                flipped.push(message.id.clone());
            }
            record
                .conversation
                .unread_count
                .insert(reader_id.to_string(), 0);
            (flipped, record.conversation.clone())
        };

        for message_id in &flipped {
            self.notify(DocumentChange::Message {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.clone(),
            });
        }
        self.notify(DocumentChange::Conversation {
            id: conversation.id,
            participants: conversation.participants,
        });
        Ok(flipped.len())
    }

    fn changes(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }
}
