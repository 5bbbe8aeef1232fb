use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const LOCATION_PREVIEW: &str = "📍 Location";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub status: String,
    pub push_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Partial profile update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub status: Option<String>,
    pub photo_url: Option<String>,
    pub push_token: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.status.is_none()
            && self.photo_url.is_none()
            && self.push_token.is_none()
    }

    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.display_name {
            user.display_name = name.clone();
        }
        if let Some(status) = &self.status {
            user.status = status.clone();
        }
        if let Some(photo) = &self.photo_url {
            user.photo_url = Some(photo.clone());
        }
        if let Some(token) = &self.push_token {
            user.push_token = Some(token.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: [String; 2],
    pub created_at: DateTime<Utc>,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: HashMap<String, u32>,
}

impl Conversation {
    /// Deterministic id for the unordered pair: sorted, then joined with `_`
    pub fn id_for(user_a: &str, user_b: &str) -> String {
        let mut pair = [user_a, user_b];
        pair.sort_unstable();
        pair.join("_")
    }

    pub fn has_participant(&self, uid: &str) -> bool {
        self.participants.iter().any(|p| p == uid)
    }

    /// The other participant, seen from `uid`
    pub fn counterpart(&self, uid: &str) -> Option<&str> {
        if !self.has_participant(uid) {
            return None;
        }
        self.participants
            .iter()
            .map(String::as_str)
            .find(|p| *p != uid)
            // self-conversation
            .or_else(|| self.participants.iter().map(String::as_str).find(|p| *p == uid))
    }

    pub fn unread_for(&self, uid: &str) -> u32 {
        self.unread_count.get(uid).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// What a sender hands to the channel
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(String),
    Location(Location),
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text(_) => MessageKind::Text,
            MessageBody::Location(_) => MessageKind::Location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub kind: MessageKind,
    pub location: Option<Location>,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
}

impl Message {
    /// Text shown in the conversation list for this message
    pub fn preview(&self) -> &str {
        match self.kind {
            MessageKind::Location => LOCATION_PREVIEW,
            MessageKind::Text => &self.body,
        }
    }
}

/// A message before the store has assigned its id, timestamp and status
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub kind: MessageKind,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent = 0,      // Written to the conversation
    Delivered = 1, // Observed by the receiving client
    Read = 2,      // Receiver opened the conversation
}

impl DeliveryStatus {
    /// Forward-only transition: the later of the two states wins
    pub fn advance(self, next: DeliveryStatus) -> DeliveryStatus {
        self.max(next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Offline,
}

/// Realtime presence record stored at `status/<uid>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub state: PresenceState,
    pub last_seen: i64, // milliseconds since epoch, server assigned
}

impl Presence {
    pub fn is_online(&self) -> bool {
        self.state == PresenceState::Online
    }

    pub fn last_seen_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.last_seen).single()
    }
}

/// Entry of the user directory
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub user: User,
    pub presence: Option<Presence>,
}

impl Contact {
    pub fn is_online(&self) -> bool {
        self.presence.as_ref().map(Presence::is_online).unwrap_or(false)
    }
}

/// Entry of the conversation directory
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub counterpart_id: String,
    pub counterpart: Option<User>,
    pub unread_count: u32,
}
