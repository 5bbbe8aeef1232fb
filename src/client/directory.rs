// Directories: the people you can talk to and the conversations you have

use futures::future::join_all;
use log::{debug, warn};
use tokio::sync::mpsc;

use super::subscription::{spawn_snapshots, wait_for, Subscription, Wake};
use super::ChatClient;
use crate::backend::{DocumentChange, RealtimeChange};
use crate::error::Result;
use crate::models::{Contact, ConversationSummary, User};

/// Case-insensitive match on display name; a blank query keeps everyone
pub fn filter_users(users: Vec<User>, query: &str) -> Vec<User> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return users;
    }
    users
        .into_iter()
        .filter(|u| u.display_name.to_lowercase().contains(&query))
        .collect()
}

impl ChatClient {
    /// Every registered user except ourselves, in the store's name order
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let me = self.require_user()?;
        let mut users = self.backend.documents.list_users().await?;
        users.retain(|u| u.uid != me.uid);
        Ok(users)
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        Ok(filter_users(self.list_users().await?, query))
    }

    pub async fn user(&self, uid: &str) -> Result<Option<User>> {
        self.backend.documents.get_user(uid).await
    }

    /// Our conversations, most recent first, each with the counterpart's profile
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
        let me = self.require_user()?;
        load_summaries(self, &me.uid).await
    }

    /// Live conversation list for the signed-in user
    pub fn subscribe_to_conversations(&self) -> Result<Subscription<Vec<ConversationSummary>>> {
        let me = self.require_user()?;
        let uid = me.uid.clone();
        let client = self.clone();

        Ok(spawn_snapshots(
            self.backend.documents.changes(),
            self.config.subscription_buffer,
            move |change: &DocumentChange| match change {
                DocumentChange::Conversation { participants, .. } => participants.contains(&me.uid),
                // counterpart renamed or changed photo
                DocumentChange::User { .. } => true,
                DocumentChange::Message { .. } => false,
            },
            move || {
                let client = client.clone();
                let uid = uid.clone();
                async move { load_summaries(&client, &uid).await }
            },
        ))
    }

    /// Live user directory with each contact's presence
    pub fn subscribe_to_user_directory(&self) -> Result<Subscription<Vec<Contact>>> {
        self.require_user()?;
        let mut documents = self.backend.documents.changes();
        let mut realtime = self.backend.realtime.changes();
        let (tx, rx) = mpsc::channel(self.config.subscription_buffer.max(1));
        let client = self.clone();

        let task = tokio::spawn(async move {
            let user_changed = |change: &DocumentChange| matches!(change, DocumentChange::User { .. });
            let presence_changed = |change: &RealtimeChange| change.path.starts_with("status/");

            loop {
                match load_contacts(&client).await {
                    Ok(contacts) => {
                        if tx.send(contacts).await.is_err() {
                            debug!("Directory subscriber went away");
                            return;
                        }
                    }
                    Err(e) => warn!("Failed to load user directory: {}", e),
                }

                let wake = tokio::select! {
                    wake = wait_for(&mut documents, &user_changed) => wake,
                    wake = wait_for(&mut realtime, &presence_changed) => wake,
                };
                if let Wake::Closed = wake {
                    debug!("Change feed closed, ending directory subscription");
                    return;
                }
            }
        });
        Ok(Subscription::new(rx, task))
    }
}

async fn load_summaries(client: &ChatClient, uid: &str) -> Result<Vec<ConversationSummary>> {
    let conversations = client.backend.documents.conversations_for(uid).await?;

    let lookups = conversations.into_iter().map(|conversation| async move {
        let counterpart_id = conversation.counterpart(uid).unwrap_or(uid).to_string();
        let counterpart = match client.backend.documents.get_user(&counterpart_id).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Failed to load counterpart {}: {}", counterpart_id, e);
                None
            }
        };
        ConversationSummary {
            unread_count: conversation.unread_for(uid),
            conversation,
            counterpart_id,
            counterpart,
        }
    });
    Ok(join_all(lookups).await)
}

async fn load_contacts(client: &ChatClient) -> Result<Vec<Contact>> {
    let users = client.list_users().await?;
    let presences = join_all(users.iter().map(|u| client.presence_of(&u.uid))).await;

    Ok(users
        .into_iter()
        .zip(presences)
        .map(|(user, presence)| Contact {
            user,
            presence: presence.unwrap_or_else(|e| {
                warn!("Failed to load presence: {}", e);
                None
            }),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(uid: &str, name: &str, email: &str) -> User {
        User {
            uid: uid.to_string(),
            email: email.to_string(),
            display_name: name.to_string(),
            photo_url: None,
            status: String::new(),
            push_token: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_filter_users() {
        let users = vec![
            user("1", "Alice Smith", "alice@example.com"),
            user("2", "Bob", "bob@work.org"),
            user("3", "Carol", "carol@example.com"),
        ];

        let names: Vec<String> = filter_users(users.clone(), "SMITH")
            .into_iter()
            .map(|u| u.uid)
            .collect();
        assert_eq!(names, vec!["1"]);

        assert_eq!(filter_users(users.clone(), "o").len(), 2);
        assert!(filter_users(users.clone(), "example").is_empty());
        assert_eq!(filter_users(users.clone(), "  ").len(), 3);
        assert!(filter_users(users, "zed").is_empty());
    }
}
