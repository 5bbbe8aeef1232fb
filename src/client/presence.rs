// Presence handling
// Online/offline state lives in the realtime store at status/<uid>. Going
// online also registers an on-disconnect write so the server flips us to
// offline by itself if the connection is lost without a sign-out.

use log::{debug, info, warn};
use serde_json::{json, Value};

use super::subscription::{spawn_snapshots, Subscription};
use super::ChatClient;
use crate::backend::{server_timestamp, RealtimeChange};
use crate::error::Result;
use crate::models::{Presence, PresenceState};

fn presence_path(uid: &str) -> String {
    format!("status/{}", uid)
}

fn presence_value(state: PresenceState) -> Value {
    json!({ "state": state, "lastSeen": server_timestamp() })
}

/// Decode a realtime value; anything malformed counts as no record
fn parse_presence(value: Option<Value>) -> Option<Presence> {
    let value = value?;
    match serde_json::from_value(value) {
        Ok(presence) => Some(presence),
        Err(e) => {
            warn!("Ignoring malformed presence record: {}", e);
            None
        }
    }
}

impl ChatClient {
    pub(crate) async fn go_online(&self, uid: &str) -> Result<()> {
        let path = presence_path(uid);
        let realtime = &self.backend.realtime;
        realtime.set(&path, presence_value(PresenceState::Online)).await?;
        realtime
            .on_disconnect_set(&self.connection_id(), &path, presence_value(PresenceState::Offline))
            .await?;
        debug!("{} is online", uid);
        Ok(())
    }

    pub(crate) async fn go_offline(&self, uid: &str) -> Result<()> {
        self.backend
            .realtime
            .set(&presence_path(uid), presence_value(PresenceState::Offline))
            .await?;
        debug!("{} is offline", uid);
        Ok(())
    }

    pub async fn presence_of(&self, uid: &str) -> Result<Option<Presence>> {
        let value = self.backend.realtime.get(&presence_path(uid)).await?;
        Ok(parse_presence(value))
    }

    /// Live presence of `uid`; `None` until the user has ever connected
    pub fn subscribe_to_presence(&self, uid: &str) -> Subscription<Option<Presence>> {
        let path = presence_path(uid);
        let watched = path.clone();
        let realtime = self.backend.realtime.clone();

        spawn_snapshots(
            realtime.changes(),
            self.config.subscription_buffer,
            move |change: &RealtimeChange| change.path == watched,
            move || {
                let realtime = realtime.clone();
                let path = path.clone();
                async move { Ok(parse_presence(realtime.get(&path).await?)) }
            },
        )
    }

    /// Lose the realtime connection without signing out, as a crash or
    /// network drop would. Registered on-disconnect writes fire and the
    /// client carries on with a fresh connection.
    pub async fn drop_connection(&self) -> Result<()> {
        let old = self.replace_connection();
        info!("Dropping realtime connection {}", old);
        self.backend.realtime.disconnect(&old).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_presence() {
        let parsed = parse_presence(Some(json!({ "state": "online", "lastSeen": 1700000000000i64 })));
        assert_eq!(
            parsed,
            Some(Presence {
                state: PresenceState::Online,
                last_seen: 1_700_000_000_000,
            })
        );
        assert_eq!(parse_presence(Some(json!({ "state": "asleep" }))), None);
        assert_eq!(parse_presence(None), None);
    }

    #[test]
    fn test_presence_value_carries_placeholder() {
        let value = presence_value(PresenceState::Offline);
        assert_eq!(value["state"], "offline");
        assert_eq!(value["lastSeen"], server_timestamp());
    }
}
