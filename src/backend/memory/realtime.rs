use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use log::{debug, info};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex as TokioMutex};
use uuid::Uuid;

use super::{ServerClock, CHANGE_FEED_CAPACITY};
use crate::backend::{server_timestamp, RealtimeChange, RealtimeStore};
use crate::error::{ChatError, Result};

/// Pending write for when a connection goes away; `None` removes the path
type DisconnectWrite = (String, Option<Value>);

pub struct MemoryRealtime {
    values: TokioMutex<HashMap<String, Value>>,
    on_disconnect: Mutex<HashMap<String, Vec<DisconnectWrite>>>,
    clock: Arc<ServerClock>,
    changes: broadcast::Sender<RealtimeChange>,
}

fn normalize(path: &str) -> Result<String> {
    let path = path.trim_matches('/');
    if path.is_empty() || path.split('/').any(str::is_empty) {
        return Err(ChatError::validation(format!("invalid realtime path '{}'", path)));
    }
    Ok(path.to_string())
}

fn is_at_or_below(key: &str, path: &str) -> bool {
    key == path || (key.starts_with(path) && key.as_bytes().get(path.len()) == Some(&b'/'))
}

impl MemoryRealtime {
    pub fn new(clock: Arc<ServerClock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        MemoryRealtime {
            values: TokioMutex::new(HashMap::new()),
            on_disconnect: Mutex::new(HashMap::new()),
            clock,
            changes,
        }
    }

    /// Replace server timestamp placeholders anywhere in `value`
    fn resolve(&self, value: Value) -> Value {
        if value == server_timestamp() {
            return Value::from(self.clock.now_millis());
        }
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.resolve(v)))
                    .collect::<Map<String, Value>>(),
            ),
            Value::Array(items) => Value::Array(items.into_iter().map(|v| self.resolve(v)).collect()),
            other => other,
        }
    }

    fn notify(&self, path: String, value: Option<Value>) {
        if self.changes.send(RealtimeChange { path, value }).is_err() {
            debug!("No realtime listeners");
        }
    }

    async fn write(&self, path: String, value: Option<Value>) {
        let mut values = self.values.lock().await;
        match value {
            Some(value) => {
                let value = self.resolve(value);
                values.insert(path.clone(), value.clone());
                drop(values);
                self.notify(path, Some(value));
            }
            None => {
                let removed: Vec<String> = values
                    .keys()
                    .filter(|key| is_at_or_below(key, &path))
                    .cloned()
                    .collect();
                for key in &removed {
                    values.remove(key);
                }
                drop(values);
                for key in removed {
                    self.notify(key, None);
                }
            }
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<DisconnectWrite>>> {
        self.on_disconnect.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register_disconnect_write(&self, connection: &str, path: &str, value: Option<Value>) -> Result<()> {
        let path = normalize(path)?;
        let mut pending = self.pending();
        let writes = pending
            .get_mut(connection)
            .ok_or_else(|| ChatError::NotFound(format!("realtime connection {}", connection)))?;
        // a later registration for the same path replaces the earlier one
        writes.retain(|(existing, _)| *existing != path);
        writes.push((path, value));
        Ok(())
    }
}

#[async_trait]
impl RealtimeStore for MemoryRealtime {
    fn connect(&self) -> String {
        let connection = Uuid::new_v4().to_string();
        self.pending().insert(connection.clone(), Vec::new());
        debug!("Realtime connection {} opened", connection);
        connection
    }

    async fn disconnect(&self, connection: &str) -> Result<()> {
        let writes = self.pending().remove(connection);
        let Some(writes) = writes else {
            return Ok(());
        };
        info!("Connection {} dropped, applying {} on-disconnect writes", connection, writes.len());
        for (path, value) in writes {
            self.write(path, value).await;
        }
        Ok(())
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        let path = normalize(path)?;
        if value.is_null() {
            self.write(path, None).await;
        } else {
            self.write(path, Some(value)).await;
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        self.write(path, None).await;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let path = normalize(path)?;
        Ok(self.values.lock().await.get(&path).cloned())
    }

    async fn on_disconnect_set(&self, connection: &str, path: &str, value: Value) -> Result<()> {
        self.register_disconnect_write(connection, path, Some(value))
    }

    async fn on_disconnect_remove(&self, connection: &str, path: &str) -> Result<()> {
        self.register_disconnect_write(connection, path, None)
    }

    fn changes(&self) -> broadcast::Receiver<RealtimeChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryRealtime {
        MemoryRealtime::new(Arc::new(ServerClock::new()))
    }

    #[tokio::test]
    async fn test_server_timestamp_is_resolved() {
        let realtime = store();
        realtime
            .set("status/alice", json!({ "state": "online", "lastSeen": server_timestamp() }))
            .await
            .unwrap();

        let value = realtime.get("/status/alice/").await.unwrap().unwrap();
        assert_eq!(value["state"], "online");
        assert!(value["lastSeen"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_remove_clears_children() {
        let realtime = store();
        realtime.set("typing/a_b/a", json!(true)).await.unwrap();
        realtime.set("typing/a_b/b", json!(true)).await.unwrap();
        realtime.set("typing/a_bc/a", json!(true)).await.unwrap();

        realtime.remove("typing/a_b").await.unwrap();
        assert_eq!(realtime.get("typing/a_b/a").await.unwrap(), None);
        assert_eq!(realtime.get("typing/a_b/b").await.unwrap(), None);
        assert_eq!(realtime.get("typing/a_bc/a").await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_disconnect_fires_registered_writes() {
        let realtime = store();
        let connection = realtime.connect();
        realtime.set("status/bob", json!({ "state": "online" })).await.unwrap();
        realtime.set("typing/x/bob", json!(true)).await.unwrap();
        realtime
            .on_disconnect_set(&connection, "status/bob", json!({ "state": "offline" }))
            .await
            .unwrap();
        realtime.on_disconnect_remove(&connection, "typing/x/bob").await.unwrap();

        let mut changes = realtime.changes();
        realtime.disconnect(&connection).await.unwrap();

        assert_eq!(realtime.get("status/bob").await.unwrap(), Some(json!({ "state": "offline" })));
        assert_eq!(realtime.get("typing/x/bob").await.unwrap(), None);
        assert_eq!(changes.recv().await.unwrap().path, "status/bob");

        // a second disconnect has nothing left to apply
        realtime.disconnect(&connection).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_empty_paths() {
        let realtime = store();
        assert!(realtime.set("", json!(1)).await.is_err());
        assert!(realtime.get("status//x").await.is_err());
    }
}
