// In-process implementation of the backend contract.
// Everything lives behind tokio mutexes and change feeds are broadcast
// channels, so several clients built from one `MemoryBackend` see each
// other's writes the way devices sharing a project would.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeZone, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::Backend;

pub mod blobs;
pub mod documents;
pub mod identity;
pub mod push;
pub mod realtime;

pub use blobs::MemoryBlobs;
pub use documents::MemoryDocuments;
pub use identity::MemoryIdentity;
pub use push::{MemoryNotifier, MemoryPush};
pub use realtime::MemoryRealtime;

const CHANGE_FEED_CAPACITY: usize = 256;
const PUSH_ID_LEN: usize = 20;

/// Server clock that never hands out the same millisecond twice
#[derive(Debug, Default)]
pub struct ServerClock {
    last_millis: Mutex<i64>,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_millis(&self) -> i64 {
        let mut last = self.last_millis.lock().unwrap_or_else(PoisonError::into_inner);
        let next = Utc::now().timestamp_millis().max(*last + 1);
        *last = next;
        next
    }

    pub fn now(&self) -> DateTime<Utc> {
        let millis = self.now_millis();
        Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
    }
}

/// Random document id in the style of auto-generated push ids
pub fn push_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PUSH_ID_LEN)
        .map(char::from)
        .collect()
}

/// Concrete handles to every in-memory service, for tests that need to poke them
#[derive(Clone)]
pub struct MemoryBackend {
    pub identity: Arc<MemoryIdentity>,
    pub documents: Arc<MemoryDocuments>,
    pub realtime: Arc<MemoryRealtime>,
    pub blobs: Arc<MemoryBlobs>,
    pub push: Arc<MemoryPush>,
    pub notifier: Arc<MemoryNotifier>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let clock = Arc::new(ServerClock::new());
        MemoryBackend {
            identity: Arc::new(MemoryIdentity::new()),
            documents: Arc::new(MemoryDocuments::new(clock.clone())),
            realtime: Arc::new(MemoryRealtime::new(clock)),
            blobs: Arc::new(MemoryBlobs::new()),
            push: Arc::new(MemoryPush::new()),
            notifier: Arc::new(MemoryNotifier::new()),
        }
    }

    pub fn backend(&self) -> Backend {
        Backend {
            identity: self.identity.clone(),
            documents: self.documents.clone(),
            realtime: self.realtime.clone(),
            blobs: self.blobs.clone(),
            push: self.push.clone(),
            notifications: self.notifier.clone(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}
