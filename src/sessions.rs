//! In-memory session storage for the web layer.
//!
//! Entries expire after a period without access, and the oldest entry is
//! evicted once the store is full. Each session sits behind its own lock so a
//! workflow step runs to completion before the next one on the same session
//! starts.

use crate::models::Session;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

pub type SessionHandle = Arc<Mutex<Session>>;

struct Entry {
    session: SessionHandle,
    touched: Instant,
}

pub struct SessionStore {
    entries: Mutex<HashMap<Uuid, Entry>>,
    ttl: Duration,
    capacity: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        SessionStore {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub async fn create(&self) -> Uuid {
        self.insert(Session::default()).await
    }

    pub async fn insert(&self, session: Session) -> Uuid {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, now, self.ttl);

        while entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    tracing::debug!(session = %id, "Evicting session, store full");
                    entries.remove(&id);
                }
                None => break,
            }
        }

        let id = Uuid::new_v4();
        entries.insert(
            id,
            Entry {
                session: Arc::new(Mutex::new(session)),
                touched: now,
            },
        );
        id
    }

    /// Look up a live session and mark it as used.
    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, now, self.ttl);
        let entry = entries.get_mut(&id)?;
        entry.touched = now;
        Some(entry.session.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

fn purge_expired(entries: &mut HashMap<Uuid, Entry>, now: Instant, ttl: Duration) {
    let before = entries.len();
    entries.retain(|_, entry| now.duration_since(entry.touched) < ttl);
    let dropped = before - entries.len();
    if dropped > 0 {
        tracing::debug!(dropped, "Expired sessions");
    }
}
