use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::session::Session;

pub type SessionHandle = Arc<Mutex<Session>>;

/// In-memory sessions keyed by the id carried in the session cookie.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn insert(&self, session: Session) -> SessionHandle {
        let id = session.id;
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, handle.clone());
        handle
    }

    /// Drop a session, cancelling its in-flight query if any.
    pub async fn remove(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(handle) => {
                if let Some(q) = handle.lock().await.in_flight.take() {
                    q.cancel.cancel();
                }
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Evict sessions not seen since `now - max_idle`. Sessions whose lock
    /// is held right now are in use and skipped.
    ///
    /// The idle and busy checks run under the map's write lock, so no request
    /// can pick up a session between the check and its removal.
    pub async fn sweep_idle(&self, max_idle: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - max_idle;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => session.last_seen >= cutoff || session.is_busy(),
            Err(_) => true,
        });
        before - sessions.len()
    }
}
