//! One session controller per browser tab, evicted once the tab goes quiet.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use client_core::{Encoder, RemoteEditor, SessionController};
use shared::domain::SessionId;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

struct SessionEntry {
    controller: Arc<SessionController>,
    last_seen: Mutex<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct SessionRegistry {
    encoder: Arc<dyn Encoder>,
    editor: Arc<dyn RemoteEditor>,
    sessions: Arc<RwLock<HashMap<SessionId, Arc<SessionEntry>>>>,
}

impl SessionRegistry {
    pub fn new(encoder: Arc<dyn Encoder>, editor: Arc<dyn RemoteEditor>) -> Self {
        Self {
            encoder,
            editor,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self) -> (SessionId, Arc<SessionController>) {
        let session_id = SessionId::new();
        let controller = Arc::new(SessionController::new(
            self.encoder.clone(),
            self.editor.clone(),
        ));
        let entry = Arc::new(SessionEntry {
            controller: controller.clone(),
            last_seen: Mutex::new(Utc::now()),
        });
        self.sessions.write().await.insert(session_id, entry);
        (session_id, controller)
    }

    /// Looks up a session and marks it as recently used.
    pub async fn get(&self, session_id: SessionId) -> Option<Arc<SessionController>> {
        let entry = self.sessions.read().await.get(&session_id).cloned()?;
        *entry.last_seen.lock().await = Utc::now();
        Some(entry.controller.clone())
    }

    pub async fn remove(&self, session_id: SessionId) -> bool {
        self.sessions.write().await.remove(&session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops sessions not touched within `ttl` of `now`. A run still in
    /// flight for an evicted session finishes against a controller nobody
    /// can reach anymore.
    pub async fn evict_idle(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (session_id, entry) in sessions.iter() {
            if now - *entry.last_seen.lock().await > ttl {
                expired.push(*session_id);
            }
        }
        for session_id in &expired {
            sessions.remove(session_id);
        }
        if !expired.is_empty() {
            info!(evicted = expired.len(), remaining = sessions.len(), "evicted idle sessions");
        }
        expired.len()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
