use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tracing::info;
use ulid::Ulid;

/// Metadata for one live connection.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub remote: Option<String>,
    pub connected_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub total_sessions: u64,
}

/// Live-connection registry, shared across the transport for observability.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionInfo>>,
    total: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        SessionRegistry::default()
    }

    /// Register a new connection and mint its session id.
    pub fn register(&self, remote: Option<String>) -> String {
        let id = Ulid::new().to_string();
        let info = SessionInfo {
            id: id.clone(),
            remote,
            connected_at: Utc::now().timestamp(),
        };
        self.sessions.insert(id.clone(), info);
        self.total.fetch_add(1, Ordering::Relaxed);
        info!(session = %id, active = self.sessions.len(), "session connected");
        id
    }

    pub fn unregister(&self, id: &str) {
        if self.sessions.remove(id).is_some() {
            info!(session = %id, active = self.sessions.len(), "session disconnected");
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            active_sessions: self.sessions.len(),
            total_sessions: self.total.load(Ordering::Relaxed),
        }
    }

    /// Point-in-time copy of every live session, oldest first.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        sessions.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then(a.id.cmp(&b.id)));
        sessions
    }
}
