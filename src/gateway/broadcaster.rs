use dashmap::DashMap;
use serde_json::Value;

use super::session::{ConnectionState, GatewaySession};

/// Registry of every live gateway session, authenticated or not. Sessions
/// register at creation and deregister on transport close; fan-out only ever
/// reaches the ones that finished identifying.
pub struct Broadcaster {
    sessions: DashMap<String, GatewaySession>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn register(&self, session: GatewaySession) {
        self.sessions.insert(session.session_id().to_string(), session);
    }

    pub fn remove(&self, session_id: &str) {
        if let Some((_, mut session)) = self.sessions.remove(session_id) {
            session.mark_closed();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Runs `f` against one registered session. The closure must not block;
    /// it runs under the registry shard lock.
    pub fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut GatewaySession) -> R,
    ) -> Option<R> {
        self.sessions.get_mut(session_id).map(|mut s| f(&mut s))
    }

    /// Fans `event` out to every session that is currently Connected.
    /// Connecting and Closed sessions are silently skipped; all connections
    /// belong to the same identity so there is no per-recipient filtering.
    pub fn dispatch(&self, event: &str, data: &Value) {
        let mut delivered = 0usize;
        for mut entry in self.sessions.iter_mut() {
            if entry.state() != ConnectionState::Connected {
                continue;
            }
            if let Err(e) = entry.dispatch(event, data.clone()) {
                tracing::warn!(session_id = %entry.session_id(), error = %e, "dispatch failed");
            } else {
                delivered += 1;
            }
        }
        tracing::debug!(event, delivered, "dispatched gateway event");
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
