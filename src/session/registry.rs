//! In-memory session registry shared by connections and the room

use dashmap::DashMap;
use tracing::{debug, info};

use crate::game::input::KeyState;
use crate::util::time::unix_millis;

use super::{InputMailbox, SessionId};

/// Per-session record
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    /// Set on the first successful room join
    pub username: Option<String>,
    /// Live transports attached to this session
    pub connections: u32,
    pub last_seen: u64,
    pub mailbox: InputMailbox,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            username: None,
            connections: 1,
            last_seen: unix_millis(),
            mailbox: InputMailbox::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connections > 0
    }
}

/// Session table. Records are never removed for the process lifetime,
/// they only lose their connections.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-attach to the presented session if it exists, otherwise allocate a
    /// fresh one. Either way the caller now holds one connection on it and
    /// must hand it back with [`release`](Self::release). Never fails.
    pub fn resolve(&self, presented: Option<&str>) -> SessionId {
        if let Some(id) = presented.and_then(SessionId::parse) {
            if let Some(mut session) = self.sessions.get_mut(&id) {
                session.connections += 1;
                session.last_seen = unix_millis();
                info!(session_id = %id, connections = session.connections, "Session re-attached");
                return id;
            }
        }

        let id = SessionId::new();
        self.sessions.insert(id, Session::new(id));
        info!(session_id = %id, "Session created");
        id
    }

    /// Overwrite the session's latest input. Unknown ids are ignored.
    pub fn record_input(&self, id: SessionId, keys: KeyState) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut session) => {
                session.mailbox.post(keys);
                session.last_seen = unix_millis();
                true
            }
            None => {
                debug!(session_id = %id, "Input for unknown session ignored");
                false
            }
        }
    }

    /// Latest keys for the session; no record means no keys pressed
    pub fn latest_input(&self, id: SessionId) -> KeyState {
        self.sessions
            .get(&id)
            .map(|s| s.mailbox.latest())
            .unwrap_or_default()
    }

    pub fn set_username(&self, id: SessionId, username: &str) {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.username = Some(username.to_string());
        }
    }

    /// Give back one connection. Returns true when it was the last, which
    /// leaves the session disconnected with no keys held.
    pub fn release(&self, id: SessionId) -> bool {
        let Some(mut session) = self.sessions.get_mut(&id) else {
            return false;
        };
        if session.connections == 0 {
            return false;
        }
        session.connections -= 1;
        session.last_seen = unix_millis();
        if session.connections > 0 {
            debug!(session_id = %id, connections = session.connections, "Connection released, session still attached");
            return false;
        }
        session.mailbox.clear();
        true
    }

    pub fn is_connected(&self, id: SessionId) -> bool {
        self.sessions
            .get(&id)
            .map(|s| s.is_connected())
            .unwrap_or(false)
    }

    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.get(&id).map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_connected()).count()
    }
}
