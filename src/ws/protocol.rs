//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::{BodySnapshot, KeyState};
use crate::session::SessionId;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Enter the room under a display name
    #[serde(rename = "room:join")]
    Join {
        #[serde(default)]
        username: String,
    },

    /// Leave the room. Without an id the connection's own session leaves.
    #[serde(rename = "room:leave")]
    Leave {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
    },

    #[serde(rename = "start-game")]
    StartGame,

    #[serde(rename = "stop-game")]
    StopGame,

    /// Latest key state, overwrites whatever the session held
    #[serde(rename = "input")]
    Input {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
        #[serde(default)]
        keys: KeyState,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    /// First message on every connection
    #[serde(rename = "session")]
    Session {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    #[serde(rename = "error:username")]
    UsernameError { text: String },

    #[serde(rename = "error:start-game")]
    StartGameError { text: String },

    #[serde(rename = "room:joined")]
    RoomJoined { text: String },

    /// Current roster
    #[serde(rename = "players")]
    Players { players: Vec<RosterEntry> },

    #[serde(rename = "game:start")]
    GameStart { text: String },

    #[serde(rename = "game:timer")]
    GameTimer {
        #[serde(rename = "secondsRemaining")]
        seconds_remaining: u32,
    },

    /// Every live body after a tick, or empty once the round stops
    #[serde(rename = "world-state")]
    WorldState { snapshot: Vec<BodySnapshot> },
}

/// One roster line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub username: String,
    /// Whether the session holds a live connection when the roster is
    /// published. A dropped transport leaves the roster as soon as the room
    /// handles its disconnect, so `false` only shows up for a member whose
    /// socket has closed while that disconnect is still queued.
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

/// Protocol errors
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parse one inbound text frame
pub fn decode_client_msg(text: &str) -> Result<ClientMsg, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}
