//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::room::{RoomActor, RoomHandle, RoomSettings};
use crate::session::SessionRegistry;

/// Shared application state, built once per process and handed to every
/// route and connection
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub room: RoomHandle,
}

impl AppState {
    /// Build the state and the room task that still has to be spawned
    pub fn new(config: Config) -> (Self, RoomActor) {
        let sessions = Arc::new(SessionRegistry::new());
        let settings = RoomSettings {
            round_duration_secs: config.round_duration_secs,
            spawn_npc: config.spawn_npc,
        };
        let (actor, room) = RoomActor::new(settings, sessions.clone());
        (Self::from_parts(config, sessions, room), actor)
    }

    pub fn from_parts(config: Config, sessions: Arc<SessionRegistry>, room: RoomHandle) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
            room,
        }
    }
}
