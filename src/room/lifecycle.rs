//! Roster membership and round start/stop
//!
//! [`Room`] is plain synchronous state. The room actor owns it and drives it
//! from one task, so roster changes, ticks and teardown never overlap.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::game::ArenaWorld;
use crate::physics::RapierWorld;
use crate::session::{SessionId, SessionRegistry};
use crate::ws::protocol::{RosterEntry, ServerMsg};

use super::{Broadcaster, RoomError};

/// Fewest participants a round can start with
pub const MIN_PLAYERS: usize = 2;

/// Round parameters taken from configuration
#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    pub round_duration_secs: u32,
    pub spawn_npc: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            round_duration_secs: 60,
            spawn_npc: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomPhase {
    /// Nobody rostered, no round
    Empty,
    /// Rostered participants, no round
    Lobby,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub session: SessionId,
    pub username: String,
}

struct Round {
    remaining_secs: u32,
    world: ArenaWorld,
}

pub struct Room {
    registry: Arc<SessionRegistry>,
    feed: Broadcaster,
    settings: RoomSettings,
    /// Join order, which is also spawn and color order
    participants: Vec<Participant>,
    round: Option<Round>,
}

impl Room {
    pub fn new(registry: Arc<SessionRegistry>, feed: Broadcaster, settings: RoomSettings) -> Self {
        Self {
            registry,
            feed,
            settings,
            participants: Vec::new(),
            round: None,
        }
    }

    /// Add a session to the roster, or rename it if already there. Returns
    /// the confirmation text for the joining client.
    pub fn join(&mut self, session: SessionId, username: &str) -> Result<String, RoomError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(RoomError::EmptyUsername);
        }

        match self.participants.iter_mut().find(|p| p.session == session) {
            Some(existing) => existing.username = username.to_string(),
            None => self.participants.push(Participant {
                session,
                username: username.to_string(),
            }),
        }
        self.registry.set_username(session, username);
        info!(session_id = %session, username, participants = self.participants.len(), "Joined room");

        self.publish_roster();
        Ok(format!("{username} joined the room"))
    }

    /// Remove a session from the roster. A running round loses that
    /// participant's actor and shot but keeps going.
    pub fn leave(&mut self, session: SessionId) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.session != session);
        if self.participants.len() == before {
            debug!(session_id = %session, "Leave for session not in room");
            return false;
        }

        if let Some(round) = self.round.as_mut() {
            round.world.remove_session_actor(session);
        }
        info!(session_id = %session, participants = self.participants.len(), "Left room");
        self.publish_roster();
        true
    }

    /// Transport went away. The session leaves the roster unless another
    /// connection has attached to it since the registry released it.
    pub fn disconnect(&mut self, session: SessionId) -> bool {
        if self.registry.is_connected(session) {
            debug!(session_id = %session, "Session re-attached, keeping roster entry");
            return false;
        }
        self.leave(session)
    }

    pub fn start_round(&mut self) -> Result<(), RoomError> {
        if self.round.is_some() {
            return Err(RoomError::RoundInProgress);
        }
        if self.participants.len() < MIN_PLAYERS {
            return Err(RoomError::InsufficientPlayers);
        }

        let sessions: Vec<SessionId> = self.participants.iter().map(|p| p.session).collect();
        let mut world = ArenaWorld::build(
            Box::new(RapierWorld::default()),
            &sessions,
            self.settings.spawn_npc,
        );
        let snapshot = world.snapshot();
        let remaining_secs = self.settings.round_duration_secs;
        self.round = Some(Round {
            remaining_secs,
            world,
        });

        info!(participants = sessions.len(), remaining_secs, "Round started");
        self.feed.publish(&ServerMsg::WorldState { snapshot });
        self.feed.publish(&ServerMsg::GameStart {
            text: "game has started".to_string(),
        });
        self.feed.publish(&ServerMsg::GameTimer {
            seconds_remaining: remaining_secs,
        });
        Ok(())
    }

    /// Tear down the running round and publish an empty world. A no-op
    /// without a round.
    pub fn stop_round(&mut self) -> bool {
        let Some(mut round) = self.round.take() else {
            return false;
        };
        round.world.teardown();
        self.feed.publish(&ServerMsg::WorldState {
            snapshot: Vec::new(),
        });
        info!(remaining_secs = round.remaining_secs, "Round stopped");
        true
    }

    /// One simulation tick and its broadcast. Returns the body count, or
    /// `None` without a round.
    pub fn tick(&mut self) -> Option<usize> {
        let round = self.round.as_mut()?;
        let registry = &self.registry;
        let snapshot = round.world.tick(|session| registry.latest_input(session));
        let bodies = snapshot.len();
        self.feed.publish(&ServerMsg::WorldState { snapshot });
        Some(bodies)
    }

    /// One countdown second. Returns the new remaining time, or `None` when
    /// nothing changed (no round, or already at zero).
    pub fn countdown_tick(&mut self) -> Option<u32> {
        let round = self.round.as_mut()?;
        if round.remaining_secs == 0 {
            return None;
        }
        round.remaining_secs -= 1;
        self.feed.publish(&ServerMsg::GameTimer {
            seconds_remaining: round.remaining_secs,
        });
        Some(round.remaining_secs)
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.participants
            .iter()
            .map(|p| RosterEntry {
                username: p.username.clone(),
                is_active: self.registry.is_connected(p.session),
            })
            .collect()
    }

    fn publish_roster(&self) {
        self.feed.publish(&ServerMsg::Players {
            players: self.roster(),
        });
    }

    pub fn phase(&self) -> RoomPhase {
        if self.round.is_some() {
            RoomPhase::Running
        } else if self.participants.is_empty() {
            RoomPhase::Empty
        } else {
            RoomPhase::Lobby
        }
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn remaining_secs(&self) -> Option<u32> {
        self.round.as_ref().map(|r| r.remaining_secs)
    }

    pub fn world(&self) -> Option<&ArenaWorld> {
        self.round.as_ref().map(|r| &r.world)
    }
}
