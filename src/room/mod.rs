//! The single game room: roster, round lifecycle and delivery

mod actor;
mod broadcast;
mod lifecycle;

pub use actor::{RoomActor, RoomHandle};
pub use broadcast::{Broadcaster, Frame};
pub use lifecycle::{Room, RoomPhase, RoomSettings};

/// Room errors. The first three are shown to the requesting client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Username cannot be empty.")]
    EmptyUsername,

    #[error("Cannot start a game. Not enough players connected.")]
    InsufficientPlayers,

    #[error("A round is already running.")]
    RoundInProgress,

    #[error("Room is unavailable")]
    Unavailable,
}
