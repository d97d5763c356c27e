//! Round simulation: arena construction, input, projectiles, contacts and
//! snapshots

pub mod contact;
pub mod input;
pub mod projectile;
pub mod snapshot;
pub mod stepper;
pub mod world;

pub use input::KeyState;
pub use snapshot::BodySnapshot;
pub use world::ArenaWorld;
