//! One fixed-timestep advance of a round's world

use tracing::trace;

use crate::session::SessionId;
use crate::util::time::tick_delta;

use super::input::KeyState;
use super::snapshot::BodySnapshot;
use super::world::ArenaWorld;

pub const VELOCITY_ITERATIONS: u32 = 8;
pub const POSITION_ITERATIONS: u32 = 3;

impl ArenaWorld {
    /// Input for every actor, then one integrator step, then the snapshot.
    /// The phases never interleave.
    pub fn tick(&mut self, inputs: impl Fn(SessionId) -> KeyState) -> Vec<BodySnapshot> {
        self.apply_inputs(inputs);
        self.engine
            .step(tick_delta(), VELOCITY_ITERATIONS, POSITION_ITERATIONS);
        let snapshot = self.snapshot();
        trace!(bodies = snapshot.len(), "Tick complete");
        snapshot
    }
}
