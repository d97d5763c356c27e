//! Projectile spawning and movement

use glam::Vec2;
use tracing::debug;

use crate::physics::{BodyDef, BodyHandle, BodyKind, FixtureDef, Shape};

use super::contact::{ActorId, FixtureRole};
use super::world::ArenaWorld;

pub const PROJECTILE_HALF_EXTENT: f32 = 0.02;
/// Spawn offset from the shooter, horizontal part follows facing
pub const MUZZLE_OFFSET: Vec2 = Vec2::new(0.6, 0.2);
/// Each tick a projectile covers this fraction of its aim vector
pub const ADVANCE_DIVISOR: f32 = 6.0;
/// A projectile beyond this distance on either axis is spent
pub const ARENA_BOUNDS: f32 = 40.0;

/// One in-flight shot. Moved by the world each tick, never by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projectile {
    pub body: BodyHandle,
    pub position: Vec2,
    /// Aim vector captured at firing time
    pub direction: Vec2,
    /// Set once the shot has hit something or left the arena
    pub ended: bool,
}

impl Projectile {
    pub fn next_position(&self) -> Vec2 {
        self.position + self.direction / ADVANCE_DIVISOR
    }

    pub fn out_of_bounds(&self) -> bool {
        self.position.x.abs() > ARENA_BOUNDS || self.position.y.abs() > ARENA_BOUNDS
    }
}

impl ArenaWorld {
    /// Spawn a shot for the actor toward its current aim point. Returns false
    /// when the actor is unknown or already has a shot in flight.
    pub fn fire(&mut self, id: ActorId) -> bool {
        let Some(actor) = self.actors.get(&id) else {
            return false;
        };
        if actor.projectile.is_some() {
            return false;
        }
        let Some(pose) = self.engine.pose(actor.body) else {
            return false;
        };

        let origin = pose.position
            + Vec2::new(MUZZLE_OFFSET.x * actor.facing.sign(), MUZZLE_OFFSET.y);
        let direction = actor.aim_point - pose.position;
        let role = FixtureRole::Projectile { owner: id };
        let shape = Shape::rect(PROJECTILE_HALF_EXTENT, PROJECTILE_HALF_EXTENT);

        let body = self
            .engine
            .create_body(BodyDef::new(BodyKind::Kinematic, origin));
        self.engine.create_fixture(
            body,
            FixtureDef::new(shape, role)
                .with_density(1.0)
                .with_friction(0.0)
                .with_sensor(true),
        );
        self.track(body, role, shape);

        if let Some(actor) = self.actors.get_mut(&id) {
            actor.projectile = Some(Projectile {
                body,
                position: origin,
                direction,
                ended: false,
            });
        }
        debug!(actor = id.0, x = origin.x, y = origin.y, "Projectile fired");
        true
    }

    /// Destroy the actor's shot, if any, freeing it to fire again
    pub fn destroy_projectile(&mut self, id: ActorId) -> bool {
        let Some(projectile) = self.actors.get_mut(&id).and_then(|a| a.projectile.take()) else {
            return false;
        };
        self.untrack(projectile.body);
        debug!(actor = id.0, "Projectile destroyed");
        true
    }

    /// Move a live shot one tick along its aim vector. Marks it ended when it
    /// leaves the arena.
    pub(super) fn advance_projectile(&mut self, id: ActorId) -> Option<Projectile> {
        let projectile = self.actors.get_mut(&id)?.projectile.as_mut()?;
        projectile.position = projectile.next_position();
        if projectile.out_of_bounds() {
            projectile.ended = true;
        }
        let moved = *projectile;
        self.engine.set_position(moved.body, moved.position);
        Some(moved)
    }

    pub(super) fn end_projectile(&mut self, id: ActorId) {
        if let Some(projectile) = self.actors.get_mut(&id).and_then(|a| a.projectile.as_mut()) {
            projectile.ended = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::tests::world_with;

    #[test]
    fn fire_spawns_one_kinematic_shot_at_the_muzzle() {
        let (mut world, sessions) = world_with(1, false);
        let actor = world.actor_for_session(sessions[0]).unwrap().clone();
        let before = world.tracked_bodies().len();

        assert!(world.fire(actor.id));
        assert!(!world.fire(actor.id));
        assert_eq!(world.tracked_bodies().len(), before + 1);

        let shot = world.actor(actor.id).unwrap().projectile.unwrap();
        assert_eq!(world.engine().body_kind(shot.body), Some(BodyKind::Kinematic));
        let pose = world.engine().pose(actor.body).unwrap();
        assert_eq!(shot.position, pose.position + Vec2::new(-0.6, 0.2));
        assert_eq!(shot.direction, actor.aim_point - pose.position);
    }

    #[test]
    fn advance_moves_a_sixth_of_the_aim_vector() {
        let (mut world, sessions) = world_with(1, false);
        let id = world.actor_for_session(sessions[0]).unwrap().id;
        world.fire(id);
        let shot = world.actor(id).unwrap().projectile.unwrap();

        let moved = world.advance_projectile(id).unwrap();
        assert_eq!(moved.position, shot.position + shot.direction / 6.0);
        assert_eq!(
            world.engine().pose(shot.body).unwrap().position,
            moved.position
        );
        assert!(!moved.ended);
    }

    #[test]
    fn leaving_the_arena_ends_the_shot() {
        let (mut world, sessions) = world_with(1, false);
        let id = world.actor_for_session(sessions[0]).unwrap().id;
        world.fire(id);
        if let Some(p) = world.actors.get_mut(&id).and_then(|a| a.projectile.as_mut()) {
            p.position = Vec2::new(-39.99, 0.0);
            p.direction = Vec2::new(-6.0, 0.0);
        }
        assert!(world.advance_projectile(id).unwrap().ended);
    }

    #[test]
    fn destroying_rearms_the_shooter() {
        let (mut world, sessions) = world_with(1, false);
        let id = world.actor_for_session(sessions[0]).unwrap().id;
        let before = world.engine().body_count();
        world.fire(id);
        assert!(world.destroy_projectile(id));
        assert!(!world.destroy_projectile(id));
        assert_eq!(world.engine().body_count(), before);
        assert!(world.fire(id));
    }
}
