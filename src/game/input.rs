//! Per-tick input application

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::session::SessionId;

use super::contact::ActorId;
use super::world::{ArenaWorld, Facing};

/// Horizontal walking force
pub const WALK_FORCE: f32 = 6.0;
/// No walking force is applied at or beyond this horizontal speed
pub const MAX_WALK_SPEED: f32 = 3.0;
/// Vertical speed below which an actor counts as grounded for walking
pub const GROUNDED_SPEED: f32 = 0.5;
/// Side-jump impulse, horizontal part follows facing
pub const JUMP_IMPULSE: Vec2 = Vec2::new(12.0, 4.0);
pub const AIM_STEP: f32 = 0.1;
pub const AIM_MIN: f32 = -6.0;
pub const AIM_MAX: f32 = 2.0;
/// Aim marker offset from the actor, horizontal part follows facing
pub const AIM_MARKER_OFFSET: Vec2 = Vec2::new(2.0, 2.0);
/// Horizontal velocity multiplier per tick with no horizontal key held
pub const IDLE_FRICTION: f32 = 0.8;

/// Key state reported by a client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyState {
    pub up: bool,
    pub left: bool,
    pub down: bool,
    pub right: bool,
    pub fire: bool,
    #[serde(rename = "enter", alias = "jump")]
    pub jump: bool,
}

impl ArenaWorld {
    /// Turn one actor's key state into forces, impulses and aim changes
    pub fn apply_input(&mut self, id: ActorId, keys: KeyState) {
        let Some(actor) = self.actors.get_mut(&id) else {
            return;
        };
        let body = actor.body;
        let Some(velocity) = self.engine.linear_velocity(body) else {
            return;
        };
        let aim_before = (actor.facing, actor.aim_offset);

        let grounded = velocity.y.abs() < GROUNDED_SPEED;
        if keys.left && grounded && velocity.x > -MAX_WALK_SPEED {
            actor.facing = Facing::Left;
            self.engine.apply_force(body, Vec2::new(-WALK_FORCE, 0.0));
        }
        if keys.right && grounded && velocity.x < MAX_WALK_SPEED {
            actor.facing = Facing::Right;
            self.engine.apply_force(body, Vec2::new(WALK_FORCE, 0.0));
        }

        if keys.jump && velocity.y == 0.0 {
            let impulse = Vec2::new(JUMP_IMPULSE.x * actor.facing.sign(), JUMP_IMPULSE.y);
            self.engine.apply_linear_impulse(body, impulse);
        }

        if keys.up && actor.aim_offset < AIM_MAX {
            actor.aim_offset = (actor.aim_offset + AIM_STEP).min(AIM_MAX);
        }
        if keys.down && actor.aim_offset > AIM_MIN {
            actor.aim_offset = (actor.aim_offset - AIM_STEP).max(AIM_MIN);
        }

        if let Some(pose) = self.engine.pose(body) {
            actor.aim_point = pose.position
                + Vec2::new(
                    AIM_MARKER_OFFSET.x * actor.facing.sign(),
                    AIM_MARKER_OFFSET.y + actor.aim_offset,
                );
        }
        // Only a player changing aim takes over the shared marker
        if !actor.is_npc() && (actor.facing, actor.aim_offset) != aim_before {
            self.marker_owner = Some(id);
        }

        // The live projectile is the only guard, airborne shots are allowed
        if keys.fire && actor.projectile.is_none() {
            self.fire(id);
        }

        if !keys.left && !keys.right {
            if let Some(current) = self.engine.linear_velocity(body) {
                self.engine
                    .set_linear_velocity(body, Vec2::new(current.x * IDLE_FRICTION, current.y));
            }
        }

        self.place_aim_marker();
    }

    /// Apply every actor's input in spawn order. NPCs get an empty key state.
    pub fn apply_inputs(&mut self, inputs: impl Fn(SessionId) -> KeyState) {
        let drivers: Vec<(ActorId, Option<SessionId>)> =
            self.actors.values().map(|a| (a.id, a.session())).collect();
        for (id, session) in drivers {
            let keys = session.map(&inputs).unwrap_or_default();
            self.apply_input(id, keys);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::tests::world_with;

    fn keys(f: impl FnOnce(&mut KeyState)) -> KeyState {
        let mut k = KeyState::default();
        f(&mut k);
        k
    }

    #[test]
    fn wire_names_use_enter_for_jump() {
        let parsed: KeyState =
            serde_json::from_str(r#"{"up":false,"left":true,"enter":true}"#).unwrap();
        assert!(parsed.left && parsed.jump);
        assert!(!parsed.fire);
        let aliased: KeyState = serde_json::from_str(r#"{"jump":true}"#).unwrap();
        assert!(aliased.jump);
    }

    #[test]
    fn idle_friction_scales_horizontal_only() {
        let (mut world, sessions) = world_with(1, false);
        let actor = world.actor_for_session(sessions[0]).unwrap().clone();
        world
            .engine_mut()
            .set_linear_velocity(actor.body, Vec2::new(2.5, -1.25));

        world.apply_input(actor.id, KeyState::default());

        let v = world.engine().linear_velocity(actor.body).unwrap();
        assert!((v.x - 2.0).abs() < 1e-6);
        assert_eq!(v.y, -1.25);
    }

    #[test]
    fn walking_needs_ground_and_respects_cap() {
        let (mut world, sessions) = world_with(1, false);
        let actor = world.actor_for_session(sessions[0]).unwrap().clone();
        let right = keys(|k| k.right = true);

        // At the cap no force is added, the step only damps
        world
            .engine_mut()
            .set_linear_velocity(actor.body, Vec2::new(MAX_WALK_SPEED, 0.0));
        world.apply_input(actor.id, right);
        world.engine_mut().step(1.0 / 60.0, 8, 3);
        assert!(world.engine().linear_velocity(actor.body).unwrap().x < MAX_WALK_SPEED);
        assert_eq!(world.actor(actor.id).unwrap().facing, Facing::Left);

        // Below the cap and grounded, facing flips and speed grows
        world
            .engine_mut()
            .set_linear_velocity(actor.body, Vec2::new(0.0, 0.0));
        world.apply_input(actor.id, right);
        world.engine_mut().step(1.0 / 60.0, 8, 3);
        assert!(world.engine().linear_velocity(actor.body).unwrap().x > 0.0);
        assert_eq!(world.actor(actor.id).unwrap().facing, Facing::Right);

        // Airborne walking is ignored
        world
            .engine_mut()
            .set_linear_velocity(actor.body, Vec2::new(0.0, -2.0));
        world.apply_input(actor.id, keys(|k| k.left = true));
        assert_eq!(world.actor(actor.id).unwrap().facing, Facing::Right);
    }

    #[test]
    fn jump_only_from_zero_vertical_speed() {
        let (mut world, sessions) = world_with(1, false);
        let actor = world.actor_for_session(sessions[0]).unwrap().clone();
        let jump = keys(|k| {
            k.jump = true;
            k.left = true;
        });

        world
            .engine_mut()
            .set_linear_velocity(actor.body, Vec2::new(0.0, -0.1));
        world.apply_input(actor.id, jump);
        assert_eq!(world.engine().linear_velocity(actor.body).unwrap().y, -0.1);

        world
            .engine_mut()
            .set_linear_velocity(actor.body, Vec2::ZERO);
        world.apply_input(actor.id, jump);
        let v = world.engine().linear_velocity(actor.body).unwrap();
        assert!((v - Vec2::new(-JUMP_IMPULSE.x, JUMP_IMPULSE.y)).length() < 1e-4, "v = {v}");
    }

    #[test]
    fn aim_offset_is_clamped() {
        let (mut world, sessions) = world_with(1, false);
        let id = world.actor_for_session(sessions[0]).unwrap().id;
        for _ in 0..200 {
            world.apply_input(id, keys(|k| k.up = true));
        }
        assert!((world.actor(id).unwrap().aim_offset - AIM_MAX).abs() < 1e-6);
        for _ in 0..200 {
            world.apply_input(id, keys(|k| k.down = true));
        }
        assert!((world.actor(id).unwrap().aim_offset - AIM_MIN).abs() < 1e-6);
    }

    #[test]
    fn aim_marker_follows_facing() {
        let (mut world, sessions) = world_with(1, false);
        let actor = world.actor_for_session(sessions[0]).unwrap().clone();
        world.apply_input(actor.id, KeyState::default());

        let position = world.engine().pose(actor.body).unwrap().position;
        let marker = world.engine().pose(world.aim_marker()).unwrap().position;
        assert_eq!(marker, position + Vec2::new(-2.0, 2.0));
    }

    #[test]
    fn marker_tracks_the_aiming_player_not_the_npc() {
        let (mut world, sessions) = world_with(1, true);
        let player = sessions[0];
        world.apply_inputs(|s| keys(|k| k.up = s == player));

        let actor = world.actor_for_session(player).unwrap().clone();
        let npc = world.npc().unwrap().clone();
        let marker = world.engine().pose(world.aim_marker()).unwrap().position;
        assert_eq!(world.marker_owner(), Some(actor.id));
        assert_eq!(marker, actor.aim_point);
        assert_ne!(marker, npc.aim_point);
        let expected = world.engine().pose(actor.body).unwrap().position
            + Vec2::new(-AIM_MARKER_OFFSET.x, AIM_MARKER_OFFSET.y + AIM_STEP);
        assert!((marker - expected).length() < 1e-6);
    }

    #[test]
    fn marker_stays_with_the_last_player_to_aim() {
        let (mut world, sessions) = world_with(2, true);
        let second = sessions[1];
        world.apply_inputs(|s| keys(|k| k.down = s == second));
        let aimer = world.actor_for_session(second).unwrap().id;
        assert_eq!(world.marker_owner(), Some(aimer));

        // Idle ticks keep the marker on the same player
        world.apply_inputs(|_| KeyState::default());
        let marker = world.engine().pose(world.aim_marker()).unwrap().position;
        assert_eq!(marker, world.actor(aimer).unwrap().aim_point);

        // Losing the owner hands the marker back to the first player
        world.remove_session_actor(second);
        world.apply_inputs(|_| KeyState::default());
        let first = world.actor_for_session(sessions[0]).unwrap();
        assert_eq!(world.marker_owner(), None);
        let marker = world.engine().pose(world.aim_marker()).unwrap().position;
        assert_eq!(marker, first.aim_point);
    }

    #[test]
    fn npc_receives_no_input() {
        let (mut world, _) = world_with(1, true);
        let npc = world.npc().unwrap().clone();
        world
            .engine_mut()
            .set_linear_velocity(npc.body, Vec2::new(1.0, 0.0));
        world.apply_inputs(|_| keys(|k| k.right = true));
        let v = world.engine().linear_velocity(npc.body).unwrap();
        assert!((v.x - IDLE_FRICTION).abs() < 1e-6);
    }
}
