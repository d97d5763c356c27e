//! Arena construction and the per-round world record

use std::collections::BTreeMap;
use std::f32::consts::PI;
use std::sync::Arc;

use glam::Vec2;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::physics::{BodyDef, BodyHandle, BodyKind, FixtureDef, PhysicsEngine, Shape};
use crate::session::SessionId;

use super::contact::{ActorId, ContactLedger, FixtureRole, SharedLedger};
use super::projectile::Projectile;

/// Actor display colors, reused by participant index
pub const PALETTE: [&str; 3] = ["#ff0000", "#0000ff", "#00ff00"];

pub const INITIAL_HEALTH: u32 = 100;

const ACTOR_HALF_EXTENTS: Vec2 = Vec2::new(0.3, 0.5);
const ACTOR_SPAWN: Vec2 = Vec2::new(0.0, 2.0);
const NPC_SPAWN: Vec2 = Vec2::new(2.0, 2.0);
const ACTOR_FRICTION: f32 = 0.1;
const ACTOR_LINEAR_DAMPING: f32 = 0.5;
const ACTOR_ANGULAR_DAMPING: f32 = 0.8;

const AIM_MARKER_START: Vec2 = Vec2::new(10.0, 10.0);
const AIM_MARKER_SIZE: f32 = 0.2;

/// One piece of static arena geometry
struct ArenaPiece {
    position: Vec2,
    half_extents: Vec2,
    angle: f32,
    friction: f32,
}

const ARENA: [ArenaPiece; 5] = [
    // Floor
    ArenaPiece {
        position: Vec2::new(0.0, -13.0),
        half_extents: Vec2::new(17.0, 0.25),
        angle: 0.0,
        friction: 0.6,
    },
    // Left wall
    ArenaPiece {
        position: Vec2::new(-17.0, 0.0),
        half_extents: Vec2::new(0.25, 20.0),
        angle: 0.0,
        friction: 0.6,
    },
    // Right wall
    ArenaPiece {
        position: Vec2::new(17.0, 0.0),
        half_extents: Vec2::new(0.25, 20.0),
        angle: 0.0,
        friction: 0.6,
    },
    ArenaPiece {
        position: Vec2::new(1.0, -2.0),
        half_extents: Vec2::new(5.0, 0.2),
        angle: PI / 24.0,
        friction: 1.0,
    },
    ArenaPiece {
        position: Vec2::new(-8.0, -3.0),
        half_extents: Vec2::new(5.0, 0.2),
        angle: 0.0,
        friction: 1.0,
    },
];

/// Number of static bodies every world starts with (arena plus aim marker)
pub const STATIC_BODY_COUNT: usize = ARENA.len() + 1;

/// Who drives an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    Session(SessionId),
    Npc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Left,
    Right,
}

impl Facing {
    /// -1 for left, +1 for right
    pub fn sign(self) -> f32 {
        match self {
            Facing::Left => -1.0,
            Facing::Right => 1.0,
        }
    }
}

/// Mutable gameplay state of one actor. The in-flight projectile lives here
/// so removing the actor always removes its shot.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: ActorId,
    pub controller: Controller,
    pub body: BodyHandle,
    pub color: Option<&'static str>,
    pub health: u32,
    pub facing: Facing,
    /// Vertical aim adjustment, clamped to the aim range
    pub aim_offset: f32,
    /// Where the aim marker sits for this actor
    pub aim_point: Vec2,
    pub projectile: Option<Projectile>,
}

impl Actor {
    pub fn is_npc(&self) -> bool {
        self.controller == Controller::Npc
    }

    pub fn session(&self) -> Option<SessionId> {
        match self.controller {
            Controller::Session(id) => Some(id),
            Controller::Npc => None,
        }
    }
}

/// A body the world serializes, with its gameplay role and display size
#[derive(Debug, Clone, Copy)]
pub struct TrackedBody {
    pub handle: BodyHandle,
    pub role: FixtureRole,
    pub display: Shape,
}

/// Everything that exists for the duration of one round
pub struct ArenaWorld {
    pub(super) engine: Box<dyn PhysicsEngine>,
    /// Insertion order: arena, aim marker, actors, then projectiles
    pub(super) bodies: Vec<TrackedBody>,
    pub(super) actors: BTreeMap<ActorId, Actor>,
    pub(super) aim_marker: BodyHandle,
    /// Player whose aim the marker shows, the first player when unset
    pub(super) marker_owner: Option<ActorId>,
    pub(super) contacts: SharedLedger,
}

impl ArenaWorld {
    /// Build the arena and one actor per participant, in roster order
    pub fn build(
        mut engine: Box<dyn PhysicsEngine>,
        participants: &[SessionId],
        spawn_npc: bool,
    ) -> Self {
        let contacts: SharedLedger = Arc::new(Mutex::new(ContactLedger::default()));
        let ledger = contacts.clone();
        engine.on_contact_begin(Box::new(move |a, b| ledger.lock().record_pair(a, b)));

        let mut bodies = Vec::with_capacity(STATIC_BODY_COUNT + participants.len() + 1);
        for piece in &ARENA {
            let handle = engine.create_body(
                BodyDef::new(BodyKind::Static, piece.position).with_angle(piece.angle),
            );
            let shape = Shape::Box {
                half_extents: piece.half_extents,
            };
            engine.create_fixture(
                handle,
                FixtureDef::new(shape, FixtureRole::Arena).with_friction(piece.friction),
            );
            bodies.push(TrackedBody {
                handle,
                role: FixtureRole::Arena,
                display: shape,
            });
        }

        // Targeting indicator only, no fixture so nothing collides with it
        let aim_marker = engine.create_body(BodyDef::new(BodyKind::Static, AIM_MARKER_START));
        bodies.push(TrackedBody {
            handle: aim_marker,
            role: FixtureRole::AimMarker,
            display: Shape::rect(AIM_MARKER_SIZE / 2.0, AIM_MARKER_SIZE / 2.0),
        });

        let mut world = Self {
            engine,
            bodies,
            actors: BTreeMap::new(),
            aim_marker,
            marker_owner: None,
            contacts,
        };

        for (index, session) in participants.iter().enumerate() {
            world.spawn_actor(
                Controller::Session(*session),
                ACTOR_SPAWN,
                Some(PALETTE[index % PALETTE.len()]),
            );
        }
        if spawn_npc {
            world.spawn_actor(Controller::Npc, NPC_SPAWN, None);
        }

        info!(
            participants = participants.len(),
            npc = spawn_npc,
            bodies = world.bodies.len(),
            "Arena built"
        );
        world
    }

    fn spawn_actor(&mut self, controller: Controller, at: Vec2, color: Option<&'static str>) {
        let id = ActorId(self.actors.len() as u32);
        let role = match controller {
            Controller::Session(_) => FixtureRole::Actor(id),
            Controller::Npc => FixtureRole::Npc(id),
        };
        let shape = Shape::Box {
            half_extents: ACTOR_HALF_EXTENTS,
        };

        let body = self.engine.create_body(
            BodyDef::new(BodyKind::Dynamic, at)
                .with_damping(ACTOR_LINEAR_DAMPING, ACTOR_ANGULAR_DAMPING),
        );
        self.engine.create_fixture(
            body,
            FixtureDef::new(shape, role)
                .with_friction(ACTOR_FRICTION)
                .with_restitution(0.0),
        );
        self.track(body, role, shape);

        self.actors.insert(
            id,
            Actor {
                id,
                controller,
                body,
                color,
                health: INITIAL_HEALTH,
                facing: Facing::Left,
                aim_offset: 0.0,
                aim_point: AIM_MARKER_START,
                projectile: None,
            },
        );
        debug!(actor = id.0, ?controller, "Actor spawned");
    }

    pub(super) fn track(&mut self, handle: BodyHandle, role: FixtureRole, display: Shape) {
        self.bodies.push(TrackedBody {
            handle,
            role,
            display,
        });
    }

    /// Destroy a body in the engine and stop tracking it
    pub(super) fn untrack(&mut self, handle: BodyHandle) {
        self.engine.destroy_body(handle);
        self.bodies.retain(|b| b.handle != handle);
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub fn actor_for_session(&self, session: SessionId) -> Option<&Actor> {
        self.actors
            .values()
            .find(|a| a.controller == Controller::Session(session))
    }

    pub fn npc(&self) -> Option<&Actor> {
        self.actors.values().find(|a| a.is_npc())
    }

    /// Bodies that will appear in the next snapshot
    pub fn tracked_bodies(&self) -> &[TrackedBody] {
        &self.bodies
    }

    pub fn aim_marker(&self) -> BodyHandle {
        self.aim_marker
    }

    pub fn marker_owner(&self) -> Option<ActorId> {
        self.marker_owner
    }

    /// Park the marker on its owner's aim point. NPCs never own it.
    pub(super) fn place_aim_marker(&mut self) {
        let owner = self
            .marker_owner
            .and_then(|id| self.actors.get(&id))
            .or_else(|| self.actors.values().find(|a| !a.is_npc()));
        if let Some(point) = owner.map(|a| a.aim_point) {
            self.engine.set_position(self.aim_marker, point);
        }
    }

    pub fn engine(&self) -> &dyn PhysicsEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn PhysicsEngine {
        self.engine.as_mut()
    }

    /// Remove the actor bound to a session along with any live projectile
    pub fn remove_session_actor(&mut self, session: SessionId) -> bool {
        let Some(id) = self.actor_for_session(session).map(|a| a.id) else {
            return false;
        };
        if let Some(actor) = self.actors.remove(&id) {
            if let Some(projectile) = actor.projectile {
                self.untrack(projectile.body);
            }
            self.untrack(actor.body);
            info!(actor = id.0, session_id = %session, "Actor removed from arena");
        }
        if self.marker_owner == Some(id) {
            self.marker_owner = None;
        }
        true
    }

    /// Destroy every tracked body
    pub fn teardown(&mut self) {
        let count = self.bodies.len();
        for body in self.bodies.drain(..) {
            self.engine.destroy_body(body.handle);
        }
        self.actors.clear();
        self.marker_owner = None;
        *self.contacts.lock() = ContactLedger::default();
        debug!(bodies = count, "Arena torn down");
    }
}
