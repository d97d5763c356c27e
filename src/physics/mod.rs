//! Rigid-body engine boundary
//!
//! The game layer only talks to physics through [`PhysicsEngine`]. Anything
//! that can create bodies and fixtures, push them around, step, and report
//! contact-begin events can sit behind it. [`RapierWorld`] wraps rapier2d and
//! is the engine the server ships with.

pub mod rapier;

pub use rapier::RapierWorld;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::game::contact::FixtureRole;

/// Opaque handle to a body owned by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(u32);

impl BodyHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// How the engine treats a body during a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyKind {
    /// Immovable, infinite mass
    Static,
    /// Moved by forces, impulses and contacts
    Dynamic,
    /// Moved only by explicit velocity or position writes
    Kinematic,
}

/// Collision shape in body-local space, centered on the body origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Box described by half extents
    Box { half_extents: Vec2 },
    Circle { radius: f32 },
}

impl Shape {
    pub fn rect(half_width: f32, half_height: f32) -> Self {
        Self::Box {
            half_extents: Vec2::new(half_width, half_height),
        }
    }

    pub fn area(&self) -> f32 {
        match *self {
            Shape::Box { half_extents } => 4.0 * half_extents.x * half_extents.y,
            Shape::Circle { radius } => std::f32::consts::PI * radius * radius,
        }
    }
}

/// Position and orientation of a body
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: Vec2,
    /// Radians, counter-clockwise
    pub angle: f32,
}

/// Body construction parameters
#[derive(Debug, Clone, Copy)]
pub struct BodyDef {
    pub kind: BodyKind,
    pub position: Vec2,
    pub angle: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl BodyDef {
    pub fn new(kind: BodyKind, position: Vec2) -> Self {
        Self {
            kind,
            position,
            angle: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
        }
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }
}

/// Fixture construction parameters
#[derive(Debug, Clone, Copy)]
pub struct FixtureDef {
    pub shape: Shape,
    /// Zero density on a dynamic body means unit mass
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    /// Reports contacts but never pushes anything
    pub sensor: bool,
    /// Gameplay payload handed back in contact callbacks
    pub role: FixtureRole,
}

impl FixtureDef {
    pub fn new(shape: Shape, role: FixtureRole) -> Self {
        Self {
            shape,
            density: 0.0,
            friction: 0.2,
            restitution: 0.0,
            sensor: false,
            role,
        }
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_sensor(mut self, sensor: bool) -> Self {
        self.sensor = sensor;
        self
    }
}

/// Callback fired once when two fixtures start touching
pub type ContactListener = Box<dyn FnMut(FixtureRole, FixtureRole) + Send>;

/// Capabilities the simulation needs from a 2D rigid-body engine
pub trait PhysicsEngine: Send {
    fn create_body(&mut self, def: BodyDef) -> BodyHandle;

    /// Attach a fixture. Returns false if the body does not exist.
    fn create_fixture(&mut self, body: BodyHandle, def: FixtureDef) -> bool;

    /// Remove a body and its fixtures. Returns false if it was already gone.
    fn destroy_body(&mut self, body: BodyHandle) -> bool;

    /// Accumulate a force at the center of mass, applied during the next step
    fn apply_force(&mut self, body: BodyHandle, force: Vec2);

    /// Change velocity immediately by `impulse / mass`
    fn apply_linear_impulse(&mut self, body: BodyHandle, impulse: Vec2);

    fn pose(&self, body: BodyHandle) -> Option<Pose>;

    fn set_position(&mut self, body: BodyHandle, position: Vec2);

    fn linear_velocity(&self, body: BodyHandle) -> Option<Vec2>;

    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec2);

    fn body_kind(&self, body: BodyHandle) -> Option<BodyKind>;

    /// Shapes of every fixture on the body, in attachment order
    fn fixture_shapes(&self, body: BodyHandle) -> Vec<Shape>;

    /// Advance the world by `dt` seconds
    fn step(&mut self, dt: f32, velocity_iterations: u32, position_iterations: u32);

    fn on_contact_begin(&mut self, listener: ContactListener);

    fn body_count(&self) -> usize;
}
