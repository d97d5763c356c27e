//! rapier2d-backed engine
//!
//! Wraps one rapier pipeline behind [`PhysicsEngine`]. Every collider carries
//! its [`FixtureRole`] in `user_data`, and collision-start events are turned
//! back into role pairs for the contact listeners once the step is over.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use glam::Vec2;
use parking_lot::Mutex;
use rapier2d::prelude::{
    ActiveCollisionTypes, ActiveEvents, CCDSolver, ColliderBuilder, ColliderHandle,
    ColliderSet, CollisionEvent, ContactPair, DefaultBroadPhase, EventHandler, ImpulseJointSet,
    IntegrationParameters, IslandManager, MultibodyJointSet, NarrowPhase, PhysicsPipeline, Real,
    RigidBody, RigidBodyBuilder, RigidBodyHandle, RigidBodySet, RigidBodyType, Vector,
};
use tracing::trace;

use crate::game::contact::{ActorId, FixtureRole};

use super::{
    BodyDef, BodyHandle, BodyKind, ContactListener, FixtureDef, PhysicsEngine, Pose, Shape,
};

/// Default world gravity (units per second squared)
pub const DEFAULT_GRAVITY: Vec2 = Vec2::new(0.0, -10.0);

const ROLE_TAG_SHIFT: u32 = 64;

fn encode_role(role: FixtureRole) -> u128 {
    let (tag, id): (u128, u32) = match role {
        FixtureRole::Arena => (1, 0),
        FixtureRole::Actor(id) => (2, id.0),
        FixtureRole::Npc(id) => (3, id.0),
        FixtureRole::Projectile { owner } => (4, owner.0),
        FixtureRole::AimMarker => (5, 0),
    };
    (tag << ROLE_TAG_SHIFT) | u128::from(id)
}

fn decode_role(data: u128) -> Option<FixtureRole> {
    let id = ActorId((data & u128::from(u32::MAX)) as u32);
    match data >> ROLE_TAG_SHIFT {
        1 => Some(FixtureRole::Arena),
        2 => Some(FixtureRole::Actor(id)),
        3 => Some(FixtureRole::Npc(id)),
        4 => Some(FixtureRole::Projectile { owner: id }),
        5 => Some(FixtureRole::AimMarker),
        _ => None,
    }
}

fn to_vector(v: Vec2) -> Vector<Real> {
    Vector::new(v.x, v.y)
}

fn to_vec2(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

/// Role pairs of colliders that started touching during the current step
#[derive(Default)]
struct ContactCollector {
    started: Mutex<Vec<(FixtureRole, FixtureRole)>>,
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if !event.started() {
            return;
        }
        let role = |handle: ColliderHandle| {
            colliders
                .get(handle)
                .and_then(|collider| decode_role(collider.user_data))
        };
        if let (Some(a), Some(b)) = (role(event.collider1()), role(event.collider2())) {
            self.started.lock().push((a, b));
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

/// Engine used by the room simulation
pub struct RapierWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    events: ContactCollector,
    handles: HashMap<BodyHandle, RigidBodyHandle>,
    next_handle: u32,
    /// Bodies with a user force pending for the next step
    forced: Vec<RigidBodyHandle>,
    listeners: Vec<ContactListener>,
}

impl RapierWorld {
    pub fn new(gravity: Vec2) -> Self {
        Self {
            gravity: to_vector(gravity),
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            events: ContactCollector::default(),
            handles: HashMap::new(),
            next_handle: 0,
            forced: Vec::new(),
            listeners: Vec::new(),
        }
    }

    fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.handles.get(&handle).and_then(|h| self.bodies.get(*h))
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        let inner = *self.handles.get(&handle)?;
        self.bodies.get_mut(inner)
    }
}

impl Default for RapierWorld {
    fn default() -> Self {
        Self::new(DEFAULT_GRAVITY)
    }
}

impl PhysicsEngine for RapierWorld {
    fn create_body(&mut self, def: BodyDef) -> BodyHandle {
        let builder = match def.kind {
            BodyKind::Static => RigidBodyBuilder::fixed(),
            // Actors stay upright and must never doze off between inputs
            BodyKind::Dynamic => RigidBodyBuilder::dynamic().lock_rotations().can_sleep(false),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_position_based(),
        };
        let body = builder
            .translation(to_vector(def.position))
            .rotation(def.angle)
            .linear_damping(def.linear_damping)
            .angular_damping(def.angular_damping)
            .build();

        let inner = self.bodies.insert(body);
        let handle = BodyHandle::from_raw(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(handle, inner);
        handle
    }

    fn create_fixture(&mut self, body: BodyHandle, def: FixtureDef) -> bool {
        let Some(kind) = self.body_kind(body) else {
            return false;
        };
        let Some(&inner) = self.handles.get(&body) else {
            return false;
        };

        // A zero-density fixture on a dynamic body weighs exactly one unit
        let density = if kind == BodyKind::Dynamic && def.density <= 0.0 {
            1.0 / def.shape.area()
        } else {
            def.density
        };
        let builder = match def.shape {
            Shape::Box { half_extents } => ColliderBuilder::cuboid(half_extents.x, half_extents.y),
            Shape::Circle { radius } => ColliderBuilder::ball(radius),
        };
        let collider = builder
            .density(density)
            .friction(def.friction)
            .restitution(def.restitution)
            .sensor(def.sensor)
            .user_data(encode_role(def.role))
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .active_collision_types(
                ActiveCollisionTypes::default() | ActiveCollisionTypes::KINEMATIC_FIXED,
            )
            .build();

        self.colliders
            .insert_with_parent(collider, inner, &mut self.bodies);
        if let Some(rb) = self.bodies.get_mut(inner) {
            rb.recompute_mass_properties_from_colliders(&self.colliders);
        }
        true
    }

    fn destroy_body(&mut self, body: BodyHandle) -> bool {
        let Some(inner) = self.handles.remove(&body) else {
            return false;
        };
        self.forced.retain(|h| *h != inner);
        self.bodies
            .remove(
                inner,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    fn apply_force(&mut self, body: BodyHandle, force: Vec2) {
        let Some(&inner) = self.handles.get(&body) else {
            return;
        };
        if let Some(rb) = self.bodies.get_mut(inner) {
            if rb.is_dynamic() {
                rb.add_force(to_vector(force), true);
                self.forced.push(inner);
            }
        }
    }

    fn apply_linear_impulse(&mut self, body: BodyHandle, impulse: Vec2) {
        if let Some(rb) = self.body_mut(body) {
            if rb.is_dynamic() {
                rb.apply_impulse(to_vector(impulse), true);
            }
        }
    }

    fn pose(&self, body: BodyHandle) -> Option<Pose> {
        self.body(body).map(|rb| Pose {
            position: to_vec2(rb.translation()),
            angle: rb.rotation().angle(),
        })
    }

    fn set_position(&mut self, body: BodyHandle, position: Vec2) {
        if let Some(rb) = self.body_mut(body) {
            rb.set_translation(to_vector(position), true);
        }
    }

    fn linear_velocity(&self, body: BodyHandle) -> Option<Vec2> {
        self.body(body).map(|rb| to_vec2(rb.linvel()))
    }

    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec2) {
        if let Some(rb) = self.body_mut(body) {
            if !rb.is_fixed() {
                rb.set_linvel(to_vector(velocity), true);
            }
        }
    }

    fn body_kind(&self, body: BodyHandle) -> Option<BodyKind> {
        self.body(body).map(|rb| match rb.body_type() {
            RigidBodyType::Fixed => BodyKind::Static,
            RigidBodyType::Dynamic => BodyKind::Dynamic,
            RigidBodyType::KinematicPositionBased | RigidBodyType::KinematicVelocityBased => {
                BodyKind::Kinematic
            }
        })
    }

    fn fixture_shapes(&self, body: BodyHandle) -> Vec<Shape> {
        let Some(rb) = self.body(body) else {
            return Vec::new();
        };
        rb.colliders()
            .iter()
            .filter_map(|handle| self.colliders.get(*handle))
            .filter_map(|collider| {
                let shape = collider.shape();
                if let Some(cuboid) = shape.as_cuboid() {
                    Some(Shape::Box {
                        half_extents: to_vec2(&cuboid.half_extents),
                    })
                } else {
                    shape.as_ball().map(|ball| Shape::Circle {
                        radius: ball.radius,
                    })
                }
            })
            .collect()
    }

    fn step(&mut self, dt: f32, velocity_iterations: u32, position_iterations: u32) {
        self.params.dt = dt;
        if let Some(iterations) = NonZeroUsize::new(velocity_iterations as usize) {
            self.params.num_solver_iterations = iterations;
        }
        // rapier has no separate position pass, its inner PGS loop takes that role
        self.params.num_internal_pgs_iterations = position_iterations.max(1) as usize;

        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &self.events,
        );

        // Forces act for exactly one step
        for inner in self.forced.drain(..) {
            if let Some(rb) = self.bodies.get_mut(inner) {
                rb.reset_forces(false);
            }
        }

        let started = std::mem::take(&mut *self.events.started.lock());
        for (a, b) in started {
            trace!(?a, ?b, "Contact begin");
            for listener in self.listeners.iter_mut() {
                (*listener)(a, b);
            }
        }
    }

    fn on_contact_begin(&mut self, listener: ContactListener) {
        self.listeners.push(listener);
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn floor(world: &mut RapierWorld) -> BodyHandle {
        let floor = world.create_body(BodyDef::new(BodyKind::Static, Vec2::new(0.0, -13.0)));
        world.create_fixture(
            floor,
            FixtureDef::new(Shape::rect(17.0, 0.25), FixtureRole::Arena).with_friction(0.6),
        );
        floor
    }

    fn actor(world: &mut RapierWorld, x: f32, y: f32) -> BodyHandle {
        let body = world.create_body(
            BodyDef::new(BodyKind::Dynamic, Vec2::new(x, y)).with_damping(0.5, 0.8),
        );
        world.create_fixture(
            body,
            FixtureDef::new(Shape::rect(0.3, 0.5), FixtureRole::Actor(ActorId(0)))
                .with_friction(0.1),
        );
        body
    }

    #[test]
    fn roles_survive_user_data() {
        let roles = [
            FixtureRole::Arena,
            FixtureRole::Actor(ActorId(3)),
            FixtureRole::Npc(ActorId(7)),
            FixtureRole::Projectile {
                owner: ActorId(u32::MAX),
            },
            FixtureRole::AimMarker,
        ];
        for role in roles {
            assert_eq!(decode_role(encode_role(role)), Some(role));
        }
        assert_eq!(decode_role(0), None);
    }

    #[test]
    fn dynamic_body_falls_under_gravity() {
        let mut world = RapierWorld::default();
        let body = actor(&mut world, 0.0, 2.0);
        world.step(DT, 8, 3);
        assert!(world.linear_velocity(body).unwrap().y < 0.0);
        assert!(world.pose(body).unwrap().position.y < 2.0);
    }

    #[test]
    fn actor_comes_to_rest_on_the_floor() {
        let mut world = RapierWorld::default();
        floor(&mut world);
        let body = actor(&mut world, 0.0, -12.0);
        for _ in 0..240 {
            world.step(DT, 8, 3);
        }
        let pose = world.pose(body).unwrap();
        assert!((pose.position.y - (-12.25)).abs() < 0.05, "y = {}", pose.position.y);
        assert!(world.linear_velocity(body).unwrap().y.abs() < 0.05);
        assert_eq!(pose.angle, 0.0);
    }

    #[test]
    fn zero_density_body_has_unit_mass() {
        let mut world = RapierWorld::new(Vec2::ZERO);
        let body = actor(&mut world, 0.0, 0.0);
        world.apply_linear_impulse(body, Vec2::new(12.0, 4.0));
        let v = world.linear_velocity(body).unwrap();
        assert!((v - Vec2::new(12.0, 4.0)).length() < 1e-4, "v = {v}");
    }

    #[test]
    fn forces_last_one_step() {
        let mut world = RapierWorld::new(Vec2::ZERO);
        let body = actor(&mut world, 0.0, 0.0);
        world.apply_force(body, Vec2::new(6.0, 0.0));
        world.step(DT, 8, 3);
        let pushed = world.linear_velocity(body).unwrap().x;
        assert!(pushed > 0.0);

        world.step(DT, 8, 3);
        // Only damping acts on the second step
        assert!(world.linear_velocity(body).unwrap().x < pushed);
    }

    #[test]
    fn kinematic_bodies_ignore_gravity_and_forces() {
        let mut world = RapierWorld::default();
        let body = world.create_body(BodyDef::new(BodyKind::Kinematic, Vec2::ZERO));
        world.apply_force(body, Vec2::new(5.0, 5.0));
        world.step(DT, 8, 3);
        assert_eq!(world.pose(body).unwrap().position, Vec2::ZERO);
        assert_eq!(world.body_kind(body), Some(BodyKind::Kinematic));
    }

    #[test]
    fn contact_begin_fires_once_per_touch() {
        let mut world = RapierWorld::new(Vec2::ZERO);
        floor(&mut world);
        let shot = world.create_body(BodyDef::new(BodyKind::Kinematic, Vec2::new(0.0, 5.0)));
        world.create_fixture(
            shot,
            FixtureDef::new(
                Shape::rect(0.02, 0.02),
                FixtureRole::Projectile { owner: ActorId(1) },
            )
            .with_sensor(true),
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        world.on_contact_begin(Box::new(move |a, b| sink.lock().push((a, b))));

        world.step(DT, 8, 3);
        assert!(seen.lock().is_empty());

        world.set_position(shot, Vec2::new(0.0, -12.8));
        world.step(DT, 8, 3);
        world.step(DT, 8, 3);
        assert_eq!(seen.lock().len(), 1);
        let (a, b) = seen.lock()[0];
        let mut roles = [a, b];
        roles.sort_by_key(|r| matches!(r, FixtureRole::Arena));
        assert_eq!(
            roles,
            [FixtureRole::Projectile { owner: ActorId(1) }, FixtureRole::Arena]
        );

        world.set_position(shot, Vec2::new(0.0, 5.0));
        world.step(DT, 8, 3);
        world.set_position(shot, Vec2::new(0.0, -12.8));
        world.step(DT, 8, 3);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn destroyed_bodies_are_gone() {
        let mut world = RapierWorld::default();
        let body = actor(&mut world, 0.0, 0.0);
        assert_eq!(world.body_count(), 1);
        assert_eq!(world.fixture_shapes(body), vec![Shape::rect(0.3, 0.5)]);
        assert!(world.destroy_body(body));
        assert!(!world.destroy_body(body));
        assert!(world.pose(body).is_none());
        assert!(world.fixture_shapes(body).is_empty());
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn overlapping_actors_are_pushed_apart() {
        let mut world = RapierWorld::new(Vec2::ZERO);
        let a = actor(&mut world, 0.0, 0.0);
        let b = actor(&mut world, 0.2, 0.0);
        for _ in 0..10 {
            world.step(DT, 8, 3);
        }
        let xa = world.pose(a).unwrap().position.x;
        let xb = world.pose(b).unwrap().position.x;
        assert!(xb - xa > 0.2, "gap = {}", xb - xa);
    }
}
