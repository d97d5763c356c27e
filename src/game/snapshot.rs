//! World-state snapshot building
//!
//! A snapshot is rebuilt from scratch every tick by walking the tracked body
//! list. Contact flags raised during the step are consumed here, before the
//! walk, so destroyed projectiles never reach the wire.

use glam::Vec2;
use serde::Serialize;
use tracing::{debug, trace};

use crate::physics::{BodyKind, Shape};

use super::contact::{ActorId, ContactLedger, FixtureRole};
use super::world::ArenaWorld;

/// Health lost by an NPC per projectile hit
pub const HIT_DAMAGE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl From<Vec2> for Point {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

/// Shape descriptor in world units (full width and height for boxes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum ShapeSnapshot {
    Box { width: f32, height: f32 },
    Circle { radius: f32 },
}

impl From<Shape> for ShapeSnapshot {
    fn from(shape: Shape) -> Self {
        match shape {
            Shape::Box { half_extents } => ShapeSnapshot::Box {
                width: half_extents.x * 2.0,
                height: half_extents.y * 2.0,
            },
            Shape::Circle { radius } => ShapeSnapshot::Circle { radius },
        }
    }
}

/// Gameplay tags a renderer needs, carried alongside the display shape
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(flatten)]
    pub shape: ShapeSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_worm: Option<bool>,
    #[serde(rename = "isNPC", skip_serializing_if = "Option::is_none")]
    pub is_npc: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_weapon_sight: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_projectile: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_num: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl UserData {
    fn plain(shape: ShapeSnapshot) -> Self {
        Self {
            shape,
            is_worm: None,
            is_npc: None,
            is_weapon_sight: None,
            is_projectile: None,
            health_num: None,
            color: None,
        }
    }
}

/// One body as sent in `world-state`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodySnapshot {
    /// Position in this snapshot, not an engine handle
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: BodyKind,
    pub position: Point,
    pub angle: f32,
    #[serde(rename = "userData")]
    pub user_data: UserData,
    pub fixtures: Vec<ShapeSnapshot>,
}

impl ArenaWorld {
    /// Apply the contact flags raised since the last snapshot: end the
    /// flagged projectiles and damage their NPC targets
    fn consume_contacts(&mut self) {
        let ledger = std::mem::take(&mut *self.contacts.lock());
        if ledger.is_empty() {
            return;
        }
        let ContactLedger { ended, hits } = ledger;
        for owner in ended {
            self.end_projectile(owner);
        }
        for target in hits {
            if let Some(npc) = self.actors.get_mut(&target) {
                npc.health = npc.health.saturating_sub(HIT_DAMAGE);
                debug!(actor = target.0, health = npc.health, "NPC hit");
            }
        }
    }

    /// Walk every tracked body and build this tick's snapshot. Projectiles
    /// are advanced (or destroyed) in the same pass.
    pub fn snapshot(&mut self) -> Vec<BodySnapshot> {
        self.consume_contacts();

        // Resolve projectiles first so removals do not disturb the walk
        let shots: Vec<ActorId> = self
            .bodies
            .iter()
            .filter_map(|b| match b.role {
                FixtureRole::Projectile { owner } => Some(owner),
                _ => None,
            })
            .collect();
        for owner in shots {
            let ended = self
                .actors
                .get(&owner)
                .and_then(|a| a.projectile)
                .map(|p| p.ended);
            match ended {
                Some(false) => {
                    self.advance_projectile(owner);
                }
                _ => {
                    self.destroy_projectile(owner);
                }
            }
        }

        let mut snapshot = Vec::with_capacity(self.bodies.len());
        for tracked in &self.bodies {
            let (Some(pose), Some(kind)) = (
                self.engine.pose(tracked.handle),
                self.engine.body_kind(tracked.handle),
            ) else {
                continue;
            };

            let mut user_data = UserData::plain(tracked.display.into());
            match tracked.role {
                FixtureRole::Arena => {}
                FixtureRole::AimMarker => user_data.is_weapon_sight = Some(true),
                FixtureRole::Projectile { .. } => user_data.is_projectile = Some(true),
                FixtureRole::Actor(id) | FixtureRole::Npc(id) => {
                    if let Some(actor) = self.actors.get(&id) {
                        if actor.is_npc() {
                            user_data.is_npc = Some(true);
                        } else {
                            user_data.is_worm = Some(true);
                        }
                        user_data.health_num = Some(actor.health);
                        user_data.color = actor.color.map(str::to_string);
                    }
                }
            }

            snapshot.push(BodySnapshot {
                id: snapshot.len() as u32,
                kind,
                position: pose.position.into(),
                angle: pose.angle,
                user_data,
                fixtures: self
                    .engine
                    .fixture_shapes(tracked.handle)
                    .into_iter()
                    .map(ShapeSnapshot::from)
                    .collect(),
            });
        }
        trace!(bodies = snapshot.len(), "Snapshot built");
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::tests::world_with;
    use crate::game::world::STATIC_BODY_COUNT;

    #[test]
    fn one_record_per_body_with_sequential_ids() {
        let (mut world, _) = world_with(2, true);
        let snapshot = world.snapshot();
        assert_eq!(snapshot.len(), STATIC_BODY_COUNT + 3);
        for (i, body) in snapshot.iter().enumerate() {
            assert_eq!(body.id, i as u32);
        }
        assert!(snapshot[..STATIC_BODY_COUNT]
            .iter()
            .all(|b| b.kind == BodyKind::Static));
    }

    #[test]
    fn boxes_report_full_extents() {
        let (mut world, _) = world_with(1, false);
        let snapshot = world.snapshot();
        assert_eq!(
            snapshot[0].fixtures,
            vec![ShapeSnapshot::Box {
                width: 34.0,
                height: 0.5
            }]
        );
        let actor = snapshot.last().unwrap();
        assert_eq!(
            actor.user_data.shape,
            ShapeSnapshot::Box {
                width: 0.6,
                height: 1.0
            }
        );
    }

    #[test]
    fn tags_are_carried_per_role() {
        let (mut world, _) = world_with(1, true);
        let snapshot = world.snapshot();
        let marker = &snapshot[STATIC_BODY_COUNT - 1];
        assert_eq!(marker.user_data.is_weapon_sight, Some(true));
        assert!(marker.fixtures.is_empty());

        let player = &snapshot[STATIC_BODY_COUNT];
        assert_eq!(player.user_data.is_worm, Some(true));
        assert_eq!(player.user_data.color.as_deref(), Some("#ff0000"));
        assert_eq!(player.user_data.health_num, Some(100));

        let npc = &snapshot[STATIC_BODY_COUNT + 1];
        assert_eq!(npc.user_data.is_npc, Some(true));
        assert!(npc.user_data.color.is_none());
    }

    #[test]
    fn wire_shape_matches_renderer_contract() {
        let (mut world, _) = world_with(1, true);
        let snapshot = world.snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();

        let floor = &json[0];
        assert_eq!(floor["type"], "static");
        assert_eq!(floor["userData"]["shape"], "box");
        assert_eq!(floor["userData"]["width"], 34.0);
        assert_eq!(floor["fixtures"][0]["shape"], "box");
        assert!(floor["userData"].get("isWorm").is_none());

        let npc = &json[STATIC_BODY_COUNT + 1];
        assert_eq!(npc["type"], "dynamic");
        assert_eq!(npc["userData"]["isNPC"], true);
        assert_eq!(npc["userData"]["healthNum"], 100);
        assert!(npc["position"]["x"].is_number());
    }

    #[test]
    fn live_projectile_reports_advanced_position() {
        let (mut world, sessions) = world_with(1, false);
        let id = world.actor_for_session(sessions[0]).unwrap().id;
        world.fire(id);
        let fired = world.actor(id).unwrap().projectile.unwrap();

        let snapshot = world.snapshot();
        let shot = snapshot.last().unwrap();
        assert_eq!(shot.kind, BodyKind::Kinematic);
        assert_eq!(shot.user_data.is_projectile, Some(true));
        let expected = fired.next_position();
        assert_eq!(shot.position, Point::from(expected));
    }

    #[test]
    fn npc_hit_costs_ten_and_removes_the_shot() {
        let (mut world, sessions) = world_with(1, true);
        let shooter = world.actor_for_session(sessions[0]).unwrap().id;
        let npc = world.npc().unwrap().id;
        world.fire(shooter);
        let before = world.snapshot().len();

        world.contacts.lock().record_pair(
            FixtureRole::Projectile { owner: shooter },
            FixtureRole::Npc(npc),
        );
        let after = world.snapshot();

        assert_eq!(after.len(), before - 1);
        assert_eq!(world.actor(npc).unwrap().health, 90);
        assert!(world.actor(shooter).unwrap().projectile.is_none());
        assert!(after.iter().all(|b| b.user_data.is_projectile.is_none()));
    }

    #[test]
    fn health_never_goes_negative() {
        let (mut world, sessions) = world_with(1, true);
        let shooter = world.actor_for_session(sessions[0]).unwrap().id;
        let npc = world.npc().unwrap().id;
        for _ in 0..12 {
            world.fire(shooter);
            world.contacts.lock().record_pair(
                FixtureRole::Npc(npc),
                FixtureRole::Projectile { owner: shooter },
            );
            world.snapshot();
        }
        assert_eq!(world.actor(npc).unwrap().health, 0);
        let snapshot = world.snapshot();
        assert_eq!(snapshot.last().unwrap().user_data.health_num, Some(0));
    }

    #[test]
    fn flags_are_cleared_after_one_pass() {
        let (mut world, sessions) = world_with(1, false);
        let shooter = world.actor_for_session(sessions[0]).unwrap().id;
        world.contacts.lock().record_pair(
            FixtureRole::Projectile { owner: shooter },
            FixtureRole::Arena,
        );
        world.snapshot();
        assert!(world.contacts.lock().is_empty());

        // A shot fired after the pass is unaffected by the stale flag
        world.fire(shooter);
        world.snapshot();
        assert!(world.actor(shooter).unwrap().projectile.is_some());
    }
}
