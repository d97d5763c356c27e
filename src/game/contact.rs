//! Contact classification and the per-tick contact ledger

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

/// Identifier of an actor inside one round's world, assigned in spawn order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u32);

/// Gameplay role attached to every fixture (and every tracked body)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureRole {
    /// Floor, walls and platforms
    Arena,
    /// Actor driven by a player session
    Actor(ActorId),
    /// Target actor not bound to any session
    Npc(ActorId),
    Projectile { owner: ActorId },
    AimMarker,
}

/// What a contact-begin event means for the game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEffect {
    None,
    DestroyProjectile { owner: ActorId },
    DestroyAndDamage { owner: ActorId, target: ActorId },
}

/// Classify a contact pair. When both fixtures are projectiles only the
/// first one's effect is reported; call again with the pair swapped for the
/// second.
pub fn classify_contact(a: FixtureRole, b: FixtureRole) -> ContactEffect {
    match (a, b) {
        (FixtureRole::Projectile { owner }, other) | (other, FixtureRole::Projectile { owner }) => {
            match other {
                // A shot never hits its own shooter
                FixtureRole::Actor(id) if id == owner => ContactEffect::None,
                FixtureRole::Npc(target) => ContactEffect::DestroyAndDamage { owner, target },
                FixtureRole::AimMarker => ContactEffect::None,
                _ => ContactEffect::DestroyProjectile { owner },
            }
        }
        _ => ContactEffect::None,
    }
}

/// Flags raised by contact callbacks during a step, consumed by the next
/// snapshot pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ContactLedger {
    /// Owners whose live projectile has ended
    pub ended: BTreeSet<ActorId>,
    /// One entry per damaging hit, by target
    pub hits: Vec<ActorId>,
}

impl ContactLedger {
    pub fn record(&mut self, effect: ContactEffect) {
        match effect {
            ContactEffect::None => {}
            ContactEffect::DestroyProjectile { owner } => {
                self.ended.insert(owner);
            }
            ContactEffect::DestroyAndDamage { owner, target } => {
                // A projectile that already ended this step cannot hit again
                if self.ended.insert(owner) {
                    self.hits.push(target);
                }
            }
        }
    }

    /// Record a raw contact pair, handling projectile-on-projectile
    pub fn record_pair(&mut self, a: FixtureRole, b: FixtureRole) {
        self.record(classify_contact(a, b));
        if matches!(
            (a, b),
            (FixtureRole::Projectile { .. }, FixtureRole::Projectile { .. })
        ) {
            self.record(classify_contact(b, a));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ended.is_empty() && self.hits.is_empty()
    }
}

/// Ledger shared between the engine's contact listener and the world
pub type SharedLedger = Arc<Mutex<ContactLedger>>;
