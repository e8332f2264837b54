use glam::Vec3;
use rustc_hash::FxHashMap;

use riftway_core::world::{EntityCapabilities, EntitySnapshot, EntitySource, WorldId};
use riftway_shared::equipment::{EquipmentState, ItemId, ItemStack};
use riftway_shared::protocol::EntityId;
use riftway_shared::transform::yaw_from_direction;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WandererKind {
    /// Player-like: living, can sleep, carries equipment.
    Drifter,
    /// Plain creature: living, bare.
    Beast,
    /// Wall decoration: hanging, never moves.
    Lantern,
}

impl WandererKind {
    fn capabilities(self) -> EntityCapabilities {
        match self {
            WandererKind::Drifter => {
                EntityCapabilities::LIVING | EntityCapabilities::HUMAN | EntityCapabilities::RESTING
            }
            WandererKind::Beast => EntityCapabilities::LIVING,
            WandererKind::Lantern => EntityCapabilities::HANGING,
        }
    }

    fn equipment(self) -> Option<EquipmentState> {
        match self {
            WandererKind::Drifter => {
                let mut equipment = EquipmentState::default();
                equipment.main_hand = Some(ItemStack {
                    item: ItemId::IRON_SWORD,
                    count: 1,
                });
                Some(equipment)
            }
            WandererKind::Beast | WandererKind::Lantern => None,
        }
    }

    fn speed(self) -> f32 {
        match self {
            WandererKind::Drifter => 1.6,
            WandererKind::Beast => 1.1,
            WandererKind::Lantern => 0.0,
        }
    }
}

struct Wanderer {
    world: WorldId,
    kind: WandererKind,
    position: Vec3,
    velocity: Vec3,
    yaw: f32,
    head_yaw: f32,
    retarget_timer: f32,
}

/// Minimal entity population for the demo host: a few creatures picking a
/// new heading every couple of seconds. Implements the entity enumeration
/// capability the view engine consumes.
pub struct WanderingEntities {
    entities: FxHashMap<EntityId, Wanderer>,
    next_id: u64,
    rng_state: u64,
}

impl WanderingEntities {
    pub fn new(seed: u64) -> Self {
        Self {
            entities: FxHashMap::default(),
            next_id: 1,
            rng_state: seed.max(1),
        }
    }

    pub fn spawn(&mut self, world: WorldId, kind: WandererKind, position: Vec3) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.insert(
            id,
            Wanderer {
                world,
                kind,
                position,
                velocity: Vec3::ZERO,
                yaw: 0.0,
                head_yaw: 0.0,
                retarget_timer: 0.0,
            },
        );
        id
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    fn next_rand(&mut self) -> u64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        x
    }

    fn rand_f32(&mut self) -> f32 {
        (self.next_rand() >> 40) as f32 / (1u64 << 24) as f32
    }

    pub fn tick(&mut self, dt: f32) {
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            let (kind, retarget) = {
                let wanderer = self.entities.get_mut(&id).expect("id collected above");
                wanderer.retarget_timer -= dt;
                (wanderer.kind, wanderer.retarget_timer <= 0.0)
            };
            if kind == WandererKind::Lantern {
                continue;
            }

            if retarget {
                let heading = self.rand_f32() * std::f32::consts::TAU;
                let pause = self.rand_f32() < 0.3;
                let delay = 1.5 + self.rand_f32() * 2.5;
                let speed = kind.speed();
                let wanderer = self.entities.get_mut(&id).expect("id collected above");
                wanderer.velocity = if pause {
                    Vec3::ZERO
                } else {
                    Vec3::new(heading.cos() * speed, 0.0, heading.sin() * speed)
                };
                wanderer.retarget_timer = delay;
            }

            let wanderer = self.entities.get_mut(&id).expect("id collected above");
            wanderer.position += wanderer.velocity * dt;
            if wanderer.velocity.length_squared() > 1.0e-4 {
                wanderer.yaw = yaw_from_direction(wanderer.velocity);
                wanderer.head_yaw = wanderer.yaw;
            }
        }
    }
}

impl EntitySource for WanderingEntities {
    fn entities_near(
        &self,
        world: WorldId,
        center: Vec3,
        radius_xz: f32,
        radius_y: f32,
    ) -> Vec<EntityId> {
        let mut found: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, wanderer)| {
                wanderer.world == world
                    && (wanderer.position.x - center.x).abs() <= radius_xz
                    && (wanderer.position.y - center.y).abs() <= radius_y
                    && (wanderer.position.z - center.z).abs() <= radius_xz
            })
            .map(|(id, _)| *id)
            .collect();
        found.sort();
        found
    }

    fn snapshot(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.entities.get(&id).map(|wanderer| EntitySnapshot {
            position: wanderer.position,
            velocity: wanderer.velocity,
            yaw: wanderer.yaw,
            pitch: 0.0,
            head_yaw: wanderer.head_yaw,
            capabilities: wanderer.kind.capabilities(),
            equipment: wanderer.kind.equipment(),
            passengers: Vec::new(),
            sleeping: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use riftway_core::world::{EntityCapabilities, EntitySource, WorldId};

    use super::{WanderingEntities, WandererKind};

    #[test]
    fn spawned_entities_are_enumerable_by_world_and_radius() {
        let mut entities = WanderingEntities::new(11);
        let near = entities.spawn(WorldId(0), WandererKind::Beast, Vec3::new(2.0, 64.0, 2.0));
        let far = entities.spawn(WorldId(0), WandererKind::Beast, Vec3::new(90.0, 64.0, 2.0));
        let elsewhere = entities.spawn(WorldId(1), WandererKind::Beast, Vec3::new(2.0, 64.0, 2.0));

        let found = entities.entities_near(WorldId(0), Vec3::new(0.0, 64.0, 0.0), 16.0, 8.0);
        assert_eq!(found, vec![near]);
        assert!(entities.snapshot(far).is_some());
        assert!(entities.snapshot(elsewhere).is_some());
    }

    #[test]
    fn lanterns_hang_still_while_beasts_wander() {
        let mut entities = WanderingEntities::new(1234);
        let beast = entities.spawn(WorldId(0), WandererKind::Beast, Vec3::ZERO);
        let lantern = entities.spawn(WorldId(0), WandererKind::Lantern, Vec3::new(5.0, 65.0, 0.0));

        for _ in 0..200 {
            entities.tick(0.05);
        }

        let lantern_snapshot = entities.snapshot(lantern).expect("lantern exists");
        assert_eq!(lantern_snapshot.position, Vec3::new(5.0, 65.0, 0.0));
        assert!(lantern_snapshot
            .capabilities
            .contains(EntityCapabilities::HANGING));

        let beast_snapshot = entities.snapshot(beast).expect("beast exists");
        assert!(beast_snapshot.capabilities.contains(EntityCapabilities::LIVING));
    }

    #[test]
    fn drifters_carry_equipment_and_beasts_do_not() {
        let mut entities = WanderingEntities::new(7);
        let drifter = entities.spawn(WorldId(0), WandererKind::Drifter, Vec3::ZERO);
        let beast = entities.spawn(WorldId(0), WandererKind::Beast, Vec3::ZERO);

        assert!(entities
            .snapshot(drifter)
            .expect("drifter exists")
            .equipment
            .is_some());
        assert!(entities
            .snapshot(beast)
            .expect("beast exists")
            .equipment
            .is_none());
    }
}
