use glam::{IVec3, Vec3};
use rustc_hash::{FxHashMap, FxHashSet};

use riftway_shared::coords::ChunkPos;
use riftway_shared::material::MaterialId;
use riftway_shared::protocol::EntityId;

use crate::world::{BlockGrid, EntitySnapshot, EntitySource, WorldBorder, WorldId};

const DEFAULT_BORDER_RADIUS: f32 = 1.0e6;

/// Sparse in-memory block store for tests: everything defaults to air and a
/// practically unlimited border.
#[derive(Default)]
pub(crate) struct TestWorld {
    blocks: FxHashMap<(WorldId, IVec3), MaterialId>,
    border_radius: FxHashMap<WorldId, f32>,
    generated: FxHashSet<(WorldId, ChunkPos)>,
    pub force_loaded: FxHashSet<(WorldId, ChunkPos)>,
    pub unloaded: Vec<(WorldId, ChunkPos)>,
    /// Positions written with physics notification enabled.
    pub notified_writes: Vec<(WorldId, IVec3)>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, world: WorldId, pos: IVec3, material: MaterialId) {
        self.generated.insert((world, ChunkPos::from_block(pos)));
        self.blocks.insert((world, pos), material);
    }

    pub fn fill(&mut self, world: WorldId, min: IVec3, max: IVec3, material: MaterialId) {
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    self.set(world, IVec3::new(x, y, z), material);
                }
            }
        }
    }

    pub fn set_border_radius(&mut self, world: WorldId, radius: f32) {
        self.border_radius.insert(world, radius);
    }
}

impl BlockGrid for TestWorld {
    fn material_at(&self, world: WorldId, pos: IVec3) -> MaterialId {
        self.blocks
            .get(&(world, pos))
            .copied()
            .unwrap_or(MaterialId::AIR)
    }

    fn set_block(&mut self, world: WorldId, pos: IVec3, material: MaterialId, notify_physics: bool) {
        if notify_physics {
            self.notified_writes.push((world, pos));
        }
        self.set(world, pos, material);
    }

    fn is_chunk_generated(&self, world: WorldId, chunk: ChunkPos) -> bool {
        self.generated.contains(&(world, chunk))
    }

    fn set_chunk_force_loaded(&mut self, world: WorldId, chunk: ChunkPos, keep: bool) {
        if keep {
            self.force_loaded.insert((world, chunk));
        } else {
            self.force_loaded.remove(&(world, chunk));
        }
    }

    fn unload_chunk(&mut self, world: WorldId, chunk: ChunkPos) {
        self.unloaded.push((world, chunk));
    }

    fn world_border(&self, world: WorldId) -> WorldBorder {
        WorldBorder {
            center: Vec3::ZERO,
            radius: self
                .border_radius
                .get(&world)
                .copied()
                .unwrap_or(DEFAULT_BORDER_RADIUS),
        }
    }
}

/// Entity source backed by a plain map; tests mutate snapshots directly
/// between ticks.
#[derive(Default)]
pub(crate) struct StaticEntities {
    entities: FxHashMap<EntityId, (WorldId, EntitySnapshot)>,
}

impl StaticEntities {
    pub fn insert(&mut self, world: WorldId, id: EntityId, snapshot: EntitySnapshot) {
        self.entities.insert(id, (world, snapshot));
    }

    pub fn update_position(&mut self, id: EntityId, position: Vec3) {
        if let Some((_, snapshot)) = self.entities.get_mut(&id) {
            snapshot.position = position;
        }
    }

    pub fn modify<F: FnOnce(&mut EntitySnapshot)>(&mut self, id: EntityId, edit: F) {
        if let Some((_, snapshot)) = self.entities.get_mut(&id) {
            edit(snapshot);
        }
    }
}

impl EntitySource for StaticEntities {
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
            .filter(|(_, (entity_world, snapshot))| {
                *entity_world == world
                    && (snapshot.position.x - center.x).abs() <= radius_xz
                    && (snapshot.position.y - center.y).abs() <= radius_y
                    && (snapshot.position.z - center.z).abs() <= radius_xz
            })
            .map(|(id, _)| *id)
            .collect();
        found.sort();
        found
    }

    fn snapshot(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.entities.get(&id).map(|(_, snapshot)| snapshot.clone())
    }
}
