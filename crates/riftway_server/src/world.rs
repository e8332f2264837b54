use glam::{IVec3, Vec3};
use rustc_hash::{FxHashMap, FxHashSet};

use riftway_core::world::{BlockGrid, WorldBorder, WorldId};
use riftway_shared::coords::ChunkPos;
use riftway_shared::material::MaterialId;

/// One flat demo world: procedural layers below the ground height, sparse
/// overrides for everything edited at runtime.
struct FlatWorld {
    ground_height: i32,
    border: WorldBorder,
    overrides: FxHashMap<IVec3, MaterialId>,
    generated: FxHashSet<ChunkPos>,
    force_loaded: FxHashSet<ChunkPos>,
}

impl FlatWorld {
    fn new(ground_height: i32, border_radius: f32, pregenerated_chunk_radius: i32) -> Self {
        let mut generated = FxHashSet::default();
        for x in -pregenerated_chunk_radius..=pregenerated_chunk_radius {
            for z in -pregenerated_chunk_radius..=pregenerated_chunk_radius {
                generated.insert(ChunkPos { x, z });
            }
        }

        Self {
            ground_height,
            border: WorldBorder {
                center: Vec3::ZERO,
                radius: border_radius,
            },
            overrides: FxHashMap::default(),
            generated,
            force_loaded: FxHashSet::default(),
        }
    }

    fn terrain_at(&self, pos: IVec3) -> MaterialId {
        if pos.y > self.ground_height {
            MaterialId::AIR
        } else if pos.y == self.ground_height {
            MaterialId::VERDANT_TURF
        } else if pos.y > self.ground_height - 4 {
            MaterialId::LOAM
        } else if pos.y > 0 {
            MaterialId::STONE
        } else {
            MaterialId::BEDSTONE
        }
    }
}

/// In-memory implementation of the host block-grid capability over a fixed
/// set of flat worlds. Stands in for the real voxel store the engine would
/// be adapted onto.
pub struct HostWorlds {
    worlds: FxHashMap<WorldId, FlatWorld>,
}

impl HostWorlds {
    pub fn new(
        world_ids: &[WorldId],
        ground_height: i32,
        border_radius: f32,
        pregenerated_chunk_radius: i32,
    ) -> Self {
        let mut worlds = FxHashMap::default();
        for id in world_ids {
            worlds.insert(
                *id,
                FlatWorld::new(ground_height, border_radius, pregenerated_chunk_radius),
            );
        }
        Self { worlds }
    }

    pub fn force_loaded_count(&self, world: WorldId) -> usize {
        self.worlds
            .get(&world)
            .map_or(0, |world| world.force_loaded.len())
    }
}

impl BlockGrid for HostWorlds {
    fn material_at(&self, world: WorldId, pos: IVec3) -> MaterialId {
        let Some(world) = self.worlds.get(&world) else {
            return MaterialId::AIR;
        };
        world
            .overrides
            .get(&pos)
            .copied()
            .unwrap_or_else(|| world.terrain_at(pos))
    }

    fn set_block(&mut self, world: WorldId, pos: IVec3, material: MaterialId, _notify_physics: bool) {
        let Some(world) = self.worlds.get_mut(&world) else {
            return;
        };
        world.generated.insert(ChunkPos::from_block(pos));
        world.overrides.insert(pos, material);
    }

    fn is_chunk_generated(&self, world: WorldId, chunk: ChunkPos) -> bool {
        self.worlds
            .get(&world)
            .is_some_and(|world| world.generated.contains(&chunk))
    }

    fn set_chunk_force_loaded(&mut self, world: WorldId, chunk: ChunkPos, keep: bool) {
        let Some(world) = self.worlds.get_mut(&world) else {
            return;
        };
        if keep {
            world.force_loaded.insert(chunk);
        } else {
            world.force_loaded.remove(&chunk);
        }
    }

    fn unload_chunk(&mut self, world: WorldId, chunk: ChunkPos) {
        if let Some(world) = self.worlds.get_mut(&world) {
            world.force_loaded.remove(&chunk);
        }
    }

    fn world_border(&self, world: WorldId) -> WorldBorder {
        self.worlds
            .get(&world)
            .map(|world| world.border)
            .unwrap_or(WorldBorder {
                center: Vec3::ZERO,
                radius: 0.0,
            })
    }
}
