use bitflags::bitflags;
use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use riftway_shared::coords::ChunkPos;
use riftway_shared::equipment::EquipmentState;
use riftway_shared::material::MaterialId;
use riftway_shared::protocol::EntityId;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldId(pub u32);

/// Square world border, matching the host convention: a center point and a
/// half-width applied on both horizontal axes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WorldBorder {
    pub center: Vec3,
    pub radius: f32,
}

impl WorldBorder {
    pub fn contains(&self, pos: Vec3) -> bool {
        (pos.x - self.center.x).abs() <= self.radius && (pos.z - self.center.z).abs() <= self.radius
    }
}

/// Read/write access to the host's voxel storage. Writes are narrow,
/// explicit mutations (frame construction, corner patching, portal
/// removal); everything else only samples.
pub trait BlockGrid {
    fn material_at(&self, world: WorldId, pos: IVec3) -> MaterialId;

    /// `notify_physics: false` bypasses the host's placement validation,
    /// which would otherwise delete freshly written portal-surface blocks.
    fn set_block(&mut self, world: WorldId, pos: IVec3, material: MaterialId, notify_physics: bool);

    fn is_chunk_generated(&self, world: WorldId, chunk: ChunkPos) -> bool;
    fn set_chunk_force_loaded(&mut self, world: WorldId, chunk: ChunkPos, keep: bool);
    fn unload_chunk(&mut self, world: WorldId, chunk: ChunkPos);
    fn world_border(&self, world: WorldId) -> WorldBorder;
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityCapabilities: u8 {
        /// Can carry equipment and take damage.
        const LIVING  = 0b0000_0001;
        /// Player-like; subject to sleep state tracking.
        const HUMAN   = 0b0000_0010;
        /// Wall-mounted, never moves freely; movement events are skipped.
        const HANGING = 0b0000_0100;
        /// Can occupy a bed.
        const RESTING = 0b0000_1000;
    }
}

/// Ground-truth state of one foreign entity, sampled fresh from the host
/// every refresh. Replicas never cache anything read from here beyond what
/// was already sent to observers.
#[derive(Clone, Debug, PartialEq)]
pub struct EntitySnapshot {
    pub position: Vec3,
    pub velocity: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub head_yaw: f32,
    pub capabilities: EntityCapabilities,
    /// `None` when the entity has no equipment capability.
    pub equipment: Option<EquipmentState>,
    pub passengers: Vec<EntityId>,
    pub sleeping: bool,
}

impl Default for EntitySnapshot {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            head_yaw: 0.0,
            capabilities: EntityCapabilities::empty(),
            equipment: None,
            passengers: Vec::new(),
            sleeping: false,
        }
    }
}

pub trait EntitySource {
    fn entities_near(
        &self,
        world: WorldId,
        center: Vec3,
        radius_xz: f32,
        radius_y: f32,
    ) -> Vec<EntityId>;

    fn snapshot(&self, id: EntityId) -> Option<EntitySnapshot>;
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::{EntityCapabilities, WorldBorder};

    #[test]
    fn border_containment_ignores_height() {
        let border = WorldBorder {
            center: Vec3::new(100.0, 0.0, -50.0),
            radius: 32.0,
        };

        assert!(border.contains(Vec3::new(100.0, 300.0, -50.0)));
        assert!(border.contains(Vec3::new(132.0, 0.0, -18.0)));
        assert!(!border.contains(Vec3::new(133.0, 0.0, -50.0)));
        assert!(!border.contains(Vec3::new(100.0, 0.0, -83.0)));
    }

    #[test]
    fn capability_flags_compose() {
        let player = EntityCapabilities::LIVING
            | EntityCapabilities::HUMAN
            | EntityCapabilities::RESTING;
        assert!(player.contains(EntityCapabilities::HUMAN));
        assert!(!player.contains(EntityCapabilities::HANGING));
    }
}
