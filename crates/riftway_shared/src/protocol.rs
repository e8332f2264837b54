use glam::{IVec3, Vec3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::equipment::EquipmentState;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Encodes an angle in degrees to the wire's 1/256-turn byte.
pub fn angle_to_byte(degrees: f32) -> u8 {
    ((degrees * 256.0 / 360.0) as i32).rem_euclid(256) as u8
}

/// One update in a per-observer view stream. Every position and rotation is
/// already transformed into the observer's (origin-side) frame before the
/// event is emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ViewEvent {
    SpawnReplica {
        id: EntityId,
        position: Vec3,
        yaw: u8,
        pitch: u8,
    },
    DestroyReplicas {
        ids: Vec<EntityId>,
    },
    MetadataRefresh {
        id: EntityId,
    },
    EquipmentUpdate {
        id: EntityId,
        equipment: EquipmentState,
    },
    HeadRotation {
        id: EntityId,
        head_yaw: u8,
    },
    MountLink {
        id: EntityId,
        passenger_ids: Vec<EntityId>,
    },
    EnterSleep {
        id: EntityId,
        bed_pos: IVec3,
    },
    ExitSleepAnimation {
        id: EntityId,
    },
    RelativeMove {
        id: EntityId,
        delta: Vec3,
    },
    RelativeMoveLook {
        id: EntityId,
        delta: Vec3,
        yaw: u8,
        pitch: u8,
    },
    Look {
        id: EntityId,
        yaw: u8,
        pitch: u8,
    },
    Teleport {
        id: EntityId,
        position: Vec3,
        yaw: u8,
        pitch: u8,
    },
}

impl ViewEvent {
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            ViewEvent::SpawnReplica { id, .. }
            | ViewEvent::MetadataRefresh { id }
            | ViewEvent::EquipmentUpdate { id, .. }
            | ViewEvent::HeadRotation { id, .. }
            | ViewEvent::MountLink { id, .. }
            | ViewEvent::EnterSleep { id, .. }
            | ViewEvent::ExitSleepAnimation { id }
            | ViewEvent::RelativeMove { id, .. }
            | ViewEvent::RelativeMoveLook { id, .. }
            | ViewEvent::Look { id, .. }
            | ViewEvent::Teleport { id, .. } => Some(*id),
            ViewEvent::DestroyReplicas { .. } => None,
        }
    }
}

pub fn encode<T: Serialize>(msg: &T) -> Vec<u8> {
    bincode::serialize(msg).expect("failed to encode view event payload")
}

pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(data)
}
