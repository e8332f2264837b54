use glam::Vec3;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use riftway_shared::protocol::{angle_to_byte, EntityId, ViewEvent};
use riftway_shared::transform::{
    direction_from_angles, pitch_from_direction, yaw_from_direction,
};

use crate::config::ViewConfig;
use crate::portal::Portal;
use crate::world::{EntityCapabilities, EntitySnapshot, EntitySource};

/// Replica ids live in the upper half of the id space so they can never
/// collide with a host-assigned entity id; a host moving "entity n" must
/// never move a replica instead.
const REPLICA_ID_BIT: u64 = 1 << 63;

/// xorshift64* stream for replica ids. Seeded once at startup and never
/// reseeded; inject a fixed seed to make replication deterministic in
/// tests.
pub struct ReplicaIdSource {
    state: u64,
}

impl ReplicaIdSource {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }
}

/// Draws replica ids and tracks which ones are currently alive, redrawing
/// on collision so two simultaneously visible replicas can never share an
/// id.
pub struct ReplicaIdAllocator {
    source: ReplicaIdSource,
    live: FxHashSet<u64>,
}

impl ReplicaIdAllocator {
    pub fn new(seed: u64) -> Self {
        Self {
            source: ReplicaIdSource::new(seed),
            live: FxHashSet::default(),
        }
    }

    pub fn allocate(&mut self) -> EntityId {
        loop {
            let id = self.source.next_u64() | REPLICA_ID_BIT;
            if self.live.insert(id) {
                return EntityId(id);
            }
        }
    }

    pub fn release(&mut self, id: EntityId) {
        self.live.remove(&id.0);
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

/// Shadow copy of one foreign entity as an observer currently sees it
/// through a portal. Every field is "what was last communicated"; ground
/// truth is re-read from the entity snapshot each tick and only the
/// difference is emitted.
pub struct ReplicaEntity {
    source: EntityId,
    replica_id: EntityId,
    location: Vec3,
    old_location: Option<Vec3>,
    rotation: Vec3,
    yaw_byte: u8,
    pitch_byte: u8,
    head_yaw_byte: u8,
    equipment: Option<riftway_shared::equipment::EquipmentState>,
    old_passengers: Vec<EntityId>,
    sleeping_last_tick: bool,
}

impl ReplicaEntity {
    fn new(source: EntityId, replica_id: EntityId, snapshot: &EntitySnapshot, portal: &Portal) -> Self {
        let rotation = portal.rotate_to_origin(direction_from_angles(snapshot.yaw, snapshot.pitch));
        let head_dir = portal.rotate_to_origin(direction_from_angles(snapshot.head_yaw, 0.0));
        Self {
            source,
            replica_id,
            location: portal.move_destination_to_origin(snapshot.position),
            old_location: None,
            rotation,
            yaw_byte: angle_to_byte(yaw_from_direction(rotation)),
            pitch_byte: angle_to_byte(pitch_from_direction(rotation)),
            head_yaw_byte: angle_to_byte(yaw_from_direction(head_dir)),
            equipment: None,
            old_passengers: Vec::new(),
            sleeping_last_tick: false,
        }
    }

    pub fn source(&self) -> EntityId {
        self.source
    }

    pub fn replica_id(&self) -> EntityId {
        self.replica_id
    }

    pub fn location(&self) -> Vec3 {
        self.location
    }

    pub fn yaw_byte(&self) -> u8 {
        self.yaw_byte
    }

    pub fn pitch_byte(&self) -> u8 {
        self.pitch_byte
    }

    /// One replication step: always refresh metadata, then diff equipment,
    /// head rotation, mount links and sleep state, then movement. Hanging
    /// entities never receive movement or rotation events.
    fn update(
        &mut self,
        snapshot: &EntitySnapshot,
        portal: &Portal,
        visible_replicas: &FxHashMap<EntityId, EntityId>,
        config: &ViewConfig,
        events: &mut Vec<ViewEvent>,
    ) {
        // Metadata covers the long tail of entity state and is cheap, so it
        // is refreshed unconditionally.
        events.push(ViewEvent::MetadataRefresh {
            id: self.replica_id,
        });

        // Entities without an equipment capability are skipped entirely.
        if let Some(sampled) = &snapshot.equipment {
            if self.equipment.as_ref() != Some(sampled) {
                events.push(ViewEvent::EquipmentUpdate {
                    id: self.replica_id,
                    equipment: sampled.clone(),
                });
                self.equipment = Some(sampled.clone());
            }
        }

        // Head swivels independently of the body; diff on the encoded byte
        // so sub-byte jitter emits nothing.
        let head_dir = portal.rotate_to_origin(direction_from_angles(snapshot.head_yaw, 0.0));
        let head_yaw_byte = angle_to_byte(yaw_from_direction(head_dir));
        if head_yaw_byte != self.head_yaw_byte {
            self.head_yaw_byte = head_yaw_byte;
            events.push(ViewEvent::HeadRotation {
                id: self.replica_id,
                head_yaw: head_yaw_byte,
            });
        }

        if snapshot.passengers != self.old_passengers {
            let passenger_ids: Vec<EntityId> = snapshot
                .passengers
                .iter()
                .filter_map(|passenger| visible_replicas.get(passenger).copied())
                .collect();
            if !passenger_ids.is_empty() {
                events.push(ViewEvent::MountLink {
                    id: self.replica_id,
                    passenger_ids,
                });
            }
            self.old_passengers = snapshot.passengers.clone();
        }

        if snapshot.capabilities.contains(EntityCapabilities::RESTING) {
            if snapshot.sleeping && !self.sleeping_last_tick {
                // Some host versions animate beds purely from metadata.
                if config.send_bed_events {
                    events.push(ViewEvent::EnterSleep {
                        id: self.replica_id,
                        bed_pos: self.location.floor().as_ivec3(),
                    });
                }
            } else if !snapshot.sleeping && self.sleeping_last_tick {
                events.push(ViewEvent::ExitSleepAnimation {
                    id: self.replica_id,
                });
            }
            self.sleeping_last_tick = snapshot.sleeping;
        }

        if snapshot.capabilities.contains(EntityCapabilities::HANGING) {
            return;
        }

        let rotation = portal.rotate_to_origin(direction_from_angles(snapshot.yaw, snapshot.pitch));
        let rotation_changed = rotation != self.rotation;
        self.rotation = rotation;
        self.yaw_byte = angle_to_byte(yaw_from_direction(rotation));
        self.pitch_byte = angle_to_byte(pitch_from_direction(rotation));

        self.old_location = Some(self.location);
        self.location = portal.move_destination_to_origin(snapshot.position);
        let delta = self
            .old_location
            .filter(|old| *old != self.location)
            .map(|old| self.location - old);

        if let Some(delta) = delta {
            if delta.abs().max_element() <= config.max_relative_move {
                if rotation_changed {
                    events.push(ViewEvent::RelativeMoveLook {
                        id: self.replica_id,
                        delta,
                        yaw: self.yaw_byte,
                        pitch: self.pitch_byte,
                    });
                } else {
                    events.push(ViewEvent::RelativeMove {
                        id: self.replica_id,
                        delta,
                    });
                }
            } else {
                // A jump past the relative-move bound only happens when the
                // source itself teleported; resend absolute coordinates.
                events.push(ViewEvent::Teleport {
                    id: self.replica_id,
                    position: self.location,
                    yaw: self.yaw_byte,
                    pitch: self.pitch_byte,
                });
            }
        } else if rotation_changed {
            events.push(ViewEvent::Look {
                id: self.replica_id,
                yaw: self.yaw_byte,
                pitch: self.pitch_byte,
            });
        }
    }
}

/// Replica bookkeeping for one observer looking through one portal.
/// Entities become visible when the segment from the observer's eye to
/// their mirrored position crosses the window; replicas are created lazily
/// on first visibility and torn down when it ends.
#[derive(Default)]
pub struct EntityViewSession {
    replicas: FxHashMap<EntityId, ReplicaEntity>,
    events: Vec<ViewEvent>,
}

impl EntityViewSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn update<E: EntitySource + ?Sized>(
        &mut self,
        observer_eye: Vec3,
        portal: &Portal,
        entities: &E,
        ids: &mut ReplicaIdAllocator,
        config: &ViewConfig,
    ) {
        let plane = portal.origin_plane();

        let mut visible_now: FxHashMap<EntityId, EntitySnapshot> = FxHashMap::default();
        for id in portal.nearby_destination() {
            let Some(snapshot) = entities.snapshot(*id) else {
                continue;
            };
            // Entities in line with the window plane would z-fight with the
            // portal surface; never show them.
            if portal.position_inline_with_destination(snapshot.position) {
                continue;
            }
            let mirrored = portal.move_destination_to_origin(snapshot.position);
            if plane.segment_crosses(observer_eye, mirrored) {
                visible_now.insert(*id, snapshot);
            }
        }

        let mut departed = Vec::new();
        self.replicas.retain(|source, replica| {
            if visible_now.contains_key(source) {
                true
            } else {
                departed.push(replica.replica_id());
                ids.release(replica.replica_id());
                false
            }
        });
        if !departed.is_empty() {
            trace!("{} replica(s) left visibility", departed.len());
            self.events.push(ViewEvent::DestroyReplicas { ids: departed });
        }

        for (source, snapshot) in &visible_now {
            if !self.replicas.contains_key(source) {
                let replica = ReplicaEntity::new(*source, ids.allocate(), snapshot, portal);
                self.events.push(ViewEvent::SpawnReplica {
                    id: replica.replica_id(),
                    position: replica.location(),
                    yaw: replica.yaw_byte(),
                    pitch: replica.pitch_byte(),
                });
                self.replicas.insert(*source, replica);
            }
        }

        // Passenger links reference replica ids, and only passengers that
        // are themselves visible may appear in them.
        let visible_replicas: FxHashMap<EntityId, EntityId> = self
            .replicas
            .iter()
            .map(|(source, replica)| (*source, replica.replica_id()))
            .collect();

        for (source, replica) in self.replicas.iter_mut() {
            let snapshot = &visible_now[source];
            replica.update(snapshot, portal, &visible_replicas, config, &mut self.events);
        }
    }

    /// Tears down every replica, emitting one destroy event. Used when the
    /// observer walks away or the portal is removed.
    pub fn clear(&mut self, ids: &mut ReplicaIdAllocator) {
        if self.replicas.is_empty() {
            return;
        }
        let departed: Vec<EntityId> = self
            .replicas
            .values()
            .map(|replica| replica.replica_id())
            .collect();
        for id in &departed {
            ids.release(*id);
        }
        self.replicas.clear();
        self.events.push(ViewEvent::DestroyReplicas { ids: departed });
    }

    pub fn drain_events(&mut self) -> Vec<ViewEvent> {
        std::mem::take(&mut self.events)
    }
}
