use glam::{IVec3, Vec3};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

use riftway_shared::material::{MaterialId, MaterialRegistry};
use riftway_shared::protocol::ViewEvent;

use crate::config::ViewConfig;
use crate::jobs::JobPool;
use crate::placement::{self, SpawnRequest, WorldLink};
use crate::portal::{Portal, PortalPose};
use crate::replication::{EntityViewSession, ReplicaIdAllocator};
use crate::world::{BlockGrid, EntitySource, WorldId};

/// Portals are addressed by the block their window center falls in.
pub type PortalKey = (WorldId, IVec3);

pub fn portal_key(world: WorldId, pos: Vec3) -> PortalKey {
    (world, pos.floor().as_ivec3())
}

/// All registered portal halves. Each two-way link is two entries, one per
/// direction; removing either one tears down both.
#[derive(Default)]
pub struct PortalRegistry {
    portals: FxHashMap<PortalKey, Portal>,
}

impl PortalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, portal: Portal) -> PortalKey {
        let key = portal_key(portal.origin().world, portal.origin().pos);
        self.portals.insert(key, portal);
        key
    }

    pub fn insert_pair(&mut self, outbound: Portal, inbound: Portal) -> (PortalKey, PortalKey) {
        (self.insert(outbound), self.insert(inbound))
    }

    pub fn get(&self, key: PortalKey) -> Option<&Portal> {
        self.portals.get(&key)
    }

    pub fn get_mut(&mut self, key: PortalKey) -> Option<&mut Portal> {
        self.portals.get_mut(&key)
    }

    pub fn len(&self) -> usize {
        self.portals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PortalKey, &Portal)> {
        self.portals.iter()
    }

    /// Nearest portal an observer could be looking through, if any is
    /// within `max_distance` of them.
    pub fn closest_portal_key(
        &self,
        world: WorldId,
        pos: Vec3,
        max_distance: f32,
    ) -> Option<PortalKey> {
        let mut best: Option<(PortalKey, f32)> = None;
        for (key, portal) in &self.portals {
            if portal.origin().world != world {
                continue;
            }
            let distance = portal.origin().pos.distance(pos);
            if distance > max_distance {
                continue;
            }
            if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                best = Some((*key, distance));
            }
        }
        best.map(|(key, _)| key)
    }

    pub fn any_portal_within(&self, world: WorldId, pos: Vec3, distance: f32) -> bool {
        self.portals.values().any(|portal| {
            portal.origin().world == world && portal.origin().pos.distance(pos) < distance
        })
    }

    /// Whether both halves of the link through `key` still physically
    /// exist. A missing counterpart entry is not a defect; loaders may
    /// register one half at a time.
    pub fn pair_is_intact<G: BlockGrid + ?Sized>(&self, key: PortalKey, grid: &G) -> bool {
        let Some(portal) = self.get(key) else {
            return false;
        };
        if !portal.is_still_intact(grid) {
            return false;
        }
        match self.get(portal_key(portal.dest().world, portal.dest().pos)) {
            Some(counterpart) => counterpart.is_still_intact(grid),
            None => true,
        }
    }

    /// Removes a portal and its counterpart, clearing the window-center
    /// surface blocks so no orphaned portal surface is left standing.
    pub fn remove_pair<G: BlockGrid + ?Sized>(&mut self, key: PortalKey, grid: &mut G) {
        let Some(portal) = self.portals.remove(&key) else {
            return;
        };
        grid.set_block(key.0, key.1, MaterialId::AIR, true);

        let dest_key = portal_key(portal.dest().world, portal.dest().pos);
        if self.portals.remove(&dest_key).is_some() {
            grid.set_block(dest_key.0, dest_key.1, MaterialId::AIR, true);
        }
        info!(
            "removed portal pair {:?} -> {:?}",
            key.1, dest_key.1
        );
    }
}

/// Creates a full two-way link for a newly declared origin portal: runs the
/// placement search, builds and patches the exit frame, and registers both
/// halves. Returns `None` when no world link covers the origin world.
pub fn create_linked_portal<G: BlockGrid + ?Sized>(
    registry: &mut PortalRegistry,
    grid: &mut G,
    materials: &MaterialRegistry,
    links: &[WorldLink],
    request: &SpawnRequest,
    anchored: bool,
    config: &ViewConfig,
) -> Option<(PortalKey, PortalKey)> {
    let destination = placement::find_destination(grid, registry, materials, links, request, config)?;

    placement::build_frame(
        grid,
        materials,
        destination.world,
        destination.bottom_left,
        request.direction,
        request.window_size,
    );
    placement::fix_corners(
        grid,
        materials,
        destination.world,
        destination.bottom_left,
        request.direction,
        request.window_size,
    );

    let origin_pose = PortalPose {
        world: request.origin_world,
        pos: placement::window_center(
            request.origin_bottom_left,
            request.direction,
            request.window_size,
        ),
        dir: request.direction,
    };
    let dest_pose = PortalPose {
        world: destination.world,
        pos: placement::window_center(
            destination.bottom_left,
            request.direction,
            request.window_size,
        ),
        dir: request.direction,
    };

    let outbound = Portal::new(origin_pose, dest_pose, request.window_size, anchored, config);
    let inbound = Portal::new(dest_pose, origin_pose, request.window_size, anchored, config);
    info!(
        "linked portal {:?} in {:?} to {:?} in {:?}",
        origin_pose.pos, origin_pose.world, dest_pose.pos, dest_pose.world
    );
    Some(registry.insert_pair(outbound, inbound))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

/// One viewer the engine maintains a consistent partial view for.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Observer {
    pub id: ObserverId,
    pub world: WorldId,
    pub eye: Vec3,
}

/// Drives the whole view pipeline once per tick: picks each observer's
/// active portal, runs the portal's cache refreshes, updates the per
/// observer replica sessions, and tears down sessions whose portal or
/// observer went away. Broken portal pairs found along the way are removed.
pub struct ViewUpdater {
    config: ViewConfig,
    ids: ReplicaIdAllocator,
    sessions: FxHashMap<(ObserverId, PortalKey), EntityViewSession>,
    jobs: Option<JobPool>,
    tick: u64,
}

impl ViewUpdater {
    pub fn new(config: ViewConfig, id_seed: u64) -> Self {
        Self {
            config,
            ids: ReplicaIdAllocator::new(id_seed),
            sessions: FxHashMap::default(),
            jobs: None,
            tick: 0,
        }
    }

    /// Moves occlusion sampling onto a worker pool; everything else stays
    /// on the tick thread.
    pub fn with_jobs(mut self, pool: JobPool) -> Self {
        self.jobs = Some(pool);
        self
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn tick<G, E>(
        &mut self,
        registry: &mut PortalRegistry,
        grid: &mut G,
        entities: &E,
        materials: &MaterialRegistry,
        observers: &[Observer],
    ) -> Vec<(ObserverId, Vec<ViewEvent>)>
    where
        G: BlockGrid + Sync + ?Sized,
        E: EntitySource + ?Sized,
    {
        self.tick += 1;

        let mut active: FxHashSet<(ObserverId, PortalKey)> = FxHashSet::default();
        let mut broken: Vec<PortalKey> = Vec::new();

        for observer in observers {
            let Some(key) = registry.closest_portal_key(
                observer.world,
                observer.eye,
                self.config.portal_activation_distance,
            ) else {
                continue;
            };

            if !registry.pair_is_intact(key, grid) {
                if !broken.contains(&key) {
                    broken.push(key);
                }
                continue;
            }

            let portal = registry
                .get_mut(key)
                .expect("closest_portal_key returned an unregistered key");
            portal.update(
                self.tick,
                grid,
                entities,
                materials,
                &self.config,
                self.jobs.as_ref(),
            );

            let portal = registry
                .get(key)
                .expect("portal cannot vanish between update and session refresh");
            let session = self.sessions.entry((observer.id, key)).or_default();
            session.update(observer.eye, portal, entities, &mut self.ids, &self.config);
            active.insert((observer.id, key));
        }

        for key in broken {
            registry.remove_pair(key, grid);
        }

        // Sessions whose observer moved on or whose portal is gone still
        // owe their observer one final teardown event.
        let mut delivered: FxHashMap<ObserverId, Vec<ViewEvent>> = FxHashMap::default();
        let stale: Vec<(ObserverId, PortalKey)> = self
            .sessions
            .keys()
            .filter(|session_key| !active.contains(*session_key))
            .copied()
            .collect();
        for session_key in stale {
            if let Some(mut session) = self.sessions.remove(&session_key) {
                session.clear(&mut self.ids);
                let events = session.drain_events();
                if !events.is_empty() {
                    delivered.entry(session_key.0).or_default().extend(events);
                }
            }
        }

        for ((observer, _), session) in self.sessions.iter_mut() {
            let events = session.drain_events();
            if !events.is_empty() {
                delivered.entry(*observer).or_default().extend(events);
            }
        }

        let mut out: Vec<(ObserverId, Vec<ViewEvent>)> = delivered.into_iter().collect();
        out.sort_by_key(|(observer, _)| *observer);
        out
    }
}

#[cfg(test)]
mod tests {
    use glam::{IVec3, UVec2, Vec3};

    use riftway_shared::direction::Direction;
    use riftway_shared::material::{register_default_materials, MaterialId};
    use riftway_shared::protocol::{EntityId, ViewEvent};

    use crate::config::ViewConfig;
    use crate::placement::{SpawnRequest, WorldLink};
    use crate::portal::{Portal, PortalPose};
    use crate::test_support::{StaticEntities, TestWorld};
    use crate::world::{BlockGrid, EntityCapabilities, EntitySnapshot, WorldId};

    use super::{
        create_linked_portal, portal_key, Observer, ObserverId, PortalRegistry, ViewUpdater,
    };

    const ORIGIN_WORLD: WorldId = WorldId(0);
    const DEST_WORLD: WorldId = WorldId(1);

    fn anchored_pair(config: &ViewConfig) -> (Portal, Portal) {
        let origin = PortalPose {
            world: ORIGIN_WORLD,
            pos: Vec3::new(0.5, 65.5, 0.5),
            dir: Direction::North,
        };
        let dest = PortalPose {
            world: DEST_WORLD,
            pos: Vec3::new(100.5, 65.5, 0.5),
            dir: Direction::North,
        };
        (
            Portal::new(origin, dest, UVec2::new(2, 3), true, config),
            Portal::new(dest, origin, UVec2::new(2, 3), true, config),
        )
    }

    #[test]
    fn closest_portal_respects_world_and_distance() {
        let config = ViewConfig::default();
        let mut registry = PortalRegistry::new();
        let (outbound, inbound) = anchored_pair(&config);
        let (out_key, _) = registry.insert_pair(outbound, inbound);

        // In range in the right world.
        assert_eq!(
            registry.closest_portal_key(ORIGIN_WORLD, Vec3::new(3.0, 65.0, 0.0), 20.0),
            Some(out_key)
        );
        // Too far away.
        assert_eq!(
            registry.closest_portal_key(ORIGIN_WORLD, Vec3::new(60.0, 65.0, 0.0), 20.0),
            None
        );
        // Wrong world: the counterpart lives at the destination.
        assert_ne!(
            registry.closest_portal_key(DEST_WORLD, Vec3::new(100.0, 65.0, 0.0), 20.0),
            Some(out_key)
        );
    }

    #[test]
    fn removing_one_half_removes_the_counterpart() {
        let config = ViewConfig::default();
        let mut registry = PortalRegistry::new();
        let mut world = TestWorld::new();
        let (outbound, inbound) = anchored_pair(&config);
        let (out_key, in_key) = registry.insert_pair(outbound, inbound);
        assert_eq!(registry.len(), 2);

        registry.remove_pair(out_key, &mut world);
        assert!(registry.is_empty());
        assert!(registry.get(in_key).is_none());
        // Window-center blocks are cleared on both sides.
        assert_eq!(
            world.material_at(ORIGIN_WORLD, IVec3::new(0, 65, 0)),
            MaterialId::AIR
        );
        assert_eq!(
            world.material_at(DEST_WORLD, IVec3::new(100, 65, 0)),
            MaterialId::AIR
        );
    }

    #[test]
    fn create_linked_portal_registers_both_halves() {
        let config = ViewConfig::default();
        let materials = register_default_materials();
        let mut registry = PortalRegistry::new();
        let mut world = TestWorld::new();
        world.fill(
            DEST_WORLD,
            IVec3::new(-12, 64, -12),
            IVec3::new(12, 64, 12),
            MaterialId::STONE,
        );

        let links = [WorldLink {
            origin_world: ORIGIN_WORLD,
            destination_world: DEST_WORLD,
            rescale: 1.0,
            min_spawn_y: 60,
            max_spawn_y: 72,
        }];
        let request = SpawnRequest {
            origin_world: ORIGIN_WORLD,
            origin_bottom_left: IVec3::new(0, 64, 0),
            direction: Direction::North,
            window_size: UVec2::new(2, 3),
        };

        // The origin frame already stands (the player built and lit it);
        // linking only constructs the exit side.
        crate::placement::build_frame(
            &mut world,
            &materials,
            ORIGIN_WORLD,
            request.origin_bottom_left,
            request.direction,
            request.window_size,
        );

        let (out_key, in_key) = create_linked_portal(
            &mut registry,
            &mut world,
            &materials,
            &links,
            &request,
            false,
            &config,
        )
        .expect("configured link must produce a portal pair");

        assert_eq!(registry.len(), 2);
        let outbound = registry.get(out_key).expect("outbound half registered");
        let inbound = registry.get(in_key).expect("inbound half registered");
        assert_eq!(outbound.dest().pos, inbound.origin().pos);
        assert_eq!(inbound.dest().pos, outbound.origin().pos);

        // The exit frame got built: its window center carries portal
        // surface, which also makes the non-anchored pair intact.
        assert!(registry.pair_is_intact(in_key, &world));
    }

    #[test]
    fn updater_delivers_spawn_events_to_observers() {
        let config = ViewConfig::default();
        let materials = register_default_materials();
        let mut registry = PortalRegistry::new();
        let mut world = TestWorld::new();
        let mut entities = StaticEntities::default();

        let (outbound, inbound) = anchored_pair(&config);
        registry.insert_pair(outbound, inbound);

        entities.insert(
            DEST_WORLD,
            EntityId(7),
            EntitySnapshot {
                position: Vec3::new(100.5, 65.5, 3.5),
                capabilities: EntityCapabilities::LIVING,
                ..EntitySnapshot::default()
            },
        );

        let observer = Observer {
            id: ObserverId(1),
            world: ORIGIN_WORLD,
            eye: Vec3::new(0.5, 65.0, -4.0),
        };

        let mut updater = ViewUpdater::new(config, 0xFACADE);
        let delivered = updater.tick(&mut registry, &mut world, &entities, &materials, &[observer]);

        assert_eq!(delivered.len(), 1);
        let (to, events) = &delivered[0];
        assert_eq!(*to, ObserverId(1));
        assert!(events
            .iter()
            .any(|event| matches!(event, ViewEvent::SpawnReplica { .. })));
        assert_eq!(updater.session_count(), 1);

        // The observer walks out of activation range: the session is torn
        // down and the final destroy event still reaches them.
        let gone = Observer {
            id: ObserverId(1),
            world: ORIGIN_WORLD,
            eye: Vec3::new(500.0, 65.0, -4.0),
        };
        let delivered = updater.tick(&mut registry, &mut world, &entities, &materials, &[gone]);
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0]
            .1
            .iter()
            .any(|event| matches!(event, ViewEvent::DestroyReplicas { .. })));
        assert_eq!(updater.session_count(), 0);
    }

    #[test]
    fn broken_pairs_are_removed_during_the_tick() {
        let config = ViewConfig::default();
        let materials = register_default_materials();
        let mut registry = PortalRegistry::new();
        let mut world = TestWorld::new();
        let entities = StaticEntities::default();

        // Non-anchored pair with no surface block in the world: broken from
        // the first look.
        let origin = PortalPose {
            world: ORIGIN_WORLD,
            pos: Vec3::new(0.5, 65.5, 0.5),
            dir: Direction::North,
        };
        let dest = PortalPose {
            world: DEST_WORLD,
            pos: Vec3::new(100.5, 65.5, 0.5),
            dir: Direction::North,
        };
        let key = portal_key(ORIGIN_WORLD, origin.pos);
        registry.insert_pair(
            Portal::new(origin, dest, UVec2::new(2, 3), false, &config),
            Portal::new(dest, origin, UVec2::new(2, 3), false, &config),
        );
        assert!(!registry.pair_is_intact(key, &world));

        let observer = Observer {
            id: ObserverId(1),
            world: ORIGIN_WORLD,
            eye: Vec3::new(0.5, 65.0, -4.0),
        };
        let mut updater = ViewUpdater::new(config, 1);
        updater.tick(&mut registry, &mut world, &entities, &materials, &[observer]);

        assert!(registry.is_empty());
    }
}
