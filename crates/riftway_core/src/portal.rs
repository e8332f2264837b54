use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::{IVec3, UVec2, Vec3};
use rustc_hash::FxHashMap;
use tracing::debug;

use riftway_shared::coords::ChunkPos;
use riftway_shared::direction::Direction;
use riftway_shared::material::{is_rift_surface, MaterialRegistry};
use riftway_shared::plane::PortalPlane;
use riftway_shared::transform::{
    direction_from_angles, pitch_from_direction, yaw_from_direction, FrameTransform,
};
use riftway_shared::protocol::EntityId;
use serde::{Deserialize, Serialize};

use crate::config::ViewConfig;
use crate::jobs::JobPool;
use crate::occlusion::{self, VisibleBlock};
use crate::world::{BlockGrid, EntitySource, WorldId};

/// World-space placement of one side of a portal: which world, the exact
/// window center, and the outward facing.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PortalPose {
    pub world: WorldId,
    pub pos: Vec3,
    pub dir: Direction,
}

/// The persisted shape of a portal, exchanged with an external storage
/// collaborator. The storage format is the collaborator's concern; this is
/// only the field contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortalRecord {
    pub origin_world: WorldId,
    pub origin_pos: Vec3,
    pub origin_dir: Direction,
    pub dest_world: WorldId,
    pub dest_pos: Vec3,
    pub dest_dir: Direction,
    pub window_size: UVec2,
    pub anchored: bool,
}

/// Pose and velocity of an entity after walking through the portal,
/// expressed in the destination frame. The host applies it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TeleportPose {
    pub position: Vec3,
    pub velocity: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

/// One directed half of a two-way portal link. Holds the frame transforms,
/// the window geometry, and the per-tick caches of visible blocks and
/// nearby entities. Each instance owns its caches exclusively; the matching
/// reverse half is a separate instance.
pub struct Portal {
    origin: PortalPose,
    dest: PortalPose,
    origin_to_dest: FrameTransform,
    dest_to_origin: FrameTransform,
    plane_radius: Vec3,
    window_size: UVec2,
    anchored: bool,
    dest_chunks: Vec<ChunkPos>,

    current_blocks: Arc<Vec<VisibleBlock>>,
    refresh_in_flight: Arc<AtomicBool>,

    nearby_origin: FxHashMap<EntityId, Option<Vec3>>,
    nearby_dest: Vec<EntityId>,

    last_active: Option<u64>,
    ticks_since_activation: u64,
}

impl Portal {
    pub fn new(
        origin: PortalPose,
        dest: PortalPose,
        window_size: UVec2,
        anchored: bool,
        config: &ViewConfig,
    ) -> Self {
        let origin_to_dest = FrameTransform::between(origin.pos, origin.dir, dest.pos, dest.dir);
        let dest_to_origin = FrameTransform::between(dest.pos, dest.dir, origin.pos, origin.dir);

        // Half the window size plus slack, oriented so the depth axis lines
        // up with the window normal.
        let half_window = Vec3::new(
            window_size.x as f32 * 0.5,
            window_size.y as f32 * 0.5,
            0.0,
        );
        let plane_radius = origin.dir.swap_vector(half_window + config.collision_slack);

        let scan_reach = IVec3::new(config.max_xz, config.max_y, config.max_xz);
        let dest_block = dest.pos.floor().as_ivec3();
        let dest_chunks = ChunkPos::area(dest_block - scan_reach, dest_block + scan_reach);

        Self {
            origin,
            dest,
            origin_to_dest,
            dest_to_origin,
            plane_radius,
            window_size,
            anchored,
            dest_chunks,
            current_blocks: Arc::new(Vec::new()),
            refresh_in_flight: Arc::new(AtomicBool::new(false)),
            nearby_origin: FxHashMap::default(),
            nearby_dest: Vec::new(),
            last_active: None,
            ticks_since_activation: 0,
        }
    }

    pub fn from_record(record: &PortalRecord, config: &ViewConfig) -> Self {
        Self::new(
            PortalPose {
                world: record.origin_world,
                pos: record.origin_pos,
                dir: record.origin_dir,
            },
            PortalPose {
                world: record.dest_world,
                pos: record.dest_pos,
                dir: record.dest_dir,
            },
            record.window_size,
            record.anchored,
            config,
        )
    }

    pub fn to_record(&self) -> PortalRecord {
        PortalRecord {
            origin_world: self.origin.world,
            origin_pos: self.origin.pos,
            origin_dir: self.origin.dir,
            dest_world: self.dest.world,
            dest_pos: self.dest.pos,
            dest_dir: self.dest.dir,
            window_size: self.window_size,
            anchored: self.anchored,
        }
    }

    pub fn origin(&self) -> PortalPose {
        self.origin
    }

    pub fn dest(&self) -> PortalPose {
        self.dest
    }

    pub fn window_size(&self) -> UVec2 {
        self.window_size
    }

    pub fn anchored(&self) -> bool {
        self.anchored
    }

    pub fn plane_radius(&self) -> Vec3 {
        self.plane_radius
    }

    pub fn origin_plane(&self) -> PortalPlane {
        PortalPlane::new(self.origin.pos, self.origin.dir.normal_vec3(), self.plane_radius)
    }

    pub fn move_origin_to_destination(&self, point: Vec3) -> Vec3 {
        self.origin_to_dest.apply(point)
    }

    pub fn move_destination_to_origin(&self, point: Vec3) -> Vec3 {
        self.dest_to_origin.apply(point)
    }

    pub fn rotate_to_destination(&self, dir: Vec3) -> Vec3 {
        self.origin_to_dest.rotate(dir)
    }

    pub fn rotate_to_origin(&self, dir: Vec3) -> Vec3 {
        self.dest_to_origin.rotate(dir)
    }

    /// Quarter turns applied to oriented materials when displaying a
    /// destination-side block on the origin side.
    pub fn quarter_turns_to_origin(&self) -> u8 {
        self.dest_to_origin.quarter_turns()
    }

    /// Whether a position sits in the column of blocks making up the
    /// origin-side window plane. Those cells belong to the portal itself
    /// and are never mirrored.
    pub fn position_inline_with_origin(&self, pos: Vec3) -> bool {
        let swapped = self.origin.dir.swap_vector(pos);
        let center = self.origin.dir.swap_vector(self.origin.pos);
        swapped.z.floor() == center.z.floor()
    }

    pub fn position_inline_with_destination(&self, pos: Vec3) -> bool {
        let swapped = self.dest.dir.swap_vector(pos);
        let center = self.dest.dir.swap_vector(self.dest.pos);
        swapped.z == center.z
    }

    /// Maps the pose of an entity stepping through the window onto the
    /// destination side, rotating velocity and facing without translation.
    pub fn teleport_pose(&self, position: Vec3, velocity: Vec3, yaw: f32, pitch: f32) -> TeleportPose {
        let facing = self.rotate_to_destination(direction_from_angles(yaw, pitch));
        TeleportPose {
            position: self.move_origin_to_destination(position),
            velocity: self.rotate_to_destination(velocity),
            yaw: yaw_from_direction(facing),
            pitch: pitch_from_direction(facing),
        }
    }

    /// Drives activation bookkeeping and the cache refresh intervals for
    /// one tick. Re-running within the same tick is a no-op; a gap of more
    /// than one tick counts as reactivation and force-loads the destination
    /// chunks again.
    pub fn update<G, E>(
        &mut self,
        tick: u64,
        grid: &mut G,
        entities: &E,
        materials: &MaterialRegistry,
        config: &ViewConfig,
        jobs: Option<&JobPool>,
    ) where
        G: BlockGrid + Sync + ?Sized,
        E: EntitySource + ?Sized,
    {
        if self.last_active == Some(tick) {
            return;
        }

        let reactivated = match self.last_active {
            None => true,
            Some(last) => tick.saturating_sub(last) > 1,
        };
        if reactivated {
            for chunk in &self.dest_chunks {
                grid.set_chunk_force_loaded(self.dest.world, *chunk, true);
            }
            self.ticks_since_activation = 0;
            debug!(
                "portal at {:?} activated, force-loading {} destination chunks",
                self.origin.pos,
                self.dest_chunks.len()
            );
        }
        self.last_active = Some(tick);

        if self.ticks_since_activation % config.entity_check_interval == 0 {
            self.refresh_nearby_entities(entities, config);
        }

        if self.ticks_since_activation % config.block_update_interval == 0
            && self.try_begin_block_refresh()
        {
            let blocks = match jobs {
                Some(pool) => occlusion::scan_parallel(self, grid, materials, config, pool),
                None => occlusion::scan(self, grid, materials, config),
            };
            self.publish_blocks(blocks);
        }

        self.ticks_since_activation += 1;
    }

    fn refresh_nearby_entities<E: EntitySource + ?Sized>(&mut self, entities: &E, config: &ViewConfig) {
        let radius_xz = config.max_xz as f32;
        let radius_y = config.max_y as f32;

        let found =
            entities.entities_near(self.origin.world, self.origin.pos, radius_xz, radius_y);
        let mut refreshed = FxHashMap::default();
        for id in found {
            // Carry forward last-known positions of entities still nearby.
            let previous = self.nearby_origin.get(&id).copied().flatten();
            refreshed.insert(id, previous);
        }
        self.nearby_origin = refreshed;

        self.nearby_dest =
            entities.entities_near(self.dest.world, self.dest.pos, radius_xz, radius_y);
    }

    /// Records fresh origin-side positions and returns the entities whose
    /// movement since the previous record crossed the window, i.e. the
    /// candidates for teleporting through.
    pub fn take_window_crossers<E: EntitySource + ?Sized>(&mut self, entities: &E) -> Vec<EntityId> {
        let plane = self.origin_plane();
        let mut crossers = Vec::new();

        for (id, last_pos) in self.nearby_origin.iter_mut() {
            let Some(snapshot) = entities.snapshot(*id) else {
                continue;
            };
            if let Some(previous) = *last_pos {
                if previous != snapshot.position && plane.segment_crosses(previous, snapshot.position)
                {
                    crossers.push(*id);
                }
            }
            *last_pos = Some(snapshot.position);
        }

        crossers
    }

    pub fn nearby_destination(&self) -> &[EntityId] {
        &self.nearby_dest
    }

    pub fn destination_chunks(&self) -> &[ChunkPos] {
        &self.dest_chunks
    }

    pub fn current_blocks(&self) -> Arc<Vec<VisibleBlock>> {
        Arc::clone(&self.current_blocks)
    }

    /// Claims the single recompute slot. Returns false while a previous
    /// recompute has not yet published.
    pub fn try_begin_block_refresh(&self) -> bool {
        self.refresh_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Publishes a fully computed block list. Readers switch from the old
    /// list to the new one atomically; a half-built list is never visible.
    pub fn publish_blocks(&mut self, blocks: Vec<VisibleBlock>) {
        self.current_blocks = Arc::new(blocks);
        self.refresh_in_flight.store(false, Ordering::Release);
    }

    /// Whether this half still physically exists: anchored portals always
    /// do; frame-built portals die when the window-center block is no
    /// longer portal surface or the window leaves the world border.
    pub fn is_still_intact<G: BlockGrid + ?Sized>(&self, grid: &G) -> bool {
        if self.anchored {
            return true;
        }

        let center_block = self.origin.pos.floor().as_ivec3();
        if !is_rift_surface(grid.material_at(self.origin.world, center_block)) {
            return false;
        }

        let half_window = Vec3::new(
            self.window_size.x as f32 * 0.5,
            self.window_size.y as f32 * 0.5,
            0.5,
        );
        let reach = self.origin.dir.swap_vector(half_window);
        let border = grid.world_border(self.origin.world);
        border.contains(self.origin.pos - reach) && border.contains(self.origin.pos + reach)
    }
}

#[cfg(test)]
mod tests {
    use glam::{IVec3, UVec2, Vec3};

    use riftway_shared::direction::Direction;
    use riftway_shared::material::{register_default_materials, MaterialId};

    use crate::config::ViewConfig;
    use crate::test_support::{StaticEntities, TestWorld};
    use crate::world::{EntitySnapshot, WorldId};

    use super::{Portal, PortalPose, PortalRecord};
    use riftway_shared::protocol::EntityId;

    fn sample_portal(config: &ViewConfig) -> Portal {
        Portal::new(
            PortalPose {
                world: WorldId(0),
                pos: Vec3::new(0.0, 65.5, 0.5),
                dir: Direction::North,
            },
            PortalPose {
                world: WorldId(1),
                pos: Vec3::new(40.0, 33.5, -7.5),
                dir: Direction::East,
            },
            UVec2::new(2, 3),
            true,
            config,
        )
    }

    #[test]
    fn record_round_trip_preserves_every_field() {
        let config = ViewConfig::default();
        let portal = sample_portal(&config);

        let record = portal.to_record();
        let reloaded = Portal::from_record(&record, &config);

        assert_eq!(reloaded.to_record(), record);
        assert_eq!(reloaded.origin(), portal.origin());
        assert_eq!(reloaded.dest(), portal.dest());
        assert_eq!(reloaded.window_size(), portal.window_size());
        assert_eq!(reloaded.anchored(), portal.anchored());
        assert_eq!(reloaded.plane_radius(), portal.plane_radius());
    }

    #[test]
    fn record_survives_serde() {
        let config = ViewConfig::default();
        let record = sample_portal(&config).to_record();
        let encoded = riftway_shared::protocol::encode(&record);
        let decoded: PortalRecord =
            riftway_shared::protocol::decode(&encoded).expect("decode portal record");
        assert_eq!(decoded, record);
    }

    #[test]
    fn transforms_agree_with_the_pose_pair() {
        let config = ViewConfig::default();
        let portal = sample_portal(&config);

        assert_eq!(
            portal.move_origin_to_destination(portal.origin().pos),
            portal.dest().pos
        );
        let round_trip = portal
            .move_destination_to_origin(portal.move_origin_to_destination(Vec3::new(1.0, 66.0, 3.0)));
        assert!((round_trip - Vec3::new(1.0, 66.0, 3.0)).length() < 1.0e-4);
    }

    #[test]
    fn teleport_pose_rotates_velocity_without_translation() {
        let config = ViewConfig::default();
        let portal = sample_portal(&config);

        // North -> East is one quarter turn; velocity along -Z becomes +X.
        let through = portal.teleport_pose(
            portal.origin().pos,
            Vec3::new(0.0, 0.0, -2.0),
            0.0,
            0.0,
        );
        assert_eq!(through.position, portal.dest().pos);
        assert!((through.velocity - Vec3::new(2.0, 0.0, 0.0)).length() < 1.0e-5);
    }

    #[test]
    fn inline_positions_are_detected_on_the_window_plane() {
        let config = ViewConfig::default();
        let portal = sample_portal(&config);

        assert!(portal.position_inline_with_origin(Vec3::new(5.0, 70.0, 0.5)));
        assert!(!portal.position_inline_with_origin(Vec3::new(5.0, 70.0, 1.5)));

        // Destination faces east, so its window plane is an X slice.
        assert!(portal.position_inline_with_destination(Vec3::new(40.0, 30.0, 12.0)));
        assert!(!portal.position_inline_with_destination(Vec3::new(41.0, 30.0, 12.0)));
    }

    #[test]
    fn refresh_guard_admits_one_recompute_at_a_time() {
        let config = ViewConfig::default();
        let mut portal = sample_portal(&config);

        assert!(portal.try_begin_block_refresh());
        assert!(!portal.try_begin_block_refresh());
        portal.publish_blocks(Vec::new());
        assert!(portal.try_begin_block_refresh());
    }

    #[test]
    fn repeated_updates_within_one_tick_are_no_ops() {
        let config = ViewConfig::default();
        let materials = register_default_materials();
        let mut world = TestWorld::new();
        let entities = StaticEntities::default();
        let mut portal = sample_portal(&config);

        portal.update(1, &mut world, &entities, &materials, &config, None);
        let published = portal.current_blocks();

        portal.update(1, &mut world, &entities, &materials, &config, None);
        assert!(
            std::sync::Arc::ptr_eq(&published, &portal.current_blocks()),
            "a second update in the same tick must not rescan"
        );
    }

    #[test]
    fn anchored_portals_never_report_broken() {
        let config = ViewConfig::default();
        let world = TestWorld::new();
        let portal = sample_portal(&config);
        assert!(portal.is_still_intact(&world));
    }

    #[test]
    fn frame_built_portals_break_without_their_surface_block() {
        let config = ViewConfig::default();
        let mut world = TestWorld::new();

        let portal = Portal::new(
            PortalPose {
                world: WorldId(0),
                pos: Vec3::new(0.0, 65.5, 0.5),
                dir: Direction::North,
            },
            PortalPose {
                world: WorldId(1),
                pos: Vec3::new(40.0, 33.5, -7.5),
                dir: Direction::North,
            },
            UVec2::new(2, 3),
            false,
            &config,
        );

        assert!(!portal.is_still_intact(&world));

        world.set(WorldId(0), IVec3::new(0, 65, 0), MaterialId::RIFT_SURFACE);
        assert!(portal.is_still_intact(&world));

        // Shrink the border until the window pokes out.
        world.set_border_radius(WorldId(0), 0.5);
        assert!(!portal.is_still_intact(&world));
    }

    #[test]
    fn window_crossers_need_a_recorded_previous_position() {
        let config = ViewConfig::default();
        let mut portal = sample_portal(&config);
        let materials = register_default_materials();
        let mut world = TestWorld::new();

        let walker = EntityId(9);
        let mut entities = StaticEntities::default();
        entities.insert(
            WorldId(0),
            walker,
            EntitySnapshot {
                position: Vec3::new(0.0, 65.5, -2.0),
                ..EntitySnapshot::default()
            },
        );

        portal.update(1, &mut world, &entities, &materials, &config, None);

        // Activation force-loads the destination chunks.
        assert!(!world.force_loaded.is_empty());

        // First pass only records positions.
        assert!(portal.take_window_crossers(&entities).is_empty());

        // Step through the window plane.
        entities.update_position(walker, Vec3::new(0.0, 65.5, 2.0));
        assert_eq!(portal.take_window_crossers(&entities), vec![walker]);

        // No further movement, no further crossing.
        assert!(portal.take_window_crossers(&entities).is_empty());
    }
}
