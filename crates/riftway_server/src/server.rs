use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{IVec3, UVec2, Vec3};
use tracing::{info, warn};

use riftway_core::jobs::JobPool;
use riftway_core::placement::{self, SpawnRequest};
use riftway_core::registry::{
    create_linked_portal, Observer, ObserverId, PortalKey, PortalRegistry, ViewUpdater,
};
use riftway_core::world::{EntitySource, WorldId};
use riftway_shared::direction::Direction;
use riftway_shared::material::{register_default_materials, MaterialRegistry};

use crate::config::ServerConfig;
use crate::entities::{WanderingEntities, WandererKind};
use crate::world::HostWorlds;

const STATS_INTERVAL_TICKS: u64 = 100;

pub struct Server {
    config: ServerConfig,
    worlds: HostWorlds,
    entities: WanderingEntities,
    materials: MaterialRegistry,
    registry: PortalRegistry,
    updater: ViewUpdater,
    observer: Observer,
    portal_keys: Option<(PortalKey, PortalKey)>,
    running: Arc<AtomicBool>,
    events_delivered: u64,
}

impl Server {
    pub fn new(config: ServerConfig, running: Arc<AtomicBool>) -> Self {
        let origin_world = WorldId(0);
        let mut world_ids = vec![origin_world];
        for link in &config.links {
            if !world_ids.contains(&link.destination_world) {
                world_ids.push(link.destination_world);
            }
        }

        let mut worlds = HostWorlds::new(
            &world_ids,
            config.ground_height,
            config.border_radius,
            config.pregenerated_chunk_radius,
        );
        let materials = register_default_materials();
        let mut registry = PortalRegistry::new();
        let updater =
            ViewUpdater::new(config.view.clone(), config.replica_id_seed).with_jobs(JobPool::default());

        let direction = Direction::from_storage_name(&config.portal_direction).unwrap_or_else(|| {
            warn!(
                "unknown portal direction '{}', defaulting to north",
                config.portal_direction
            );
            Direction::North
        });
        let request = SpawnRequest {
            origin_world,
            origin_bottom_left: IVec3::from_array(config.portal_bottom_left),
            direction,
            window_size: UVec2::new(config.portal_width, config.portal_height),
        };

        // The origin frame is "player-built"; linking then finds or builds
        // the exit side.
        placement::build_frame(
            &mut worlds,
            &materials,
            origin_world,
            request.origin_bottom_left,
            request.direction,
            request.window_size,
        );
        let portal_keys = create_linked_portal(
            &mut registry,
            &mut worlds,
            &materials,
            &config.links,
            &request,
            false,
            &config.view,
        );
        if portal_keys.is_none() {
            warn!("portal creation declined; running without a portal");
        }

        // A stationary demo observer a few blocks in front of the window.
        let origin_center =
            placement::window_center(request.origin_bottom_left, direction, request.window_size);
        let observer = Observer {
            id: ObserverId(1),
            world: origin_world,
            eye: origin_center + direction.normal_vec3() * 6.0 + Vec3::new(0.0, 0.2, 0.0),
        };

        let mut entities = WanderingEntities::new(config.replica_id_seed ^ 0x9E37_79B9);
        if let Some((out_key, _)) = portal_keys {
            if let Some(portal) = registry.get(out_key) {
                let dest = portal.dest();
                for (kind, offset) in [
                    (WandererKind::Drifter, Vec3::new(2.0, 0.0, 4.0)),
                    (WandererKind::Beast, Vec3::new(-3.0, 0.0, 5.0)),
                    (WandererKind::Beast, Vec3::new(4.0, 0.0, 7.0)),
                    (WandererKind::Lantern, Vec3::new(0.0, 1.0, 6.0)),
                ] {
                    let behind_window = dest.dir.normal_vec3() * -1.0 * offset.z
                        + Vec3::new(offset.x, offset.y, 0.0);
                    entities.spawn(dest.world, kind, dest.pos + behind_window);
                }
            }
        }

        Self {
            config,
            worlds,
            entities,
            materials,
            registry,
            updater,
            observer,
            portal_keys,
            running,
            events_delivered: 0,
        }
    }

    pub fn run(&mut self) {
        let tick_duration = Duration::from_millis(1000 / u64::from(self.config.tick_rate.max(1)));
        info!(
            "Starting Riftway reference host at {} ticks/s ({} portal halves, {} entities)",
            self.config.tick_rate,
            self.registry.len(),
            self.entities.len()
        );

        while self.running.load(Ordering::SeqCst) {
            let tick_start = Instant::now();

            self.tick(tick_duration.as_secs_f32());

            let elapsed = tick_start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            }
        }

        info!(
            "Shutting down after {} ticks, {} view events delivered",
            self.updater.current_tick(),
            self.events_delivered
        );
    }

    fn tick(&mut self, dt: f32) {
        self.entities.tick(dt);

        let observers = [self.observer];
        let delivered = self.updater.tick(
            &mut self.registry,
            &mut self.worlds,
            &self.entities,
            &self.materials,
            &observers,
        );
        for (_, events) in &delivered {
            self.events_delivered += events.len() as u64;
        }

        // Report entities that walked through the window; the demo host
        // only logs the mapped pose instead of moving anything.
        if let Some((out_key, _)) = self.portal_keys {
            if let Some(portal) = self.registry.get_mut(out_key) {
                for crosser in portal.take_window_crossers(&self.entities) {
                    if let Some(snapshot) = self.entities.snapshot(crosser) {
                        let through = portal.teleport_pose(
                            snapshot.position,
                            snapshot.velocity,
                            snapshot.yaw,
                            snapshot.pitch,
                        );
                        info!(
                            "entity {:?} crossed the window; destination pose {:?}",
                            crosser, through.position
                        );
                    }
                }
            }
        }

        let tick = self.updater.current_tick();
        if tick % STATS_INTERVAL_TICKS == 0 {
            let (blocks, loaded) = self
                .portal_keys
                .and_then(|(out_key, _)| self.registry.get(out_key))
                .map_or((0, 0), |portal| {
                    (
                        portal.current_blocks().len(),
                        self.worlds.force_loaded_count(portal.dest().world),
                    )
                });
            info!(
                "tick {tick}: {} mirrored blocks, {} sessions, {} force-loaded chunks, {} events so far",
                blocks,
                self.updater.session_count(),
                loaded,
                self.events_delivered
            );
        }
    }
}

pub fn run(config: ServerConfig, running: Arc<AtomicBool>) {
    let mut server = Server::new(config, running);
    server.run();
}
