use glam::{IVec3, UVec2, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use riftway_shared::coords::{ChunkPos, CHUNK_SIZE};
use riftway_shared::direction::Direction;
use riftway_shared::material::{
    is_rift_surface, MaterialId, MaterialRegistry, CORNER_PATCH_MATERIAL, FRAME_MATERIAL,
};

use crate::config::ViewConfig;
use crate::registry::PortalRegistry;
use crate::world::{BlockGrid, WorldBorder, WorldId};

/// Half-width of the square neighborhood searched around the rescaled
/// target, both for existing frames and for natural spawn spots.
pub const SEARCH_RADIUS: i32 = 128;

/// A weathered frame may be missing up to this many border blocks and still
/// be recognized and reused.
pub const MAX_WRONG_FRAME_BLOCKS: u32 = 6;

/// Portals never spawn closer to the world border than this.
pub const BORDER_SAFETY_MARGIN: f32 = 3.0;

pub const WORLD_MAX_Y: i32 = 255;

/// Pairing of two worlds for portal travel: horizontal coordinates are
/// multiplied by `rescale` going origin -> destination, and new exit
/// portals only spawn inside the configured Y band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldLink {
    pub origin_world: WorldId,
    pub destination_world: WorldId,
    pub rescale: f32,
    pub min_spawn_y: i32,
    pub max_spawn_y: i32,
}

/// Where a new exit portal should be built. `bottom_left` is the lowest
/// corner of the frame rectangle, in frame-local "across" order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortalDestination {
    pub world: WorldId,
    pub bottom_left: IVec3,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpawnRequest {
    pub origin_world: WorldId,
    pub origin_bottom_left: IVec3,
    pub direction: Direction,
    pub window_size: UVec2,
}

/// Exact window-center position for a frame whose bottom-left corner sits
/// at `bottom_left`.
pub fn window_center(bottom_left: IVec3, direction: Direction, window_size: UVec2) -> Vec3 {
    bottom_left.as_vec3()
        + direction.swap_vector(Vec3::new(
            1.0 + window_size.x as f32 * 0.5,
            1.0 + window_size.y as f32 * 0.5,
            0.5,
        ))
}

/// Finds where the exit portal for `request` should go, preferring an
/// existing matching frame, then the nearest suitable natural spot, then
/// the clamped rescaled target itself. Returns `None` only when no world
/// link covers the origin world.
pub fn find_destination<G: BlockGrid + ?Sized>(
    grid: &mut G,
    registry: &PortalRegistry,
    materials: &MaterialRegistry,
    links: &[WorldLink],
    request: &SpawnRequest,
    config: &ViewConfig,
) -> Option<PortalDestination> {
    let Some(link) = links
        .iter()
        .find(|link| link.origin_world == request.origin_world)
    else {
        info!(
            "no world link configured for world {:?}; portal creation declined",
            request.origin_world
        );
        return None;
    };
    let world = link.destination_world;

    // Outer frame footprint, two blocks wider and taller than the window.
    let frame_size = Vec3::new(
        request.window_size.x as f32 + 2.0,
        request.window_size.y as f32 + 2.0,
        0.0,
    );

    // Horizontal coordinates rescale; height does not.
    let mut target = Vec3::new(
        request.origin_bottom_left.x as f32 * link.rescale,
        request.origin_bottom_left.y as f32,
        request.origin_bottom_left.z as f32 * link.rescale,
    );
    let border = grid.world_border(world);
    clamp_into_world(&mut target, link, frame_size, request.direction, border);
    let preferred = target.floor().as_ivec3();

    if let Some(existing) = find_existing_frame(grid, registry, world, preferred, request, config) {
        debug!(
            "reusing existing frame at {existing} for portal from {:?}",
            request.origin_bottom_left
        );
        return Some(PortalDestination {
            world,
            bottom_left: existing,
        });
    }

    let mut best: Option<IVec3> = None;
    let mut best_distance_sq = f32::INFINITY;
    for z in -SEARCH_RADIUS..SEARCH_RADIUS {
        for y in link.min_spawn_y..=link.max_spawn_y {
            for x in -SEARCH_RADIUS..SEARCH_RADIUS {
                let candidate = IVec3::new(preferred.x + x, y, preferred.z + z);
                let low = candidate.as_vec3();
                if !border.contains(low)
                    || !border.contains(low + request.direction.swap_vector(frame_size))
                {
                    continue;
                }

                // Suitability is only ever evaluated for candidates that
                // would improve on the best distance found so far.
                let distance_sq = preferred.as_vec3().distance_squared(low);
                if distance_sq >= best_distance_sq {
                    continue;
                }
                if is_suitable_spawn(grid, registry, materials, world, candidate, request, config) {
                    best = Some(candidate);
                    best_distance_sq = distance_sq;
                }
            }
        }
    }
    if let Some(found) = best {
        return Some(PortalDestination {
            world,
            bottom_left: found,
        });
    }

    warn!(
        "no suitable spawn location within {SEARCH_RADIUS} blocks of {preferred} in world {:?}; \
         using the clamped target itself",
        world
    );
    Some(PortalDestination {
        world,
        bottom_left: preferred,
    })
}

/// Clamps the rescaled target into the link's Y band and inside the world
/// border, leaving room for the whole frame on the high side.
fn clamp_into_world(
    target: &mut Vec3,
    link: &WorldLink,
    frame_size: Vec3,
    direction: Direction,
    border: WorldBorder,
) {
    target.y = target
        .y
        .min(link.max_spawn_y as f32 - frame_size.y)
        .max(link.min_spawn_y as f32);

    let radius = border.radius - BORDER_SAFETY_MARGIN;
    let low = border.center - Vec3::new(radius, 0.0, radius);
    let high = border.center + Vec3::new(radius, 0.0, radius) - direction.swap_vector(frame_size);
    target.x = target.x.min(high.x).max(low.x);
    target.z = target.z.min(high.z).max(low.z);
}

/// Scans already-generated chunks around the target for a matching frame,
/// keeping the nearest hit. Chunks are released again after scanning;
/// recognition must never force new terrain generation.
fn find_existing_frame<G: BlockGrid + ?Sized>(
    grid: &mut G,
    registry: &PortalRegistry,
    world: WorldId,
    preferred: IVec3,
    request: &SpawnRequest,
    config: &ViewConfig,
) -> Option<IVec3> {
    let reach = IVec3::new(SEARCH_RADIUS, 0, SEARCH_RADIUS);
    let mut closest: Option<IVec3> = None;
    let mut closest_distance_sq = f32::INFINITY;

    for chunk in ChunkPos::area(preferred - reach, preferred + reach) {
        if !grid.is_chunk_generated(world, chunk) {
            continue;
        }
        scan_chunk_for_frame(
            grid,
            registry,
            world,
            preferred,
            chunk,
            request,
            config,
            &mut closest,
            &mut closest_distance_sq,
        );
        grid.unload_chunk(world, chunk);
    }

    closest
}

#[allow(clippy::too_many_arguments)]
fn scan_chunk_for_frame<G: BlockGrid + ?Sized>(
    grid: &G,
    registry: &PortalRegistry,
    world: WorldId,
    preferred: IVec3,
    chunk: ChunkPos,
    request: &SpawnRequest,
    config: &ViewConfig,
    closest: &mut Option<IVec3>,
    closest_distance_sq: &mut f32,
) {
    let corner = chunk.block_corner();
    let max_y = WORLD_MAX_Y - 1 - request.window_size.y as i32;
    let right_one = request.direction.swap_ivec3(IVec3::new(1, 0, 0));

    for x in 0..CHUNK_SIZE {
        for z in 0..CHUNK_SIZE {
            for y in 0..max_y {
                let check = corner + IVec3::new(x, y, z);
                let distance_sq = preferred.as_vec3().distance_squared(check.as_vec3());
                if distance_sq >= *closest_distance_sq {
                    continue;
                }

                // The block beside the bottom-left corner is frame material
                // in any real frame; this one lookup rules out nearly every
                // position before the full rectangle walk.
                if grid.material_at(world, check + right_one) != FRAME_MATERIAL {
                    continue;
                }

                if is_existing_frame(grid, world, check, request.direction, request.window_size)
                    && !registry.any_portal_within(
                        world,
                        check.as_vec3(),
                        config.min_portal_spawn_distance,
                    )
                {
                    *closest = Some(check);
                    *closest_distance_sq = distance_sq;
                }
            }
        }
    }
}

/// Whether a frame rectangle already stands at `bottom_left`: the border
/// ring may be missing up to [`MAX_WRONG_FRAME_BLOCKS`] blocks, but any
/// foreign block inside the window disqualifies the spot outright.
pub fn is_existing_frame<G: BlockGrid + ?Sized>(
    grid: &G,
    world: WorldId,
    bottom_left: IVec3,
    direction: Direction,
    window_size: UVec2,
) -> bool {
    let mut wrong_blocks = 0u32;
    let max_x = window_size.x as i32 + 1;
    let max_y = window_size.y as i32 + 1;

    for y in 0..=max_y {
        for x in 0..=max_x {
            let pos = bottom_left + direction.swap_ivec3(IVec3::new(x, y, 0));
            let material = grid.material_at(world, pos);

            if x == 0 || x == max_x || y == 0 || y == max_y {
                if material != FRAME_MATERIAL {
                    wrong_blocks += 1;
                }
            } else if !(material == MaterialId::AIR || is_rift_surface(material)) {
                return false;
            }

            if wrong_blocks > MAX_WRONG_FRAME_BLOCKS {
                return false;
            }
        }
    }

    true
}

/// A suitable natural spot has a full-width solid ground row, a clear
/// column of non-solid, non-liquid blocks above it, and keeps its distance
/// from every registered portal.
pub fn is_suitable_spawn<G: BlockGrid + ?Sized>(
    grid: &G,
    registry: &PortalRegistry,
    materials: &MaterialRegistry,
    world: WorldId,
    bottom_left: IVec3,
    request: &SpawnRequest,
    config: &ViewConfig,
) -> bool {
    let max_x = request.window_size.x as i32 + 1;
    let max_y = request.window_size.y as i32 + 1;

    for x in 0..=max_x {
        let ground = bottom_left + request.direction.swap_ivec3(IVec3::new(x, 0, 0));
        if !materials.is_solid(grid.material_at(world, ground)) {
            return false;
        }

        for y in 1..=max_y {
            let above = grid.material_at(world, ground + IVec3::new(0, y, 0));
            if materials.is_solid(above) || materials.is_liquid(above) {
                return false;
            }
        }
    }

    !registry.any_portal_within(world, bottom_left.as_vec3(), config.min_portal_spawn_distance)
}

/// Forces the four outer corners of the frame solid, so the ring is closed
/// regardless of terrain.
pub fn fix_corners<G: BlockGrid + ?Sized>(
    grid: &mut G,
    materials: &MaterialRegistry,
    world: WorldId,
    bottom_left: IVec3,
    direction: Direction,
    window_size: UVec2,
) {
    let max_x = window_size.x as i32 + 1;
    let max_y = window_size.y as i32 + 1;

    for (x, y) in [(0, 0), (max_x, 0), (0, max_y), (max_x, max_y)] {
        let pos = bottom_left + direction.swap_ivec3(IVec3::new(x, y, 0));
        if !materials.is_occluding(grid.material_at(world, pos)) {
            grid.set_block(world, pos, CORNER_PATCH_MATERIAL, true);
        }
    }
}

/// Writes the frame ring and the oriented portal surface, plus standing
/// room on both sides of the window. Frame and surface writes suppress
/// physics notification: the host's validation would delete surface blocks
/// it considers unsupported before the portal is registered.
pub fn build_frame<G: BlockGrid + ?Sized>(
    grid: &mut G,
    materials: &MaterialRegistry,
    world: WorldId,
    bottom_left: IVec3,
    direction: Direction,
    window_size: UVec2,
) {
    let max_x = window_size.x as i32 + 1;
    let max_y = window_size.y as i32 + 1;
    let surface = match direction {
        Direction::North | Direction::South => MaterialId::RIFT_SURFACE,
        Direction::East | Direction::West => MaterialId::RIFT_SURFACE_EW,
    };

    for z in -1..=1 {
        for y in 0..=max_y {
            for x in 0..=max_x {
                let pos = bottom_left + direction.swap_ivec3(IVec3::new(x, y, z));

                if z != 0 {
                    // Standing room beside the window: patch missing ground
                    // under the opening, clear everything above it.
                    if y == 0 {
                        if x >= 1
                            && x <= window_size.x as i32
                            && !materials.is_solid(grid.material_at(world, pos))
                        {
                            grid.set_block(world, pos, FRAME_MATERIAL, true);
                        }
                    } else {
                        grid.set_block(world, pos, MaterialId::AIR, true);
                    }
                    continue;
                }

                if x == 0 || x == max_x || y == 0 || y == max_y {
                    grid.set_block(world, pos, FRAME_MATERIAL, false);
                } else {
                    grid.set_block(world, pos, surface, false);
                }
            }
        }
    }

    debug!(
        "built {}x{} portal frame at {bottom_left} facing {:?}",
        window_size.x, window_size.y, direction
    );
}
