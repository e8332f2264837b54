use glam::{IVec3, Vec3};

use riftway_shared::material::{rotate_oriented, MaterialId, MaterialRegistry};

use crate::config::ViewConfig;
use crate::jobs::JobPool;
use crate::portal::Portal;
use crate::world::BlockGrid;

/// One destination-side block to mirror onto the origin side. The material
/// is already reoriented for the origin facing; `edge` marks cells on the
/// outer shell of the scan volume, whose neighbors are partially unknown to
/// the consumer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VisibleBlock {
    pub origin_pos: IVec3,
    pub dest_pos: IVec3,
    pub material: MaterialId,
    pub edge: bool,
}

const FACE_NEIGHBOR_OFFSETS: [IVec3; 6] = [
    IVec3::new(1, 0, 0),
    IVec3::new(-1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(0, 0, -1),
];

/// The scanned box of cell offsets around the portal center, with the dense
/// array layout shared by both passes: z-major, then y, then x.
#[derive(Copy, Clone, Debug)]
struct ScanVolume {
    min_xz: i32,
    max_xz: i32,
    min_y: i32,
    max_y: i32,
}

impl ScanVolume {
    fn from_config(config: &ViewConfig) -> Self {
        Self {
            min_xz: config.min_xz,
            max_xz: config.max_xz,
            min_y: config.min_y,
            max_y: config.max_y,
        }
    }

    fn extent_xz(self) -> i32 {
        self.max_xz - self.min_xz + 1
    }

    fn extent_y(self) -> i32 {
        self.max_y - self.min_y + 1
    }

    fn len(self) -> usize {
        (self.extent_xz() * self.extent_y() * self.extent_xz()) as usize
    }

    fn cells_per_z_slab(self) -> usize {
        (self.extent_y() * self.extent_xz()) as usize
    }

    fn contains(self, offset: IVec3) -> bool {
        (self.min_xz..=self.max_xz).contains(&offset.x)
            && (self.min_y..=self.max_y).contains(&offset.y)
            && (self.min_xz..=self.max_xz).contains(&offset.z)
    }

    fn index(self, offset: IVec3) -> usize {
        debug_assert!(self.contains(offset), "offset {offset} outside scan volume");
        (((offset.z - self.min_xz) * self.extent_y() + (offset.y - self.min_y)) * self.extent_xz()
            + (offset.x - self.min_xz)) as usize
    }

    fn is_edge(self, offset: IVec3) -> bool {
        offset.x == self.min_xz
            || offset.x == self.max_xz
            || offset.z == self.min_xz
            || offset.z == self.max_xz
            || offset.y == self.min_y
            || offset.y == self.max_y
    }
}

/// Block-centered origin-side sample position for a cell offset, and the
/// destination block it maps to.
fn sample_positions(portal: &Portal, offset: IVec3) -> (Vec3, IVec3) {
    let origin_center = (portal.origin().pos + offset.as_vec3()).floor() + Vec3::splat(0.5);
    let dest_block = portal
        .move_origin_to_destination(origin_center)
        .floor()
        .as_ivec3();
    (origin_center, dest_block)
}

fn sample_slab<G: BlockGrid + ?Sized>(
    portal: &Portal,
    grid: &G,
    volume: ScanVolume,
    z: i32,
    slab: &mut [MaterialId],
) {
    let dest_world = portal.dest().world;
    let mut index = 0;
    for y in volume.min_y..=volume.max_y {
        for x in volume.min_xz..=volume.max_xz {
            let (_, dest_block) = sample_positions(portal, IVec3::new(x, y, z));
            slab[index] = grid.material_at(dest_world, dest_block);
            index += 1;
        }
    }
}

/// Recomputes the visible-block list for a portal: pass one samples the
/// destination material of every cell into a dense array, pass two keeps
/// the cells bordered by at least one non-occluding (or out-of-volume)
/// neighbor. Cells fully surrounded by occluding neighbors can never be
/// seen and are dropped, an over-approximation that trades rare diagonal
/// sightlines for skipping per-cell ray tracing.
pub fn scan<G: BlockGrid + ?Sized>(
    portal: &Portal,
    grid: &G,
    materials: &MaterialRegistry,
    config: &ViewConfig,
) -> Vec<VisibleBlock> {
    let volume = ScanVolume::from_config(config);
    let mut samples = vec![MaterialId::AIR; volume.len()];

    let slab_len = volume.cells_per_z_slab();
    for (slab_index, slab) in samples.chunks_mut(slab_len).enumerate() {
        let z = volume.min_xz + slab_index as i32;
        sample_slab(portal, grid, volume, z, slab);
    }

    collect_exposed(portal, materials, volume, &samples)
}

/// Same result as [`scan`], with the sampling pass spread across the job
/// pool by z slab. Only sampling leaves the tick thread; the exposure pass
/// and publication stay with the caller.
pub fn scan_parallel<G: BlockGrid + Sync + ?Sized>(
    portal: &Portal,
    grid: &G,
    materials: &MaterialRegistry,
    config: &ViewConfig,
    pool: &JobPool,
) -> Vec<VisibleBlock> {
    let volume = ScanVolume::from_config(config);
    let mut samples = vec![MaterialId::AIR; volume.len()];

    let slab_len = volume.cells_per_z_slab();
    pool.scope(|scope| {
        for (slab_index, slab) in samples.chunks_mut(slab_len).enumerate() {
            let z = volume.min_xz + slab_index as i32;
            scope.spawn(move |_| sample_slab(portal, grid, volume, z, slab));
        }
    });

    collect_exposed(portal, materials, volume, &samples)
}

fn collect_exposed(
    portal: &Portal,
    materials: &MaterialRegistry,
    volume: ScanVolume,
    samples: &[MaterialId],
) -> Vec<VisibleBlock> {
    let display_turns = portal.quarter_turns_to_origin();
    let mut visible = Vec::new();

    for z in volume.min_xz..=volume.max_xz {
        for y in volume.min_y..=volume.max_y {
            for x in volume.min_xz..=volume.max_xz {
                let offset = IVec3::new(x, y, z);
                let (origin_center, dest_block) = sample_positions(portal, offset);

                // The window plane itself belongs to the portal; its blocks
                // are never mirrored.
                if portal.position_inline_with_origin(origin_center) {
                    continue;
                }

                let mut exposed = false;
                for neighbor in FACE_NEIGHBOR_OFFSETS {
                    let neighbor_offset = offset + neighbor;
                    // Unknown terrain past the volume never counts as
                    // occluding, so boundary cells are always kept.
                    if !volume.contains(neighbor_offset) {
                        exposed = true;
                        break;
                    }
                    if !materials.is_occluding(samples[volume.index(neighbor_offset)]) {
                        exposed = true;
                        break;
                    }
                }
                if !exposed {
                    continue;
                }

                visible.push(VisibleBlock {
                    origin_pos: origin_center.floor().as_ivec3(),
                    dest_pos: dest_block,
                    material: rotate_oriented(samples[volume.index(offset)], display_turns),
                    edge: volume.is_edge(offset),
                });
            }
        }
    }

    visible
}
