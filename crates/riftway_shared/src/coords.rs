use glam::IVec3;
use serde::{Deserialize, Serialize};

pub const CHUNK_SIZE: i32 = 16;

/// Vertical column of blocks, 16x16 on the horizontal axes. Chunks are
/// columns rather than cubes because generation and force-loading in the
/// host world are keyed by column.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

fn div_floor(value: i32, divisor: i32) -> i32 {
    let mut q = value / divisor;
    if value % divisor < 0 {
        q -= 1;
    }
    q
}

impl ChunkPos {
    pub fn from_block(block: IVec3) -> ChunkPos {
        ChunkPos {
            x: div_floor(block.x, CHUNK_SIZE),
            z: div_floor(block.z, CHUNK_SIZE),
        }
    }

    /// World position of this chunk's lowest-x, lowest-z corner at y = 0.
    pub fn block_corner(self) -> IVec3 {
        IVec3::new(self.x * CHUNK_SIZE, 0, self.z * CHUNK_SIZE)
    }

    /// All chunk columns overlapping the horizontal rectangle spanned by two
    /// world positions (inclusive on both ends).
    pub fn area(low: IVec3, high: IVec3) -> Vec<ChunkPos> {
        let min = ChunkPos::from_block(low.min(high));
        let max = ChunkPos::from_block(low.max(high));

        let mut chunks = Vec::with_capacity(
            ((max.x - min.x + 1) * (max.z - min.z + 1)).max(0) as usize,
        );
        for x in min.x..=max.x {
            for z in min.z..=max.z {
                chunks.push(ChunkPos { x, z });
            }
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use glam::IVec3;

    use super::{ChunkPos, CHUNK_SIZE};

    #[test]
    fn from_block_floors_negative_coordinates() {
        assert_eq!(
            ChunkPos::from_block(IVec3::new(-1, 64, -1)),
            ChunkPos { x: -1, z: -1 }
        );
        assert_eq!(
            ChunkPos::from_block(IVec3::new(0, 0, 0)),
            ChunkPos { x: 0, z: 0 }
        );
        assert_eq!(
            ChunkPos::from_block(IVec3::new(CHUNK_SIZE, 5, CHUNK_SIZE * 2 + 3)),
            ChunkPos { x: 1, z: 2 }
        );
    }

    #[test]
    fn block_corner_round_trips_through_from_block() {
        let chunk = ChunkPos { x: -3, z: 7 };
        assert_eq!(ChunkPos::from_block(chunk.block_corner()), chunk);
    }

    #[test]
    fn area_covers_the_spanned_rectangle_inclusively() {
        let chunks = ChunkPos::area(IVec3::new(-1, 0, -1), IVec3::new(16, 0, 0));
        assert_eq!(chunks.len(), 3 * 2);
        assert!(chunks.contains(&ChunkPos { x: -1, z: -1 }));
        assert!(chunks.contains(&ChunkPos { x: 1, z: 0 }));
        assert!(!chunks.contains(&ChunkPos { x: 2, z: 0 }));

        // Order of the two corners must not matter.
        let swapped = ChunkPos::area(IVec3::new(16, 0, 0), IVec3::new(-1, 0, -1));
        assert_eq!(chunks, swapped);
    }
}
