use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Cardinal facing of a portal window. The window plane is vertical; the
/// direction is the outward normal on the origin side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

pub const ALL_DIRECTIONS: [Direction; 4] = [
    Direction::North,
    Direction::East,
    Direction::South,
    Direction::West,
];

impl Direction {
    pub fn normal_ivec3(self) -> IVec3 {
        match self {
            Direction::North => IVec3::NEG_Z,
            Direction::East => IVec3::X,
            Direction::South => IVec3::Z,
            Direction::West => IVec3::NEG_X,
        }
    }

    pub fn normal_vec3(self) -> Vec3 {
        self.normal_ivec3().as_vec3()
    }

    /// Quarter turns about +Y needed to rotate a north-facing frame into
    /// this one.
    pub fn quarter_turns(self) -> u8 {
        match self {
            Direction::North => 0,
            Direction::East => 1,
            Direction::South => 2,
            Direction::West => 3,
        }
    }

    /// Quarter turns taking a frame facing `self` to one facing `to`.
    pub fn quarter_turns_to(self, to: Direction) -> u8 {
        (to.quarter_turns() + 4 - self.quarter_turns()) % 4
    }

    pub fn rotated(self, quarter_turns: u8) -> Direction {
        ALL_DIRECTIONS[((self.quarter_turns() + quarter_turns) % 4) as usize]
    }

    /// Maps a window-local offset (x across the window, y up, z depth) into
    /// a world-space offset. North/south windows lie on the world X axis,
    /// east/west windows on the world Z axis, so the swap exchanges x and z
    /// for the latter. The swap is an involution: applying it twice returns
    /// the input unchanged.
    pub fn swap_vector(self, local: Vec3) -> Vec3 {
        match self {
            Direction::North | Direction::South => local,
            Direction::East | Direction::West => Vec3::new(local.z, local.y, local.x),
        }
    }

    pub fn swap_ivec3(self, local: IVec3) -> IVec3 {
        match self {
            Direction::North | Direction::South => local,
            Direction::East | Direction::West => IVec3::new(local.z, local.y, local.x),
        }
    }

    pub fn storage_name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
        }
    }

    pub fn from_storage_name(name: &str) -> Option<Direction> {
        ALL_DIRECTIONS
            .into_iter()
            .find(|dir| dir.storage_name() == name)
    }
}

#[cfg(test)]
mod tests {
    use glam::{IVec3, Vec3};

    use super::{Direction, ALL_DIRECTIONS};

    #[test]
    fn swap_vector_is_an_involution() {
        let local = Vec3::new(1.5, 2.0, -0.5);
        for dir in ALL_DIRECTIONS {
            let swapped = dir.swap_vector(local);
            assert_eq!(dir.swap_vector(swapped), local);
        }

        let block = IVec3::new(3, -1, 7);
        for dir in ALL_DIRECTIONS {
            assert_eq!(dir.swap_ivec3(dir.swap_ivec3(block)), block);
        }
    }

    #[test]
    fn quarter_turns_compose_back_to_the_target_direction() {
        for from in ALL_DIRECTIONS {
            for to in ALL_DIRECTIONS {
                let turns = from.quarter_turns_to(to);
                assert_eq!(from.rotated(turns), to);
            }
        }
    }

    #[test]
    fn storage_names_round_trip() {
        for dir in ALL_DIRECTIONS {
            assert_eq!(Direction::from_storage_name(dir.storage_name()), Some(dir));
        }
        assert_eq!(Direction::from_storage_name("up"), None);
    }

    #[test]
    fn normals_are_unit_axis_vectors() {
        assert_eq!(Direction::North.normal_ivec3(), IVec3::new(0, 0, -1));
        assert_eq!(Direction::East.normal_ivec3(), IVec3::new(1, 0, 0));
        assert_eq!(Direction::South.normal_ivec3(), IVec3::new(0, 0, 1));
        assert_eq!(Direction::West.normal_ivec3(), IVec3::new(-1, 0, 0));
    }
}
