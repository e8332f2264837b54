use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Opaque handle into the host's material catalog. The engine only ever
/// inspects materials through `MaterialRegistry` predicates, never by id
/// arithmetic, except for the frame/surface constants it writes itself.
#[repr(transparent)]
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Pod,
    Zeroable,
)]
pub struct MaterialId(pub u16);

impl MaterialId {
    pub const AIR: Self = Self(0);
    pub const BEDSTONE: Self = Self(1);
    pub const STONE: Self = Self(2);
    pub const LOAM: Self = Self(3);
    pub const VERDANT_TURF: Self = Self(4);
    pub const DUNE_SAND: Self = Self(5);
    pub const GRAVEL_BED: Self = Self(6);
    pub const TIMBER_LOG: Self = Self(7);
    pub const HEWN_PLANK: Self = Self(8);
    pub const CANOPY_LEAVES: Self = Self(9);
    pub const CRYSTAL_PANE: Self = Self(10);
    pub const STILL_WATER: Self = Self(11);
    pub const LAVA_SOURCE: Self = Self(12);
    pub const OBSIDIAN: Self = Self(13);
    pub const RIFT_SURFACE: Self = Self(14);
    pub const RIFT_SURFACE_EW: Self = Self(15);
    pub const TORCH: Self = Self(16);
    pub const STONE_STAIRS_NORTH: Self = Self(17);
    pub const STONE_STAIRS_EAST: Self = Self(18);
    pub const STONE_STAIRS_SOUTH: Self = Self(19);
    pub const STONE_STAIRS_WEST: Self = Self(20);
    pub const LADDER_NORTH: Self = Self(21);
    pub const LADDER_EAST: Self = Self(22);
    pub const LADDER_SOUTH: Self = Self(23);
    pub const LADDER_WEST: Self = Self(24);
    pub const SNOWCAP: Self = Self(25);
    pub const ICE: Self = Self(26);
    pub const MOSS_BLOCK: Self = Self(27);
    pub const RUBBLESTONE: Self = Self(28);
    pub const CLAY_DEPOSIT: Self = Self(29);
}

/// The frame ring written around a constructed portal window.
pub const FRAME_MATERIAL: MaterialId = MaterialId::OBSIDIAN;

/// The filler written where a frame corner fails the solidity check.
pub const CORNER_PATCH_MATERIAL: MaterialId = MaterialId::STONE;

pub fn is_rift_surface(material: MaterialId) -> bool {
    material == MaterialId::RIFT_SURFACE || material == MaterialId::RIFT_SURFACE_EW
}

pub fn is_stairs(material: MaterialId) -> bool {
    (MaterialId::STONE_STAIRS_NORTH.0..=MaterialId::STONE_STAIRS_WEST.0).contains(&material.0)
}

pub fn is_ladder(material: MaterialId) -> bool {
    (MaterialId::LADDER_NORTH.0..=MaterialId::LADDER_WEST.0).contains(&material.0)
}

/// Reorients a direction-carrying material by quarter turns about +Y.
/// Materials with no facing come back unchanged. Mirrored blocks keep their
/// appearance consistent when displayed through a rotated portal frame.
pub fn rotate_oriented(material: MaterialId, quarter_turns: u8) -> MaterialId {
    let turns = u16::from(quarter_turns % 4);
    if is_stairs(material) {
        let facing = material.0 - MaterialId::STONE_STAIRS_NORTH.0;
        return MaterialId(MaterialId::STONE_STAIRS_NORTH.0 + (facing + turns) % 4);
    }
    if is_ladder(material) {
        let facing = material.0 - MaterialId::LADDER_NORTH.0;
        return MaterialId(MaterialId::LADDER_NORTH.0 + (facing + turns) % 4);
    }
    if is_rift_surface(material) && turns % 2 == 1 {
        return if material == MaterialId::RIFT_SURFACE {
            MaterialId::RIFT_SURFACE_EW
        } else {
            MaterialId::RIFT_SURFACE
        };
    }
    material
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterialProperties {
    pub name: String,
    pub solid: bool,
    pub occluding: bool,
    pub liquid: bool,
}

#[derive(Default, Debug, Clone)]
pub struct MaterialRegistry {
    properties: Vec<MaterialProperties>,
    by_name: HashMap<String, MaterialId>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self {
            properties: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn register(&mut self, props: MaterialProperties) -> MaterialId {
        if let Some(existing) = self.by_name.get(props.name.as_str()) {
            return *existing;
        }

        let next_index = self.properties.len();
        let id = MaterialId(
            u16::try_from(next_index)
                .expect("material registry exceeded MaterialId capacity (u16::MAX)"),
        );

        self.by_name.insert(props.name.clone(), id);
        self.properties.push(props);
        id
    }

    pub fn get_properties(&self, id: MaterialId) -> &MaterialProperties {
        self.properties
            .get(id.0 as usize)
            .or_else(|| self.properties.get(MaterialId::AIR.0 as usize))
            .expect("material registry is empty; call register_default_materials() first")
    }

    pub fn get_by_name(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(name).copied()
    }

    pub fn is_solid(&self, id: MaterialId) -> bool {
        self.get_properties(id).solid
    }

    pub fn is_occluding(&self, id: MaterialId) -> bool {
        self.get_properties(id).occluding
    }

    pub fn is_liquid(&self, id: MaterialId) -> bool {
        self.get_properties(id).liquid
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

pub fn register_default_materials() -> MaterialRegistry {
    fn material(name: &str, solid: bool, occluding: bool, liquid: bool) -> MaterialProperties {
        MaterialProperties {
            name: name.to_string(),
            solid,
            occluding,
            liquid,
        }
    }

    let mut registry = MaterialRegistry::new();

    let defaults = [
        material("air", false, false, false),
        material("bedstone", true, true, false),
        material("stone", true, true, false),
        material("loam", true, true, false),
        material("verdant_turf", true, true, false),
        material("dune_sand", true, true, false),
        material("gravel_bed", true, true, false),
        material("timber_log", true, true, false),
        material("hewn_plank", true, true, false),
        material("canopy_leaves", true, false, false),
        material("crystal_pane", true, false, false),
        material("still_water", false, false, true),
        material("lava_source", false, false, true),
        material("obsidian", true, true, false),
        material("rift_surface", false, false, false),
        material("rift_surface_ew", false, false, false),
        material("torch", false, false, false),
        material("stone_stairs_north", true, false, false),
        material("stone_stairs_east", true, false, false),
        material("stone_stairs_south", true, false, false),
        material("stone_stairs_west", true, false, false),
        material("ladder_north", false, false, false),
        material("ladder_east", false, false, false),
        material("ladder_south", false, false, false),
        material("ladder_west", false, false, false),
        material("snowcap", true, false, false),
        material("ice", true, false, false),
        material("moss_block", true, true, false),
        material("rubblestone", true, true, false),
        material("clay_deposit", true, true, false),
    ];

    for (idx, props) in defaults.into_iter().enumerate() {
        let id = registry.register(props);
        debug_assert_eq!(id.0 as usize, idx, "default material ids must be stable");
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::{
        is_rift_surface, register_default_materials, rotate_oriented, MaterialId, FRAME_MATERIAL,
    };

    #[test]
    fn registry_returns_known_material_properties() {
        let registry = register_default_materials();

        let air = registry.get_properties(MaterialId::AIR);
        assert_eq!(air.name, "air");
        assert!(!air.solid);
        assert!(!air.occluding);
        assert!(!air.liquid);

        let obsidian = registry
            .get_by_name("obsidian")
            .expect("obsidian should be registered");
        assert_eq!(obsidian, FRAME_MATERIAL);
        assert!(registry.is_solid(obsidian));
        assert!(registry.is_occluding(obsidian));

        let water = registry
            .get_by_name("still_water")
            .expect("still_water should be registered");
        assert!(registry.is_liquid(water));
        assert!(!registry.is_solid(water));

        let leaves = registry
            .get_by_name("canopy_leaves")
            .expect("canopy_leaves should be registered");
        assert!(registry.is_solid(leaves));
        assert!(!registry.is_occluding(leaves));

        let surface = registry
            .get_by_name("rift_surface")
            .expect("rift_surface should be registered");
        assert_eq!(surface, MaterialId::RIFT_SURFACE);
        assert!(!registry.is_solid(surface));
        assert!(!registry.is_occluding(surface));
    }

    #[test]
    fn oriented_materials_rotate_by_quarter_turns() {
        assert_eq!(
            rotate_oriented(MaterialId::STONE_STAIRS_NORTH, 1),
            MaterialId::STONE_STAIRS_EAST
        );
        assert_eq!(
            rotate_oriented(MaterialId::STONE_STAIRS_WEST, 1),
            MaterialId::STONE_STAIRS_NORTH
        );
        assert_eq!(
            rotate_oriented(MaterialId::LADDER_SOUTH, 2),
            MaterialId::LADDER_NORTH
        );

        // Four quarter turns are the identity for every material.
        for raw in 0..30u16 {
            let material = MaterialId(raw);
            assert_eq!(rotate_oriented(material, 4), material);
        }

        // Unoriented materials never change.
        assert_eq!(rotate_oriented(MaterialId::STONE, 3), MaterialId::STONE);
    }

    #[test]
    fn rift_surface_swaps_axis_on_odd_turns() {
        assert!(is_rift_surface(MaterialId::RIFT_SURFACE));
        assert!(is_rift_surface(MaterialId::RIFT_SURFACE_EW));

        assert_eq!(
            rotate_oriented(MaterialId::RIFT_SURFACE, 1),
            MaterialId::RIFT_SURFACE_EW
        );
        assert_eq!(
            rotate_oriented(MaterialId::RIFT_SURFACE_EW, 3),
            MaterialId::RIFT_SURFACE
        );
        assert_eq!(
            rotate_oriented(MaterialId::RIFT_SURFACE, 2),
            MaterialId::RIFT_SURFACE
        );
    }
}
