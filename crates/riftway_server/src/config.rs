use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use riftway_core::config::ViewConfig;
use riftway_core::placement::WorldLink;
use riftway_core::world::WorldId;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub tick_rate: u32,
    pub replica_id_seed: u64,
    pub ground_height: i32,
    pub border_radius: f32,
    /// Chunk radius around the world origin treated as already generated.
    pub pregenerated_chunk_radius: i32,
    pub portal_bottom_left: [i32; 3],
    pub portal_direction: String,
    pub portal_width: u32,
    pub portal_height: u32,
    pub view: ViewConfig,
    pub links: Vec<WorldLink>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            replica_id_seed: 0x52_49_46_54,
            ground_height: 64,
            border_radius: 512.0,
            pregenerated_chunk_radius: 4,
            portal_bottom_left: [0, 64, 0],
            portal_direction: "north".to_string(),
            portal_width: 2,
            portal_height: 3,
            view: ViewConfig::default(),
            links: vec![WorldLink {
                origin_world: WorldId(0),
                destination_world: WorldId(1),
                rescale: 1.0,
                min_spawn_y: 32,
                max_spawn_y: 100,
            }],
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(
                    "Failed to read config at {}: {}; using defaults",
                    path.display(),
                    err
                );
                return Self::default();
            }
        };

        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    "Failed to parse config at {}: {}; using defaults",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }
}
