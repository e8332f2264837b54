use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Tuning for the per-tick view pipeline. The scan bounds are offsets from
/// the portal center: `min_xz..=max_xz` on both horizontal axes and
/// `min_y..=max_y` vertically.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub min_xz: i32,
    pub max_xz: i32,
    pub min_y: i32,
    pub max_y: i32,
    /// Ticks between occlusion rescans of an active portal.
    pub block_update_interval: u64,
    /// Ticks between refreshes of the nearby-entity caches.
    pub entity_check_interval: u64,
    /// Observers farther than this from every portal drive no updates.
    pub portal_activation_distance: f32,
    /// Extra slack added to the window half-extents when building the
    /// intersection plane, so positions just off the surface still count.
    pub collision_slack: Vec3,
    pub min_portal_spawn_distance: f32,
    /// Largest per-axis delta the wire can carry as a relative move; bigger
    /// jumps fall back to an absolute teleport.
    pub max_relative_move: f32,
    /// Some host versions need an explicit bed event when a mirrored entity
    /// falls asleep.
    pub send_bed_events: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            min_xz: -16,
            max_xz: 16,
            min_y: -8,
            max_y: 8,
            block_update_interval: 5,
            entity_check_interval: 10,
            portal_activation_distance: 20.0,
            collision_slack: Vec3::new(0.5, 0.5, 0.5),
            min_portal_spawn_distance: 16.0,
            max_relative_move: 8.0,
            send_bed_events: true,
        }
    }
}
