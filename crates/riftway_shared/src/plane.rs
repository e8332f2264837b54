use glam::Vec3;

/// Tolerance for degenerate geometry: rays parallel to the window plane and
/// intersections at the ray origin are treated as "no intersection".
pub const EPSILON: f32 = 1.0e-4;

/// The window rectangle of one portal side: center point, outward unit
/// normal, and half-extents on each world axis (the in-plane axes carry the
/// window size, the normal axis a small slack so positions just off the
/// plane still count).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PortalPlane {
    pub center: Vec3,
    pub normal: Vec3,
    pub half_extents: Vec3,
}

impl PortalPlane {
    pub fn new(center: Vec3, normal: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            normal,
            half_extents,
        }
    }

    /// Whether the segment from `ray_origin` to `target` crosses the window
    /// before reaching the target. Used to decide if a destination-side
    /// block or entity is actually seen through the portal rather than
    /// merely nearby.
    pub fn segment_crosses(&self, ray_origin: Vec3, target: Vec3) -> bool {
        let Some(direction) = (target - ray_origin).try_normalize() else {
            return false;
        };

        let denominator = self.normal.dot(direction);
        if denominator.abs() <= EPSILON {
            return false;
        }

        let t = (self.center - ray_origin).dot(self.normal) / denominator;
        // The target sits nearer than the plane: nothing behind the window
        // to reveal.
        if ray_origin.distance(target) < t {
            return false;
        }
        // The plane is behind the ray origin.
        if t <= EPSILON {
            return false;
        }

        let offset = ray_origin + direction * t - self.center;
        offset.x.abs() <= self.half_extents.x
            && offset.y.abs() <= self.half_extents.y
            && offset.z.abs() <= self.half_extents.z
    }
}
