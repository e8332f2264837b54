use glam::{IVec3, Vec3};

use crate::direction::Direction;

/// Rotates a vector a quarter turn about +Y. Pure sign flip plus axis swap,
/// so repeated application accumulates no floating error.
fn rotate_quarter(v: Vec3) -> Vec3 {
    Vec3::new(-v.z, v.y, v.x)
}

fn rotate_quarter_ivec3(v: IVec3) -> IVec3 {
    IVec3::new(-v.z, v.y, v.x)
}

/// Affine map between two portal reference frames: quarter-turn rotation
/// about the vertical axis followed by translation, built as
/// `translate(to) * rotate * translate(-from)`. Rotation is restricted to
/// the four cardinal headings, so constructing both directions of a link
/// yields exact inverses.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameTransform {
    from_pos: Vec3,
    to_pos: Vec3,
    quarter_turns: u8,
}

impl FrameTransform {
    pub fn between(from_pos: Vec3, from_dir: Direction, to_pos: Vec3, to_dir: Direction) -> Self {
        Self {
            from_pos,
            to_pos,
            quarter_turns: from_dir.quarter_turns_to(to_dir),
        }
    }

    /// Rotation-only component, for direction vectors (velocity, facing)
    /// where translation must not apply.
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        let mut rotated = v;
        for _ in 0..self.quarter_turns {
            rotated = rotate_quarter(rotated);
        }
        rotated
    }

    pub fn rotate_ivec3(&self, v: IVec3) -> IVec3 {
        let mut rotated = v;
        for _ in 0..self.quarter_turns {
            rotated = rotate_quarter_ivec3(rotated);
        }
        rotated
    }

    pub fn apply(&self, point: Vec3) -> Vec3 {
        self.rotate(point - self.from_pos) + self.to_pos
    }

    pub fn quarter_turns(&self) -> u8 {
        self.quarter_turns
    }
}

/// Unit vector for a yaw/pitch pair in degrees. Yaw 0 faces +Z, yaw 90
/// faces -X, pitch is positive looking down.
pub fn direction_from_angles(yaw_deg: f32, pitch_deg: f32) -> Vec3 {
    let yaw = yaw_deg.to_radians();
    let pitch = pitch_deg.to_radians();
    Vec3::new(
        -yaw.sin() * pitch.cos(),
        -pitch.sin(),
        yaw.cos() * pitch.cos(),
    )
}

pub fn yaw_from_direction(dir: Vec3) -> f32 {
    (-dir.x).atan2(dir.z).to_degrees()
}

pub fn pitch_from_direction(dir: Vec3) -> f32 {
    let len = dir.length();
    if len <= f32::EPSILON {
        return 0.0;
    }
    (-(dir.y / len)).asin().to_degrees()
}

#[cfg(test)]
mod tests {
    use glam::{IVec3, Vec3};

    use crate::direction::{Direction, ALL_DIRECTIONS};

    use super::{direction_from_angles, yaw_from_direction, FrameTransform};

    const TOLERANCE: f32 = 1.0e-4;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!(
            (a - b).length() < TOLERANCE,
            "expected {a:?} to be within {TOLERANCE} of {b:?}"
        );
    }

    #[test]
    fn transform_maps_the_source_pose_onto_the_target_pose() {
        let from = Vec3::new(10.0, 64.5, -3.5);
        let to = Vec3::new(-120.0, 80.5, 44.5);

        for from_dir in ALL_DIRECTIONS {
            for to_dir in ALL_DIRECTIONS {
                let transform = FrameTransform::between(from, from_dir, to, to_dir);
                assert_eq!(transform.apply(from), to);
                assert_close(
                    transform.rotate(from_dir.normal_vec3()),
                    to_dir.normal_vec3(),
                );
            }
        }
    }

    #[test]
    fn forward_and_reverse_transforms_are_inverses() {
        let from = Vec3::new(3.5, 70.0, 8.5);
        let to = Vec3::new(-64.5, 12.0, 101.5);
        let points = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(4.5, 71.0, 9.5),
            Vec3::new(-17.25, 66.0, 30.75),
        ];

        for from_dir in ALL_DIRECTIONS {
            for to_dir in ALL_DIRECTIONS {
                let forward = FrameTransform::between(from, from_dir, to, to_dir);
                let reverse = FrameTransform::between(to, to_dir, from, from_dir);
                for point in points {
                    assert_close(reverse.apply(forward.apply(point)), point);
                }
            }
        }
    }

    #[test]
    fn rotation_round_trip_is_exact_for_direction_vectors() {
        let forward = FrameTransform::between(Vec3::ZERO, Direction::North, Vec3::ZERO, Direction::West);
        let reverse = FrameTransform::between(Vec3::ZERO, Direction::West, Vec3::ZERO, Direction::North);

        let vectors = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.25, -1.0, 0.75),
            Vec3::new(-3.0, 2.0, 5.0),
        ];
        for v in vectors {
            // Quarter-turn rotation is a permutation with sign flips, so the
            // round trip must be bit-exact, not merely close.
            assert_eq!(reverse.rotate(forward.rotate(v)), v);
        }

        assert_eq!(
            forward.rotate_ivec3(IVec3::new(2, 3, -4)),
            reverse.rotate_ivec3(forward.rotate_ivec3(forward.rotate_ivec3(IVec3::new(2, 3, -4))))
        );
    }

    #[test]
    fn yaw_recovers_from_direction_vectors() {
        for yaw in [0.0_f32, 45.0, 90.0, 135.0, -90.0] {
            let dir = direction_from_angles(yaw, 0.0);
            let recovered = yaw_from_direction(dir);
            let diff = (recovered - yaw).rem_euclid(360.0);
            assert!(
                diff < 1.0e-3 || diff > 360.0 - 1.0e-3,
                "yaw {yaw} came back as {recovered}"
            );
        }
    }
}
