//! Axis-angle <-> quaternion conversion for PSN orientation chunks
//!
//! PSN carries orientation as a rotation vector: the unit axis scaled by the
//! angle in radians.

use glam::{Quat, Vec3};

/// Rotation vectors shorter than this are treated as no rotation
pub const ANGLE_EPSILON: f32 = 1e-6;

/// Convert a rotation vector to a quaternion
pub fn axis_angle_to_quat(rotation: Vec3) -> Quat {
    let angle = rotation.length();
    if !angle.is_finite() || angle < ANGLE_EPSILON {
        return Quat::IDENTITY;
    }
    Quat::from_axis_angle(rotation / angle, angle)
}

/// Convert a quaternion to a rotation vector, taking the shorter arc
pub fn quat_to_axis_angle(rotation: Quat) -> Vec3 {
    let mut q = rotation.normalize();
    if !q.is_finite() {
        return Vec3::ZERO;
    }
    if q.w < 0.0 {
        q = -q;
    }
    let (axis, angle) = q.to_axis_angle();
    if angle.abs() < ANGLE_EPSILON {
        Vec3::ZERO
    } else {
        axis * angle
    }
}

/// Mirror the Z component between scene and wire coordinates
pub fn flip_z(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.y, -v.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_tiny_angle_is_identity() {
        assert_eq!(axis_angle_to_quat(Vec3::new(1e-7, 0.0, 0.0)), Quat::IDENTITY);
        assert_eq!(axis_angle_to_quat(Vec3::ZERO), Quat::IDENTITY);
        assert_eq!(quat_to_axis_angle(Quat::IDENTITY), Vec3::ZERO);
    }

    #[test]
    fn test_quarter_turn_about_y() {
        let q = axis_angle_to_quat(Vec3::new(0.0, FRAC_PI_2, 0.0));
        let rotated = q * Vec3::X;
        assert!(rotated.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));

        let back = quat_to_axis_angle(q);
        assert!(back.abs_diff_eq(Vec3::new(0.0, FRAC_PI_2, 0.0), 1e-5));
    }

    #[test]
    fn test_negated_quaternion_maps_to_same_rotation() {
        let q = axis_angle_to_quat(Vec3::new(0.3, -0.2, 0.5));
        let a = quat_to_axis_angle(q);
        let b = quat_to_axis_angle(-q);
        assert!(a.abs_diff_eq(b, 1e-5));
    }

    #[test]
    fn test_flip_z() {
        assert_eq!(flip_z(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, 2.0, -3.0));
        assert_eq!(flip_z(flip_z(Vec3::new(1.0, 2.0, 3.0))), Vec3::new(1.0, 2.0, 3.0));
    }
}
