//! Math type aliases and helper functions.
//!
//! Thin aliases over nalgebra plus the frame/transform helpers the merge
//! pipeline needs. All simulation math is f32.

pub use nalgebra;

/// 2D vector (f32).
pub type Vec2 = nalgebra::Vector2<f32>;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// 4D vector (f32).
pub type Vec4 = nalgebra::Vector4<f32>;

/// 4x4 matrix (f32).
pub type Mat4 = nalgebra::Matrix4<f32>;

/// Unit quaternion (f32).
pub type UnitQuat = nalgebra::UnitQuaternion<f32>;

// ===== Helper functions =====

/// Build the orientation of a vertex frame from its normal and tangent.
///
/// The frame's z-axis points along the normal and its y-axis is aligned
/// with the tangent as closely as orthogonality allows. Degenerate input
/// (normal parallel to tangent, or zero-length) falls back to an axis
/// orthogonal to the normal.
pub fn frame_rotation(normal: Vec3, tangent: Vec3) -> UnitQuat {
    let n = normal.try_normalize(1e-9).unwrap_or_else(Vec3::z);
    let up = if n.cross(&tangent).norm_squared() > 1e-12 {
        tangent
    } else if n.x.abs() < 0.9 {
        Vec3::x()
    } else {
        Vec3::y()
    };
    UnitQuat::face_towards(&n, &up)
}

/// Build the world-to-local matrix of a vertex frame at `position` with
/// orientation `rotation` (unit scale).
pub fn frame_world_to_local(position: Vec3, rotation: UnitQuat) -> Mat4 {
    let local_to_world = Mat4::new_translation(&position) * rotation.to_homogeneous();
    local_to_world.try_inverse().unwrap_or_else(Mat4::identity)
}

/// Transform a point by an affine 4x4 matrix.
pub fn transform_point(m: &Mat4, p: Vec3) -> Vec3 {
    m.transform_point(&nalgebra::Point3::from(p)).coords
}

/// Transform a direction by an affine 4x4 matrix (no translation).
pub fn transform_vector(m: &Mat4, v: Vec3) -> Vec3 {
    m.transform_vector(&v)
}

/// Angle between two vectors in degrees.
pub fn angle_degrees(a: &Vec3, b: &Vec3) -> f32 {
    a.angle(b).to_degrees()
}
