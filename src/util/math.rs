//! Math type re-exports and the compound value types stored in UDM documents.
//!
//! Vectors, quaternions and 4x4 matrices come from `glam`; transforms and
//! colors are packed records matching their on-disk layout.

// Re-export glam types
pub use glam::{IVec2, IVec3, IVec4, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use bytemuck::{Pod, Zeroable};

/// Rotation taking the engine's Y-up frame into the host's Z-up frame
/// (+90 degrees about X): `(x, y, z) -> (x, -z, y)`.
pub const Y_UP_TO_Z_UP: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, -1.0, 0.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
]);

/// Bone roll applied after the pose (-90 degrees about Z), so the host's
/// bone +Y axis follows the engine's bone +X axis.
pub const BONE_ROLL: Mat4 = Mat4::from_cols_array(&[
    0.0, -1.0, 0.0, 0.0, //
    1.0, 0.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
]);

/// Convert an engine-space point or direction into host space.
#[inline]
pub fn convert_vec3(v: Vec3) -> Vec3 {
    Vec3::new(v.x, -v.z, v.y)
}

/// Convert an engine-space rotation into host space.
#[inline]
pub fn convert_quat(q: Quat) -> Quat {
    Quat::from_xyzw(q.x, -q.z, q.y, q.w)
}

/// Translation + rotation, stored as 7 packed floats (`x y z qx qy qz qw`).
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Transform {
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation: translation.to_array(),
            rotation: rotation.to_array(),
        }
    }

    #[inline]
    pub fn translation(&self) -> Vec3 {
        Vec3::from_array(self.translation)
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        Quat::from_array(self.rotation)
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation(), self.translation())
    }
}

/// Translation + rotation + scale, stored as 10 packed floats.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ScaledTransform {
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for ScaledTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ScaledTransform {
    pub const IDENTITY: Self = Self {
        translation: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0; 3],
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation: translation.to_array(),
            rotation: rotation.to_array(),
            scale: scale.to_array(),
        }
    }

    #[inline]
    pub fn translation(&self) -> Vec3 {
        Vec3::from_array(self.translation)
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        Quat::from_array(self.rotation)
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        Vec3::from_array(self.scale)
    }

    /// `T * R * S`.
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale(), self.rotation(), self.translation())
    }
}

impl From<Transform> for ScaledTransform {
    fn from(t: Transform) -> Self {
        Self {
            translation: t.translation,
            rotation: t.rotation,
            scale: [1.0; 3],
        }
    }
}

/// Euler angles in degrees (pitch, yaw, roll).
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct EulerAngles {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

/// 8-bit sRGB color with alpha.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
pub struct Srgba(pub [u8; 4]);

/// 16-bit per channel HDR color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
pub struct HdrColor(pub [u16; 3]);

/// Row-major 3x4 affine matrix.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(transparent)]
pub struct Mat3x4(pub [f32; 12]);

impl Default for Mat3x4 {
    fn default() -> Self {
        Self([
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        ])
    }
}

impl Mat3x4 {
    /// Expand to a column-major 4x4 matrix.
    pub fn to_mat4(&self) -> Mat4 {
        let m = &self.0;
        Mat4::from_cols_array(&[
            m[0], m[4], m[8], 0.0, //
            m[1], m[5], m[9], 0.0, //
            m[2], m[6], m[10], 0.0, //
            m[3], m[7], m[11], 1.0,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_axis_constant_matches_convert() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert!(approx(Y_UP_TO_Z_UP.transform_point3(v), convert_vec3(v)));
        let rx = Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2);
        assert!(approx(rx.transform_point3(v), convert_vec3(v)));
    }

    #[test]
    fn test_bone_roll_is_negative_z_quarter_turn() {
        let rz = Mat4::from_rotation_z(-std::f32::consts::FRAC_PI_2);
        assert!(approx(BONE_ROLL.transform_vector3(Vec3::X), rz.transform_vector3(Vec3::X)));
        assert!(approx(BONE_ROLL.transform_vector3(Vec3::Y), rz.transform_vector3(Vec3::Y)));
    }

    #[test]
    fn test_convert_quat_matches_matrix_conjugation() {
        let q = Quat::from_rotation_y(0.7);
        let converted = Mat4::from_quat(convert_quat(q));
        let expected = Y_UP_TO_Z_UP * Mat4::from_quat(q) * Y_UP_TO_Z_UP.inverse();
        assert!(converted.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_scaled_transform_compose() {
        let t = ScaledTransform::new(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, Vec3::splat(2.0));
        let p = t.to_mat4().transform_point3(Vec3::ONE);
        assert!(approx(p, Vec3::new(3.0, 2.0, 2.0)));
    }

    #[test]
    fn test_mat3x4_expand() {
        let mut m = Mat3x4::default();
        m.0[3] = 5.0;
        let p = m.to_mat4().transform_point3(Vec3::ZERO);
        assert!(approx(p, Vec3::new(5.0, 0.0, 0.0)));
    }
}
