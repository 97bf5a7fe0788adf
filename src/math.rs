// Math core
//
// Vectors and matrices are glam's. Matrices are reasoned about row-major
// (`m[row][col]`, column vectors, `A * B` applies B first); glam stores them
// column-major, which is exactly the layout the shaders consume, so the
// "transpose before upload" step is `to_cols_array_2d`.

use crate::error::MathError;

pub use glam::{Mat3 as Matrix3, Mat4 as Matrix4, Vec3 as Vector3, Vec4 as Vector4};

/// Near plane of the projection used by the renderer.
pub const Z_NEAR: f32 = 1.0;
/// Far plane. Kept for reference; the projection below has no far clip.
pub const Z_FAR: f32 = 10_000.0;

/// A component of a 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
}

/// Read one component of `v`.
#[inline]
pub fn component(v: Vector3, axis: Axis) -> f32 {
    match axis {
        Axis::X => v.x,
        Axis::Y => v.y,
        Axis::Z => v.z,
    }
}

/// Normalize `v`, refusing the zero vector and non-finite input.
///
/// The vector is scaled by its largest component first, so the squared
/// length neither overflows for huge inputs nor flushes to zero for tiny ones.
pub fn normalize(v: Vector3) -> Result<Vector3, MathError> {
    if !v.is_finite() {
        return Err(MathError::NonFinite);
    }
    let scale = v.abs().max_element();
    if scale == 0.0 {
        return Err(MathError::ZeroLength);
    }
    let scaled = v / scale;
    Ok(scaled / scaled.length())
}

/// Build a matrix from its rows.
pub fn from_rows(rows: [[f32; 4]; 4]) -> Matrix4 {
    Matrix4::from_cols_array_2d(&rows).transpose()
}

/// Rows of `m`, `rows(m)[row][col]`.
pub fn rows(m: &Matrix4) -> [[f32; 4]; 4] {
    m.transpose().to_cols_array_2d()
}

/// Column-major data ready to be copied into a uniform buffer.
pub fn to_gpu(m: &Matrix4) -> [[f32; 4]; 4] {
    m.to_cols_array_2d()
}

pub fn scaling(x: f32, y: f32, z: f32) -> Matrix4 {
    Matrix4::from_scale(Vector3::new(x, y, z))
}

pub fn translation(position: Vector3) -> Matrix4 {
    Matrix4::from_translation(position)
}

/// World-space rotation: roll first, then pitch, then yaw (`yaw * pitch * roll`).
///
/// Yaw turns about +Y, pitch tilts the forward axis (+Z) towards +Y and roll
/// turns about +Z. The composition order is load-bearing: changing it changes
/// how every camera and entity is oriented.
pub fn rotation(yaw: f32, pitch: f32, roll: f32) -> Matrix4 {
    let (siny, cosy) = yaw.sin_cos();
    let (sinp, cosp) = pitch.sin_cos();
    let (sinr, cosr) = roll.sin_cos();

    from_rows([
        [
            sinp * sinr * siny + cosr * cosy,
            cosr * sinp * siny - cosy * sinr,
            -cosp * siny,
            0.0,
        ],
        [cosp * sinr, cosp * cosr, sinp, 0.0],
        [
            -cosy * sinp * sinr + cosr * siny,
            -cosr * cosy * sinp - sinr * siny,
            cosp * cosy,
            0.0,
        ],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

/// Undo [`rotation`]: yaw first, then pitch, then roll, each with the angle negated.
pub fn inverse_rotation(yaw: f32, pitch: f32, roll: f32) -> Matrix4 {
    let (siny, cosy) = (-yaw).sin_cos();
    let (sinp, cosp) = (-pitch).sin_cos();
    let (sinr, cosr) = (-roll).sin_cos();

    from_rows([
        [
            -sinp * sinr * siny + cosr * cosy,
            -cosp * sinr,
            -cosy * sinp * sinr - cosr * siny,
            0.0,
        ],
        [
            cosr * sinp * siny + cosy * sinr,
            cosp * cosr,
            cosr * cosy * sinp - sinr * siny,
            0.0,
        ],
        [cosp * siny, -sinp, cosp * cosy, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

/// World to camera space.
pub fn view(position: Vector3, yaw: f32, pitch: f32, roll: f32) -> Matrix4 {
    inverse_rotation(yaw, pitch, roll) * translation(-position)
}

/// Camera to clip space.
///
/// Row 3 copies view-space z into w; row 2 is `z - zNear`, so after the divide
/// depth is `1 - zNear / z`: 0 at the near plane, approaching 1 at infinity.
pub fn projection(fov: f32, aspect_ratio: f32) -> Matrix4 {
    let inv_tan_half_fov = 1.0 / (fov / 2.0).tan();

    from_rows([
        [inv_tan_half_fov / aspect_ratio, 0.0, 0.0, 0.0],
        [0.0, inv_tan_half_fov, 0.0, 0.0],
        [0.0, 0.0, 1.0, -Z_NEAR],
        [0.0, 0.0, 1.0, 0.0],
    ])
}

/// Upper-left 3x3 block: rotates directions without translating them.
pub fn upper_left(m: &Matrix4) -> Matrix3 {
    Matrix3::from_mat4(*m)
}

/// Unit direction the +Z axis points to after `rotation(yaw, pitch, _)`.
pub fn direction_from_angles(yaw: f32, pitch: f32) -> Vector3 {
    let (siny, cosy) = yaw.sin_cos();
    let (sinp, cosp) = pitch.sin_cos();
    Vector3::new(-siny * cosp, sinp, cosy * cosp)
}

/// Yaw and pitch pointing +Z along `direction`. Roll is not derivable.
pub fn angles_from_direction(direction: Vector3) -> Result<(f32, f32), MathError> {
    let direction = normalize(direction)?;
    let yaw = (-direction.x).atan2(direction.z);
    let pitch = direction.y.clamp(-1.0, 1.0).asin();
    Ok((yaw, pitch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    const ANGLES: [(f32, f32, f32); 6] = [
        (0.0, 0.0, 0.0),
        (0.3, -0.7, 1.1),
        (-2.5, 1.2, 0.4),
        (3.0, 0.0, -3.0),
        (1.57, 1.5, 0.01),
        (-0.9, -1.4, 2.2),
    ];

    fn assert_identity(m: Matrix4) {
        assert_abs_diff_eq!(m, Matrix4::IDENTITY, epsilon = 1e-5);
    }

    #[test]
    fn rotation_times_inverse_is_identity() {
        for (yaw, pitch, roll) in ANGLES {
            assert_identity(rotation(yaw, pitch, roll) * inverse_rotation(yaw, pitch, roll));
            assert_identity(inverse_rotation(yaw, pitch, roll) * rotation(yaw, pitch, roll));
        }
    }

    #[test]
    fn rotation_composes_roll_then_pitch_then_yaw() {
        let (yaw, pitch, roll) = (0.4, -0.3, 0.9);
        let yaw_only = rotation(yaw, 0.0, 0.0);
        let pitch_only = rotation(0.0, pitch, 0.0);
        let roll_only = rotation(0.0, 0.0, roll);
        assert_abs_diff_eq!(
            rotation(yaw, pitch, roll),
            yaw_only * pitch_only * roll_only,
            epsilon = 1e-6
        );
    }

    #[test]
    fn rotation_is_not_commutative() {
        let a = rotation(0.8, 0.0, 0.0) * rotation(0.0, 0.6, 0.0);
        let b = rotation(0.0, 0.6, 0.0) * rotation(0.8, 0.0, 0.0);
        assert!(!a.abs_diff_eq(b, 1e-3));
    }

    #[test]
    fn rotation_rows_match_layout() {
        let r = rows(&rotation(0.0, std::f32::consts::FRAC_PI_2, 0.0));
        // pitching up by 90 degrees sends +Z to +Y
        assert_abs_diff_eq!(r[1][2], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(r[2][2], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn translation_puts_offset_in_last_column() {
        let r = rows(&translation(Vector3::new(1.0, 2.0, 3.0)));
        assert_eq!([r[0][3], r[1][3], r[2][3], r[3][3]], [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn view_moves_camera_to_origin() {
        let position = Vector3::new(3.0, -2.0, 7.0);
        let v = view(position, 0.7, 0.2, -0.4);
        assert_abs_diff_eq!(v.transform_point3(position), Vector3::ZERO, epsilon = 1e-5);
    }

    #[test]
    fn view_looks_down_forward_axis() {
        let (yaw, pitch) = (1.1, -0.5);
        let position = Vector3::new(1.0, 1.0, 1.0);
        let ahead = position + direction_from_angles(yaw, pitch) * 5.0;
        let in_view = view(position, yaw, pitch, 0.0).transform_point3(ahead);
        assert_abs_diff_eq!(in_view, Vector3::new(0.0, 0.0, 5.0), epsilon = 1e-4);
    }

    #[test]
    fn projection_layout() {
        let r = rows(&projection(1.2, 1.25));
        let inv = 1.0 / 0.6f32.tan();
        assert_relative_eq!(r[0][0], inv / 1.25);
        assert_relative_eq!(r[1][1], inv);
        assert_eq!(r[2][2], 1.0);
        assert_eq!(r[2][3], -Z_NEAR);
        assert_eq!(r[3][2], 1.0);
        assert_eq!(r[3][3], 0.0);
    }

    #[test]
    fn projection_maps_near_plane_to_zero_depth() {
        let clip = projection(1.0, 1.0) * Vector4::new(0.0, 0.0, Z_NEAR, 1.0);
        assert_abs_diff_eq!(clip.z / clip.w, 0.0);
        let far = projection(1.0, 1.0) * Vector4::new(0.0, 0.0, Z_FAR, 1.0);
        assert!(far.z / far.w > 0.99 && far.z / far.w < 1.0);
    }

    #[test]
    fn view_projection_is_reproducible() {
        let build = || projection(1.2, 1500.0 / 1200.0) * view(Vector3::new(0.5, 1.0, -3.0), 0.0, 0.0, 0.0);
        let a = build().to_cols_array();
        let b = build().to_cols_array();
        assert_eq!(a.map(f32::to_bits), b.map(f32::to_bits));
    }

    #[test]
    fn gpu_layout_is_transpose_of_rows() {
        let m = translation(Vector3::new(4.0, 5.0, 6.0)) * rotation(0.2, 0.1, 0.3);
        let r = rows(&m);
        let gpu = to_gpu(&m);
        for row in 0..4 {
            for col in 0..4 {
                assert_eq!(gpu[col][row], r[row][col]);
            }
        }
    }

    #[test]
    fn normalize_yields_unit_vectors() {
        for v in [
            Vector3::new(3.0, 4.0, 0.0),
            Vector3::new(-1e-3, 2e-3, 5e-4),
            Vector3::new(100.0, -250.0, 7.0),
        ] {
            assert_relative_eq!(normalize(v).unwrap().length(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn normalize_rejects_zero() {
        assert_eq!(normalize(Vector3::ZERO), Err(MathError::ZeroLength));
    }

    #[test]
    fn normalize_survives_extreme_magnitudes() {
        let huge = normalize(Vector3::new(1e20, 0.0, 0.0)).unwrap();
        assert_relative_eq!(huge, Vector3::X, epsilon = 1e-6);

        let tiny = normalize(Vector3::new(0.0, 1e-23, 1e-23)).unwrap();
        assert_relative_eq!(tiny.length(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(tiny.y, tiny.z);

        let mixed = normalize(Vector3::new(3e20, -4e20, 0.0)).unwrap();
        assert_relative_eq!(mixed, Vector3::new(0.6, -0.8, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn normalize_rejects_non_finite() {
        assert_eq!(normalize(Vector3::new(f32::INFINITY, 0.0, 0.0)), Err(MathError::NonFinite));
        assert_eq!(normalize(Vector3::new(1.0, f32::NAN, 0.0)), Err(MathError::NonFinite));
        assert_eq!(normalize(Vector3::new(0.0, 0.0, f32::NEG_INFINITY)), Err(MathError::NonFinite));
    }

    #[test]
    fn cross_is_orthogonal_and_dot_symmetric() {
        let pairs = [
            (Vector3::new(1.0, 2.0, 3.0), Vector3::new(-4.0, 0.5, 2.0)),
            (Vector3::new(0.0, 1.0, 0.0), Vector3::new(1.0, 0.0, 0.0)),
            (Vector3::new(-7.0, 3.0, 1.5), Vector3::new(2.0, 2.0, -9.0)),
        ];
        for (a, b) in pairs {
            let c = a.cross(b);
            assert_abs_diff_eq!(c.dot(a), 0.0, epsilon = 1e-4);
            assert_abs_diff_eq!(c.dot(b), 0.0, epsilon = 1e-4);
            assert_eq!(a.dot(b), b.dot(a));
        }
    }

    #[test]
    fn upper_left_rotates_without_translating() {
        let m = translation(Vector3::new(10.0, 0.0, 0.0)) * rotation(std::f32::consts::FRAC_PI_2, 0.0, 0.0);
        let d = upper_left(&m) * Vector3::Z;
        assert_abs_diff_eq!(d, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn direction_and_angles_round_trip() {
        for d in [
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 2.0, -3.0),
            Vector3::new(-0.2, -0.9, 0.1),
            Vector3::new(5.0, 0.0, 0.0),
        ] {
            let (yaw, pitch) = angles_from_direction(d).unwrap();
            assert_abs_diff_eq!(
                direction_from_angles(yaw, pitch),
                normalize(d).unwrap(),
                epsilon = 1e-5
            );
        }
    }

    #[test]
    fn component_access() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let picked: Vec<f32> = Axis::ALL.iter().map(|&a| component(v, a)).collect();
        assert_eq!(picked, v.to_array());
    }
}
