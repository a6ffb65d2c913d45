//! View-dependent color from real spherical harmonics (degree 0..=3)

use glam::{Vec3, Vec4};

use crate::gaussian::{GaussianStore, SH_COEFFS_PER_CHANNEL};

pub const SH_C0: f32 = 0.282_094_8;
pub const SH_C1: f32 = 0.488_602_5;
pub const SH_C2: [f32; 5] = [1.092_548_4, -1.092_548_4, 0.315_391_57, -1.092_548_4, 0.546_274_2];
pub const SH_C3: [f32; 7] = [
    -0.590_043_6,
    2.890_611_4,
    -0.457_045_8,
    0.373_176_34,
    -0.457_045_8,
    1.445_305_7,
    -0.590_043_6,
];

/// Offset added to the SH reduction so trained DC terms map around mid-gray
pub const SH_DC_OFFSET: f32 = 0.5;

/// Evaluate the 16 basis functions for a unit direction
pub fn sh_basis(dir: Vec3) -> [f32; SH_COEFFS_PER_CHANNEL] {
    let (x, y, z) = (dir.x, dir.y, dir.z);
    let (xx, yy, zz) = (x * x, y * y, z * z);
    let (xy, yz, xz) = (x * y, y * z, x * z);

    [
        SH_C0,
        -SH_C1 * y,
        SH_C1 * z,
        -SH_C1 * x,
        SH_C2[0] * xy,
        SH_C2[1] * yz,
        SH_C2[2] * (2.0 * zz - xx - yy),
        SH_C2[3] * xz,
        SH_C2[4] * (xx - yy),
        SH_C3[0] * y * (3.0 * xx - yy),
        SH_C3[1] * xy * z,
        SH_C3[2] * y * (4.0 * zz - xx - yy),
        SH_C3[3] * z * (2.0 * zz - 3.0 * xx - 3.0 * yy),
        SH_C3[4] * x * (4.0 * zz - xx - yy),
        SH_C3[5] * z * (xx - yy),
        SH_C3[6] * x * (xx - 3.0 * yy),
    ]
}

/// Reduce one channel's coefficients against the basis
#[inline]
pub fn reduce_channel(basis: &[f32; SH_COEFFS_PER_CHANNEL], coeffs: &[f32]) -> f32 {
    basis.iter().zip(coeffs).map(|(b, c)| b * c).sum()
}

/// View direction from the camera to a gaussian center
///
/// A gaussian sitting exactly on the camera falls back to +z.
pub fn view_direction(position: Vec3, camera_position: Vec3) -> Vec3 {
    (position - camera_position).try_normalize().unwrap_or(Vec3::Z)
}

/// Predicted RGBA of one gaussian: SH color, alpha = opacity
pub fn predict_color(store: &GaussianStore, index: usize, camera_position: Vec3) -> Vec4 {
    let dir = view_direction(store.position(index), camera_position);
    let basis = sh_basis(dir);
    let rgb = Vec3::new(
        reduce_channel(&basis, store.sh_channel(index, 0)),
        reduce_channel(&basis, store.sh_channel(index, 1)),
        reduce_channel(&basis, store.sh_channel(index, 2)),
    ) + Vec3::splat(SH_DC_OFFSET);
    rgb.max(Vec3::ZERO).extend(store.opacities[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaussian::SceneIngest;
    use approx::assert_relative_eq;

    #[test]
    fn test_dc_only_is_view_independent() {
        let mut ingest = SceneIngest::default();
        ingest.push_activated(Vec3::ZERO, Vec3::ONE, Vec4::X, 0.7, Vec3::new(0.2, 0.4, 0.9));
        let store = GaussianStore::from_ingest(&ingest).unwrap();

        for cam in [Vec3::new(0.0, 0.0, -5.0), Vec3::new(3.0, 1.0, 2.0), Vec3::new(0.0, 9.0, 0.0)] {
            let c = predict_color(&store, 0, cam);
            assert_relative_eq!(c.x, 0.2, epsilon = 1e-5);
            assert_relative_eq!(c.y, 0.4, epsilon = 1e-5);
            assert_relative_eq!(c.z, 0.9, epsilon = 1e-5);
            assert_relative_eq!(c.w, 0.7, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_color_is_clamped() {
        let mut ingest = SceneIngest::default();
        ingest.push_activated(Vec3::ZERO, Vec3::ONE, Vec4::X, 0.5, Vec3::splat(-2.0));
        let store = GaussianStore::from_ingest(&ingest).unwrap();
        let c = predict_color(&store, 0, Vec3::Z);
        assert_eq!(c.truncate(), Vec3::ZERO);
    }

    #[test]
    fn test_degree_one_follows_direction() {
        // y basis term only: color changes sign with the view direction
        let mut coeffs = [0.0f32; SH_COEFFS_PER_CHANNEL];
        coeffs[1] = 1.0;
        let up = reduce_channel(&sh_basis(Vec3::Y), &coeffs);
        let down = reduce_channel(&sh_basis(-Vec3::Y), &coeffs);
        assert_relative_eq!(up, -SH_C1, epsilon = 1e-6);
        assert_relative_eq!(down, SH_C1, epsilon = 1e-6);
    }
}
