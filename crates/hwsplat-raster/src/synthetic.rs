//! Deterministic synthetic scenes for demos and tests

use glam::{Vec3, Vec4};
use std::f32::consts::PI;

use crate::camera::FrameCamera;
use crate::gaussian::{Gaussian, GaussianStore};

const IDENTITY_ROTATION: Vec4 = Vec4::new(1.0, 0.0, 0.0, 0.0);

/// Isotropic gaussians on the -z axis at the given depths from the origin
///
/// Pair with [`axis_camera`], which sits at the origin looking down -z.
pub fn axis_line(depths: &[f32], opacity: f32) -> GaussianStore {
    let palette = [
        Vec3::new(1.0, 0.2, 0.2),
        Vec3::new(0.2, 1.0, 0.2),
        Vec3::new(0.2, 0.2, 1.0),
    ];
    let gaussians: Vec<Gaussian> = depths
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            Gaussian::solid(
                i as u32,
                Vec3::new(0.0, 0.0, -d),
                Vec3::splat(0.1),
                IDENTITY_ROTATION,
                opacity,
                palette[i % palette.len()],
            )
        })
        .collect();
    GaussianStore::from_gaussians(&gaussians)
}

/// Camera at the origin looking down -z (near 0.01, far 100, 60° vertical fov)
pub fn axis_camera(width: u32, height: u32) -> FrameCamera {
    FrameCamera::look_at(
        Vec3::ZERO,
        -Vec3::Z,
        Vec3::Y,
        PI / 3.0,
        0.01,
        100.0,
        width,
        height,
    )
}

/// Random anisotropic gaussians in a ball of radius 2 around the origin
pub fn random_cloud(count: usize, seed: u64) -> GaussianStore {
    let mut rng = seed;
    let mut rand = || {
        rng = rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (rng >> 40) as f32 / (1u64 << 24) as f32
    };

    let gaussians: Vec<Gaussian> = (0..count)
        .map(|i| {
            // uniform direction, cube-root radius for uniform density
            let z = rand() * 2.0 - 1.0;
            let azimuth = rand() * 2.0 * PI;
            let r = 2.0 * rand().cbrt();
            let ring = (1.0 - z * z).max(0.0).sqrt();
            let position = Vec3::new(ring * azimuth.cos(), ring * azimuth.sin(), z) * r;

            let scale = Vec3::new(rand(), rand(), rand()) * 0.06 + Vec3::splat(0.01);
            let rotation = Vec4::new(rand() - 0.5, rand() - 0.5, rand() - 0.5, rand() - 0.5)
                .try_normalize()
                .unwrap_or(IDENTITY_ROTATION);
            let opacity = 0.05 + rand() * 0.9;
            let rgb = Vec3::new(rand(), rand(), rand());

            Gaussian::solid(i as u32, position, scale, rotation, opacity, rgb)
        })
        .collect();
    GaussianStore::from_gaussians(&gaussians)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_line_depths() {
        let store = axis_line(&[1.0, 2.0, 3.0], 0.5);
        let camera = axis_camera(32, 32);
        for (i, d) in [1.0, 2.0, 3.0].iter().enumerate() {
            assert_eq!(camera.depth(store.position(i)), *d);
        }
    }

    #[test]
    fn test_random_cloud_is_deterministic() {
        let a = random_cloud(64, 3);
        let b = random_cloud(64, 3);
        let c = random_cloud(64, 4);
        assert_eq!(a.positions, b.positions);
        assert_ne!(a.positions, c.positions);
        for &o in &a.opacities {
            assert!(o > 0.0 && o < 1.0);
        }
        for p in &a.positions {
            assert!(glam::Vec4::from_array(*p).truncate().length() <= 2.0 + 1e-4);
        }
    }
}
