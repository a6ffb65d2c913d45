//! 3D Gaussian to 2D screen-space projection mathematics
//!
//! This module implements the covariance transformations that turn a 3D
//! Gaussian into the conic and pixel footprint used by the quad compositor.
//! `shaders/common.wgsl` mirrors these functions line for line.

use glam::{Mat3, Vec2, Vec3, Vec4};

use crate::camera::FrameCamera;
use crate::settings::RenderSettings;

/// Variance (in pixels²) added to the 2D covariance when antialiasing is on
pub const LOW_PASS_FILTER: f32 = 0.3;

/// Converts view space (-z forward, y up) into the camera frame used by the
/// Jacobian (+z forward, y down, matching pixel rows)
pub const VIEW_TO_CAMERA_FRAME: Mat3 = Mat3::from_cols(
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, 0.0, -1.0),
);

/// Rotation matrix of a unit quaternion stored as (r, x, y, z)
pub fn quat_to_rotation_matrix(q: Vec4) -> Mat3 {
    let (r, x, y, z) = (q.x, q.y, q.z, q.w);

    // rows written out, then transposed into glam's column storage
    Mat3::from_cols(
        Vec3::new(1.0 - 2.0 * (y * y + z * z), 2.0 * (x * y - r * z), 2.0 * (x * z + r * y)),
        Vec3::new(2.0 * (x * y + r * z), 1.0 - 2.0 * (x * x + z * z), 2.0 * (y * z - r * x)),
        Vec3::new(2.0 * (x * z - r * y), 2.0 * (y * z + r * x), 1.0 - 2.0 * (x * x + y * y)),
    )
    .transpose()
}

/// Build the camera-frame 3D covariance Σ = M·Mᵀ with M = V·R(q)·S
///
/// # Arguments
/// * `scale` - Activated (sx, sy, sz) axis scales
/// * `modifier` - Global scale multiplier
/// * `rotation` - Unit quaternion (r, x, y, z)
/// * `view_rotation` - Rotation part of the world to camera-frame transform
pub fn compute_cov3d(scale: Vec3, modifier: f32, rotation: Vec4, view_rotation: Mat3) -> Mat3 {
    let r = view_rotation * quat_to_rotation_matrix(rotation);
    let s = scale * modifier;

    // S is diagonal, so V*R*S just scales the columns of V*R
    let m = Mat3::from_cols(r.col(0) * s.x, r.col(1) * s.y, r.col(2) * s.z);
    m * m.transpose()
}

/// Project a camera-frame 3D covariance to pixel space
///
/// Uses the first-order Jacobian of the pinhole projection at `mean`
/// (camera frame, z > 0):
///
/// J = | fx/z    0    -fx*x/z^2 |
///     |  0    fy/z   -fy*y/z^2 |
///
/// # Returns
/// The symmetric triple (Σ00, Σ01, Σ11) of J·Σ·Jᵀ
pub fn compute_cov2d(mean: Vec3, focal_x: f32, focal_y: f32, cov3d: Mat3) -> Vec3 {
    let z = mean.z;
    let z2 = z * z;

    let j00 = focal_x / z;
    let j02 = -focal_x * mean.x / z2;
    let j11 = focal_y / z;
    let j12 = -focal_y * mean.y / z2;

    // Extract covariance elements (symmetric matrix)
    let s00 = cov3d.col(0).x;
    let s01 = cov3d.col(1).x;
    let s02 = cov3d.col(2).x;
    let s11 = cov3d.col(1).y;
    let s12 = cov3d.col(2).y;
    let s22 = cov3d.col(2).z;

    // J * Σ, only the entries needed for the upper triangle
    let t00 = j00 * s00 + j02 * s02;
    let t01 = j00 * s01 + j02 * s12;
    let t02 = j00 * s02 + j02 * s22;
    let t11 = j11 * s11 + j12 * s12;
    let t12 = j11 * s12 + j12 * s22;

    Vec3::new(
        t00 * j00 + t02 * j02,
        t01 * j11 + t02 * j12,
        t11 * j11 + t12 * j12,
    )
}

/// Dilate the 2D covariance by `filter_size` on the diagonal
///
/// Returns the filtered covariance and the factor that keeps the integrated
/// opacity unchanged.
pub fn apply_low_pass_filter(cov: Vec3, filter_size: f32) -> (Vec3, f32) {
    let det_before = cov.x * cov.z - cov.y * cov.y;
    let filtered = Vec3::new(cov.x + filter_size, cov.y, cov.z + filter_size);
    let det_after = filtered.x * filtered.z - filtered.y * filtered.y;
    (filtered, (det_before / det_after).max(0.0).sqrt())
}

/// Invert a symmetric 2x2 covariance (a, b, c)
///
/// The gaussian evaluates as exp(-0.5 * (a*dx^2 + 2*b*dx*dy + c*dy^2)).
/// Non-culled gaussians are assumed to have a non-degenerate covariance.
pub fn covariance_to_conic(cov: Vec3) -> Vec3 {
    let det_inv = 1.0 / (cov.x * cov.z - cov.y * cov.y);
    Vec3::new(cov.z * det_inv, -cov.y * det_inv, cov.x * det_inv)
}

/// Compute eigenvalues of a 2x2 symmetric matrix (a, b, c)
///
/// # Returns
/// (λ_max, λ_min)
pub fn eigenvalues_2x2(m: Vec3) -> (f32, f32) {
    let half_trace = (m.x + m.z) * 0.5;
    let det = m.x * m.z - m.y * m.y;
    let delta = (half_trace * half_trace - det).max(0.0).sqrt();
    (half_trace + delta, half_trace - delta)
}

/// Squared-Mahalanobis level at which the gaussian's alpha drops to `min_alpha`
#[inline]
pub fn confidence_level(opacity: f32, min_alpha: f32) -> f32 {
    -2.0 * (min_alpha / opacity).ln()
}

/// Exact axis-aligned half-extents of the ellipse {d : dᵀ·conic·d = e}
pub fn axis_half_extents(conic: Vec3, e: f32) -> Vec2 {
    let (a, b, c) = (conic.x, conic.y, conic.z);
    let quad = |v: Vec2| a * v.x * v.x + 2.0 * b * v.x * v.y + c * v.y * v.y;
    let vx = Vec2::new(1.0, -b / c);
    let vy = Vec2::new(-b / a, 1.0);
    Vec2::new((e / quad(vx)).sqrt(), (e / quad(vy)).sqrt())
}

/// Axis-aligned footprint half-extents, rounded up to whole pixels
pub fn compute_aabb(conic: Vec3, opacity: f32, min_alpha: f32) -> Vec2 {
    if opacity < min_alpha {
        return Vec2::ZERO;
    }
    axis_half_extents(conic, confidence_level(opacity, min_alpha)).ceil()
}

/// Oriented footprint from the eigen-decomposition of the conic
///
/// # Returns
/// (half-extents along (principal, secondary), principal eigenvector). The
/// principal axis belongs to the conic's largest eigenvalue.
pub fn compute_obb(conic: Vec3, opacity: f32, min_alpha: f32) -> (Vec2, Vec2) {
    if opacity < min_alpha {
        return (Vec2::ZERO, Vec2::X);
    }
    let (a, b, c) = (conic.x, conic.y, conic.z);
    let (lambda1, lambda2) = eigenvalues_2x2(conic);

    let fallback = if a >= c { Vec2::X } else { Vec2::Y };
    let eigen_vec = Vec2::new(-b, a - lambda1).try_normalize().unwrap_or(fallback);

    let e = confidence_level(opacity, min_alpha);
    (Vec2::new((e / lambda1).sqrt(), (e / lambda2).sqrt()), eigen_vec)
}

/// Screen-space description of one projected gaussian
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Footprint {
    /// Pixel position of the center (origin top-left, y down)
    pub center: Vec2,
    pub conic: Vec3,
    /// Opacity after antialiasing compensation
    pub opacity: f32,
    /// Axis-aligned half-extents in whole pixels
    pub aabb: Vec2,
    /// Oriented half-extents along (eigen_vec, its perpendicular)
    pub obb: Vec2,
    pub eigen_vec: Vec2,
}

impl Footprint {
    /// Rebuild from the per-slot GPU records
    ///
    /// `bounding_box` is (center, aabb), `conic_opacity` is (conic, opacity)
    /// and `oriented_box` is (eigen_vec, obb).
    pub fn from_packed(bounding_box: Vec4, conic_opacity: Vec4, oriented_box: Vec4) -> Self {
        Self {
            center: Vec2::new(bounding_box.x, bounding_box.y),
            conic: conic_opacity.truncate(),
            opacity: conic_opacity.w,
            aabb: Vec2::new(bounding_box.z, bounding_box.w),
            obb: Vec2::new(oriented_box.z, oriented_box.w),
            eigen_vec: Vec2::new(oriented_box.x, oriented_box.y),
        }
    }
}

/// Full projection of one gaussian
///
/// Returns `None` when the center lies on or behind the camera plane.
pub fn project_footprint(
    position: Vec3,
    scale: Vec3,
    rotation: Vec4,
    opacity: f32,
    camera: &FrameCamera,
    settings: &RenderSettings,
) -> Option<Footprint> {
    let center = camera.project_to_screen(position)?;

    let view_rotation = VIEW_TO_CAMERA_FRAME * Mat3::from_mat4(camera.view);
    let mean = VIEW_TO_CAMERA_FRAME * camera.view_position(position);

    let cov3d = compute_cov3d(scale, settings.scale_modifier, rotation, view_rotation);
    let mut cov2d = compute_cov2d(mean, camera.focal_x(), camera.focal_y(), cov3d);

    let mut opacity = opacity;
    if settings.antialiasing {
        let (filtered, compensation) = apply_low_pass_filter(cov2d, LOW_PASS_FILTER);
        cov2d = filtered;
        opacity *= compensation;
    }

    let conic = covariance_to_conic(cov2d);
    let aabb = compute_aabb(conic, opacity, settings.min_opacity);
    let (obb, eigen_vec) = compute_obb(conic, opacity, settings.min_opacity);

    Some(Footprint {
        center,
        conic,
        opacity,
        aabb,
        obb,
        eigen_vec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{Mat4, Quat};

    const IDENTITY_ROT: Vec4 = Vec4::new(1.0, 0.0, 0.0, 0.0);

    fn head_on_camera() -> FrameCamera {
        FrameCamera::look_at(
            Vec3::ZERO,
            -Vec3::Z,
            Vec3::Y,
            std::f32::consts::FRAC_PI_2,
            0.01,
            100.0,
            256,
            256,
        )
    }

    #[test]
    fn test_rotation_matches_glam() {
        let q = Quat::from_axis_angle(Vec3::new(1.0, 2.0, -0.5).normalize(), 0.8);
        let ours = quat_to_rotation_matrix(Vec4::new(q.w, q.x, q.y, q.z));
        let theirs = Mat3::from_quat(q);
        for i in 0..3 {
            assert_relative_eq!(ours.col(i).x, theirs.col(i).x, epsilon = 1e-5);
            assert_relative_eq!(ours.col(i).y, theirs.col(i).y, epsilon = 1e-5);
            assert_relative_eq!(ours.col(i).z, theirs.col(i).z, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_identity_covariance() {
        let cov = compute_cov3d(Vec3::ONE, 1.0, IDENTITY_ROT, Mat3::IDENTITY);
        assert_relative_eq!(cov.col(0).x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(cov.col(1).y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(cov.col(2).z, 1.0, epsilon = 1e-6);
        assert_relative_eq!(cov.col(0).y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_scaled_covariance() {
        let cov = compute_cov3d(Vec3::new(2.0, 1.0, 0.5), 0.5, IDENTITY_ROT, Mat3::IDENTITY);

        // Diagonal should be (scale * modifier)^2
        assert_relative_eq!(cov.col(0).x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(cov.col(1).y, 0.25, epsilon = 1e-6);
        assert_relative_eq!(cov.col(2).z, 0.0625, epsilon = 1e-6);
    }

    #[test]
    fn test_isotropic_head_on_is_isotropic() {
        let camera = head_on_camera();
        let fp = project_footprint(
            Vec3::new(0.0, 0.0, -4.0),
            Vec3::splat(0.1),
            IDENTITY_ROT,
            0.8,
            &camera,
            &RenderSettings::default(),
        )
        .unwrap();

        let cov = Vec3::new(fp.conic.z, -fp.conic.y, fp.conic.x)
            / (fp.conic.x * fp.conic.z - fp.conic.y * fp.conic.y);
        assert_relative_eq!(cov.x, cov.z, epsilon = 1e-3);
        assert_relative_eq!(cov.y, 0.0, epsilon = 1e-5);

        // sigma in pixels = focal * scale / depth = 128 * 0.1 / 4
        assert_relative_eq!(cov.x, 3.2 * 3.2, epsilon = 1e-2);
        assert_relative_eq!(fp.center.x, 128.0, epsilon = 1e-3);
        assert_relative_eq!(fp.center.y, 128.0, epsilon = 1e-3);
    }

    #[test]
    fn test_conic_inversion() {
        let conic = covariance_to_conic(Vec3::new(4.0, 0.0, 1.0));
        assert_relative_eq!(conic.x, 0.25, epsilon = 1e-6);
        assert_relative_eq!(conic.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(conic.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_eigenvalues() {
        let (l1, l2) = eigenvalues_2x2(Vec3::new(1.0, 0.0, 1.0));
        assert_relative_eq!(l1, 1.0, epsilon = 1e-6);
        assert_relative_eq!(l2, 1.0, epsilon = 1e-6);

        let (l1, l2) = eigenvalues_2x2(Vec3::new(4.0, 0.0, 1.0));
        assert_relative_eq!(l1, 4.0, epsilon = 1e-6);
        assert_relative_eq!(l2, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_axis_extents_invert_to_covariance() {
        let cov = Vec3::new(9.0, 2.5, 4.0);
        let conic = covariance_to_conic(cov);
        let e = confidence_level(0.9, 0.02);
        let half = axis_half_extents(conic, e);

        assert_relative_eq!(half.x * half.x / e, cov.x, epsilon = 1e-3);
        assert_relative_eq!(half.y * half.y / e, cov.z, epsilon = 1e-3);

        let aabb = compute_aabb(conic, 0.9, 0.02);
        assert_eq!(aabb, half.ceil());
    }

    #[test]
    fn test_obb_reconstructs_covariance() {
        let cov = Vec3::new(9.0, 2.5, 4.0);
        let conic = covariance_to_conic(cov);
        let (opacity, min_alpha) = (0.9, 0.02);
        let (half, v) = compute_obb(conic, opacity, min_alpha);
        let e = confidence_level(opacity, min_alpha);

        assert_relative_eq!(v.length(), 1.0, epsilon = 1e-6);

        // Σ = e⁻¹ (h1² v vᵀ + h2² w wᵀ) with w ⟂ v
        let w = v.perp();
        let (s1, s2) = (half.x * half.x / e, half.y * half.y / e);
        let rebuilt = Vec3::new(
            s1 * v.x * v.x + s2 * w.x * w.x,
            s1 * v.x * v.y + s2 * w.x * w.y,
            s1 * v.y * v.y + s2 * w.y * w.y,
        );
        assert_relative_eq!(rebuilt.x, cov.x, epsilon = 1e-3);
        assert_relative_eq!(rebuilt.y, cov.y, epsilon = 1e-3);
        assert_relative_eq!(rebuilt.z, cov.z, epsilon = 1e-3);
    }

    #[test]
    fn test_obb_isotropic_eigenvector_is_unit() {
        let (half, v) = compute_obb(Vec3::new(0.5, 0.0, 0.5), 0.5, 0.1);
        assert_relative_eq!(v.length(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(half.x, half.y, epsilon = 1e-6);
    }

    #[test]
    fn test_below_min_opacity_is_zero_area() {
        let conic = Vec3::new(0.1, 0.0, 0.1);
        assert_eq!(compute_aabb(conic, 0.01, 0.02), Vec2::ZERO);
        assert_eq!(compute_obb(conic, 0.01, 0.02).0, Vec2::ZERO);
    }

    #[test]
    fn test_low_pass_preserves_mass() {
        let (filtered, k) = apply_low_pass_filter(Vec3::new(1.0, 0.0, 1.0), LOW_PASS_FILTER);
        assert_relative_eq!(filtered.x, 1.3, epsilon = 1e-6);
        assert_relative_eq!(k, 1.0 / 1.3, epsilon = 1e-5);
    }

    #[test]
    fn test_view_rotation_flips_into_camera_frame() {
        let view = Mat4::look_at_rh(Vec3::ZERO, -Vec3::Z, Vec3::Y);
        let mean = VIEW_TO_CAMERA_FRAME * view.transform_point3(Vec3::new(1.0, 1.0, -2.0));
        assert_relative_eq!(mean.z, 2.0, epsilon = 1e-6);
        assert_relative_eq!(mean.y, -1.0, epsilon = 1e-6);
    }
}
