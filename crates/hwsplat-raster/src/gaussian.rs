//! Static per-gaussian attributes
//!
//! A loader hands over raw, pre-activation values in a [`SceneIngest`]. The
//! [`GaussianStore`] applies the activations exactly once and keeps the
//! attributes as structure-of-arrays, which is also the layout uploaded to
//! the GPU.

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{RasterError, RasterResult};
use crate::sh::SH_C0;

/// Spherical-harmonic coefficients per color channel (degree 3)
pub const SH_COEFFS_PER_CHANNEL: usize = 16;

/// Spherical-harmonic coefficients per gaussian (3 channels)
pub const SH_COEFFS_PER_GAUSSIAN: usize = 3 * SH_COEFFS_PER_CHANNEL;

/// Logistic activation, kept strictly inside (0, 1)
///
/// In f32 the plain formula saturates to exactly 1.0 above a logit of about
/// 17 and to 0.0 below about -104.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    (1.0 / (1.0 + (-x).exp())).clamp(f32::MIN_POSITIVE, 1.0 - f32::EPSILON)
}

#[inline]
pub fn logit(p: f32) -> f32 {
    (p / (1.0 - p)).ln()
}

/// Raw scene data as produced by a point-cloud loader
///
/// Scales are log-space, opacities are logits, and `sh_coeffs` holds 48 values
/// per gaussian in file order: the three DC terms first, then the 45 higher
/// order terms grouped by channel.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SceneIngest {
    pub positions: Vec<[f32; 3]>,
    /// Quaternions packed as (r, x, y, z)
    pub rotations: Vec<[f32; 4]>,
    pub log_scales: Vec<[f32; 3]>,
    pub opacity_logits: Vec<f32>,
    pub sh_coeffs: Vec<f32>,
}

impl SceneIngest {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Read a scene dumped as JSON by an external loader
    pub fn load_json(path: &Path) -> RasterResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Append a gaussian given in activated form with a constant (view-independent) color
    ///
    /// The values are stored pre-activation, so they round-trip through
    /// [`GaussianStore::from_ingest`] like file data would.
    pub fn push_activated(
        &mut self,
        position: Vec3,
        scale: Vec3,
        rotation: Vec4,
        opacity: f32,
        rgb: Vec3,
    ) {
        self.positions.push(position.to_array());
        self.rotations.push(rotation.to_array());
        self.log_scales.push([scale.x.ln(), scale.y.ln(), scale.z.ln()]);
        self.opacity_logits.push(logit(opacity));

        let dc = (rgb - Vec3::splat(0.5)) / SH_C0;
        let mut coeffs = [0.0f32; SH_COEFFS_PER_GAUSSIAN];
        coeffs[..3].copy_from_slice(&dc.to_array());
        self.sh_coeffs.extend_from_slice(&coeffs);
    }

    fn check_lengths(&self) -> RasterResult<()> {
        let n = self.positions.len();
        let check = |attribute, expected, actual| {
            if expected == actual {
                Ok(())
            } else {
                Err(RasterError::AttributeLength { attribute, expected, actual })
            }
        };
        check("rotations", n, self.rotations.len())?;
        check("log_scales", n, self.log_scales.len())?;
        check("opacity_logits", n, self.opacity_logits.len())?;
        check("sh_coeffs", n * SH_COEFFS_PER_GAUSSIAN, self.sh_coeffs.len())
    }
}

/// One gaussian in activated form
#[derive(Clone, Debug, PartialEq)]
pub struct Gaussian {
    pub id: u32,
    pub position: Vec3,
    pub scale: Vec3,
    /// Unit quaternion as (r, x, y, z)
    pub rotation: Vec4,
    pub opacity: f32,
    /// Per channel, 16 coefficients each
    pub sh: [[f32; SH_COEFFS_PER_CHANNEL]; 3],
}

impl Gaussian {
    /// Gaussian with a view-independent color
    pub fn solid(id: u32, position: Vec3, scale: Vec3, rotation: Vec4, opacity: f32, rgb: Vec3) -> Self {
        let mut sh = [[0.0; SH_COEFFS_PER_CHANNEL]; 3];
        for (channel, block) in sh.iter_mut().enumerate() {
            block[0] = (rgb[channel] - 0.5) / SH_C0;
        }
        Self {
            id,
            position,
            scale,
            rotation,
            opacity,
            sh,
        }
    }
}

/// Immutable activated attributes for the whole scene
#[derive(Clone, Debug, Default)]
pub struct GaussianStore {
    /// xyz, w = 1
    pub positions: Vec<[f32; 4]>,
    /// xyz, w = 0
    pub scales: Vec<[f32; 4]>,
    /// (r, x, y, z)
    pub rotations: Vec<[f32; 4]>,
    pub opacities: Vec<f32>,
    /// `[gaussian][channel][coefficient]`, 48 floats per gaussian
    pub sh_coeffs: Vec<f32>,
}

impl GaussianStore {
    /// Validate raw loader output and apply the activations
    pub fn from_ingest(ingest: &SceneIngest) -> RasterResult<Self> {
        ingest.check_lengths()?;
        let n = ingest.len();

        let positions = ingest
            .positions
            .iter()
            .map(|p| [p[0], p[1], p[2], 1.0])
            .collect();

        // exponential activation
        let scales = ingest
            .log_scales
            .iter()
            .map(|s| [s[0].exp(), s[1].exp(), s[2].exp(), 0.0])
            .collect();

        let mut rotations = Vec::with_capacity(n);
        for (index, q) in ingest.rotations.iter().enumerate() {
            let q = Vec4::from_array(*q);
            let len = q.length();
            if !(len > 0.0) {
                return Err(RasterError::DegenerateRotation { index });
            }
            rotations.push((q / len).to_array());
        }

        // sigmoid activation
        let opacities = ingest.opacity_logits.iter().map(|&o| sigmoid(o)).collect();

        let mut sh_coeffs = vec![0.0f32; n * SH_COEFFS_PER_GAUSSIAN];
        for (raw, dst) in ingest
            .sh_coeffs
            .chunks_exact(SH_COEFFS_PER_GAUSSIAN)
            .zip(sh_coeffs.chunks_exact_mut(SH_COEFFS_PER_GAUSSIAN))
        {
            for channel in 0..3 {
                let block = &mut dst[channel * SH_COEFFS_PER_CHANNEL..][..SH_COEFFS_PER_CHANNEL];
                block[0] = raw[channel];
                for j in 1..SH_COEFFS_PER_CHANNEL {
                    block[j] = raw[3 + channel * 15 + j - 1];
                }
            }
        }

        tracing::info!("Activated {} gaussians", n);

        Ok(Self {
            positions,
            scales,
            rotations,
            opacities,
            sh_coeffs,
        })
    }

    /// Build a store from gaussians that are already activated
    pub fn from_gaussians<'a>(gaussians: impl IntoIterator<Item = &'a Gaussian>) -> Self {
        let mut store = Self::default();
        for g in gaussians {
            store.positions.push(g.position.extend(1.0).to_array());
            store.scales.push(g.scale.extend(0.0).to_array());
            store
                .rotations
                .push(g.rotation.try_normalize().unwrap_or(Vec4::X).to_array());
            store.opacities.push(g.opacity);
            for channel in &g.sh {
                store.sh_coeffs.extend_from_slice(channel);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    pub fn position(&self, index: usize) -> Vec3 {
        Vec4::from_array(self.positions[index]).truncate()
    }

    #[inline]
    pub fn scale(&self, index: usize) -> Vec3 {
        Vec4::from_array(self.scales[index]).truncate()
    }

    #[inline]
    pub fn rotation(&self, index: usize) -> Vec4 {
        Vec4::from_array(self.rotations[index])
    }

    /// The 16 coefficients of one channel
    #[inline]
    pub fn sh_channel(&self, index: usize, channel: usize) -> &[f32] {
        let start = index * SH_COEFFS_PER_GAUSSIAN + channel * SH_COEFFS_PER_CHANNEL;
        &self.sh_coeffs[start..start + SH_COEFFS_PER_CHANNEL]
    }

    /// Look up one gaussian; `None` when the index is out of range
    pub fn get(&self, index: usize) -> Option<Gaussian> {
        if index >= self.len() {
            return None;
        }
        let mut sh = [[0.0; SH_COEFFS_PER_CHANNEL]; 3];
        for (channel, dst) in sh.iter_mut().enumerate() {
            dst.copy_from_slice(self.sh_channel(index, channel));
        }
        Some(Gaussian {
            id: index as u32,
            position: self.position(index),
            scale: self.scale(index),
            rotation: self.rotation(index),
            opacity: self.opacities[index],
            sh,
        })
    }

    /// Axis-aligned bounds of all gaussian centers
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        if self.is_empty() {
            return None;
        }
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for i in 0..self.len() {
            let p = self.position(i);
            min = min.min(p);
            max = max.max(p);
        }
        Some((min, max))
    }
}
