//! Runtime render parameters

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::RasterResult;
use crate::sort::DepthOrder;

/// Parameters the control surface (GUI or CLI) may change between frames
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Multiplies every gaussian scale
    pub scale_modifier: f32,
    /// Visibility threshold and footprint cutoff
    pub min_opacity: f32,
    /// Dilate the 2D covariance by a pixel-sized filter and compensate opacity
    pub antialiasing: bool,
    /// Front-to-back compositing; back-to-front when false
    pub front_to_back: bool,
    pub render_points: bool,
    pub render_quads: bool,
    /// Ordered per-pixel compositing instead of fixed-function blending
    pub software_blending: bool,
    /// Debug introspection only, never affects the image
    pub selected_gaussian: Option<u32>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            scale_modifier: 1.0,
            min_opacity: 0.02,
            antialiasing: false,
            front_to_back: true,
            render_points: true,
            render_quads: false,
            software_blending: false,
            selected_gaussian: None,
        }
    }
}

impl RenderSettings {
    pub const SCALE_MODIFIER_RANGE: (f32, f32) = (0.001, 1.0);
    pub const MIN_OPACITY_RANGE: (f32, f32) = (0.01, 1.0);

    /// Read settings from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> RasterResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        Ok(settings.sanitized())
    }

    pub fn save(&self, path: &Path) -> RasterResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Clamp the sliders to the ranges the control panel exposes
    pub fn sanitized(mut self) -> Self {
        let (lo, hi) = Self::SCALE_MODIFIER_RANGE;
        self.scale_modifier = self.scale_modifier.clamp(lo, hi);
        let (lo, hi) = Self::MIN_OPACITY_RANGE;
        self.min_opacity = self.min_opacity.clamp(lo, hi);
        self
    }

    pub fn depth_order(&self) -> DepthOrder {
        if self.front_to_back {
            DepthOrder::FrontToBack
        } else {
            DepthOrder::BackToFront
        }
    }

    /// The selected index if it points at an existing gaussian
    pub fn selected_in(&self, num_gaussians: usize) -> Option<usize> {
        self.selected_gaussian
            .map(|s| s as usize)
            .filter(|&s| s < num_gaussians)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = RenderSettings::default();
        assert_eq!(s.min_opacity, 0.02);
        assert!(s.render_points && !s.render_quads);
        assert_eq!(s.depth_order(), DepthOrder::FrontToBack);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: RenderSettings =
            serde_json::from_str(r#"{ "render_quads": true, "front_to_back": false }"#).unwrap();
        assert!(s.render_quads);
        assert_eq!(s.depth_order(), DepthOrder::BackToFront);
        assert_eq!(s.scale_modifier, 1.0);
    }

    #[test]
    fn test_sanitized_clamps() {
        let s = RenderSettings {
            scale_modifier: 5.0,
            min_opacity: 0.0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(s.scale_modifier, 1.0);
        assert_eq!(s.min_opacity, 0.01);
    }

    #[test]
    fn test_selected_out_of_range_is_ignored() {
        let s = RenderSettings {
            selected_gaussian: Some(10),
            ..Default::default()
        };
        assert_eq!(s.selected_in(11), Some(10));
        assert_eq!(s.selected_in(10), None);
    }
}
