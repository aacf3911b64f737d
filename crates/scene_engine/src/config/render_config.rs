//! Render configuration
//!
//! Defaults here are what a freshly created [`crate::render::RenderHost`] uses.
//! Post-effect nodes copy their parameters from [`PostEffectConfig`] when created
//! and may then be tuned per node.

use serde::{Deserialize, Serialize};

use super::Config;
use crate::render::post_effects::blur::BlurDepth;
use crate::render::post_effects::fxaa::FxaaLevel;
use crate::render::post_effects::outline::OutlineMode;
use crate::scene::sorting::SortingMethod;

/// Configuration for octree behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Build octrees for groups at all
    pub enabled: bool,

    /// Minimum octant edge length; octants this small are never split
    pub min_octant_size: f32,

    /// Maximum subdivision depth
    pub max_depth: u32,

    /// Items an octant holds before it tries to split
    pub max_items_per_octant: usize,

    /// Expand the root bounds to a cube
    pub cubify: bool,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_octant_size: 1.0,
            max_depth: 8,
            max_items_per_octant: 8,
            cubify: false,
        }
    }
}

/// Sorting group behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortingConfig {
    /// Milliseconds between two sorts
    pub interval_ms: u64,

    /// Distance metric
    pub method: SortingMethod,

    /// Only reorder transparent children
    pub sort_transparent_only: bool,
}

impl Default for SortingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            method: SortingMethod::BoundingBoxCorners,
            sort_transparent_only: true,
        }
    }
}

/// Blur effect parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurSettings {
    /// Vertical+horizontal iterations per level
    pub number_of_blur_pass: u32,
    /// Downsample levels
    pub depth: BlurDepth,
    /// Sampling offset scale
    pub scale_x: f32,
    /// Sampling offset scale
    pub scale_y: f32,
}

impl Default for BlurSettings {
    fn default() -> Self {
        Self {
            number_of_blur_pass: 2,
            depth: BlurDepth::One,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

/// Bloom effect parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    /// Luminance threshold (linear RGB) for the extract pass
    pub threshold_color: [f32; 4],
    /// Blur iterations per chain level
    pub number_of_blur_pass: u32,
    /// Maximum number of halvings after the first level
    pub maximum_down_sampling_step: u32,
    /// Intensity of the extracted highlights
    pub bloom_extract_intensity: f32,
    /// Intensity of each combine step
    pub bloom_pass_intensity: f32,
    /// Intensity of the final composite
    pub bloom_intensity: f32,
    /// Saturation of the final composite
    pub bloom_saturation: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            threshold_color: [0.8, 0.8, 0.8, 0.0],
            number_of_blur_pass: 2,
            maximum_down_sampling_step: 3,
            bloom_extract_intensity: 1.0,
            bloom_pass_intensity: 0.95,
            bloom_intensity: 1.0,
            bloom_saturation: 1.0,
        }
    }
}

/// Outline / border highlight parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineSettings {
    /// Default outline color when a node does not override it
    pub color: [f32; 4],
    /// Blur iterations over the silhouette
    pub number_of_blur_pass: u32,
    /// Silhouette blur offset scale
    pub scale_x: f32,
    /// Silhouette blur offset scale
    pub scale_y: f32,
    /// Merged or per-mesh outlines
    pub mode: OutlineMode,
}

impl Default for OutlineSettings {
    fn default() -> Self {
        Self {
            color: [1.0, 0.0, 0.0, 1.0],
            number_of_blur_pass: 1,
            scale_x: 1.0,
            scale_y: 1.0,
            mode: OutlineMode::Merged,
        }
    }
}

/// X-ray and X-ray grid parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XRaySettings {
    /// Default color for occluded geometry
    pub color: [f32; 4],
    /// Fade of the occluded draw
    pub fading_factor: f32,
    /// Mark visible parts first and draw only occluded parts
    pub enable_double_pass: bool,
    /// Grid lines per unit for the grid variant
    pub grid_density: u32,
    /// Dimming of the grid variant
    pub dimming_factor: f32,
    /// Blend factor of the grid variant
    pub blending_factor: f32,
}

impl Default for XRaySettings {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 1.0, 1.0],
            fading_factor: 0.5,
            enable_double_pass: false,
            grid_density: 8,
            dimming_factor: 0.8,
            blending_factor: 1.0,
        }
    }
}

/// Post-effect defaults
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostEffectConfig {
    /// Blur
    pub blur: BlurSettings,
    /// Bloom
    pub bloom: BloomSettings,
    /// Outline and border highlight
    pub outline: OutlineSettings,
    /// X-ray and X-ray grid
    pub xray: XRaySettings,
    /// FXAA quality
    pub fxaa_level: FxaaLevel,
}

/// Top level render configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Octree behavior
    pub octree: OctreeConfig,
    /// Sorting group behavior
    pub sorting: SortingConfig,
    /// Post-effect defaults
    pub post_effects: PostEffectConfig,
    /// Multisample count of the primary target
    pub msaa_samples: u32,
    /// Skip nodes outside the view frustum
    pub enable_view_frustum_check: bool,
    /// Screen-spaced node edge length in pixels at `size_scale == 1`
    pub screen_spaced_base_size: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            octree: OctreeConfig::default(),
            sorting: SortingConfig::default(),
            post_effects: PostEffectConfig::default(),
            msaa_samples: 1,
            enable_view_frustum_check: true,
            screen_spaced_base_size: 100.0,
        }
    }
}

impl Config for RenderConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let text = r#"
            msaa_samples = 4

            [sorting]
            interval_ms = 250
            method = "BoundingSphereSurface"
        "#;
        let config = RenderConfig::from_str_with_format(text, ConfigFormat::Toml).unwrap();
        assert_eq!(config.msaa_samples, 4);
        assert_eq!(config.sorting.interval_ms, 250);
        assert_eq!(config.sorting.method, SortingMethod::BoundingSphereSurface);
        assert!(config.sorting.sort_transparent_only);
        assert_eq!(config.octree, OctreeConfig::default());
    }

    #[test]
    fn test_ron_round_trip() {
        let mut config = RenderConfig::default();
        config.post_effects.fxaa_level = FxaaLevel::High;
        config.post_effects.outline.mode = OutlineMode::Separated;
        let text = config.to_string_with_format(ConfigFormat::Ron).unwrap();
        let back = RenderConfig::from_str_with_format(&text, ConfigFormat::Ron).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_save_and_load_toml_file() {
        let path = std::env::temp_dir().join(format!("scene_engine_cfg_{}.toml", std::process::id()));
        let mut config = RenderConfig::default();
        config.octree.cubify = true;
        config.save_to_file(&path).unwrap();
        let loaded = RenderConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(loaded.octree.cubify);
    }
}
