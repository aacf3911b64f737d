//! Fast approximate anti-aliasing
//!
//! The frame is copied (or resolved) into an offscreen texture and filtered
//! back onto the primary target with the quality preset of the chosen level.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::render::context::RenderContext;
use crate::render::core::AttachError;
use crate::render::device::{DeviceContext, TargetRef, TextureFormat};
use crate::render::host::RenderHost;
use crate::render::technique::{pass_names, technique_names};
use crate::render::camera::Viewport;

use super::{constant_slots, EffectResources, OffscreenTarget};

/// FXAA quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FxaaLevel {
    /// Disabled
    None,
    /// Fastest
    Low,
    /// Balanced
    #[default]
    Medium,
    /// Sharper edges
    High,
    /// Best quality
    Ultra,
}

/// Shader parameters of a preset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FxaaParameters {
    /// Amount of sub-pixel aliasing removal
    pub subpixel: f32,
    /// Minimum local contrast required to apply the filter
    pub edge_threshold: f32,
    /// Contrast below which dark regions are skipped
    pub edge_threshold_min: f32,
}

impl FxaaLevel {
    /// Preset parameters, `None` when anti-aliasing is disabled
    pub fn parameters(self) -> Option<FxaaParameters> {
        let (subpixel, edge_threshold, edge_threshold_min) = match self {
            FxaaLevel::None => return None,
            FxaaLevel::Low => (0.25, 0.250, 0.0833),
            FxaaLevel::Medium => (0.50, 0.166, 0.0625),
            FxaaLevel::High => (0.75, 0.125, 0.0625),
            FxaaLevel::Ultra => (1.0, 0.063, 0.0312),
        };
        Some(FxaaParameters {
            subpixel,
            edge_threshold,
            edge_threshold_min,
        })
    }
}

/// Constant block of the FXAA pass
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FxaaConstants {
    /// `1/width, 1/height`, padded
    pub rcp_frame: [f32; 4],
    /// Subpixel, edge threshold, edge threshold min, padded
    pub quality: [f32; 4],
}

impl FxaaConstants {
    /// Constants for a preset and target size
    pub fn new(parameters: &FxaaParameters, width: u32, height: u32) -> Self {
        Self {
            rcp_frame: [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32, 0.0, 0.0],
            quality: [
                parameters.subpixel,
                parameters.edge_threshold,
                parameters.edge_threshold_min,
                0.0,
            ],
        }
    }
}

const PASSES: &[&str] = &[pass_names::FXAA];

/// FXAA post-effect core
#[derive(Debug)]
pub struct FxaaCore {
    /// Quality preset
    pub level: FxaaLevel,
    resources: EffectResources,
    source: OffscreenTarget,
}

impl FxaaCore {
    /// FXAA core with a preset
    pub fn new(level: FxaaLevel) -> Self {
        Self {
            level,
            resources: EffectResources::new(technique_names::POST_EFFECT_FXAA, PASSES),
            source: OffscreenTarget::color(TextureFormat::Rgba8),
        }
    }

    pub(crate) fn on_attach(&mut self, host: &mut RenderHost) -> Result<(), AttachError> {
        self.resources.acquire(host)
    }

    pub(crate) fn on_detach(&mut self, host: &mut RenderHost) {
        self.resources.release(host);
        host.defer_texture_release(self.source.take());
    }

    pub(crate) fn can_render(&self) -> bool {
        self.level != FxaaLevel::None && self.resources.is_ready()
    }

    pub(crate) fn render(&mut self, ctx: &RenderContext, device: &mut dyn DeviceContext) {
        let Some(parameters) = self.level.parameters() else {
            return;
        };
        let pass = self.resources.pass(pass_names::FXAA);
        if pass.is_null() {
            return;
        }
        let (width, height) = ctx.viewport().pixel_size();
        let source = self.source.ensure_size(device, width, height);
        if ctx.msaa_samples > 1 {
            device.resolve_texture(TargetRef::Primary, source);
        } else {
            device.copy_texture(TargetRef::Primary, source);
        }

        device.set_render_targets(Some(TargetRef::Primary), None);
        device.set_viewport(&Viewport::new(width as f32, height as f32));
        device.bind_pass(pass);
        if let Some(sampler) = self.resources.sampler() {
            device.bind_sampler(0, sampler);
        }
        let constants = FxaaConstants::new(&parameters, width, height);
        device.update_constants(constant_slots::POST_EFFECT, bytemuck::bytes_of(&constants));
        device.bind_texture(0, TargetRef::Texture(source));
        device.draw_fullscreen_quad();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{test_context, DeviceCall, RecordingDevice};
    use approx::assert_relative_eq;

    #[test]
    fn test_preset_table() {
        let expected = [
            (FxaaLevel::Low, 0.25, 0.250, 0.0833),
            (FxaaLevel::Medium, 0.50, 0.166, 0.0625),
            (FxaaLevel::High, 0.75, 0.125, 0.0625),
            (FxaaLevel::Ultra, 1.0, 0.063, 0.0312),
        ];
        for (level, subpixel, edge, edge_min) in expected {
            let p = level.parameters().unwrap();
            assert_relative_eq!(p.subpixel, subpixel);
            assert_relative_eq!(p.edge_threshold, edge);
            assert_relative_eq!(p.edge_threshold_min, edge_min);
        }
        assert!(FxaaLevel::None.parameters().is_none());
        assert_eq!(FxaaLevel::default(), FxaaLevel::Medium);
    }

    #[test]
    fn test_level_none_is_a_no_op() {
        let mut host = RenderHost::default();
        let mut core = FxaaCore::new(FxaaLevel::None);
        core.on_attach(&mut host).unwrap();
        assert!(!core.can_render());
        let mut device = RecordingDevice::default();
        core.render(&test_context(32, 32), &mut device);
        assert!(device.calls.is_empty());
    }

    #[test]
    fn test_msaa_frame_is_resolved_before_filtering() {
        let mut host = RenderHost::default();
        let mut core = FxaaCore::new(FxaaLevel::High);
        core.on_attach(&mut host).unwrap();
        let mut ctx = test_context(32, 16);
        ctx.msaa_samples = 4;
        let mut device = RecordingDevice::default();
        core.render(&ctx, &mut device);

        assert_eq!(device.count(|c| matches!(c, DeviceCall::Resolve(TargetRef::Primary, _))), 1);
        let constants = FxaaConstants::new(&FxaaLevel::High.parameters().unwrap(), 32, 16);
        assert!(device.calls.contains(&DeviceCall::UpdateConstants(
            constant_slots::POST_EFFECT,
            bytemuck::bytes_of(&constants).to_vec()
        )));
        assert_eq!(device.calls.last(), Some(&DeviceCall::DrawFullscreenQuad));
    }
}
