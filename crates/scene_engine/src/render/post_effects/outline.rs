//! Mesh outline blur and border highlight
//!
//! Flagged nodes are drawn into an offscreen silhouette while writing stencil.
//! The silhouette is blurred (or edge-detected first for border highlight) and
//! composited onto the primary target only where stencil is not set, so the
//! glow appears around the mesh and never over it.

use serde::{Deserialize, Serialize};

use crate::config::render_config::OutlineSettings;
use crate::foundation::math::Mat4;
use crate::render::camera::Viewport;
use crate::render::context::{DrawItem, RenderContext};
use crate::render::core::AttachError;
use crate::render::device::{DeviceContext, TargetRef, TextureFormat};
use crate::render::host::RenderHost;
use crate::render::technique::{pass_names, technique_names};

use super::{
    constant_slots, effect_names, fullscreen_pass, separable_blur, EffectResources, OffscreenTarget, PingPong,
    PostEffectConstants,
};

/// How flagged meshes share outline passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutlineMode {
    /// One silhouette for all flagged meshes; overlapping outlines merge
    #[default]
    Merged,
    /// One full silhouette/blur/composite cycle per mesh
    Separated,
}

/// Look of the outline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineStyle {
    /// Soft glow from a blurred silhouette
    MeshOutlineBlur,
    /// Crisp border from edge detection on the silhouette
    BorderHighlight,
}

const PASSES: &[&str] = &[
    pass_names::SILHOUETTE_STENCIL,
    pass_names::COPY,
    pass_names::BORDER_DETECT,
    pass_names::BLUR_VERTICAL,
    pass_names::BLUR_HORIZONTAL,
    pass_names::OUTLINE_COMPOSITE,
];

const STENCIL_REFERENCE: u32 = 1;

/// Outline post-effect core
#[derive(Debug)]
pub struct OutlineCore {
    /// Nodes opt in with this effect name
    pub effect_name: String,
    /// Glow or border
    pub style: OutlineStyle,
    /// Outline parameters
    pub settings: OutlineSettings,
    resources: EffectResources,
    silhouette: OffscreenTarget,
    stencil: OffscreenTarget,
    blur: PingPong,
}

impl OutlineCore {
    /// Outline core; the effect name follows the style
    pub fn new(style: OutlineStyle, settings: OutlineSettings) -> Self {
        let effect_name = match style {
            OutlineStyle::MeshOutlineBlur => effect_names::OUTLINE,
            OutlineStyle::BorderHighlight => effect_names::BORDER_HIGHLIGHT,
        };
        Self {
            effect_name: effect_name.to_string(),
            style,
            settings,
            resources: EffectResources::new(technique_names::POST_EFFECT_OUTLINE, PASSES),
            silhouette: OffscreenTarget::color(TextureFormat::Rgba8),
            stencil: OffscreenTarget::depth_stencil(1),
            blur: PingPong::new(TextureFormat::Rgba8),
        }
    }

    pub(crate) fn on_attach(&mut self, host: &mut RenderHost) -> Result<(), AttachError> {
        self.resources.acquire(host)
    }

    pub(crate) fn on_detach(&mut self, host: &mut RenderHost) {
        self.resources.release(host);
        host.defer_texture_release(self.silhouette.take());
        host.defer_texture_release(self.stencil.take());
        host.defer_texture_release(self.blur.take());
    }

    pub(crate) fn can_render(&self) -> bool {
        !self.effect_name.is_empty() && self.resources.is_ready()
    }

    pub(crate) fn render(&mut self, ctx: &RenderContext, device: &mut dyn DeviceContext) {
        let items = ctx.nodes_with_post_effect(&self.effect_name);
        if items.is_empty() || self.resources.pass(pass_names::SILHOUETTE_STENCIL).is_null() {
            return;
        }
        let size = ctx.viewport().pixel_size();
        self.silhouette.ensure_size(device, size.0, size.1);
        self.stencil.ensure_size(device, size.0, size.1);
        self.blur.ensure_size(device, size.0, size.1);

        let view_projection = ctx.view_projection();
        match self.settings.mode {
            OutlineMode::Merged => self.outline_cycle(device, &view_projection, items, size),
            OutlineMode::Separated => {
                for item in items {
                    self.outline_cycle(device, &view_projection, std::slice::from_ref(item), size);
                }
            }
        }
    }

    fn outline_cycle(
        &mut self,
        device: &mut dyn DeviceContext,
        view_projection: &Mat4,
        items: &[DrawItem],
        size: (u32, u32),
    ) {
        let (Some(silhouette), Some(stencil)) = (self.silhouette.target(), self.stencil.target()) else {
            return;
        };
        let viewport = Viewport::new(size.0 as f32, size.1 as f32);

        device.set_render_targets(Some(silhouette), Some(stencil));
        device.clear_render_target(silhouette, [0.0; 4]);
        device.clear_depth_stencil(stencil, 1.0, 0);
        device.set_viewport(&viewport);
        device.bind_pass(self.resources.pass(pass_names::SILHOUETTE_STENCIL));
        device.set_stencil_reference(STENCIL_REFERENCE);
        for item in items {
            item.draw(device, view_projection, item.attributes.color_or(self.settings.color));
        }

        let Some(destination) = self.blur.current() else {
            return;
        };
        let first_pass = match self.style {
            OutlineStyle::MeshOutlineBlur => pass_names::COPY,
            OutlineStyle::BorderHighlight => pass_names::BORDER_DETECT,
        };
        let constants = PostEffectConstants::new(
            self.settings.color,
            [self.settings.scale_x, self.settings.scale_y, 0.0, 0.0],
            size.0,
            size.1,
        );
        let sampler = self.resources.sampler();
        fullscreen_pass(
            device,
            self.resources.pass(first_pass),
            sampler,
            silhouette,
            TargetRef::Texture(destination),
            size,
            &constants,
        );
        separable_blur(
            device,
            self.resources.pass(pass_names::BLUR_VERTICAL),
            self.resources.pass(pass_names::BLUR_HORIZONTAL),
            sampler,
            &mut self.blur,
            self.settings.number_of_blur_pass,
            [self.settings.scale_x, self.settings.scale_y],
        );

        let composite = self.resources.pass(pass_names::OUTLINE_COMPOSITE);
        let Some(blurred) = self.blur.current() else {
            return;
        };
        if composite.is_null() {
            return;
        }
        device.set_render_targets(Some(TargetRef::Primary), Some(stencil));
        device.set_viewport(&viewport);
        device.bind_pass(composite);
        device.set_stencil_reference(STENCIL_REFERENCE);
        if let Some(sampler) = sampler {
            device.bind_sampler(0, sampler);
        }
        device.update_constants(constant_slots::POST_EFFECT, bytemuck::bytes_of(&constants));
        device.bind_texture(0, TargetRef::Texture(blurred));
        device.draw_fullscreen_quad();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{draw_item, test_context, RecordingDevice};

    fn render_three(style: OutlineStyle, mode: OutlineMode) -> RecordingDevice {
        let mut host = RenderHost::default();
        let settings = OutlineSettings {
            mode,
            number_of_blur_pass: 2,
            ..OutlineSettings::default()
        };
        let mut core = OutlineCore::new(style, settings);
        core.on_attach(&mut host).unwrap();

        let mut ctx = test_context(128, 128);
        for _ in 0..3 {
            ctx.add_post_effect_node(&core.effect_name, draw_item(&core.effect_name));
        }
        let mut device = RecordingDevice::default();
        core.render(&ctx, &mut device);
        device
    }

    #[test]
    fn test_merged_mode_runs_one_cycle() {
        let device = render_three(OutlineStyle::MeshOutlineBlur, OutlineMode::Merged);
        assert_eq!(device.pass_binds(pass_names::SILHOUETTE_STENCIL), 1);
        assert_eq!(device.pass_binds(pass_names::OUTLINE_COMPOSITE), 1);
        assert_eq!(device.pass_binds(pass_names::BLUR_VERTICAL), 2);
        assert_eq!(device.drawn().len(), 3);
    }

    #[test]
    fn test_separated_mode_runs_one_cycle_per_mesh() {
        let device = render_three(OutlineStyle::MeshOutlineBlur, OutlineMode::Separated);
        assert_eq!(device.pass_binds(pass_names::SILHOUETTE_STENCIL), 3);
        assert_eq!(device.pass_binds(pass_names::OUTLINE_COMPOSITE), 3);
        assert_eq!(device.pass_binds(pass_names::BLUR_VERTICAL), 6);
        assert_eq!(device.drawn().len(), 3);
    }

    #[test]
    fn test_border_highlight_adds_edge_detection() {
        let device = render_three(OutlineStyle::BorderHighlight, OutlineMode::Merged);
        assert_eq!(device.pass_binds(pass_names::BORDER_DETECT), 1);
        assert_eq!(device.pass_binds(pass_names::COPY), 0);
        let blur = render_three(OutlineStyle::MeshOutlineBlur, OutlineMode::Merged);
        assert_eq!(blur.pass_binds(pass_names::BORDER_DETECT), 0);
    }

    #[test]
    fn test_composite_is_stencil_tested_against_silhouette() {
        let device = render_three(OutlineStyle::MeshOutlineBlur, OutlineMode::Merged);
        let passes = device.bound_passes();
        assert_eq!(passes.first().map(String::as_str), Some(pass_names::SILHOUETTE_STENCIL));
        assert_eq!(passes.last().map(String::as_str), Some(pass_names::OUTLINE_COMPOSITE));
    }
}
