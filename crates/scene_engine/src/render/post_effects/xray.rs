//! X-ray and x-ray grid
//!
//! Flagged nodes are redrawn with an inverted depth test so the parts hidden
//! behind other geometry show through, either as a faded flat color or as a
//! dimmed grid pattern.
//!
//! A multisampled primary depth buffer can't be tested against directly, so
//! with MSAA the frame's opaque draws are first replayed into a single-sample
//! depth target.

use crate::config::render_config::XRaySettings;
use crate::render::camera::Viewport;
use crate::render::context::RenderContext;
use crate::render::core::AttachError;
use crate::render::device::{DeviceContext, TargetRef};
use crate::render::host::RenderHost;
use crate::render::technique::{pass_names, technique_names};

use super::{constant_slots, effect_names, EffectResources, OffscreenTarget, PostEffectConstants};

/// Look of the occluded parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRayStyle {
    /// Flat faded color
    Plain,
    /// Grid pattern
    Grid,
}

const PASSES: &[&str] = &[
    pass_names::DEPTH_PREPASS,
    pass_names::XRAY_MARK_VISIBLE,
    pass_names::XRAY_OCCLUDED,
];

const STENCIL_REFERENCE: u32 = 1;

/// X-ray post-effect core
#[derive(Debug)]
pub struct XRayCore {
    /// Nodes opt in with this effect name
    pub effect_name: String,
    /// Plain or grid
    pub style: XRayStyle,
    /// X-ray parameters
    pub settings: XRaySettings,
    resources: EffectResources,
    depth: OffscreenTarget,
}

impl XRayCore {
    /// X-ray core; the effect name and technique follow the style
    pub fn new(style: XRayStyle, settings: XRaySettings) -> Self {
        let (effect_name, technique) = match style {
            XRayStyle::Plain => (effect_names::XRAY, technique_names::POST_EFFECT_XRAY),
            XRayStyle::Grid => (effect_names::XRAY_GRID, technique_names::POST_EFFECT_XRAY_GRID),
        };
        Self {
            effect_name: effect_name.to_string(),
            style,
            settings,
            resources: EffectResources::new(technique, PASSES),
            depth: OffscreenTarget::depth_stencil(1),
        }
    }

    pub(crate) fn on_attach(&mut self, host: &mut RenderHost) -> Result<(), AttachError> {
        self.resources.acquire(host)
    }

    pub(crate) fn on_detach(&mut self, host: &mut RenderHost) {
        self.resources.release(host);
        host.defer_texture_release(self.depth.take());
    }

    pub(crate) fn can_render(&self) -> bool {
        !self.effect_name.is_empty() && self.resources.is_ready()
    }

    fn effect_params(&self) -> [f32; 4] {
        match self.style {
            XRayStyle::Plain => [self.settings.fading_factor, 0.0, 0.0, 0.0],
            XRayStyle::Grid => [
                self.settings.grid_density as f32,
                self.settings.dimming_factor,
                self.settings.blending_factor,
                0.0,
            ],
        }
    }

    pub(crate) fn render(&mut self, ctx: &RenderContext, device: &mut dyn DeviceContext) {
        let items = ctx.nodes_with_post_effect(&self.effect_name);
        let occluded = self.resources.pass(pass_names::XRAY_OCCLUDED);
        if items.is_empty() || occluded.is_null() {
            return;
        }
        let (width, height) = ctx.viewport().pixel_size();
        let viewport = Viewport::new(width as f32, height as f32);
        let view_projection = ctx.view_projection();

        let depth = if ctx.msaa_samples > 1 {
            let depth = TargetRef::Texture(self.depth.ensure_size(device, width, height));
            device.set_render_targets(None, Some(depth));
            device.clear_depth_stencil(depth, 1.0, 0);
            device.set_viewport(&viewport);
            device.bind_pass(self.resources.pass(pass_names::DEPTH_PREPASS));
            for item in ctx.opaque_draws() {
                item.draw(device, &view_projection, [0.0; 4]);
            }
            depth
        } else {
            TargetRef::Primary
        };

        device.set_render_targets(Some(TargetRef::Primary), Some(depth));
        device.set_viewport(&viewport);
        let constants = PostEffectConstants::new(self.settings.color, self.effect_params(), width, height);
        device.update_constants(constant_slots::POST_EFFECT, bytemuck::bytes_of(&constants));

        if self.settings.enable_double_pass {
            let mark = self.resources.pass(pass_names::XRAY_MARK_VISIBLE);
            if !mark.is_null() {
                device.bind_pass(mark);
                device.set_stencil_reference(STENCIL_REFERENCE);
                for item in items {
                    item.draw(device, &view_projection, [0.0; 4]);
                }
            }
        }

        device.bind_pass(occluded);
        device.set_stencil_reference(STENCIL_REFERENCE);
        for item in items {
            item.draw(device, &view_projection, item.attributes.color_or(self.settings.color));
        }
    }
}
