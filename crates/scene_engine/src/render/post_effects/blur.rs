//! Blur of flagged geometry
//!
//! Flagged nodes are drawn as flat silhouettes into a full-size target, which
//! is downsampled once or twice, blurred with separable passes and blended back
//! onto the primary target.

use serde::{Deserialize, Serialize};

use crate::config::render_config::BlurSettings;
use crate::render::camera::Viewport;
use crate::render::context::RenderContext;
use crate::render::core::AttachError;
use crate::render::device::{DeviceContext, TargetRef, TextureFormat};
use crate::render::host::RenderHost;
use crate::render::technique::{pass_names, technique_names};

use super::{effect_names, fullscreen_pass, separable_blur, EffectResources, OffscreenTarget, PingPong, PostEffectConstants};

/// Number of downsample levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlurDepth {
    /// Half resolution
    #[default]
    One,
    /// Half, then quarter resolution
    Two,
}

impl BlurDepth {
    /// Number of downsampled levels
    pub fn levels(self) -> usize {
        match self {
            BlurDepth::One => 1,
            BlurDepth::Two => 2,
        }
    }
}

const PASSES: &[&str] = &[
    pass_names::SILHOUETTE,
    pass_names::COPY,
    pass_names::BLUR_VERTICAL,
    pass_names::BLUR_HORIZONTAL,
    pass_names::BLUR_COMPOSITE,
];

/// Blur post-effect core
#[derive(Debug)]
pub struct BlurCore {
    /// Nodes opt in with this effect name
    pub effect_name: String,
    /// Blur parameters
    pub settings: BlurSettings,
    resources: EffectResources,
    silhouette: OffscreenTarget,
    levels: Vec<PingPong>,
}

impl BlurCore {
    /// Blur core reacting to [`effect_names::BLUR`]
    pub fn new(settings: BlurSettings) -> Self {
        Self {
            effect_name: effect_names::BLUR.to_string(),
            settings,
            resources: EffectResources::new(technique_names::POST_EFFECT_BLUR, PASSES),
            silhouette: OffscreenTarget::color(TextureFormat::Rgba8),
            levels: Vec::new(),
        }
    }

    pub(crate) fn on_attach(&mut self, host: &mut RenderHost) -> Result<(), AttachError> {
        self.resources.acquire(host)
    }

    pub(crate) fn on_detach(&mut self, host: &mut RenderHost) {
        self.resources.release(host);
        host.defer_texture_release(self.silhouette.take());
        for level in &mut self.levels {
            host.defer_texture_release(level.take());
        }
        self.levels.clear();
    }

    pub(crate) fn can_render(&self) -> bool {
        !self.effect_name.is_empty() && self.resources.is_ready()
    }

    pub(crate) fn render(&mut self, ctx: &RenderContext, device: &mut dyn DeviceContext) {
        let items = ctx.nodes_with_post_effect(&self.effect_name);
        if items.is_empty() {
            return;
        }
        let silhouette_pass = self.resources.pass(pass_names::SILHOUETTE);
        if silhouette_pass.is_null() {
            return;
        }

        let (width, height) = ctx.viewport().pixel_size();
        let silhouette = TargetRef::Texture(self.silhouette.ensure_size(device, width, height));
        device.set_render_targets(Some(silhouette), None);
        device.clear_render_target(silhouette, [0.0; 4]);
        device.set_viewport(&Viewport::new(width as f32, height as f32));
        device.bind_pass(silhouette_pass);
        let view_projection = ctx.view_projection();
        for item in items {
            item.draw(device, &view_projection, item.attributes.color_or([1.0; 4]));
        }

        let sampler = self.resources.sampler();
        let scale = [self.settings.scale_x, self.settings.scale_y];
        let level_count = self.settings.depth.levels();
        for mut level in self.levels.drain(level_count.min(self.levels.len())..) {
            for texture in level.take() {
                device.release_texture(texture);
            }
        }
        self.levels.resize_with(level_count, || PingPong::new(TextureFormat::Rgba8));

        let mut source = silhouette;
        for (i, level) in self.levels.iter_mut().enumerate() {
            let size = ((width >> (i + 1)).max(1), (height >> (i + 1)).max(1));
            level.ensure_size(device, size.0, size.1);
            let Some(destination) = level.current() else {
                return;
            };
            let constants = PostEffectConstants::new([0.0; 4], [0.0; 4], size.0, size.1);
            fullscreen_pass(
                device,
                self.resources.pass(pass_names::COPY),
                sampler,
                source,
                TargetRef::Texture(destination),
                size,
                &constants,
            );
            separable_blur(
                device,
                self.resources.pass(pass_names::BLUR_VERTICAL),
                self.resources.pass(pass_names::BLUR_HORIZONTAL),
                sampler,
                level,
                self.settings.number_of_blur_pass,
                scale,
            );
            match level.current() {
                Some(blurred) => source = TargetRef::Texture(blurred),
                None => return,
            }
        }

        // upsample back through every coarser level before compositing
        for i in (1..self.levels.len()).rev() {
            let (Some(blurred), Some(destination)) = (self.levels[i].current(), self.levels[i - 1].current()) else {
                return;
            };
            let size = self.levels[i - 1].size();
            let constants = PostEffectConstants::new([0.0; 4], [0.0; 4], size.0, size.1);
            fullscreen_pass(
                device,
                self.resources.pass(pass_names::COPY),
                sampler,
                TargetRef::Texture(blurred),
                TargetRef::Texture(destination),
                size,
                &constants,
            );
            source = TargetRef::Texture(destination);
        }

        let constants = PostEffectConstants::new([0.0; 4], [0.0; 4], width, height);
        fullscreen_pass(
            device,
            self.resources.pass(pass_names::BLUR_COMPOSITE),
            sampler,
            source,
            TargetRef::Primary,
            (width, height),
            &constants,
        );
    }
}
