//! Bloom
//!
//! Bright regions of the rendered frame are extracted into a chain of
//! progressively halved targets, each level is blurred, the levels are added
//! back up the chain and the result is added onto the primary target.

use crate::config::render_config::BloomSettings;
use crate::render::context::RenderContext;
use crate::render::core::AttachError;
use crate::render::device::{DeviceContext, TargetRef, TextureFormat};
use crate::render::host::RenderHost;
use crate::render::technique::{pass_names, technique_names};

use super::{fullscreen_pass, separable_blur, EffectResources, OffscreenTarget, PingPong, PostEffectConstants};

/// Sizes of the bloom chain for a `width` x `height` viewport
///
/// Each level halves the previous one (clamped to 1). The chain stops once
/// either dimension reaches 1 or it holds `max_steps + 1` levels.
pub fn bloom_chain_sizes(width: u32, height: u32, max_steps: u32) -> Vec<(u32, u32)> {
    let limit = max_steps as usize + 1;
    let mut sizes = Vec::with_capacity(limit);
    let (mut w, mut h) = (width, height);
    loop {
        w /= 2;
        h /= 2;
        sizes.push((w.max(1), h.max(1)));
        if w <= 1 || h <= 1 || sizes.len() >= limit {
            break;
        }
    }
    sizes
}

const PASSES: &[&str] = &[
    pass_names::BLOOM_EXTRACT,
    pass_names::COPY,
    pass_names::BLUR_VERTICAL,
    pass_names::BLUR_HORIZONTAL,
    pass_names::BLOOM_COMBINE,
    pass_names::BLOOM_COMPOSITE,
];

/// Bloom post-effect core
#[derive(Debug)]
pub struct BloomCore {
    /// Bloom parameters
    pub settings: BloomSettings,
    resources: EffectResources,
    scene_copy: OffscreenTarget,
    chain: Vec<PingPong>,
}

impl BloomCore {
    /// Bloom core with the given parameters
    pub fn new(settings: BloomSettings) -> Self {
        Self {
            settings,
            resources: EffectResources::new(technique_names::POST_EFFECT_BLOOM, PASSES),
            scene_copy: OffscreenTarget::color(TextureFormat::Rgba16Float),
            chain: Vec::new(),
        }
    }

    /// Number of chain levels allocated by the last frame
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub(crate) fn on_attach(&mut self, host: &mut RenderHost) -> Result<(), AttachError> {
        self.resources.acquire(host)
    }

    pub(crate) fn on_detach(&mut self, host: &mut RenderHost) {
        self.resources.release(host);
        host.defer_texture_release(self.scene_copy.take());
        for level in &mut self.chain {
            host.defer_texture_release(level.take());
        }
        self.chain.clear();
    }

    pub(crate) fn can_render(&self) -> bool {
        self.resources.is_ready()
    }

    fn ensure_chain(&mut self, device: &mut dyn DeviceContext, sizes: &[(u32, u32)]) {
        if self.chain.len() > sizes.len() {
            for mut level in self.chain.drain(sizes.len()..) {
                for texture in level.take() {
                    device.release_texture(texture);
                }
            }
        }
        self.chain.resize_with(sizes.len(), || PingPong::new(TextureFormat::Rgba16Float));
        for (level, size) in self.chain.iter_mut().zip(sizes) {
            level.ensure_size(device, size.0, size.1);
        }
    }

    pub(crate) fn render(&mut self, ctx: &RenderContext, device: &mut dyn DeviceContext) {
        if self.resources.pass(pass_names::BLOOM_EXTRACT).is_null() {
            return;
        }
        let (width, height) = ctx.viewport().pixel_size();
        let sizes = bloom_chain_sizes(width, height, self.settings.maximum_down_sampling_step);
        self.ensure_chain(device, &sizes);

        let copy = self.scene_copy.ensure_size(device, width, height);
        if ctx.msaa_samples > 1 {
            device.resolve_texture(TargetRef::Primary, copy);
        } else {
            device.copy_texture(TargetRef::Primary, copy);
        }

        let sampler = self.resources.sampler();
        let settings = &self.settings;
        let level_target = |level: &PingPong| level.current().map(TargetRef::Texture);

        let Some(first) = self.chain.first().and_then(level_target) else {
            return;
        };
        fullscreen_pass(
            device,
            self.resources.pass(pass_names::BLOOM_EXTRACT),
            sampler,
            TargetRef::Texture(copy),
            first,
            sizes[0],
            &PostEffectConstants::new(
                settings.threshold_color,
                [settings.bloom_extract_intensity, 0.0, 0.0, 0.0],
                sizes[0].0,
                sizes[0].1,
            ),
        );

        for i in 1..self.chain.len() {
            let (Some(source), Some(destination)) = (level_target(&self.chain[i - 1]), level_target(&self.chain[i]))
            else {
                return;
            };
            fullscreen_pass(
                device,
                self.resources.pass(pass_names::COPY),
                sampler,
                source,
                destination,
                sizes[i],
                &PostEffectConstants::new([0.0; 4], [0.0; 4], sizes[i].0, sizes[i].1),
            );
        }

        for level in &mut self.chain {
            separable_blur(
                device,
                self.resources.pass(pass_names::BLUR_VERTICAL),
                self.resources.pass(pass_names::BLUR_HORIZONTAL),
                sampler,
                level,
                self.settings.number_of_blur_pass,
                [1.0, 1.0],
            );
        }

        for i in (1..self.chain.len()).rev() {
            let (Some(source), Some(destination)) = (level_target(&self.chain[i]), level_target(&self.chain[i - 1]))
            else {
                return;
            };
            fullscreen_pass(
                device,
                self.resources.pass(pass_names::BLOOM_COMBINE),
                sampler,
                source,
                destination,
                sizes[i - 1],
                &PostEffectConstants::new(
                    [0.0; 4],
                    [self.settings.bloom_pass_intensity, 0.0, 0.0, 0.0],
                    sizes[i - 1].0,
                    sizes[i - 1].1,
                ),
            );
        }

        let Some(result) = self.chain.first().and_then(level_target) else {
            return;
        };
        fullscreen_pass(
            device,
            self.resources.pass(pass_names::BLOOM_COMPOSITE),
            sampler,
            result,
            TargetRef::Primary,
            (width, height),
            &PostEffectConstants::new(
                [0.0; 4],
                [self.settings.bloom_intensity, self.settings.bloom_saturation, 0.0, 0.0],
                width,
                height,
            ),
        );
    }
}
