//! Device context abstraction
//!
//! The scene never talks to a graphics API directly. Every GPU operation goes
//! through [`DeviceContext`], an immediate-mode, single-threaded command
//! interface implemented by the embedding application.

use bitflags::bitflags;

use super::buffers::GeometryBufferProxy;
use super::camera::Viewport;
use super::technique::ShaderPass;
use super::states::StateId;

/// Handle to a texture created through [`DeviceContext::create_texture`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Texel format of an offscreen texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit normalized RGBA
    Rgba8,
    /// 16-bit float RGBA
    Rgba16Float,
    /// 24-bit depth with 8-bit stencil
    Depth24Stencil8,
}

bitflags! {
    /// How a texture will be bound
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Color attachment
        const RENDER_TARGET = 1 << 0;
        /// Sampled in a shader
        const SHADER_RESOURCE = 1 << 1;
        /// Depth/stencil attachment
        const DEPTH_STENCIL = 1 << 2;
    }
}

/// Description of an offscreen texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Texel format
    pub format: TextureFormat,
    /// Multisample count (1 = single sample)
    pub sample_count: u32,
    /// Bind flags
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// Single-sample color target that can also be sampled
    pub fn color(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            sample_count: 1,
            usage: TextureUsage::RENDER_TARGET | TextureUsage::SHADER_RESOURCE,
        }
    }

    /// Depth-stencil target
    pub fn depth_stencil(width: u32, height: u32, sample_count: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Depth24Stencil8,
            sample_count,
            usage: TextureUsage::DEPTH_STENCIL,
        }
    }
}

/// A render target: the host's primary surface or an offscreen texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetRef {
    /// The primary color or depth buffer owned by the host
    Primary,
    /// An offscreen texture
    Texture(TextureId),
}

/// Immediate-mode device services used by render cores
pub trait DeviceContext {
    /// Create an offscreen texture
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId;

    /// Release a texture created by this device
    fn release_texture(&mut self, texture: TextureId);

    /// Bind color and depth-stencil targets; `None` unbinds the slot
    fn set_render_targets(&mut self, color: Option<TargetRef>, depth_stencil: Option<TargetRef>);

    /// Clear a color target
    fn clear_render_target(&mut self, target: TargetRef, color: [f32; 4]);

    /// Clear a depth-stencil target
    fn clear_depth_stencil(&mut self, target: TargetRef, depth: f32, stencil: u8);

    /// Set the rasterizer viewport
    fn set_viewport(&mut self, viewport: &Viewport);

    /// Bind a shader pass with its blend, rasterizer and depth-stencil states
    fn bind_pass(&mut self, pass: &ShaderPass);

    /// Stencil reference used by the bound depth-stencil state
    fn set_stencil_reference(&mut self, reference: u32);

    /// Bind a texture for sampling
    fn bind_texture(&mut self, slot: u32, texture: TargetRef);

    /// Bind a sampler state
    fn bind_sampler(&mut self, slot: u32, sampler: StateId);

    /// Upload a constant block
    fn update_constants(&mut self, slot: u32, data: &[u8]);

    /// Draw geometry buffers, uploading them on first use
    fn draw_geometry(&mut self, buffers: &GeometryBufferProxy, instance_count: u32);

    /// Draw a full-screen triangle pair with the bound pass
    fn draw_fullscreen_quad(&mut self);

    /// Resolve a multisampled target into a single-sample texture
    fn resolve_texture(&mut self, source: TargetRef, destination: TextureId);

    /// Copy a target into a texture of the same size
    fn copy_texture(&mut self, source: TargetRef, destination: TextureId);
}
