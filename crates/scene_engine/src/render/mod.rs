//! # Rendering System
//!
//! Device-agnostic rendering layer of the scene engine. Scene nodes own render
//! cores; cores attach against a [`RenderHost`] and draw through a
//! [`DeviceContext`] supplied by the embedding application.
//!
//! ## Architecture
//!
//! - **RenderCore**: per-node GPU state with an attach/detach lifecycle
//! - **RenderHost**: techniques, state pools, buffer and material registries
//! - **RenderContext**: camera, viewport, frustum and per-frame draw lists
//! - **Post effects**: blur, bloom, outline, x-ray and FXAA cores
//!
//! ## Frame Order
//!
//! Opaque (sorted by render order then material), transparent (traversal
//! order), post effects, screen-spaced content.

pub mod buffers;
pub mod camera;
pub mod context;
pub mod core;
pub mod device;
pub mod host;
pub mod material;
pub mod post_effects;
pub mod scene_cores;
pub mod states;
pub mod technique;

#[cfg(test)]
pub(crate) mod testing;

pub use buffers::{GeometryBufferManager, GeometryBufferProxy};
pub use camera::{Camera, Projection, Viewport};
pub use context::{DrawItem, FrameStats, RenderContext};
pub use self::core::{
    AttachError, AttachState, CoreFactory, CoreId, CustomCore, OrderKey, RenderCore, RenderCoreKind, RenderType,
};
pub use device::{DeviceContext, TargetRef, TextureDesc, TextureFormat, TextureId, TextureUsage};
pub use host::RenderHost;
pub use material::{Material, MaterialId, MaterialRegistry};
pub use post_effects::{EffectAttributes, EffectParseError};
pub use scene_cores::{GeometryCore, InstancingCore, ScreenSpacedCore, ScreenSpacedView};
pub use technique::{EffectsManager, ShaderPass, Technique};
