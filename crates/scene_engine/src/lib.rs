//! # Scene Engine
//!
//! Retained-mode scene graph with device-agnostic render cores.
//!
//! ## Features
//!
//! - **Render cores**: per-node GPU state with an attach/detach lifecycle
//! - **Octree hit testing**: groups and instancing meshes prune rays through
//!   an incrementally maintained octree
//! - **Post effects**: blur, bloom, mesh outline, border highlight, x-ray,
//!   x-ray grid and FXAA
//! - **Screen-spaced nodes**: view box and coordinate system gizmos drawn and
//!   hit tested with their own camera
//! - **Sorting groups**: periodic camera-distance ordering of children
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! # fn frame(device: &mut dyn DeviceContext) -> Result<(), SceneError> {
//! let mut scene = Scene::new(RenderConfig::default());
//! scene.attach();
//! let cube = scene.host().assets.view_box_cube.clone();
//! let node = scene.add_mesh(scene.root(), cube, Material::new("red").with_color(1.0, 0.0, 0.0))?;
//! scene.set_post_effects(node, "outline[color:#FFFF00]")?;
//! scene.add_node(scene.root(), NodeKind::PostEffect(PostEffectKind::Outline))?;
//!
//! let mut ctx = scene.create_context(Camera::default(), Viewport::new(1280.0, 720.0));
//! ctx.begin_frame(std::time::Duration::from_millis(16));
//! scene.update(&ctx);
//! scene.render(&mut ctx, device);
//! let hits = scene.hit_test(&ctx, Vec2::new(640.0, 360.0), HitTestMode::Nearest);
//! # let _ = hits;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod foundation;
pub mod geometry;
pub mod render;
pub mod scene;
pub mod spatial;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, RenderConfig},
        foundation::math::{Mat4, Vec2, Vec3, Vec4},
        geometry::{BoundingBox, Geometry, LineData, MeshData, PointData, Ray},
        render::{Camera, DeviceContext, Material, RenderContext, RenderCore, RenderHost, Viewport},
        scene::{
            HitTag, HitTestMode, HitTestResult, NodeId, NodeKind, PostEffectKind, Scene, SceneError, ScreenSpacedKind,
            ScreenSpacedSettings,
        },
    };
}
