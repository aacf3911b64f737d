//! # Render Context
//!
//! Per-frame state handed to every render core: camera, viewport, timing, the
//! view frustum and the draw lists the post effects consume.
//!
//! ## Frame Lists
//!
//! - **Post-effect lists**: nodes flagged for an effect, keyed by effect name,
//!   in traversal order
//! - **Opaque draws**: everything drawn by the opaque pass, replayed by the
//!   x-ray depth prepass
//!
//! Both lists are cleared by [`RenderContext::begin_frame`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec3};
use crate::geometry::Frustum;
use crate::scene::NodeId;

use super::buffers::GeometryBufferProxy;
use super::camera::{Camera, Viewport};
use super::device::DeviceContext;
use super::material::MaterialConstants;
use super::post_effects::{constant_slots, EffectAttributes};

/// Per-draw transform constants
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelConstants {
    /// Object to world
    pub world: [[f32; 4]; 4],
    /// World to clip
    pub view_projection: [[f32; 4]; 4],
    /// Flat color used by silhouette and x-ray passes
    pub color: [f32; 4],
    /// Core specific parameters (line thickness, point size, ...)
    pub params: [f32; 4],
}

impl ModelConstants {
    /// Constants for one draw
    pub fn new(world: &Mat4, view_projection: &Mat4, color: [f32; 4], params: [f32; 4]) -> Self {
        Self {
            world: (*world).into(),
            view_projection: (*view_projection).into(),
            color,
            params,
        }
    }
}

/// Everything needed to redraw a node outside its own core
#[derive(Debug, Clone)]
pub struct DrawItem {
    /// Node the draw belongs to
    pub node: NodeId,
    /// Total transform
    pub world: Mat4,
    /// Geometry buffers
    pub buffers: Arc<GeometryBufferProxy>,
    /// Per-instance matrices for instanced geometry
    pub instances: Option<Arc<Vec<[[f32; 4]; 4]>>>,
    /// Material constants of the node
    pub material: MaterialConstants,
    /// Effect entry that put the node on a post-effect list
    pub attributes: EffectAttributes,
}

impl DrawItem {
    /// Upload constants and draw with whatever pass is bound
    pub fn draw(&self, device: &mut dyn DeviceContext, view_projection: &Mat4, color: [f32; 4]) {
        let constants = ModelConstants::new(&self.world, view_projection, color, [0.0; 4]);
        device.update_constants(constant_slots::MODEL, bytemuck::bytes_of(&constants));
        device.update_constants(constant_slots::MATERIAL, bytemuck::bytes_of(&self.material));
        match &self.instances {
            Some(instances) => {
                if instances.is_empty() {
                    return;
                }
                device.update_constants(constant_slots::INSTANCES, bytemuck::cast_slice(instances.as_slice()));
                device.draw_geometry(&self.buffers, instances.len() as u32);
            }
            None => device.draw_geometry(&self.buffers, 1),
        }
    }
}

/// Counters collected while rendering one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Nodes whose core rendered
    pub nodes_rendered: usize,
    /// Nodes skipped by the frustum check
    pub nodes_culled: usize,
    /// Post-effect cores that ran
    pub post_effects_run: usize,
}

#[derive(Debug, Clone)]
struct ViewOverride {
    view: Mat4,
    projection: Mat4,
    viewport: Viewport,
}

/// Per-frame rendering state
#[derive(Debug, Clone)]
pub struct RenderContext {
    camera: Camera,
    viewport: Viewport,
    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
    frustum: Frustum,
    overrides: Vec<ViewOverride>,

    /// Time since the first frame
    pub total_time: Duration,
    /// Time since the previous frame
    pub delta_time: Duration,
    /// Multisample count of the primary target
    pub msaa_samples: u32,
    /// Skip nodes outside the view frustum
    pub enable_view_frustum_check: bool,
    /// Counters for the current frame
    pub stats: FrameStats,

    post_effect_nodes: HashMap<String, Vec<DrawItem>>,
    opaque_draws: Vec<DrawItem>,
}

impl RenderContext {
    /// Context for a camera and viewport
    pub fn new(camera: Camera, viewport: Viewport) -> Self {
        let mut context = Self {
            camera,
            viewport,
            view: Mat4::identity(),
            projection: Mat4::identity(),
            view_projection: Mat4::identity(),
            frustum: Frustum::from_matrix(&Mat4::identity()),
            overrides: Vec::new(),
            total_time: Duration::ZERO,
            delta_time: Duration::ZERO,
            msaa_samples: 1,
            enable_view_frustum_check: true,
            stats: FrameStats::default(),
            post_effect_nodes: HashMap::new(),
            opaque_draws: Vec::new(),
        };
        context.camera.set_aspect_ratio(viewport.aspect());
        context.update_matrices();
        context
    }

    /// Advance time, refresh matrices and clear the frame lists
    pub fn begin_frame(&mut self, delta: Duration) {
        self.delta_time = delta;
        self.total_time += delta;
        self.overrides.clear();
        self.post_effect_nodes.clear();
        self.opaque_draws.clear();
        self.stats = FrameStats::default();
        self.update_matrices();
    }

    fn update_matrices(&mut self) {
        self.view = self.camera.get_view_matrix();
        self.projection = self.camera.get_projection_matrix();
        self.view_projection = self.projection * self.view;
        self.frustum = Frustum::from_matrix(&self.view_projection);
    }

    /// Main camera
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Replace the main camera
    pub fn set_camera(&mut self, mut camera: Camera) {
        camera.set_aspect_ratio(self.viewport.aspect());
        self.camera = camera;
        self.update_matrices();
    }

    /// Main viewport, or the innermost override
    pub fn viewport(&self) -> &Viewport {
        self.overrides.last().map_or(&self.viewport, |o| &o.viewport)
    }

    /// Resize the main viewport
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.camera.set_aspect_ratio(viewport.aspect());
        self.update_matrices();
    }

    /// Active view matrix
    pub fn view_matrix(&self) -> &Mat4 {
        self.overrides.last().map_or(&self.view, |o| &o.view)
    }

    /// Active projection matrix
    pub fn projection_matrix(&self) -> &Mat4 {
        self.overrides.last().map_or(&self.projection, |o| &o.projection)
    }

    /// Active view-projection matrix
    pub fn view_projection(&self) -> Mat4 {
        match self.overrides.last() {
            Some(o) => o.projection * o.view,
            None => self.view_projection,
        }
    }

    /// Frustum of the main camera
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// World position of the main camera
    pub fn camera_position(&self) -> Vec3 {
        self.camera.position
    }

    /// Render subsequent draws with a private camera into a sub-viewport
    pub fn push_view_override(&mut self, view: Mat4, projection: Mat4, viewport: Viewport) {
        self.overrides.push(ViewOverride { view, projection, viewport });
    }

    /// Restore the previous camera; returns false when nothing was pushed
    pub fn pop_view_override(&mut self) -> bool {
        self.overrides.pop().is_some()
    }

    /// True while a private camera is active
    pub fn has_view_override(&self) -> bool {
        !self.overrides.is_empty()
    }

    /// Put a draw on an effect's list
    pub fn add_post_effect_node(&mut self, effect: &str, item: DrawItem) {
        self.post_effect_nodes.entry(effect.to_string()).or_default().push(item);
    }

    /// Nodes flagged for an effect this frame, in traversal order
    pub fn nodes_with_post_effect(&self, effect: &str) -> &[DrawItem] {
        self.post_effect_nodes.get(effect).map_or(&[], Vec::as_slice)
    }

    /// Record an opaque draw
    pub fn push_opaque_draw(&mut self, item: DrawItem) {
        self.opaque_draws.push(item);
    }

    /// Opaque draws of this frame
    pub fn opaque_draws(&self) -> &[DrawItem] {
        &self.opaque_draws
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;
    use approx::assert_relative_eq;

    #[test]
    fn test_viewport_drives_camera_aspect() {
        let mut ctx = RenderContext::new(Camera::default(), Viewport::new(800.0, 400.0));
        assert_relative_eq!(ctx.camera().aspect, 2.0);
        ctx.set_viewport(Viewport::new(300.0, 300.0));
        assert_relative_eq!(ctx.camera().aspect, 1.0);
    }

    #[test]
    fn test_view_override_stack() {
        let mut ctx = RenderContext::new(Camera::default(), Viewport::new(800.0, 600.0));
        let main = ctx.view_projection();
        let private_view = Mat4::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y());
        ctx.push_view_override(private_view, Mat4::identity(), Viewport::with_offset(0.0, 500.0, 100.0, 100.0));
        assert!(ctx.has_view_override());
        assert_eq!(ctx.viewport().width, 100.0);
        assert_relative_eq!(ctx.view_projection(), private_view, epsilon = 1e-6);
        assert!(ctx.pop_view_override());
        assert!(!ctx.pop_view_override());
        assert_relative_eq!(ctx.view_projection(), main, epsilon = 1e-6);
    }

    #[test]
    fn test_begin_frame_accumulates_time() {
        let mut ctx = RenderContext::new(Camera::default(), Viewport::new(10.0, 10.0));
        ctx.begin_frame(Duration::from_millis(16));
        ctx.begin_frame(Duration::from_millis(16));
        assert_eq!(ctx.total_time, Duration::from_millis(32));
        assert!(ctx.nodes_with_post_effect("outline").is_empty());
    }
}
