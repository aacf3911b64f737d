//! Screen-spaced nodes
//!
//! A screen-spaced node draws its subtree into a small square of the screen
//! with a private camera. The private camera always looks at the subtree's
//! origin from the main camera's direction, so a view box or coordinate
//! system turns with the scene but keeps its size and place on screen.
//!
//! View boxes and coordinate systems get their gizmo children when created;
//! hits on those children are tagged with the face or axis that was hit.

use std::f32::consts::FRAC_PI_2;

use log::{debug, trace};

use crate::foundation::math::{utils, Mat4, Vec2, Vec3};
use crate::render::{Camera, Material, RenderContext, RenderCoreKind, ScreenSpacedView, Viewport};

use super::assets::{SceneAssets, AXIS_COLORS};
use super::graph::{Scene, SceneError};
use super::hit_test::{HitTag, HitTestResult};
use super::node::{NodeId, NodeKind, ScreenSpacedKind};

const VIEW_BOX_SCALE: f32 = 4.0;
const AXIS_SCALE: f32 = 3.5;

/// Where the screen rectangle sits
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScreenSpacedPlacement {
    /// Center in normalized device coordinates of the main viewport,
    /// (-1, -1) bottom left to (1, 1) top right
    Relative {
        /// Horizontal position
        x: f32,
        /// Vertical position
        y: f32,
    },
    /// Centered on the screen projection of a world point
    Anchor3D(Vec3),
}

/// Projection of the private camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenSpacedProjection {
    /// Perspective with [`ScreenSpacedSettings::field_of_view`]
    #[default]
    Perspective,
    /// Parallel projection covering what the perspective would show at the origin
    Orthographic,
}

/// Placement and camera of a screen-spaced node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenSpacedSettings {
    /// Rectangle position
    pub placement: ScreenSpacedPlacement,
    /// Multiplier on the configured base size in pixels
    pub size_scale: f32,
    /// Distance of the private camera from the subtree origin
    pub camera_distance: f32,
    /// Vertical field of view in degrees
    pub field_of_view: f32,
    /// Private camera projection
    pub projection: ScreenSpacedProjection,
}

impl Default for ScreenSpacedSettings {
    fn default() -> Self {
        Self {
            placement: ScreenSpacedPlacement::Relative { x: -0.8, y: -0.8 },
            size_scale: 1.0,
            camera_distance: 10.0,
            field_of_view: 45.0,
            projection: ScreenSpacedProjection::Perspective,
        }
    }
}

/// Gizmo child roles, used to tag hits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GizmoPart {
    /// The view box cube
    ViewBoxCube,
    /// Coordinate system arrow, 0 = X, 1 = Y, 2 = Z
    Axis(usize),
}

/// Per-node state of a screen-spaced node
#[derive(Debug, Clone, Default)]
pub struct ScreenSpacedState {
    /// Placement and camera
    pub settings: ScreenSpacedSettings,
    pub(crate) gizmo: Vec<(NodeId, GizmoPart)>,
}

impl ScreenSpacedState {
    /// Role of a gizmo child
    pub fn gizmo_part(&self, node: NodeId) -> Option<GizmoPart> {
        self.gizmo.iter().find(|(id, _)| *id == node).map(|(_, part)| *part)
    }
}

/// Private camera and rectangle for the current main camera and viewport
///
/// Returns `None` when a 3D anchor is behind the main camera.
pub fn compute_view(
    settings: &ScreenSpacedSettings,
    main_camera: &Camera,
    main_viewport: &Viewport,
    base_size: f32,
) -> Option<ScreenSpacedView> {
    let side = base_size * settings.size_scale;
    let center = match settings.placement {
        ScreenSpacedPlacement::Relative { x, y } => main_viewport.from_ndc(Vec2::new(x, y)),
        ScreenSpacedPlacement::Anchor3D(anchor) => main_camera.project_to_screen(anchor, main_viewport)?,
    };
    let viewport = Viewport::with_offset(center.x - side * 0.5, center.y - side * 0.5, side, side);

    let distance = settings.camera_distance;
    let position = -main_camera.look_direction() * distance;
    let near = (distance * 0.01).max(f32::EPSILON);
    let far = distance * 10.0;
    let mut camera = match settings.projection {
        ScreenSpacedProjection::Perspective => {
            Camera::perspective(position, settings.field_of_view, 1.0, near, far)
        }
        ScreenSpacedProjection::Orthographic => {
            let width = 2.0 * distance * (utils::deg_to_rad(settings.field_of_view) * 0.5).tan();
            Camera::orthographic(position, width, 1.0, near, far)
        }
    };
    camera.look_at(Vec3::zeros(), main_camera.up);
    Some(ScreenSpacedView { camera, viewport })
}

impl Scene {
    /// Screen-spaced nodes reachable through visible, hit-testable ancestors
    pub(crate) fn screen_spaced_nodes(&self) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else { continue };
            if !node.is_visible() || !node.is_hit_test_visible() {
                continue;
            }
            if matches!(node.kind, NodeKind::ScreenSpaced(_)) {
                found.push(id);
            } else {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        found
    }

    /// Hit test the subtree of a screen-spaced node with its private camera
    ///
    /// Pixels outside the node's rectangle never hit. Hits are marked
    /// screen-spaced, and gizmo hits get a face or axis tag.
    pub(crate) fn hit_test_screen_spaced(
        &self,
        id: NodeId,
        ctx: &RenderContext,
        pixel: Vec2,
        results: &mut Vec<HitTestResult>,
    ) {
        let Some(node) = self.nodes.get(id) else { return };
        let Some(state) = node.screen_spaced.as_ref() else { return };
        let base_size = self.host.config.screen_spaced_base_size;
        let Some(view) = compute_view(&state.settings, ctx.camera(), ctx.viewport(), base_size) else {
            return;
        };
        if !view.viewport.contains(pixel) {
            return;
        }

        let ray = view.camera.pixel_to_ray(pixel, &view.viewport);
        let mut local = Vec::new();
        self.hit_test_children(node, &ray, &mut local);
        trace!("Screen-spaced {:?}: {} hits", id, local.len());

        results.extend(local.into_iter().map(|mut hit| {
            hit.screen_spaced = true;
            match state.gizmo_part(hit.node) {
                Some(GizmoPart::ViewBoxCube) => {
                    if let Some(face) = hit.triangle_index.and_then(SceneAssets::view_box_face) {
                        hit.tag = Some(HitTag::ViewBoxFace(face));
                    }
                }
                Some(GizmoPart::Axis(axis)) => hit.tag = Some(HitTag::Axis(axis)),
                None => {}
            }
            hit
        }));
    }

    /// Store the private views on every screen-spaced core
    pub(crate) fn update_screen_spaced_views(&mut self, ctx: &RenderContext) {
        let base_size = self.host.config.screen_spaced_base_size;
        for node in self.nodes.values_mut() {
            let Some(state) = node.screen_spaced.as_ref() else { continue };
            let view = compute_view(&state.settings, ctx.camera(), ctx.viewport(), base_size);
            if let RenderCoreKind::ScreenSpaced(core) = node.core.kind_mut() {
                core.set_view(view);
            }
        }
    }

    /// Add the gizmo children of a view box or coordinate system
    pub(crate) fn build_gizmo(&mut self, id: NodeId, kind: ScreenSpacedKind) -> Result<(), SceneError> {
        let mut parts = Vec::new();
        match kind {
            ScreenSpacedKind::Plain => return Ok(()),
            ScreenSpacedKind::ViewBox => {
                let cube = self.host.assets.view_box_cube.clone();
                let child = self.add_mesh(id, cube, Material::new("view_box").with_color(0.8, 0.8, 0.85))?;
                self.set_transform(child, Mat4::new_scaling(VIEW_BOX_SCALE))?;
                parts.push((child, GizmoPart::ViewBoxCube));
            }
            ScreenSpacedKind::CoordinateSystem => {
                let rotations = [
                    Mat4::identity(),
                    Mat4::from_axis_angle(&Vec3::z_axis(), FRAC_PI_2),
                    Mat4::from_axis_angle(&Vec3::y_axis(), -FRAC_PI_2),
                ];
                for (axis, rotation) in rotations.into_iter().enumerate() {
                    let color = AXIS_COLORS[axis];
                    let material = Material::new(["axis_x", "axis_y", "axis_z"][axis]).with_color(color.x, color.y, color.z);
                    let arrow = self.host.assets.axis_arrow.clone();
                    let child = self.add_mesh(id, arrow, material)?;
                    self.set_transform(child, rotation * Mat4::new_scaling(AXIS_SCALE))?;
                    parts.push((child, GizmoPart::Axis(axis)));
                }
            }
        }
        debug!("Built {:?} gizmo with {} parts under {:?}", kind, parts.len(), id);
        if let Some(state) = self.get_mut(id)?.screen_spaced.as_mut() {
            state.gizmo = parts;
        }
        Ok(())
    }

    /// Placement and camera of a screen-spaced node
    pub fn screen_spaced_settings(&self, id: NodeId) -> Option<&ScreenSpacedSettings> {
        self.nodes.get(id)?.screen_spaced.as_ref().map(|s| &s.settings)
    }

    /// Change placement or camera of a screen-spaced node
    pub fn set_screen_spaced_settings(&mut self, id: NodeId, settings: ScreenSpacedSettings) -> Result<(), SceneError> {
        let state = self
            .get_mut(id)?
            .screen_spaced
            .as_mut()
            .ok_or(SceneError::Unsupported { node: id, operation: "set_screen_spaced_settings" })?;
        state.settings = settings;
        Ok(())
    }
}
