//! Render cores of drawable scene nodes
//!
//! [`GeometryCore`] draws a mesh, line list or point list with a material.
//! [`InstancingCore`] draws one mesh many times. [`ScreenSpacedCore`] switches
//! the context to a private camera and viewport before its children draw.

use std::sync::Arc;

use log::{trace, warn};

use crate::foundation::math::Mat4;
use crate::geometry::{Geometry, GeometryKind};
use crate::scene::NodeId;

use super::buffers::GeometryBufferProxy;
use super::camera::{Camera, Viewport};
use super::context::{DrawItem, ModelConstants, RenderContext};
use super::core::AttachError;
use super::device::DeviceContext;
use super::host::RenderHost;
use super::material::{Material, MaterialId};
use super::post_effects::{constant_slots, EffectAttributes};
use super::technique::{pass_names, technique_names, ShaderPass};

#[derive(Debug, Clone)]
struct GeometryPasses {
    default: Arc<ShaderPass>,
    transparent: Arc<ShaderPass>,
}

/// Core drawing one geometry with one material
#[derive(Debug)]
pub struct GeometryCore {
    expected: GeometryKind,
    technique_name: String,
    geometry: Option<Arc<Geometry>>,
    buffers: Option<Arc<GeometryBufferProxy>>,
    material: Material,
    material_id: MaterialId,
    passes: Option<GeometryPasses>,
    /// Line width or point size in world units, also the hit-test tolerance
    pub thickness: f32,
    /// Force the transparent pass regardless of material alpha
    pub force_transparent: bool,
}

impl GeometryCore {
    /// Core accepting geometry of `kind`
    pub fn new(kind: GeometryKind) -> Self {
        let technique = match kind {
            GeometryKind::Mesh => technique_names::MESH,
            GeometryKind::Line => technique_names::LINE,
            GeometryKind::Point => technique_names::POINT,
        };
        Self {
            expected: kind,
            technique_name: technique.to_string(),
            geometry: None,
            buffers: None,
            material: Material::default(),
            material_id: MaterialId::default(),
            passes: None,
            thickness: 0.05,
            force_transparent: false,
        }
    }

    /// Render with another technique
    #[must_use]
    pub fn with_technique(mut self, name: &str) -> Self {
        self.technique_name = name.to_string();
        self
    }

    /// Geometry kind this core draws
    pub fn expected_kind(&self) -> GeometryKind {
        self.expected
    }

    /// Assigned geometry
    pub fn geometry(&self) -> Option<&Arc<Geometry>> {
        self.geometry.as_ref()
    }

    /// True when a geometry of the expected kind is assigned
    pub fn has_matching_geometry(&self) -> bool {
        self.geometry.as_ref().is_some_and(|g| g.kind() == self.expected)
    }

    /// GPU buffers, while attached with matching geometry
    pub fn buffers(&self) -> Option<&Arc<GeometryBufferProxy>> {
        self.buffers.as_ref()
    }

    /// Current material
    pub fn material(&self) -> &Material {
        &self.material
    }

    /// Registered material id; 0 while detached
    pub fn material_id(&self) -> MaterialId {
        self.material_id
    }

    /// True when drawn in the transparent pass
    pub fn is_transparent(&self) -> bool {
        self.force_transparent || self.material.is_transparent()
    }

    /// Replace the geometry, swapping buffers when attached
    pub fn set_geometry(&mut self, geometry: Option<Arc<Geometry>>, host: &mut RenderHost, attached: bool) {
        if attached {
            self.release_buffers(host);
        }
        self.geometry = geometry;
        if attached {
            self.acquire_buffers(host);
        }
    }

    /// Replace the material, swapping its registry id when attached
    pub fn set_material(&mut self, material: Material, host: &mut RenderHost, attached: bool) {
        if attached {
            host.materials.release(&self.material);
            self.material_id = host.materials.acquire(&material);
        }
        self.material = material;
    }

    fn acquire_buffers(&mut self, host: &mut RenderHost) {
        match &self.geometry {
            Some(geometry) if geometry.kind() == self.expected => {
                self.buffers = Some(host.buffers.acquire(geometry));
            }
            Some(geometry) => {
                warn!(
                    "{:?} core given {:?} geometry; node will not render",
                    self.expected,
                    geometry.kind()
                );
            }
            None => {}
        }
    }

    fn release_buffers(&mut self, host: &mut RenderHost) {
        if let Some(buffers) = self.buffers.take() {
            host.buffers.release(buffers.geometry_id());
        }
    }

    pub(crate) fn on_attach(&mut self, host: &mut RenderHost) -> Result<(), AttachError> {
        let technique = host
            .effects
            .technique(&self.technique_name)
            .ok_or_else(|| AttachError::TechniqueNotFound(self.technique_name.clone()))?;
        self.passes = Some(GeometryPasses {
            default: technique.get_pass(pass_names::DEFAULT),
            transparent: technique.get_pass(pass_names::TRANSPARENT),
        });
        self.material_id = host.materials.acquire(&self.material);
        self.acquire_buffers(host);
        trace!("Attached {:?} core with material id {:?}", self.expected, self.material_id);
        Ok(())
    }

    pub(crate) fn on_detach(&mut self, host: &mut RenderHost) {
        self.release_buffers(host);
        if self.passes.take().is_some() {
            host.materials.release(&self.material);
        }
        self.material_id = MaterialId::default();
    }

    fn active_pass(&self) -> Option<&ShaderPass> {
        let passes = self.passes.as_ref()?;
        let pass = if self.is_transparent() {
            &passes.transparent
        } else {
            &passes.default
        };
        (!pass.is_null()).then_some(pass.as_ref())
    }

    pub(crate) fn can_render(&self) -> bool {
        !self.technique_name.is_empty() && self.buffers.is_some() && self.active_pass().is_some()
    }

    fn params(&self) -> [f32; 4] {
        [self.thickness, 0.0, 0.0, 0.0]
    }

    pub(crate) fn render(&self, ctx: &RenderContext, device: &mut dyn DeviceContext, world: &Mat4, instance_count: u32) {
        let (Some(pass), Some(buffers)) = (self.active_pass(), &self.buffers) else {
            return;
        };
        device.bind_pass(pass);
        let constants = ModelConstants::new(world, &ctx.view_projection(), self.material.diffuse, self.params());
        device.update_constants(constant_slots::MODEL, bytemuck::bytes_of(&constants));
        device.update_constants(constant_slots::MATERIAL, bytemuck::bytes_of(&self.material.constants()));
        device.draw_geometry(buffers, instance_count);
    }

    /// Draw description for post effects and depth prepasses
    pub fn draw_item(&self, node: NodeId, world: &Mat4, attributes: EffectAttributes) -> Option<DrawItem> {
        Some(DrawItem {
            node,
            world: *world,
            buffers: Arc::clone(self.buffers.as_ref()?),
            instances: None,
            material: self.material.constants(),
            attributes,
        })
    }
}

/// Core drawing one mesh once per instance matrix
#[derive(Debug)]
pub struct InstancingCore {
    /// Shared geometry and material handling
    pub base: GeometryCore,
    instances: Arc<Vec<[[f32; 4]; 4]>>,
}

impl Default for InstancingCore {
    fn default() -> Self {
        Self::new()
    }
}

impl InstancingCore {
    /// Instancing core without instances
    pub fn new() -> Self {
        Self {
            base: GeometryCore::new(GeometryKind::Mesh).with_technique(technique_names::INSTANCING),
            instances: Arc::new(Vec::new()),
        }
    }

    /// Replace the per-instance model matrices
    pub fn set_instances(&mut self, matrices: &[Mat4]) {
        self.instances = Arc::new(matrices.iter().map(|m| (*m).into()).collect());
    }

    /// Number of instances
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub(crate) fn can_render(&self) -> bool {
        !self.instances.is_empty() && self.base.can_render()
    }

    pub(crate) fn render(&self, ctx: &RenderContext, device: &mut dyn DeviceContext, world: &Mat4) {
        if self.instances.is_empty() {
            return;
        }
        device.update_constants(constant_slots::INSTANCES, bytemuck::cast_slice(self.instances.as_slice()));
        self.base.render(ctx, device, world, self.instances.len() as u32);
    }

    /// Draw description carrying the instance matrices
    pub fn draw_item(&self, node: NodeId, world: &Mat4, attributes: EffectAttributes) -> Option<DrawItem> {
        let mut item = self.base.draw_item(node, world, attributes)?;
        item.instances = Some(Arc::clone(&self.instances));
        Some(item)
    }
}

/// Private camera and sub-viewport of a screen-spaced node for this frame
#[derive(Debug, Clone)]
pub struct ScreenSpacedView {
    /// Camera looking at the node's content from a fixed distance
    pub camera: Camera,
    /// Pixel rectangle the content is drawn into
    pub viewport: Viewport,
}

/// Core that redirects its subtree into a screen-space rectangle
#[derive(Debug, Default)]
pub struct ScreenSpacedCore {
    clear_depth: Option<Arc<ShaderPass>>,
    view: Option<ScreenSpacedView>,
}

impl ScreenSpacedCore {
    /// Core without a computed view
    pub fn new() -> Self {
        Self::default()
    }

    /// View computed by the last update
    pub fn view(&self) -> Option<&ScreenSpacedView> {
        self.view.as_ref()
    }

    /// Store the view computed by the scene update
    pub fn set_view(&mut self, view: Option<ScreenSpacedView>) {
        self.view = view;
    }

    pub(crate) fn on_attach(&mut self, host: &mut RenderHost) -> Result<(), AttachError> {
        let technique = host
            .effects
            .technique(technique_names::SCREEN_SPACED)
            .ok_or_else(|| AttachError::TechniqueNotFound(technique_names::SCREEN_SPACED.to_string()))?;
        self.clear_depth = Some(technique.get_pass(pass_names::CLEAR_DEPTH));
        Ok(())
    }

    pub(crate) fn on_detach(&mut self) {
        self.clear_depth = None;
    }

    pub(crate) fn can_render(&self) -> bool {
        self.view.is_some()
    }

    /// Push the private camera and clear depth inside the rectangle
    ///
    /// The scene renderer pops the override once the subtree has drawn.
    pub(crate) fn render(&self, ctx: &mut RenderContext, device: &mut dyn DeviceContext) {
        let Some(view) = &self.view else {
            return;
        };
        ctx.push_view_override(
            view.camera.get_view_matrix(),
            view.camera.get_projection_matrix(),
            view.viewport,
        );
        device.set_viewport(&view.viewport);
        if let Some(pass) = self.clear_depth.as_ref().filter(|p| !p.is_null()) {
            device.bind_pass(pass);
            device.draw_fullscreen_quad();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{LineData, MeshData};
    use crate::foundation::math::Vec3;
    use crate::render::testing::{test_context, triangle_geometry, DeviceCall, RecordingDevice};

    #[test]
    fn test_attach_acquires_buffers_and_material() {
        let mut host = RenderHost::default();
        let mut core = GeometryCore::new(GeometryKind::Mesh);
        let geometry = triangle_geometry();
        core.set_geometry(Some(Arc::clone(&geometry)), &mut host, false);
        assert!(core.buffers().is_none());

        core.on_attach(&mut host).unwrap();
        assert!(core.can_render());
        assert_eq!(host.buffers.ref_count(geometry.id()), 1);
        assert_ne!(core.material_id(), MaterialId(0));

        core.on_detach(&mut host);
        assert!(!core.can_render());
        assert!(host.buffers.is_empty());
        assert!(host.materials.is_empty());
    }

    #[test]
    fn test_mismatched_geometry_does_not_render() {
        let mut host = RenderHost::default();
        let mut core = GeometryCore::new(GeometryKind::Line);
        core.on_attach(&mut host).unwrap();
        core.set_geometry(Some(triangle_geometry()), &mut host, true);
        assert!(!core.has_matching_geometry());
        assert!(!core.can_render());

        let line = Geometry::line(LineData::from_segments(&[(Vec3::zeros(), Vec3::x())]));
        core.set_geometry(Some(Arc::new(line)), &mut host, true);
        assert!(core.can_render());
        assert_eq!(host.buffers.len(), 1);
    }

    #[test]
    fn test_material_alpha_selects_transparent_pass() {
        let mut host = RenderHost::default();
        let mut core = GeometryCore::new(GeometryKind::Mesh);
        core.set_geometry(Some(triangle_geometry()), &mut host, false);
        core.on_attach(&mut host).unwrap();
        core.set_material(Material::new("glass").with_alpha(0.5), &mut host, true);
        assert!(core.is_transparent());

        let ctx = test_context(16, 16);
        let mut device = RecordingDevice::default();
        core.render(&ctx, &mut device, &Mat4::identity(), 1);
        assert_eq!(device.bound_passes(), vec![pass_names::TRANSPARENT.to_string()]);
        assert_eq!(host.materials.len(), 1);
    }

    #[test]
    fn test_instancing_draws_all_instances() {
        let mut host = RenderHost::default();
        let mut core = InstancingCore::new();
        let cube = MeshData {
            positions: vec![Vec3::zeros(), Vec3::x(), Vec3::y()],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        core.base.set_geometry(Some(Arc::new(Geometry::mesh(cube))), &mut host, false);
        core.base.on_attach(&mut host).unwrap();
        assert!(!core.can_render());

        core.set_instances(&[Mat4::identity(), Mat4::new_translation(&Vec3::x())]);
        assert!(core.can_render());
        let mut device = RecordingDevice::default();
        core.render(&test_context(16, 16), &mut device, &Mat4::identity());
        assert_eq!(device.count(|c| matches!(c, DeviceCall::DrawGeometry(_, 2))), 1);
    }
}
