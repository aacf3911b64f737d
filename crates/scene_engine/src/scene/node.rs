//! Scene nodes
//!
//! A [`SceneNode`] pairs a [`RenderCore`] with the CPU side of a scene element:
//! transforms, bounds, flags and render order. Nodes live in the scene's arena
//! and refer to each other by [`NodeId`].

use bitflags::bitflags;

use crate::foundation::math::Mat4;
use crate::geometry::{BoundingBox, BoundingSphere, GeometryKind};
use crate::render::{EffectAttributes, OrderKey, RenderContext, RenderCore, RenderHost, RenderType};
use crate::spatial::OctreeManager;

use super::instancing::InstanceSet;
use super::screen_spaced::ScreenSpacedState;
use super::sorting::SortingGroupState;

slotmap::new_key_type! {
    /// Handle of a node in a [`super::Scene`]
    pub struct NodeId;
}

bitflags! {
    /// Per-node switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// Rendered, together with its subtree
        const VISIBLE = 0b0000_0001;
        /// Considered by hit tests, together with its subtree
        const HIT_TEST_VISIBLE = 0b0000_0010;
        /// Skipped when outside the view frustum
        const FRUSTUM_CHECK = 0b0000_0100;
        /// Aggregate bounds need recomputing in the next update
        const BOUNDS_DIRTY = 0b0000_1000;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        NodeFlags::VISIBLE | NodeFlags::HIT_TEST_VISIBLE | NodeFlags::FRUSTUM_CHECK
    }
}

/// Screen-spaced node flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScreenSpacedKind {
    /// Empty container; children are supplied by the caller
    Plain,
    /// Navigation cube reporting the face hit
    ViewBox,
    /// Axis gizmo reporting the axis hit
    CoordinateSystem,
}

/// Post-effect node flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostEffectKind {
    /// Blur of flagged nodes
    Blur,
    /// Bloom of the whole frame
    Bloom,
    /// Blurred outline around flagged meshes
    Outline,
    /// Hard border around flagged meshes
    BorderHighlight,
    /// Occluded parts of flagged meshes
    XRay,
    /// Occluded parts of flagged meshes as a grid
    XRayGrid,
    /// Anti-aliasing of the whole frame
    Fxaa,
}

impl PostEffectKind {
    /// Registered core name; also the effect name nodes are flagged with
    pub fn core_name(self) -> &'static str {
        match self {
            PostEffectKind::Blur => "blur",
            PostEffectKind::Bloom => "bloom",
            PostEffectKind::Outline => "outline",
            PostEffectKind::BorderHighlight => "border_highlight",
            PostEffectKind::XRay => "xray",
            PostEffectKind::XRayGrid => "xray_grid",
            PostEffectKind::Fxaa => "fxaa",
        }
    }
}

/// What a node is
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Container with an octree over its children
    Group,
    /// Triangle mesh
    Mesh,
    /// Line list
    Line,
    /// Point list
    Point,
    /// One mesh drawn once per instance matrix
    InstancingMesh,
    /// Group whose children are periodically reordered by camera distance
    SortingGroup,
    /// Subtree drawn with a private camera into a screen rectangle
    ScreenSpaced(ScreenSpacedKind),
    /// Post-processing pass
    PostEffect(PostEffectKind),
    /// Node whose core comes from a constructor registered on the
    /// [`crate::render::CoreFactory`]
    Custom(String),
}

impl NodeKind {
    /// Name of the core constructor for this kind
    pub fn core_name(&self) -> &str {
        match self {
            NodeKind::Group | NodeKind::SortingGroup => "empty",
            NodeKind::Mesh => "mesh",
            NodeKind::Line => "line",
            NodeKind::Point => "point",
            NodeKind::InstancingMesh => "instancing",
            NodeKind::ScreenSpaced(_) => "screen_spaced",
            NodeKind::PostEffect(effect) => effect.core_name(),
            NodeKind::Custom(name) => name,
        }
    }

    /// True for kinds that own children
    pub fn is_group(&self) -> bool {
        matches!(self, NodeKind::Group | NodeKind::SortingGroup | NodeKind::ScreenSpaced(_))
    }

    /// Geometry the node draws, if any
    pub fn geometry_kind(&self) -> Option<GeometryKind> {
        match self {
            NodeKind::Mesh | NodeKind::InstancingMesh => Some(GeometryKind::Mesh),
            NodeKind::Line => Some(GeometryKind::Line),
            NodeKind::Point => Some(GeometryKind::Point),
            _ => None,
        }
    }

    /// Build the detached core for this kind; `None` when no constructor is
    /// registered under [`NodeKind::core_name`]
    pub fn create_render_core(&self, host: &RenderHost) -> Option<RenderCore> {
        host.core_factory.create(self.core_name(), &host.config)
    }
}

/// One element of the scene graph
#[derive(Debug)]
pub struct SceneNode {
    pub(crate) id: NodeId,
    /// Free-form label used in logs
    pub name: String,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) local_transform: Mat4,
    pub(crate) total_transform: Mat4,
    pub(crate) bounds: BoundingBox,
    pub(crate) bounding_sphere: BoundingSphere,
    pub(crate) bounds_with_transform: BoundingBox,
    pub(crate) bounding_sphere_with_transform: BoundingSphere,
    pub(crate) flags: NodeFlags,
    pub(crate) render_order: u16,
    pub(crate) order_key: OrderKey,
    pub(crate) post_effects: Vec<EffectAttributes>,
    pub(crate) core: RenderCore,
    pub(crate) octree: Option<OctreeManager<NodeId>>,
    pub(crate) instances: Option<InstanceSet>,
    pub(crate) sorting: Option<SortingGroupState>,
    pub(crate) screen_spaced: Option<ScreenSpacedState>,
}

impl SceneNode {
    /// Detached node with identity transforms and no bounds
    pub(crate) fn new(kind: NodeKind, core: RenderCore) -> Self {
        let name = kind.core_name().to_string();
        Self {
            id: NodeId::default(),
            name,
            kind,
            parent: None,
            children: Vec::new(),
            local_transform: Mat4::identity(),
            total_transform: Mat4::identity(),
            bounds: BoundingBox::EMPTY,
            bounding_sphere: BoundingSphere::EMPTY,
            bounds_with_transform: BoundingBox::EMPTY,
            bounding_sphere_with_transform: BoundingSphere::EMPTY,
            flags: NodeFlags::default(),
            render_order: 0,
            order_key: OrderKey::default(),
            post_effects: Vec::new(),
            core,
            octree: None,
            instances: None,
            sorting: None,
            screen_spaced: None,
        }
    }

    /// Arena handle
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Node kind
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Parent, `None` for the root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in render order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Transform relative to the parent
    pub fn local_transform(&self) -> &Mat4 {
        &self.local_transform
    }

    /// Parent total transform times the local transform
    pub fn total_transform(&self) -> &Mat4 {
        &self.total_transform
    }

    /// Bounds in the node's own space
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Bounding sphere in the node's own space
    pub fn bounding_sphere(&self) -> &BoundingSphere {
        &self.bounding_sphere
    }

    /// [`SceneNode::bounds`] under the total transform
    pub fn bounds_with_transform(&self) -> &BoundingBox {
        &self.bounds_with_transform
    }

    /// [`SceneNode::bounding_sphere`] under the total transform
    pub fn bounding_sphere_with_transform(&self) -> &BoundingSphere {
        &self.bounding_sphere_with_transform
    }

    /// Flags
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// True when rendered
    pub fn is_visible(&self) -> bool {
        self.flags.contains(NodeFlags::VISIBLE)
    }

    /// True when hit tests consider the node
    pub fn is_hit_test_visible(&self) -> bool {
        self.flags.contains(NodeFlags::HIT_TEST_VISIBLE)
    }

    /// Render order; lower draws first within the opaque pass
    pub fn render_order(&self) -> u16 {
        self.render_order
    }

    /// Opaque sort key
    pub fn order_key(&self) -> OrderKey {
        self.order_key
    }

    /// Pass the node renders in
    pub fn render_type(&self) -> RenderType {
        self.core.render_type()
    }

    /// Effects the node is flagged for
    pub fn post_effects(&self) -> &[EffectAttributes] {
        &self.post_effects
    }

    /// Render core
    pub fn core(&self) -> &RenderCore {
        &self.core
    }

    /// Instance matrices and identifiers of an instancing mesh
    pub fn instances(&self) -> Option<&InstanceSet> {
        self.instances.as_ref()
    }

    /// Sorting state of a sorting group
    pub fn sorting(&self) -> Option<&SortingGroupState> {
        self.sorting.as_ref()
    }

    /// Transform the children of this node are placed under
    ///
    /// Screen-spaced nodes are drawn with a private camera, so their children
    /// start again from the identity.
    pub(crate) fn child_space(&self) -> Mat4 {
        match self.kind {
            NodeKind::ScreenSpaced(_) => Mat4::identity(),
            _ => self.total_transform,
        }
    }

    pub(crate) fn set_flag(&mut self, flag: NodeFlags, value: bool) {
        self.flags.set(flag, value);
    }

    pub(crate) fn refresh_order_key(&mut self) {
        self.order_key = self.core.order_key(self.render_order);
    }

    /// Recompute the transformed bounds from the local bounds
    pub(crate) fn update_bounds_with_transform(&mut self) {
        self.bounds_with_transform = self.bounds.transform(&self.total_transform);
        self.bounding_sphere_with_transform = self.bounding_sphere.transform(&self.total_transform);
    }

    /// Local bounds from the node's own content; groups keep their aggregate
    pub(crate) fn recompute_content_bounds(&mut self) {
        if self.kind.is_group() {
            return;
        }
        let (bounds, sphere) = match self.core.geometry() {
            Some(geometry) => match &self.instances {
                Some(instances) => instances.bounds(&geometry.bounds()),
                None => (geometry.bounds(), geometry.bounding_sphere()),
            },
            None => (BoundingBox::EMPTY, BoundingSphere::EMPTY),
        };
        self.bounds = bounds;
        self.bounding_sphere = sphere;
        self.update_bounds_with_transform();
    }

    /// Sphere-then-box test against the main frustum
    ///
    /// Always true when frustum checking is off or the node has no bounds.
    pub fn test_view_frustum(&self, ctx: &RenderContext) -> bool {
        if !ctx.enable_view_frustum_check || !self.flags.contains(NodeFlags::FRUSTUM_CHECK) {
            return true;
        }
        if self.bounds_with_transform.is_empty() {
            return true;
        }
        let frustum = ctx.frustum();
        if !self.bounding_sphere_with_transform.is_empty()
            && !frustum.intersects_sphere(&self.bounding_sphere_with_transform)
        {
            return false;
        }
        frustum.intersects_box(&self.bounds_with_transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::{Camera, Viewport};

    fn node_with_bounds(center: Vec3) -> SceneNode {
        let mut node = SceneNode::new(NodeKind::Mesh, RenderCore::empty());
        node.bounds = BoundingBox::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5));
        node.bounding_sphere = BoundingSphere::from_box(&node.bounds);
        node.total_transform = Mat4::new_translation(&center);
        node.update_bounds_with_transform();
        node
    }

    fn context() -> RenderContext {
        let mut camera = Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 45.0, 1.0, 0.1, 100.0);
        camera.look_at(Vec3::zeros(), Vec3::y());
        RenderContext::new(camera, Viewport::new(100.0, 100.0))
    }

    #[test]
    fn test_kind_core_names_resolve() {
        let host = RenderHost::default();
        let kinds = [
            NodeKind::Group,
            NodeKind::Mesh,
            NodeKind::Line,
            NodeKind::Point,
            NodeKind::InstancingMesh,
            NodeKind::SortingGroup,
            NodeKind::ScreenSpaced(ScreenSpacedKind::ViewBox),
            NodeKind::PostEffect(PostEffectKind::Outline),
            NodeKind::PostEffect(PostEffectKind::XRayGrid),
        ];
        for kind in kinds {
            let core = kind.create_render_core(&host).unwrap();
            assert_eq!(core.kind().name(), kind.core_name());
        }
        assert!(NodeKind::Custom("hologram".into()).create_render_core(&host).is_none());
    }

    #[test]
    fn test_view_frustum_sphere_then_box() {
        let mut ctx = context();
        assert!(node_with_bounds(Vec3::zeros()).test_view_frustum(&ctx));
        assert!(!node_with_bounds(Vec3::new(0.0, 0.0, 20.0)).test_view_frustum(&ctx));
        assert!(!node_with_bounds(Vec3::new(50.0, 0.0, 0.0)).test_view_frustum(&ctx));

        ctx.enable_view_frustum_check = false;
        assert!(node_with_bounds(Vec3::new(50.0, 0.0, 0.0)).test_view_frustum(&ctx));
    }

    #[test]
    fn test_node_without_bounds_is_always_visible() {
        let node = SceneNode::new(NodeKind::Group, RenderCore::empty());
        assert!(node.test_view_frustum(&context()));
        assert_eq!(node.flags(), NodeFlags::default());
    }
}
