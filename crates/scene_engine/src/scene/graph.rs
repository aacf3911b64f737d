//! Scene arena and mutation API
//!
//! Every mutation keeps two things true before it returns: each touched node's
//! transformed bounds are the image of its local bounds under its total
//! transform, and the parent's octree has the change queued. Aggregate group
//! bounds and the octrees themselves catch up in [`Scene::update`].

use std::sync::Arc;

use log::{debug, info};
use slotmap::SlotMap;

use crate::config::RenderConfig;
use crate::foundation::math::Mat4;
use crate::geometry::Geometry;
use crate::render::{
    AttachError, Camera, EffectAttributes, EffectParseError, Material, RenderContext, RenderCore, RenderHost,
    Viewport,
};
use crate::spatial::OctreeManager;

use super::instancing::InstanceSet;
use super::node::{NodeFlags, NodeId, NodeKind, SceneNode};
use super::screen_spaced::ScreenSpacedState;
use super::sorting::SortingGroupState;

/// Errors from scene mutations
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    /// The id is stale or was never issued by this scene
    #[error("Node {0:?} does not exist")]
    NodeNotFound(NodeId),

    /// Children can only be added to group kinds
    #[error("Node {0:?} cannot have children")]
    NotAGroup(NodeId),

    /// The new parent lies inside the moved subtree
    #[error("Moving {node:?} under {parent:?} would create a cycle")]
    Cycle {
        /// Node being moved
        node: NodeId,
        /// Requested parent
        parent: NodeId,
    },

    /// The root cannot be removed or moved
    #[error("The root node cannot be removed or reparented")]
    RootNode,

    /// No core constructor is registered under the name
    #[error("No render core registered as '{0}'")]
    UnknownCoreKind(String),

    /// The node kind has no such property
    #[error("Node {node:?} does not support {operation}")]
    Unsupported {
        /// Node the operation was applied to
        node: NodeId,
        /// Operation name
        operation: &'static str,
    },

    /// Post-effect attribute string could not be parsed
    #[error(transparent)]
    EffectParse(#[from] EffectParseError),

    /// The node's core failed to attach
    #[error(transparent)]
    Attach(#[from] AttachError),
}

/// Scene graph: node arena, root group and the render host the cores attach to
#[derive(Debug)]
pub struct Scene {
    pub(crate) nodes: SlotMap<NodeId, SceneNode>,
    pub(crate) root: NodeId,
    pub(crate) host: RenderHost,
    attached: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

impl Scene {
    /// Empty scene with a root group
    pub fn new(config: RenderConfig) -> Self {
        Self::with_host(RenderHost::new(config))
    }

    /// Empty scene using a prepared host, e.g. one with custom cores registered
    pub fn with_host(host: RenderHost) -> Self {
        let mut nodes = SlotMap::with_key();
        let mut root = SceneNode::new(NodeKind::Group, RenderCore::empty());
        root.name = "root".to_string();
        root.octree = Some(OctreeManager::new(host.config.octree.clone()));
        let root = nodes.insert_with_key(|id| {
            root.id = id;
            root
        });
        info!("Created scene");
        Self {
            nodes,
            root,
            host,
            attached: false,
        }
    }

    /// Root group
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Render host
    pub fn host(&self) -> &RenderHost {
        &self.host
    }

    /// Render host, mutable; register techniques and core constructors here
    pub fn host_mut(&mut self) -> &mut RenderHost {
        &mut self.host
    }

    /// Render configuration
    pub fn config(&self) -> &RenderConfig {
        &self.host.config
    }

    /// Context for a frame, seeded from the configuration
    pub fn create_context(&self, camera: Camera, viewport: Viewport) -> RenderContext {
        let mut ctx = RenderContext::new(camera, viewport);
        ctx.msaa_samples = self.host.config.msaa_samples;
        ctx.enable_view_frustum_check = self.host.config.enable_view_frustum_check;
        ctx
    }

    /// Node by id
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// True when `id` is live
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root exists
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Children of a node in render order
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], SceneError> {
        Ok(self.get(id)?.children())
    }

    /// Core of a node, mutable; effect settings are tuned through it
    pub fn core_mut(&mut self, id: NodeId) -> Result<&mut RenderCore, SceneError> {
        Ok(&mut self.get_mut(id)?.core)
    }

    /// True after [`Scene::attach`] until [`Scene::detach`]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub(crate) fn get(&self, id: NodeId) -> Result<&SceneNode, SceneError> {
        self.nodes.get(id).ok_or(SceneError::NodeNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut SceneNode, SceneError> {
        self.nodes.get_mut(id).ok_or(SceneError::NodeNotFound(id))
    }

    /// `id` and its descendants, parents before children
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get(next) else { continue };
            order.push(next);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Add a node of `kind` under `parent`
    ///
    /// The node is attached right away when the scene is attached. View boxes
    /// and coordinate systems come with their gizmo children.
    pub fn add_node(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId, SceneError> {
        if !self.get(parent)?.kind.is_group() {
            return Err(SceneError::NotAGroup(parent));
        }
        let core = kind
            .create_render_core(&self.host)
            .ok_or_else(|| SceneError::UnknownCoreKind(kind.core_name().to_string()))?;

        let mut node = SceneNode::new(kind.clone(), core);
        let config = &self.host.config;
        match &kind {
            NodeKind::Group => node.octree = Some(OctreeManager::new(config.octree.clone())),
            NodeKind::SortingGroup => {
                node.octree = Some(OctreeManager::new(config.octree.clone()));
                node.sorting = Some(SortingGroupState::new(&config.sorting));
            }
            NodeKind::ScreenSpaced(_) => {
                node.octree = Some(OctreeManager::new(config.octree.clone()));
                node.screen_spaced = Some(ScreenSpacedState::default());
            }
            NodeKind::InstancingMesh => node.instances = Some(InstanceSet::new(config.octree.clone())),
            _ => {}
        }

        let id = self.nodes.insert_with_key(|id| {
            node.id = id;
            node
        });
        self.link(id, parent);
        if self.attached {
            self.attach_subtree(id);
        }
        debug!("Added {:?} node {:?} under {:?}", kind, id, parent);

        if let NodeKind::ScreenSpaced(flavour) = kind {
            self.build_gizmo(id, flavour)?;
        }
        Ok(id)
    }

    /// Add a group
    pub fn add_group(&mut self, parent: NodeId) -> Result<NodeId, SceneError> {
        self.add_node(parent, NodeKind::Group)
    }

    /// Add a mesh node with geometry and material
    pub fn add_mesh(&mut self, parent: NodeId, geometry: Arc<Geometry>, material: Material) -> Result<NodeId, SceneError> {
        let id = self.add_node(parent, NodeKind::Mesh)?;
        self.set_geometry(id, Some(geometry))?;
        self.set_material(id, material)?;
        Ok(id)
    }

    /// Remove a node and its subtree, detaching every core
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootNode);
        }
        self.get(id)?;
        self.unlink(id);
        let subtree = self.subtree(id);
        for node_id in &subtree {
            if let Some(mut node) = self.nodes.remove(*node_id) {
                node.core.detach(&mut self.host);
            }
        }
        debug!("Removed node {:?} and {} descendants", id, subtree.len() - 1);
        Ok(())
    }

    /// Move a node under another group, keeping its local transform
    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootNode);
        }
        self.get(id)?;
        if !self.get(new_parent)?.kind.is_group() {
            return Err(SceneError::NotAGroup(new_parent));
        }
        let mut ancestor = Some(new_parent);
        while let Some(a) = ancestor {
            if a == id {
                return Err(SceneError::Cycle { node: id, parent: new_parent });
            }
            ancestor = self.nodes.get(a).and_then(|n| n.parent);
        }
        self.unlink(id);
        self.link(id, new_parent);
        Ok(())
    }

    fn link(&mut self, id: NodeId, parent: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = Some(parent);
        }
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(id);
            if let Some(sorting) = parent_node.sorting.as_mut() {
                sorting.request_sort();
            }
        }
        self.propagate_transform(id);
    }

    fn unlink(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get_mut(id).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|c| *c != id);
            if let Some(octree) = parent_node.octree.as_mut() {
                octree.remove_item(id);
            }
        }
        self.mark_bounds_dirty(parent);
    }

    /// Set the transform relative to the parent
    pub fn set_transform(&mut self, id: NodeId, local: Mat4) -> Result<(), SceneError> {
        self.get_mut(id)?.local_transform = local;
        self.propagate_transform(id);
        Ok(())
    }

    /// Recompute total transforms and transformed bounds of a subtree
    ///
    /// Each visited node's new bounds are queued on its parent's octree.
    /// Screen-spaced nodes start a new space: their children ignore every
    /// transform above them.
    pub(crate) fn propagate_transform(&mut self, id: NodeId) {
        let parent_total = self
            .nodes
            .get(id)
            .and_then(|n| n.parent)
            .and_then(|p| self.nodes.get(p))
            .map_or_else(Mat4::identity, SceneNode::child_space);

        let mut stack = vec![(id, parent_total)];
        while let Some((node_id, parent_total)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(node_id) else { continue };
            node.total_transform = parent_total * node.local_transform;
            node.update_bounds_with_transform();
            let child_space = node.child_space();
            stack.extend(node.children.iter().map(|c| (*c, child_space)));
            let (parent, bounds) = (node.parent, node.bounds_with_transform);
            self.queue_octree_update(parent, node_id, bounds);
        }
        if let Some(parent) = self.nodes.get(id).and_then(|n| n.parent) {
            self.mark_bounds_dirty(parent);
        }
    }

    pub(crate) fn queue_octree_update(&mut self, parent: Option<NodeId>, id: NodeId, bounds: crate::geometry::BoundingBox) {
        let Some(octree) = parent.and_then(|p| self.nodes.get_mut(p)).and_then(|p| p.octree.as_mut()) else {
            return;
        };
        if bounds.is_empty() {
            octree.remove_item(id);
        } else {
            octree.update_item(id, bounds);
        }
    }

    /// Flag a group and its ancestors for an aggregate bounds recompute
    pub(crate) fn mark_bounds_dirty(&mut self, id: NodeId) {
        let mut next = Some(id);
        while let Some(node_id) = next {
            let Some(node) = self.nodes.get_mut(node_id) else { break };
            if node.flags.contains(NodeFlags::BOUNDS_DIRTY) {
                break;
            }
            node.set_flag(NodeFlags::BOUNDS_DIRTY, true);
            // holds a child whose bounds are about to change
            if let Some(octree) = node.octree.as_mut() {
                octree.request_update_octree();
            }
            next = node.parent;
        }
    }

    /// Content bounds changed: refresh them and queue the parent update
    pub(crate) fn content_changed(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else { return };
        node.recompute_content_bounds();
        let (parent, bounds) = (node.parent, node.bounds_with_transform);
        self.queue_octree_update(parent, id, bounds);
        if let Some(parent) = parent {
            self.mark_bounds_dirty(parent);
        }
    }

    /// Replace the geometry of a mesh, line, point or instancing node
    ///
    /// A geometry of the wrong kind is accepted; the node then neither renders
    /// nor hit tests.
    pub fn set_geometry(&mut self, id: NodeId, geometry: Option<Arc<Geometry>>) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::NodeNotFound(id))?;
        if !node.core.set_geometry(geometry, &mut self.host) {
            return Err(SceneError::Unsupported { node: id, operation: "set_geometry" });
        }
        if let Some(instances) = node.instances.as_mut() {
            instances.invalidate_octree();
        }
        node.refresh_order_key();
        self.content_changed(id);
        Ok(())
    }

    /// Replace the material of a geometry node
    pub fn set_material(&mut self, id: NodeId, material: Material) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::NodeNotFound(id))?;
        if !node.core.set_material(material, &mut self.host) {
            return Err(SceneError::Unsupported { node: id, operation: "set_material" });
        }
        node.refresh_order_key();
        if let Some(parent) = node.parent {
            if let Some(sorting) = self.nodes.get_mut(parent).and_then(|p| p.sorting.as_mut()) {
                sorting.request_sort();
            }
        }
        Ok(())
    }

    /// Line width or point size, also the hit-test tolerance
    pub fn set_thickness(&mut self, id: NodeId, thickness: f32) -> Result<(), SceneError> {
        let node = self.get_mut(id)?;
        let core = node
            .core
            .geometry_core_mut()
            .ok_or(SceneError::Unsupported { node: id, operation: "set_thickness" })?;
        core.thickness = thickness;
        Ok(())
    }

    /// Show or hide a node and its subtree
    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> Result<(), SceneError> {
        self.get_mut(id)?.set_flag(NodeFlags::VISIBLE, visible);
        Ok(())
    }

    /// Include or exclude a node and its subtree from hit tests
    pub fn set_hit_test_visible(&mut self, id: NodeId, visible: bool) -> Result<(), SceneError> {
        self.get_mut(id)?.set_flag(NodeFlags::HIT_TEST_VISIBLE, visible);
        Ok(())
    }

    /// Enable or disable frustum culling of a node
    pub fn set_frustum_check(&mut self, id: NodeId, enabled: bool) -> Result<(), SceneError> {
        self.get_mut(id)?.set_flag(NodeFlags::FRUSTUM_CHECK, enabled);
        Ok(())
    }

    /// Force a full octree rebuild for a group on the next [`Scene::update`]
    pub fn request_octree_rebuild(&mut self, id: NodeId) -> Result<(), SceneError> {
        let node = self.get_mut(id)?;
        match node.octree.as_mut() {
            Some(octree) => {
                octree.request_rebuild();
                Ok(())
            }
            None => Err(SceneError::NotAGroup(id)),
        }
    }

    /// Set the render order used by the opaque sort
    pub fn set_render_order(&mut self, id: NodeId, render_order: u16) -> Result<(), SceneError> {
        let node = self.get_mut(id)?;
        node.render_order = render_order;
        node.refresh_order_key();
        Ok(())
    }

    /// Flag a node for post effects, e.g. `"outline[color:#FF0000] xray"`
    ///
    /// An empty string clears every flag. On a parse error the flags are left
    /// unchanged.
    pub fn set_post_effects(&mut self, id: NodeId, effects: &str) -> Result<(), SceneError> {
        let parsed = EffectAttributes::parse_list(effects)?;
        self.get_mut(id)?.post_effects = parsed;
        Ok(())
    }

    /// Replace the instances of an instancing mesh node
    pub fn set_instances(
        &mut self,
        id: NodeId,
        matrices: Vec<Mat4>,
        identifiers: Option<Vec<u64>>,
    ) -> Result<(), SceneError> {
        let node = self.get_mut(id)?;
        let Some(instances) = node.instances.as_mut() else {
            return Err(SceneError::Unsupported { node: id, operation: "set_instances" });
        };
        if let crate::render::RenderCoreKind::Instancing(core) = node.core.kind_mut() {
            core.set_instances(&matrices);
        }
        instances.set(matrices, identifiers);
        self.content_changed(id);
        Ok(())
    }

    /// Attach every core; failures are logged and leave that node detached
    pub fn attach(&mut self) {
        if self.attached {
            return;
        }
        self.attached = true;
        let failures = self.attach_subtree(self.root);
        info!("Attached scene: {} nodes, {} failed", self.nodes.len(), failures);
    }

    fn attach_subtree(&mut self, id: NodeId) -> usize {
        let mut failures = 0;
        for node_id in self.subtree(id) {
            let Some(node) = self.nodes.get_mut(node_id) else { continue };
            if node.core.attach(&mut self.host).is_err() {
                failures += 1;
            }
            node.refresh_order_key();
        }
        failures
    }

    /// Detach every core
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        for node in self.nodes.values_mut() {
            node.core.detach(&mut self.host);
            node.refresh_order_key();
        }
        self.attached = false;
        info!("Detached scene");
    }

    /// Attach a single node's core, e.g. after fixing what made it fail
    pub fn attach_node(&mut self, id: NodeId) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::NodeNotFound(id))?;
        let result = node.core.attach(&mut self.host);
        node.refresh_order_key();
        Ok(result?)
    }

    /// Detach a single node's core
    pub fn detach_node(&mut self, id: NodeId) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::NodeNotFound(id))?;
        node.core.detach(&mut self.host);
        node.refresh_order_key();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::AttachState;
    use crate::scene::assets::SceneAssets;
    use approx::assert_relative_eq;

    fn cube() -> Arc<Geometry> {
        SceneAssets::new().view_box_cube
    }

    #[test]
    fn test_add_requires_group_parent() {
        let mut scene = Scene::default();
        let mesh = scene.add_mesh(scene.root(), cube(), Material::default()).unwrap();
        assert_eq!(scene.add_node(mesh, NodeKind::Mesh), Err(SceneError::NotAGroup(mesh)));
        assert_eq!(
            scene.add_node(scene.root(), NodeKind::Custom("hologram".into())),
            Err(SceneError::UnknownCoreKind("hologram".into()))
        );
        assert_eq!(scene.len(), 2);
    }

    #[test]
    fn test_child_total_is_parent_total_times_local() {
        let mut scene = Scene::default();
        let group = scene.add_group(scene.root()).unwrap();
        let mesh = scene.add_mesh(group, cube(), Material::default()).unwrap();
        scene.set_transform(mesh, Mat4::new_scaling(2.0)).unwrap();
        scene.set_transform(group, Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0))).unwrap();

        let node = scene.node(mesh).unwrap();
        let expected = Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0)) * Mat4::new_scaling(2.0);
        assert_relative_eq!(*node.total_transform(), expected);
        assert_relative_eq!(node.bounds_with_transform().min, Vec3::new(4.0, -1.0, -1.0));
        assert_relative_eq!(node.bounds_with_transform().max, Vec3::new(6.0, 1.0, 1.0));
    }

    #[test]
    fn test_reparent_rejects_cycles_and_root() {
        let mut scene = Scene::default();
        let a = scene.add_group(scene.root()).unwrap();
        let b = scene.add_group(a).unwrap();
        assert_eq!(scene.reparent(a, b), Err(SceneError::Cycle { node: a, parent: b }));
        assert_eq!(scene.reparent(scene.root(), a), Err(SceneError::RootNode));

        scene.set_transform(a, Mat4::new_translation(&Vec3::new(0.0, 3.0, 0.0))).unwrap();
        let mesh = scene.add_mesh(b, cube(), Material::default()).unwrap();
        scene.reparent(mesh, scene.root()).unwrap();
        assert_eq!(scene.node(mesh).unwrap().parent(), Some(scene.root()));
        assert!(scene.children(b).unwrap().is_empty());
        assert_relative_eq!(scene.node(mesh).unwrap().bounds_with_transform().center(), Vec3::zeros());
    }

    #[test]
    fn test_remove_subtree_detaches_and_frees() {
        let mut scene = Scene::default();
        scene.attach();
        let group = scene.add_group(scene.root()).unwrap();
        let mesh = scene.add_mesh(group, cube(), Material::default()).unwrap();
        assert!(scene.node(mesh).unwrap().core().is_attached());
        assert_eq!(scene.host().buffers.len(), 1);

        scene.remove_node(group).unwrap();
        assert!(!scene.contains(mesh));
        assert!(scene.host().buffers.is_empty());
        assert!(scene.host().materials.is_empty());
        assert_eq!(scene.remove_node(scene.root()), Err(SceneError::RootNode));
        assert_eq!(scene.remove_node(group), Err(SceneError::NodeNotFound(group)));
    }

    #[test]
    fn test_unsupported_operations() {
        let mut scene = Scene::default();
        let group = scene.add_group(scene.root()).unwrap();
        assert_eq!(
            scene.set_geometry(group, Some(cube())),
            Err(SceneError::Unsupported { node: group, operation: "set_geometry" })
        );
        assert!(matches!(scene.set_instances(group, vec![], None), Err(SceneError::Unsupported { .. })));
        assert!(matches!(scene.set_post_effects(group, "outline[color"), Err(SceneError::EffectParse(_))));
    }

    #[test]
    fn test_octree_rebuild_request_needs_a_group() {
        let mut scene = Scene::default();
        let group = scene.add_group(scene.root()).unwrap();
        let mesh = scene.add_mesh(group, cube(), Material::default()).unwrap();
        assert_eq!(scene.request_octree_rebuild(mesh), Err(SceneError::NotAGroup(mesh)));
        scene.request_octree_rebuild(group).unwrap();
        assert!(scene.node(group).unwrap().octree.as_ref().unwrap().rebuild_requested());
    }

    #[test]
    fn test_render_order_and_material_feed_order_key() {
        let mut scene = Scene::default();
        scene.attach();
        let mesh = scene.add_mesh(scene.root(), cube(), Material::new("red").with_color(1.0, 0.0, 0.0)).unwrap();
        scene.set_render_order(mesh, 7).unwrap();
        let key = scene.node(mesh).unwrap().order_key();
        assert_eq!(key.render_order(), 7);
        assert_eq!(Some(key.material()), scene.host().materials.id_of("red"));
    }

    #[test]
    fn test_attach_failure_is_reported_per_node() {
        let mut scene = Scene::default();
        let mesh = scene.add_mesh(scene.root(), cube(), Material::default()).unwrap();
        scene.host_mut().effects.remove_technique(crate::render::technique::technique_names::MESH);
        scene.attach();
        assert_eq!(scene.node(mesh).unwrap().core().state(), AttachState::Detached);
        assert!(matches!(scene.attach_node(mesh), Err(SceneError::Attach(AttachError::TechniqueNotFound(_)))));
    }
}
