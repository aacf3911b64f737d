//! Hit testing
//!
//! World hits walk the graph from the root: groups prune their children
//! through their octree when it is current and test every child otherwise;
//! geometry nodes run the exact test for their primitive type. Screen-spaced
//! nodes are tested separately with a ray rebuilt through their private camera
//! and sort ahead of world hits, since they draw on top.

use log::trace;

use crate::foundation::math::{Mat4, Mat4Ext, Vec2, Vec3};
use crate::geometry::{GeometryKind, MeshData, Ray};
use crate::render::RenderContext;

use super::graph::Scene;
use super::node::{NodeId, NodeKind, SceneNode};

/// Extra information about what was hit inside a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitTag {
    /// Instance index of an instancing mesh without identifiers
    InstanceIndex(usize),
    /// Caller-supplied identifier of the instance
    InstanceId(u64),
    /// Outward normal of the view box face
    ViewBoxFace(Vec3),
    /// Coordinate system axis: 0 = X, 1 = Y, 2 = Z
    Axis(usize),
}

/// Which hits a test returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitTestMode {
    /// Every hit, nearest first
    #[default]
    All,
    /// Only the nearest hit
    Nearest,
}

/// One intersection
#[derive(Debug, Clone, PartialEq)]
pub struct HitTestResult {
    /// Hit position; in the private space of the gizmo for screen-spaced hits
    pub point: Vec3,
    /// Surface normal at the hit
    pub normal: Vec3,
    /// Distance from the ray origin
    pub distance: f32,
    /// Node that was hit
    pub node: NodeId,
    /// Extra information
    pub tag: Option<HitTag>,
    /// Triangle of a mesh hit
    pub triangle_index: Option<usize>,
    /// Segment of a line hit
    pub segment_index: Option<usize>,
    /// Vertex of a point hit
    pub vertex_index: Option<usize>,
    /// Hit inside a screen-spaced node
    pub screen_spaced: bool,
}

impl HitTestResult {
    fn new(node: NodeId, point: Vec3, normal: Vec3, distance: f32) -> Self {
        Self {
            point,
            normal,
            distance,
            node,
            tag: None,
            triangle_index: None,
            segment_index: None,
            vertex_index: None,
            screen_spaced: false,
        }
    }

    /// Nearest triangle hit of a mesh placed by `world`
    pub(crate) fn from_mesh(node: NodeId, mesh: &MeshData, world: &Mat4, ray: &Ray) -> Option<Self> {
        let inverse = world.inverse_or_identity();
        let hit = mesh.intersect_ray(&ray.transform(&inverse))?;
        let point = world.transform_point3(&hit.point);
        let normal = inverse
            .transpose()
            .transform_vector3(&hit.normal)
            .try_normalize(f32::EPSILON)
            .unwrap_or(hit.normal);
        let mut result = Self::new(node, point, normal, (point - ray.origin).norm());
        result.triangle_index = Some(hit.triangle_index);
        Some(result)
    }

    /// Ordering used for every result list: screen-spaced first, then nearest
    fn sort_key(&self) -> (bool, f32) {
        (!self.screen_spaced, self.distance)
    }
}

/// Sort and trim results for `mode`
pub(crate) fn finish_results(mut results: Vec<HitTestResult>, mode: HitTestMode) -> Vec<HitTestResult> {
    results.sort_by(|a, b| {
        a.sort_key()
            .partial_cmp(&b.sort_key())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if mode == HitTestMode::Nearest {
        results.truncate(1);
    }
    results
}

fn hit_geometry(node: &SceneNode, ray: &Ray) -> Option<HitTestResult> {
    let core = node.core.geometry_core()?;
    if !core.has_matching_geometry() {
        return None;
    }
    let geometry = core.geometry()?;
    let total = &node.total_transform;
    match geometry.kind() {
        GeometryKind::Mesh => {
            let mesh = geometry.as_mesh()?;
            match &node.instances {
                Some(instances) => instances.hit_test(node.id, mesh, total, ray),
                None => HitTestResult::from_mesh(node.id, mesh, total, ray),
            }
        }
        GeometryKind::Line => {
            let (index, approach) = geometry.as_line()?.closest_segment(ray, total, core.thickness)?;
            let mut result = HitTestResult::new(node.id, approach.point_on_segment, -ray.direction, approach.ray_t);
            result.segment_index = Some(index);
            Some(result)
        }
        GeometryKind::Point => {
            let (index, point, t) = geometry.as_point()?.closest_point(ray, total, core.thickness)?;
            let mut result = HitTestResult::new(node.id, point, -ray.direction, t);
            result.vertex_index = Some(index);
            Some(result)
        }
    }
}

impl Scene {
    /// Hit test a pixel of the context's viewport
    ///
    /// Screen-spaced nodes are tested with their private camera; everything
    /// else with the main camera's ray through the pixel.
    pub fn hit_test(&self, ctx: &RenderContext, pixel: Vec2, mode: HitTestMode) -> Vec<HitTestResult> {
        let ray = ctx.camera().pixel_to_ray(pixel, ctx.viewport());
        let mut results = Vec::new();
        self.hit_test_node(self.root, &ray, &mut results);
        for id in self.screen_spaced_nodes() {
            self.hit_test_screen_spaced(id, ctx, pixel, &mut results);
        }
        trace!("Hit test at {:?}: {} hits", pixel, results.len());
        finish_results(results, mode)
    }

    /// Hit test a world-space ray; screen-spaced subtrees are skipped
    pub fn hit_test_ray(&self, ray: &Ray, mode: HitTestMode) -> Vec<HitTestResult> {
        let mut results = Vec::new();
        self.hit_test_node(self.root, ray, &mut results);
        finish_results(results, mode)
    }

    /// Test `id` and its subtree; screen-spaced children are left out
    pub(crate) fn hit_test_node(&self, id: NodeId, ray: &Ray, results: &mut Vec<HitTestResult>) {
        let Some(node) = self.nodes.get(id) else { return };
        if !node.is_visible() || !node.is_hit_test_visible() {
            return;
        }
        if node.kind.is_group() {
            self.hit_test_children(node, ray, results);
            return;
        }

        let bounds = &node.bounds_with_transform;
        if !bounds.is_empty() {
            let tolerance = node.core.geometry_core().map_or(0.0, |c| match node.kind {
                NodeKind::Line | NodeKind::Point => c.thickness,
                _ => 0.0,
            });
            if bounds.inflate(tolerance).intersect_ray(ray.origin, ray.direction).is_none() {
                return;
            }
        }
        if let Some(hit) = hit_geometry(node, ray) {
            results.push(hit);
        }
    }

    /// Children of a group, pruned through its octree when current
    pub(crate) fn hit_test_children(&self, group: &SceneNode, ray: &Ray, results: &mut Vec<HitTestResult>) {
        let candidates = group.octree.as_ref().and_then(|octree| octree.query_ray(ray));
        match candidates {
            Some(candidates) => {
                trace!(
                    "Octree of {:?} narrowed {} children to {}",
                    group.id,
                    group.children.len(),
                    candidates.len()
                );
                for child in &group.children {
                    let in_tree = candidates.contains(child);
                    let unplaced = self
                        .nodes
                        .get(*child)
                        .is_some_and(|c| c.bounds_with_transform.is_empty());
                    if in_tree || unplaced {
                        self.hit_test_child(*child, ray, results);
                    }
                }
            }
            None => {
                for child in &group.children {
                    self.hit_test_child(*child, ray, results);
                }
            }
        }
    }

    fn hit_test_child(&self, child: NodeId, ray: &Ray, results: &mut Vec<HitTestResult>) {
        let is_screen_spaced = self
            .nodes
            .get(child)
            .is_some_and(|c| matches!(c.kind, NodeKind::ScreenSpaced(_)));
        if !is_screen_spaced {
            self.hit_test_node(child, ray, results);
        }
    }

    /// Brute-force test of every child of a group, ignoring its octree
    pub fn hit_test_linear(&self, group: NodeId, ray: &Ray, mode: HitTestMode) -> Vec<HitTestResult> {
        let mut results = Vec::new();
        if let Some(node) = self.nodes.get(group) {
            for child in &node.children {
                self.hit_test_child(*child, ray, &mut results);
            }
        }
        finish_results(results, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::geometry::{Geometry, LineData, PointData};
    use crate::render::Material;
    use crate::scene::assets::SceneAssets;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn ray_down_z(x: f32, y: f32) -> Ray {
        Ray::new(Vec3::new(x, y, 10.0), Vec3::new(0.0, 0.0, -1.0))
    }

    #[test]
    fn test_mesh_hit_under_scale_and_translation() {
        let mut scene = Scene::default();
        let cube = SceneAssets::new().view_box_cube;
        let id = scene.add_mesh(scene.root(), cube, Material::default()).unwrap();
        let transform = Mat4::new_translation(&Vec3::new(3.0, 0.0, 0.0)) * Mat4::new_scaling(2.0);
        scene.set_transform(id, transform).unwrap();

        let hits = scene.hit_test_ray(&ray_down_z(3.5, 0.0), HitTestMode::All);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node, id);
        assert_relative_eq!(hits[0].point, Vec3::new(3.5, 0.0, 1.0), epsilon = 1e-5);
        assert_relative_eq!(hits[0].normal, Vec3::z(), epsilon = 1e-5);
        assert_relative_eq!(hits[0].distance, 9.0, epsilon = 1e-5);
        assert!(scene.hit_test_ray(&ray_down_z(5.5, 0.0), HitTestMode::All).is_empty());
    }

    #[test]
    fn test_line_and_point_use_thickness() {
        let mut scene = Scene::default();
        let root = scene.root();
        let line = scene.add_node(root, NodeKind::Line).unwrap();
        let segments = LineData::from_segments(&[(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0))]);
        scene.set_geometry(line, Some(Arc::new(Geometry::line(segments)))).unwrap();
        scene.set_thickness(line, 0.1).unwrap();

        let hit = scene.hit_test_ray(&ray_down_z(0.5, 0.05), HitTestMode::Nearest);
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].segment_index, Some(0));
        assert!(scene.hit_test_ray(&ray_down_z(0.5, 0.3), HitTestMode::All).is_empty());

        let points = scene.add_node(root, NodeKind::Point).unwrap();
        let data = PointData {
            positions: vec![Vec3::new(4.0, 4.0, 0.0), Vec3::new(4.0, 4.0, -2.0)],
            ..Default::default()
        };
        scene.set_geometry(points, Some(Arc::new(Geometry::point(data)))).unwrap();
        let hit = scene.hit_test_ray(&ray_down_z(4.0, 4.02), HitTestMode::Nearest);
        assert_eq!(hit[0].node, points);
        assert_eq!(hit[0].vertex_index, Some(0));
    }

    #[test]
    fn test_mismatched_geometry_is_not_hit() {
        let mut scene = Scene::default();
        let root = scene.root();
        let line = scene.add_node(root, NodeKind::Line).unwrap();
        scene.set_geometry(line, Some(SceneAssets::new().view_box_cube)).unwrap();
        assert!(scene.hit_test_ray(&ray_down_z(0.0, 0.0), HitTestMode::All).is_empty());
    }

    #[test]
    fn test_hidden_subtrees_are_skipped() {
        let mut scene = Scene::default();
        let root = scene.root();
        let group = scene.add_node(root, NodeKind::Group).unwrap();
        let cube = SceneAssets::new().view_box_cube;
        scene.add_mesh(group, cube, Material::default()).unwrap();
        assert_eq!(scene.hit_test_ray(&ray_down_z(0.0, 0.0), HitTestMode::All).len(), 1);

        scene.set_hit_test_visible(group, false).unwrap();
        assert!(scene.hit_test_ray(&ray_down_z(0.0, 0.0), HitTestMode::All).is_empty());
        scene.set_hit_test_visible(group, true).unwrap();
        scene.set_visible(group, false).unwrap();
        assert!(scene.hit_test_ray(&ray_down_z(0.0, 0.0), HitTestMode::All).is_empty());
    }

    #[test]
    fn test_results_sorted_and_trimmed() {
        let node = NodeId::default();
        let mut far = HitTestResult::new(node, Vec3::zeros(), Vec3::z(), 5.0);
        let near = HitTestResult::new(node, Vec3::zeros(), Vec3::z(), 1.0);
        let mut gizmo = HitTestResult::new(node, Vec3::zeros(), Vec3::z(), 9.0);
        gizmo.screen_spaced = true;
        far.tag = Some(HitTag::Axis(1));

        let all = finish_results(vec![far.clone(), near.clone(), gizmo.clone()], HitTestMode::All);
        assert_eq!(all, vec![gizmo.clone(), near, far]);
        let nearest = finish_results(all, HitTestMode::Nearest);
        assert_eq!(nearest, vec![gizmo]);
    }
}
