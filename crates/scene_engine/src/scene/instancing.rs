//! Instancing mesh nodes
//!
//! An instancing node draws one mesh once per matrix. For hit testing it keeps
//! a private octree over the instance bounds (in the node's own space), so a
//! ray only runs the exact triangle test on instances whose bounds it crosses.

use log::{trace, warn};

use crate::config::OctreeConfig;
use crate::foundation::math::{Mat4, Mat4Ext};
use crate::geometry::{BoundingBox, BoundingSphere, MeshData, Ray};
use crate::spatial::{OctreeItem, OctreeManager};

use super::hit_test::{HitTag, HitTestResult};
use super::node::NodeId;

/// Instance matrices of one node plus their optional stable identifiers
#[derive(Debug, Clone)]
pub struct InstanceSet {
    matrices: Vec<Mat4>,
    identifiers: Option<Vec<u64>>,
    octree: OctreeManager<usize>,
}

impl InstanceSet {
    /// Empty set
    pub fn new(config: OctreeConfig) -> Self {
        Self {
            matrices: Vec::new(),
            identifiers: None,
            octree: OctreeManager::new(config),
        }
    }

    /// Replace every instance
    ///
    /// Identifiers are ignored, with a warning, unless there is one per matrix.
    pub fn set(&mut self, matrices: Vec<Mat4>, identifiers: Option<Vec<u64>>) {
        self.identifiers = match identifiers {
            Some(ids) if ids.len() == matrices.len() => Some(ids),
            Some(ids) => {
                warn!(
                    "Got {} instance identifiers for {} instances; reporting instance indices instead",
                    ids.len(),
                    matrices.len()
                );
                None
            }
            None => None,
        };
        self.matrices = matrices;
        self.invalidate_octree();
    }

    /// Drop the per-instance tree; the next update rebuilds it
    pub(crate) fn invalidate_octree(&mut self) {
        self.octree.clear();
        self.octree.request_rebuild();
    }

    /// Per-instance model matrices
    pub fn matrices(&self) -> &[Mat4] {
        &self.matrices
    }

    /// Stable identifiers, one per instance
    pub fn identifiers(&self) -> Option<&[u64]> {
        self.identifiers.as_deref()
    }

    /// Number of instances
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    /// True without instances
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Tag reported for a hit on instance `index`
    pub fn tag(&self, index: usize) -> HitTag {
        match self.identifiers.as_ref().and_then(|ids| ids.get(index)) {
            Some(&id) => HitTag::InstanceId(id),
            None => HitTag::InstanceIndex(index),
        }
    }

    /// Union of the mesh bounds under every instance matrix
    pub fn bounds(&self, mesh_bounds: &BoundingBox) -> (BoundingBox, BoundingSphere) {
        let bounds = self
            .matrices
            .iter()
            .fold(BoundingBox::EMPTY, |acc, m| acc.merge(&mesh_bounds.transform(m)));
        (bounds, BoundingSphere::from_box(&bounds))
    }

    /// The instance octree, for inspection
    pub fn octree(&self) -> &OctreeManager<usize> {
        &self.octree
    }

    /// Rebuild the instance octree when the set changed
    pub(crate) fn update_octree(&mut self, mesh_bounds: &BoundingBox) {
        if !self.octree.needs_update() {
            return;
        }
        let items: Vec<_> = self
            .matrices
            .iter()
            .enumerate()
            .map(|(id, m)| OctreeItem { id, bounds: mesh_bounds.transform(m) })
            .collect();
        trace!("Rebuilding instance octree over {} instances", items.len());
        self.octree.rebuild_tree(items);
    }

    /// Nearest hit over all instances
    ///
    /// Candidates come from the octree when it is current, otherwise every
    /// instance is tested. The exact hit is computed under
    /// `total * instance_matrix`.
    pub(crate) fn hit_test(&self, node: NodeId, mesh: &MeshData, total: &Mat4, ray: &Ray) -> Option<HitTestResult> {
        let local_ray = ray.transform(&total.inverse_or_identity());
        let candidates = self
            .octree
            .query_ray(&local_ray)
            .unwrap_or_else(|| (0..self.matrices.len()).collect());

        let mut best: Option<HitTestResult> = None;
        for index in candidates {
            let Some(instance) = self.matrices.get(index) else { continue };
            let world = total * instance;
            let Some(hit) = HitTestResult::from_mesh(node, mesh, &world, ray) else { continue };
            if best.as_ref().map_or(true, |b| hit.distance < b.distance) {
                best = Some(HitTestResult {
                    tag: Some(self.tag(index)),
                    ..hit
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::scene::assets::SceneAssets;
    use approx::assert_relative_eq;

    fn row(n: usize) -> Vec<Mat4> {
        (0..n).map(|i| Mat4::new_translation(&Vec3::new(i as f32 * 2.0, 0.0, 0.0))).collect()
    }

    #[test]
    fn test_tag_prefers_identifiers() {
        let mut set = InstanceSet::new(OctreeConfig::default());
        set.set(row(3), Some(vec![10, 20, 30]));
        assert_eq!(set.tag(1), HitTag::InstanceId(20));

        set.set(row(3), Some(vec![10]));
        assert!(set.identifiers().is_none());
        assert_eq!(set.tag(1), HitTag::InstanceIndex(1));
    }

    #[test]
    fn test_hit_reports_instance_and_exact_point() {
        let assets = SceneAssets::new();
        let geometry = &assets.view_box_cube;
        let mesh = geometry.as_mesh().unwrap();
        let mut set = InstanceSet::new(OctreeConfig::default());
        set.set(row(8), Some((100..108).collect()));
        set.update_octree(&geometry.bounds());
        assert!(set.octree().is_current());

        let total = Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0));
        let ray = Ray::new(Vec3::new(6.0, 1.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = set.hit_test(NodeId::default(), mesh, &total, &ray).unwrap();
        assert_eq!(hit.tag, Some(HitTag::InstanceId(103)));
        assert_relative_eq!(hit.point, Vec3::new(6.0, 1.0, 0.5), epsilon = 1e-5);
        assert_relative_eq!(hit.distance, 9.5, epsilon = 1e-5);

        let miss = Ray::new(Vec3::new(7.0, 1.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(set.hit_test(NodeId::default(), mesh, &total, &miss).is_none());
    }

    #[test]
    fn test_bounds_cover_every_instance() {
        let mut set = InstanceSet::new(OctreeConfig::default());
        set.set(row(4), None);
        let cube = BoundingBox::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5));
        let (bounds, sphere) = set.bounds(&cube);
        assert_relative_eq!(bounds.min.x, -0.5);
        assert_relative_eq!(bounds.max.x, 6.5);
        assert!(!sphere.is_empty());
    }
}
