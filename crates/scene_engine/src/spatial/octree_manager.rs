//! Incremental octree maintenance
//!
//! Mutations are only recorded here. They reach the tree when the owner calls
//! [`OctreeManager::process_pending_items`] or [`OctreeManager::rebuild_tree`]
//! from its update pass, so a tree seen by render or hit test never changes
//! under it.

use log::{debug, trace};

use super::octree::{Octree, OctreeItem};
use crate::config::OctreeConfig;
use crate::geometry::{BoundingBox, Frustum, Ray};

/// Buffers item changes and applies them to an [`Octree`] on request
#[derive(Debug, Clone)]
pub struct OctreeManager<T> {
    tree: Option<Octree<T>>,
    pending_add: Vec<OctreeItem<T>>,
    pending_remove: Vec<T>,
    rebuild_requested: bool,
    update_requested: bool,
    config: OctreeConfig,
}

impl<T: Copy + PartialEq> OctreeManager<T> {
    /// Create a manager with no tree
    pub fn new(config: OctreeConfig) -> Self {
        Self {
            tree: None,
            pending_add: Vec::new(),
            pending_remove: Vec::new(),
            rebuild_requested: false,
            update_requested: false,
            config,
        }
    }

    /// Configuration used for new trees
    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Replace the configuration; takes effect on the next rebuild
    pub fn set_config(&mut self, config: OctreeConfig) {
        self.config = config;
        self.request_rebuild();
    }

    /// Queue an item for insertion
    pub fn add_pending_item(&mut self, id: T, bounds: BoundingBox) {
        self.pending_remove.retain(|r| *r != id);
        self.pending_add.retain(|a| a.id != id);
        self.pending_add.push(OctreeItem { id, bounds });
        self.update_requested = true;
    }

    /// Queue an item for removal
    pub fn remove_item(&mut self, id: T) {
        let was_pending = self.pending_add.len();
        self.pending_add.retain(|a| a.id != id);
        if self.tree.is_some() || self.pending_add.len() == was_pending {
            self.pending_remove.push(id);
        }
        self.update_requested = true;
    }

    /// Item bounds changed: remove then reinsert
    pub fn update_item(&mut self, id: T, bounds: BoundingBox) {
        self.pending_remove.push(id);
        self.pending_add.retain(|a| a.id != id);
        self.pending_add.push(OctreeItem { id, bounds });
        self.update_requested = true;
    }

    /// Ask for a full rebuild on the next update pass
    pub fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    /// Ask for pending items to be applied on the next update pass
    pub fn request_update_octree(&mut self) {
        self.update_requested = true;
    }

    /// True when a full rebuild is outstanding
    pub fn rebuild_requested(&self) -> bool {
        self.rebuild_requested
    }

    /// True when the update pass has work to do
    pub fn needs_update(&self) -> bool {
        self.rebuild_requested || self.update_requested
    }

    /// True when a tree exists and no changes are waiting
    pub fn is_current(&self) -> bool {
        self.tree.is_some()
            && !self.rebuild_requested
            && !self.update_requested
            && self.pending_add.is_empty()
            && self.pending_remove.is_empty()
    }

    /// The tree, but only while it reflects every recorded change
    pub fn tree(&self) -> Option<&Octree<T>> {
        if self.is_current() {
            self.tree.as_ref()
        } else {
            None
        }
    }

    /// Drop the tree and every pending change
    pub fn clear(&mut self) {
        self.tree = None;
        self.pending_add.clear();
        self.pending_remove.clear();
        self.rebuild_requested = false;
        self.update_requested = false;
    }

    /// Build a fresh tree from the complete item set
    pub fn rebuild_tree(&mut self, items: impl IntoIterator<Item = OctreeItem<T>>) {
        if !self.config.enabled {
            self.clear();
            return;
        }
        let tree = Octree::build(items, self.config.clone());
        debug!(
            "Rebuilt octree: {} items, depth {}",
            tree.len(),
            tree.root.max_depth()
        );
        self.tree = Some(tree);
        self.pending_add.clear();
        self.pending_remove.clear();
        self.rebuild_requested = false;
        self.update_requested = false;
    }

    /// Apply queued removals and insertions to the existing tree
    ///
    /// Returns false when the tree cannot absorb the changes (no tree yet, or
    /// an item outside the root bounds); the caller should then rebuild.
    pub fn process_pending_items(&mut self) -> bool {
        self.update_requested = false;
        let Some(tree) = self.tree.as_mut() else {
            self.rebuild_requested = true;
            return false;
        };
        for id in self.pending_remove.drain(..) {
            tree.remove(id);
        }
        let mut fits = true;
        for item in self.pending_add.drain(..) {
            if item.bounds.is_empty() {
                continue;
            }
            if !tree.insert(item) {
                fits = false;
            }
        }
        trace!("Processed pending octree items, fits: {}", fits);
        if !fits {
            self.rebuild_requested = true;
        }
        fits
    }

    /// Candidate ids along a ray; `None` when the tree is missing or stale
    pub fn query_ray(&self, ray: &Ray) -> Option<Vec<T>> {
        self.tree().map(|t| t.query_ray(ray))
    }

    /// Ids intersecting the frustum; `None` when the tree is missing or stale
    pub fn query_frustum(&self, frustum: &Frustum) -> Option<Vec<T>> {
        self.tree().map(|t| t.query_frustum(frustum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    fn cube(x: f32) -> BoundingBox {
        BoundingBox::from_center_extents(Vec3::new(x, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.5))
    }

    fn items() -> Vec<OctreeItem<u32>> {
        (0..6).map(|i| OctreeItem { id: i, bounds: cube(i as f32 * 2.0) }).collect()
    }

    #[test]
    fn test_tree_hidden_until_rebuilt() {
        let mut manager = OctreeManager::new(OctreeConfig::default());
        manager.add_pending_item(0u32, cube(0.0));
        assert!(manager.tree().is_none());
        assert!(manager.needs_update());
        manager.rebuild_tree(items());
        assert!(manager.is_current());
        assert_eq!(manager.tree().map(|t| t.len()), Some(6));
    }

    #[test]
    fn test_pending_changes_make_tree_stale_until_processed() {
        let mut manager = OctreeManager::new(OctreeConfig::default());
        manager.rebuild_tree(items());
        manager.remove_item(2);
        assert!(manager.tree().is_none());
        assert!(manager.process_pending_items());
        assert_eq!(manager.tree().map(|t| t.len()), Some(5));
    }

    #[test]
    fn test_update_request_hides_tree_until_processed() {
        let mut manager = OctreeManager::new(OctreeConfig::default());
        manager.rebuild_tree(items());
        manager.request_update_octree();
        assert!(manager.needs_update());
        assert!(manager.query_ray(&Ray::new(Vec3::zeros(), Vec3::x())).is_none());
        assert!(manager.process_pending_items());
        assert!(manager.is_current());
    }

    #[test]
    fn test_item_outside_root_requests_rebuild() {
        let mut manager = OctreeManager::new(OctreeConfig::default());
        manager.rebuild_tree(items());
        manager.add_pending_item(42, cube(500.0));
        assert!(!manager.process_pending_items());
        assert!(manager.rebuild_requested());
        assert!(manager.tree().is_none());
    }

    #[test]
    fn test_process_without_tree_requests_rebuild() {
        let mut manager: OctreeManager<u32> = OctreeManager::new(OctreeConfig::default());
        assert!(!manager.process_pending_items());
        assert!(manager.rebuild_requested());
    }

    #[test]
    fn test_disabled_config_never_builds() {
        let mut manager = OctreeManager::new(OctreeConfig { enabled: false, ..OctreeConfig::default() });
        manager.rebuild_tree(items());
        assert!(manager.tree().is_none());
        assert!(manager.query_ray(&Ray::new(Vec3::zeros(), Vec3::x())).is_none());
    }
}
