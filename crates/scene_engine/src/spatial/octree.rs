//! Octree spatial partitioning structure
//!
//! Bounds-based octree: every item lives in the smallest octant
//! that fully contains its bounding box, so items straddling a split plane stay
//! in the parent. A query only has to visit octants whose bounds pass the test.

use crate::config::OctreeConfig;
use crate::foundation::math::Vec3;
use crate::geometry::{BoundingBox, Frustum, Ray};

/// Item stored in the octree: an id plus its bounds in the tree's space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctreeItem<T> {
    /// Caller's handle for the item
    pub id: T,
    /// Bounds used for placement and queries
    pub bounds: BoundingBox,
}

/// Single node in the octree hierarchy
#[derive(Debug, Clone)]
pub struct OctreeNode<T> {
    /// Bounds of this octant
    pub bounds: BoundingBox,

    /// Items that fit in this octant but in none of its children
    pub items: Vec<OctreeItem<T>>,

    /// Child nodes (8 octants), None if this is a leaf
    pub children: Option<Box<[OctreeNode<T>; 8]>>,

    /// Depth in the tree (0 = root)
    pub depth: u32,
}

impl<T: Copy + PartialEq> OctreeNode<T> {
    /// Create a new leaf node
    pub fn new(bounds: BoundingBox, depth: u32) -> Self {
        Self {
            bounds,
            items: Vec::new(),
            children: None,
            depth,
        }
    }

    /// Check if this node is a leaf (has no children)
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Bounds of one of the 8 octants
    ///
    /// Octant layout: bit 0 selects +X, bit 1 selects +Y, bit 2 selects +Z.
    fn octant_bounds(&self, octant: usize) -> BoundingBox {
        let center = self.bounds.center();
        let pick = |bit: usize, lo: f32, mid: f32, hi: f32| {
            if octant & bit != 0 { (mid, hi) } else { (lo, mid) }
        };
        let (x0, x1) = pick(1, self.bounds.min.x, center.x, self.bounds.max.x);
        let (y0, y1) = pick(2, self.bounds.min.y, center.y, self.bounds.max.y);
        let (z0, z1) = pick(4, self.bounds.min.z, center.z, self.bounds.max.z);
        BoundingBox::new(
            Vec3::new(x0, y0, z0),
            Vec3::new(x1, y1, z1),
        )
    }

    /// Child octant that fully contains `bounds`, if any
    fn fitting_octant(&self, bounds: &BoundingBox) -> Option<usize> {
        let center = self.bounds.center();
        let mut octant = 0;
        for (axis, bit) in [(0usize, 1usize), (1, 2), (2, 4)] {
            if bounds.min[axis] >= center[axis] {
                octant |= bit;
            } else if bounds.max[axis] > center[axis] {
                return None;
            }
        }
        Some(octant)
    }

    fn can_split(&self, config: &OctreeConfig) -> bool {
        let size = self.bounds.size();
        self.depth < config.max_depth && size.x.min(size.y).min(size.z) * 0.5 >= config.min_octant_size
    }

    /// Subdivide this node into 8 children and push down the items that fit
    fn subdivide(&mut self) {
        if self.children.is_some() {
            return;
        }
        let depth = self.depth + 1;
        let children: [OctreeNode<T>; 8] =
            std::array::from_fn(|octant| OctreeNode::new(self.octant_bounds(octant), depth));
        self.children = Some(Box::new(children));

        let items = std::mem::take(&mut self.items);
        for item in items {
            match (self.fitting_octant(&item.bounds), self.children.as_mut()) {
                (Some(octant), Some(children)) => children[octant].items.push(item),
                _ => self.items.push(item),
            }
        }
    }

    /// Insert an item; false when it does not fit inside this node
    pub fn insert(&mut self, item: OctreeItem<T>, config: &OctreeConfig) -> bool {
        if !self.bounds.contains_box(&item.bounds) {
            return false;
        }

        if self.is_leaf() {
            if self.items.len() < config.max_items_per_octant || !self.can_split(config) {
                self.items.push(item);
                return true;
            }
            self.subdivide();
        }

        if let Some(octant) = self.fitting_octant(&item.bounds) {
            if let Some(children) = self.children.as_mut() {
                return children[octant].insert(item, config);
            }
        }
        self.items.push(item);
        true
    }

    /// Remove an item from this node or its children
    pub fn remove(&mut self, id: T) -> bool {
        if let Some(index) = self.items.iter().position(|i| i.id == id) {
            self.items.swap_remove(index);
            return true;
        }
        if let Some(children) = self.children.as_mut() {
            for child in children.iter_mut() {
                if child.remove(id) {
                    return true;
                }
            }
        }
        false
    }

    /// Collect ids whose bounds the ray passes through
    pub fn query_ray(&self, ray: &Ray, results: &mut Vec<T>) {
        if self.bounds.intersect_ray(ray.origin, ray.direction).is_none() {
            return;
        }
        for item in &self.items {
            if item.bounds.intersect_ray(ray.origin, ray.direction).is_some() {
                results.push(item.id);
            }
        }
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                child.query_ray(ray, results);
            }
        }
    }

    /// Collect ids whose bounds intersect the frustum
    pub fn query_frustum(&self, frustum: &Frustum, results: &mut Vec<T>) {
        if !frustum.intersects_box(&self.bounds) {
            return;
        }
        results.extend(
            self.items
                .iter()
                .filter(|i| frustum.intersects_box(&i.bounds))
                .map(|i| i.id),
        );
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                child.query_frustum(frustum, results);
            }
        }
    }

    /// Count total items in this node and all children
    pub fn count_items(&self) -> usize {
        let below: usize = self
            .children
            .as_ref()
            .map_or(0, |c| c.iter().map(OctreeNode::count_items).sum());
        self.items.len() + below
    }

    /// Deepest level below (and including) this node
    pub fn max_depth(&self) -> u32 {
        self.children
            .as_ref()
            .map_or(self.depth, |c| c.iter().map(OctreeNode::max_depth).max().unwrap_or(self.depth))
    }
}

/// Octree over items of type `T`
#[derive(Debug, Clone)]
pub struct Octree<T> {
    /// Root node covering every item at build time
    pub root: OctreeNode<T>,

    config: OctreeConfig,
}

impl<T: Copy + PartialEq> Octree<T> {
    /// Create an empty octree covering `world_bounds`
    pub fn new(world_bounds: BoundingBox, config: OctreeConfig) -> Self {
        let bounds = if config.cubify { world_bounds.cubify() } else { world_bounds };
        Self {
            root: OctreeNode::new(bounds, 0),
            config,
        }
    }

    /// Build a tree sized to fit `items`
    ///
    /// Items with empty bounds cannot be placed and are skipped; callers test
    /// those by brute force.
    pub fn build(items: impl IntoIterator<Item = OctreeItem<T>>, config: OctreeConfig) -> Self {
        let items: Vec<_> = items.into_iter().filter(|i| !i.bounds.is_empty()).collect();
        let world = items
            .iter()
            .fold(BoundingBox::EMPTY, |acc, i| acc.merge(&i.bounds));
        let world = if world.is_empty() {
            BoundingBox::new(Vec3::zeros(), Vec3::zeros())
        } else {
            world
        };
        let mut tree = Self::new(world, config);
        for item in items {
            tree.insert(item);
        }
        tree
    }

    /// Insert an item; false when it lies outside the root bounds
    pub fn insert(&mut self, item: OctreeItem<T>) -> bool {
        self.root.insert(item, &self.config)
    }

    /// Remove an item by id
    pub fn remove(&mut self, id: T) -> bool {
        self.root.remove(id)
    }

    /// Candidate ids along a ray; callers still run the exact test
    pub fn query_ray(&self, ray: &Ray) -> Vec<T> {
        let mut results = Vec::new();
        self.root.query_ray(ray, &mut results);
        results
    }

    /// Ids whose bounds intersect the frustum
    pub fn query_frustum(&self, frustum: &Frustum) -> Vec<T> {
        let mut results = Vec::new();
        self.root.query_frustum(frustum, &mut results);
        results
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.root.count_items()
    }

    /// True when no items are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bounds of the root octant
    pub fn bounds(&self) -> BoundingBox {
        self.root.bounds
    }

    /// Configuration the tree was built with
    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }
}
