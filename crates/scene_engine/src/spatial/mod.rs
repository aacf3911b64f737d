//! Spatial partitioning for hit testing and culling
//!
//! Provides a bounds-based octree and the manager groups use to keep it in
//! step with their children.

pub mod octree;
pub mod octree_manager;

pub use octree::{Octree, OctreeItem, OctreeNode};
pub use octree_manager::OctreeManager;
