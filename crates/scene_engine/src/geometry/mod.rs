//! Geometry module - bounding volumes, ray primitives and CPU-side geometry
//!
//! Everything here is plain data with no GPU dependency. The render module turns
//! [`Geometry`] into GPU buffers, the scene module uses the bounds and ray tests.

pub mod bounds;
pub mod primitives;
pub mod frustum;
pub mod geometry3d;

pub use bounds::{BoundingBox, BoundingSphere};
pub use frustum::{Frustum, Plane};
pub use geometry3d::{
    Geometry, GeometryData, GeometryId, GeometryKind, LineData, MeshData, MeshHit, PointData,
};
pub use primitives::{Ray, SegmentApproach, Triangle};
