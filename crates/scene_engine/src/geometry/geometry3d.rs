//! CPU-side geometry
//!
//! A [`Geometry`] is immutable once built and shared through `Arc`. Its
//! [`GeometryId`] is the key the geometry buffer manager uses, so two nodes
//! sharing one `Arc<Geometry>` share one set of GPU buffers.

use std::sync::atomic::{AtomicU64, Ordering};

use super::bounds::{BoundingBox, BoundingSphere};
use super::primitives::{Ray, SegmentApproach, Triangle};
use crate::foundation::math::{Mat4, Mat4Ext, Vec2, Vec3, Vec4};

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a geometry instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u64);

impl GeometryId {
    fn next() -> Self {
        Self(NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which primitive a geometry is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    /// Indexed triangles
    Mesh,
    /// Indexed line segments
    Line,
    /// Point list
    Point,
}

/// Triangle mesh data
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// Vertex positions
    pub positions: Vec<Vec3>,
    /// Per-vertex normals; generated when left empty
    pub normals: Vec<Vec3>,
    /// Per-vertex texture coordinates; may be empty
    pub texcoords: Vec<Vec2>,
    /// Triangle list, three indices per triangle
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Number of complete triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Triangle by index, `None` when an index is out of range
    pub fn triangle(&self, index: usize) -> Option<Triangle> {
        let base = index * 3;
        let i = self.indices.get(base..base + 3)?;
        Some(Triangle::new(
            *self.positions.get(i[0] as usize)?,
            *self.positions.get(i[1] as usize)?,
            *self.positions.get(i[2] as usize)?,
        ))
    }

    /// Area weighted smooth normals
    pub fn compute_normals(&mut self) {
        let mut normals = vec![Vec3::zeros(); self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            if a >= normals.len() || b >= normals.len() || c >= normals.len() {
                continue;
            }
            let n = (self.positions[b] - self.positions[a]).cross(&(self.positions[c] - self.positions[a]));
            normals[a] += n;
            normals[b] += n;
            normals[c] += n;
        }
        for n in &mut normals {
            *n = n.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::y);
        }
        self.normals = normals;
    }

    /// Nearest triangle hit along a model-space ray
    pub fn intersect_ray(&self, ray: &Ray) -> Option<MeshHit> {
        let mut best: Option<MeshHit> = None;
        for index in 0..self.triangle_count() {
            let Some(tri) = self.triangle(index) else { continue };
            if let Some((t, _, _)) = tri.intersect_ray(ray) {
                if best.map_or(true, |b| t < b.t) {
                    best = Some(MeshHit {
                        t,
                        triangle_index: index,
                        point: ray.point_at(t),
                        normal: tri.normal(),
                    });
                }
            }
        }
        best
    }
}

/// Result of [`MeshData::intersect_ray`], in the ray's space
#[derive(Debug, Clone, Copy)]
pub struct MeshHit {
    /// Ray parameter
    pub t: f32,
    /// Triangle index
    pub triangle_index: usize,
    /// Hit point
    pub point: Vec3,
    /// Face normal
    pub normal: Vec3,
}

/// Line segment data
#[derive(Debug, Clone, Default)]
pub struct LineData {
    /// Vertex positions
    pub positions: Vec<Vec3>,
    /// Segment list, two indices per segment
    pub indices: Vec<u32>,
    /// Optional per-vertex colors
    pub colors: Vec<Vec4>,
}

impl LineData {
    /// Build a line list from explicit segments
    pub fn from_segments(segments: &[(Vec3, Vec3)]) -> Self {
        let mut data = Self::default();
        for (a, b) in segments {
            let base = data.positions.len() as u32;
            data.positions.push(*a);
            data.positions.push(*b);
            data.indices.extend_from_slice(&[base, base + 1]);
        }
        data
    }

    /// Number of complete segments
    pub fn segment_count(&self) -> usize {
        self.indices.len() / 2
    }

    /// Closest segment to a world-space ray after taking each segment to world
    /// space through `world`; only segments within `thickness` count
    pub fn closest_segment(&self, ray: &Ray, world: &Mat4, thickness: f32) -> Option<(usize, SegmentApproach)> {
        let mut best: Option<(usize, SegmentApproach)> = None;
        for (index, seg) in self.indices.chunks_exact(2).enumerate() {
            let (Some(a), Some(b)) = (self.positions.get(seg[0] as usize), self.positions.get(seg[1] as usize))
            else {
                continue;
            };
            let approach = ray.closest_to_segment(&world.transform_point3(a), &world.transform_point3(b));
            if approach.distance <= thickness
                && best.as_ref().map_or(true, |(_, b)| approach.ray_t < b.ray_t)
            {
                best = Some((index, approach));
            }
        }
        best
    }
}

/// Point list data
#[derive(Debug, Clone, Default)]
pub struct PointData {
    /// Point positions
    pub positions: Vec<Vec3>,
    /// Optional per-point colors
    pub colors: Vec<Vec4>,
}

impl PointData {
    /// Nearest world-space point within `thickness` of the ray
    pub fn closest_point(&self, ray: &Ray, world: &Mat4, thickness: f32) -> Option<(usize, Vec3, f32)> {
        let mut best: Option<(usize, Vec3, f32)> = None;
        for (index, p) in self.positions.iter().enumerate() {
            let wp = world.transform_point3(p);
            if ray.distance_to_point(&wp) > thickness {
                continue;
            }
            let t = ray.closest_t(&wp);
            if best.map_or(true, |(_, _, bt)| t < bt) {
                best = Some((index, wp, t));
            }
        }
        best
    }
}

/// Primitive payload of a [`Geometry`]
#[derive(Debug, Clone)]
pub enum GeometryData {
    /// Triangles
    Mesh(MeshData),
    /// Segments
    Line(LineData),
    /// Points
    Point(PointData),
}

/// Immutable geometry with identity and cached bounds
#[derive(Debug, Clone)]
pub struct Geometry {
    id: GeometryId,
    data: GeometryData,
    bounds: BoundingBox,
    bounding_sphere: BoundingSphere,
}

impl Geometry {
    /// Wrap primitive data, computing bounds and assigning a fresh id
    pub fn new(data: GeometryData) -> Self {
        let positions = match &data {
            GeometryData::Mesh(m) => &m.positions,
            GeometryData::Line(l) => &l.positions,
            GeometryData::Point(p) => &p.positions,
        };
        let bounds = BoundingBox::from_points(positions);
        let bounding_sphere = BoundingSphere::from_points(positions);
        Self {
            id: GeometryId::next(),
            data,
            bounds,
            bounding_sphere,
        }
    }

    /// Mesh geometry; normals are generated when missing
    pub fn mesh(mut data: MeshData) -> Self {
        if data.normals.len() != data.positions.len() {
            data.compute_normals();
        }
        Self::new(GeometryData::Mesh(data))
    }

    /// Line geometry
    pub fn line(data: LineData) -> Self {
        Self::new(GeometryData::Line(data))
    }

    /// Point geometry
    pub fn point(data: PointData) -> Self {
        Self::new(GeometryData::Point(data))
    }

    /// Identity used to share GPU buffers
    pub fn id(&self) -> GeometryId {
        self.id
    }

    /// Primitive kind
    pub fn kind(&self) -> GeometryKind {
        match self.data {
            GeometryData::Mesh(_) => GeometryKind::Mesh,
            GeometryData::Line(_) => GeometryKind::Line,
            GeometryData::Point(_) => GeometryKind::Point,
        }
    }

    /// Primitive payload
    pub fn data(&self) -> &GeometryData {
        &self.data
    }

    /// Mesh payload, if this is a mesh
    pub fn as_mesh(&self) -> Option<&MeshData> {
        match &self.data {
            GeometryData::Mesh(m) => Some(m),
            _ => None,
        }
    }

    /// Line payload, if this is a line list
    pub fn as_line(&self) -> Option<&LineData> {
        match &self.data {
            GeometryData::Line(l) => Some(l),
            _ => None,
        }
    }

    /// Point payload, if this is a point list
    pub fn as_point(&self) -> Option<&PointData> {
        match &self.data {
            GeometryData::Point(p) => Some(p),
            _ => None,
        }
    }

    /// Model-space bounding box
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Model-space bounding sphere
    pub fn bounding_sphere(&self) -> BoundingSphere {
        self.bounding_sphere
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        match &self.data {
            GeometryData::Mesh(m) => m.positions.len(),
            GeometryData::Line(l) => l.positions.len(),
            GeometryData::Point(p) => p.positions.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad() -> MeshData {
        MeshData {
            positions: vec![
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            ..Default::default()
        }
    }

    #[test]
    fn test_geometry_ids_are_unique() {
        let a = Geometry::mesh(quad());
        let b = Geometry::mesh(quad());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.kind(), GeometryKind::Mesh);
    }

    #[test]
    fn test_mesh_normals_generated() {
        let g = Geometry::mesh(quad());
        let mesh = g.as_mesh().unwrap();
        assert_eq!(mesh.normals.len(), 4);
        assert_relative_eq!(mesh.normals[0], Vec3::z(), epsilon = 1e-6);
    }

    #[test]
    fn test_mesh_intersect_reports_triangle() {
        let mesh = quad();
        let ray = Ray::new(Vec3::new(-0.5, 0.5, 3.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = mesh.intersect_ray(&ray).unwrap();
        assert_eq!(hit.triangle_index, 1);
        assert_relative_eq!(hit.t, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_bounds_cover_positions() {
        let g = Geometry::mesh(quad());
        assert_eq!(g.bounds().min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(g.bounds().max, Vec3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(g.bounding_sphere().radius, 2.0f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_line_thickness_filter() {
        let line = LineData::from_segments(&[(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0))]);
        let ray = Ray::new(Vec3::new(0.0, 0.2, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(line.closest_segment(&ray, &Mat4::identity(), 0.1).is_none());
        let (index, approach) = line.closest_segment(&ray, &Mat4::identity(), 0.5).unwrap();
        assert_eq!(index, 0);
        assert_relative_eq!(approach.distance, 0.2, epsilon = 1e-5);
    }

    #[test]
    fn test_point_picks_nearest_along_ray() {
        let points = PointData {
            positions: vec![Vec3::new(0.0, 0.0, -2.0), Vec3::new(0.0, 0.05, 1.0)],
            ..Default::default()
        };
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let (index, _, t) = points.closest_point(&ray, &Mat4::identity(), 0.1).unwrap();
        assert_eq!(index, 1);
        assert_relative_eq!(t, 4.0, epsilon = 1e-5);
    }
}
