//! Procedural geometry shared by gizmo nodes
//!
//! Built once per [`crate::render::RenderHost`] and handed out as `Arc`s, so
//! every view box in a scene shares one cube and therefore one GPU buffer.

use std::sync::Arc;

use log::debug;

use crate::foundation::math::{Vec2, Vec3, Vec4};
use crate::geometry::{Geometry, MeshData};

/// Faces of the view box cube in triangle order; face `i` owns triangles `2i`
/// and `2i + 1`
pub const VIEW_BOX_FACES: [Vec3; 6] = [
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(-1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(0.0, 0.0, -1.0),
];

/// Axis colors of the coordinate system gizmo (X red, Y green, Z blue)
pub const AXIS_COLORS: [Vec4; 3] = [
    Vec4::new(1.0, 0.0, 0.0, 1.0),
    Vec4::new(0.0, 1.0, 0.0, 1.0),
    Vec4::new(0.0, 0.0, 1.0, 1.0),
];

const SHAFT_LENGTH: f32 = 0.8;
const SHAFT_HALF_WIDTH: f32 = 0.03;
const HEAD_HALF_WIDTH: f32 = 0.08;

/// Immutable geometry table
#[derive(Debug, Clone)]
pub struct SceneAssets {
    /// Unit cube centered at the origin, 4 vertices and 2 triangles per face
    pub view_box_cube: Arc<Geometry>,
    /// Arrow of length 1 along +X
    pub axis_arrow: Arc<Geometry>,
}

impl Default for SceneAssets {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneAssets {
    /// Generate every asset
    pub fn new() -> Self {
        let assets = Self {
            view_box_cube: Arc::new(Geometry::mesh(view_box_cube())),
            axis_arrow: Arc::new(Geometry::mesh(axis_arrow())),
        };
        debug!(
            "Generated scene assets: cube {} vertices, arrow {} vertices",
            assets.view_box_cube.vertex_count(),
            assets.axis_arrow.vertex_count()
        );
        assets
    }

    /// Face normal for a triangle of [`SceneAssets::view_box_cube`]
    pub fn view_box_face(triangle_index: usize) -> Option<Vec3> {
        VIEW_BOX_FACES.get(triangle_index / 2).copied()
    }
}

fn face_tangents(normal: Vec3) -> (Vec3, Vec3) {
    let up = if normal.y.abs() > 0.5 { Vec3::z() } else { Vec3::y() };
    let u = up.cross(&normal);
    let v = normal.cross(&u);
    (u, v)
}

fn view_box_cube() -> MeshData {
    let mut mesh = MeshData::default();
    for normal in VIEW_BOX_FACES {
        let (u, v) = face_tangents(normal);
        let base = mesh.positions.len() as u32;
        let center = normal * 0.5;
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            mesh.positions.push(center + u * su + v * sv);
            mesh.normals.push(normal);
        }
        mesh.texcoords.extend([Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0), Vec2::new(1.0, 0.0), Vec2::zeros()]);
        mesh.indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

fn axis_arrow() -> MeshData {
    let mut mesh = MeshData::default();
    let w = SHAFT_HALF_WIDTH;
    // Shaft: box from x = 0 to SHAFT_LENGTH
    for x in [0.0, SHAFT_LENGTH] {
        for (y, z) in [(-w, -w), (w, -w), (w, w), (-w, w)] {
            mesh.positions.push(Vec3::new(x, y, z));
        }
    }
    mesh.indices.extend([
        0, 2, 1, 0, 3, 2, // back cap
        4, 5, 6, 4, 6, 7, // front cap
        0, 1, 5, 0, 5, 4, //
        1, 2, 6, 1, 6, 5, //
        2, 3, 7, 2, 7, 6, //
        3, 0, 4, 3, 4, 7,
    ]);
    // Head: pyramid from SHAFT_LENGTH to the tip at x = 1
    let base = mesh.positions.len() as u32;
    let h = HEAD_HALF_WIDTH;
    for (y, z) in [(-h, -h), (h, -h), (h, h), (-h, h)] {
        mesh.positions.push(Vec3::new(SHAFT_LENGTH, y, z));
    }
    mesh.positions.push(Vec3::x());
    let tip = base + 4;
    mesh.indices.extend([base, base + 2, base + 1, base, base + 3, base + 2]);
    for i in 0..4 {
        mesh.indices.extend([base + i, base + (i + 1) % 4, tip]);
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Ray;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_face_layout() {
        let assets = SceneAssets::new();
        let mesh = assets.view_box_cube.as_mesh().unwrap();
        assert_eq!(mesh.positions.len(), 24);
        assert_eq!(mesh.triangle_count(), 12);

        for (face, normal) in VIEW_BOX_FACES.iter().enumerate() {
            for tri in [2 * face, 2 * face + 1] {
                let triangle = mesh.triangle(tri).unwrap();
                assert_relative_eq!(triangle.centroid().dot(normal), 0.5, epsilon = 1e-6);
                assert_relative_eq!(triangle.normal().dot(normal), 1.0, epsilon = 1e-6);
                assert_eq!(SceneAssets::view_box_face(tri), Some(*normal));
            }
        }
        assert_eq!(SceneAssets::view_box_face(12), None);
    }

    #[test]
    fn test_ray_hits_front_face() {
        let assets = SceneAssets::new();
        let mesh = assets.view_box_cube.as_mesh().unwrap();
        let hit = mesh
            .intersect_ray(&Ray::new(Vec3::new(0.1, 0.2, 5.0), Vec3::new(0.0, 0.0, -1.0)))
            .unwrap();
        assert_eq!(SceneAssets::view_box_face(hit.triangle_index), Some(Vec3::z()));
        assert_relative_eq!(hit.t, 4.5, epsilon = 1e-5);
    }

    #[test]
    fn test_arrow_spans_unit_length() {
        let assets = SceneAssets::new();
        let bounds = assets.axis_arrow.bounds();
        assert_relative_eq!(bounds.min.x, 0.0);
        assert_relative_eq!(bounds.max.x, 1.0);
        assert_relative_eq!(bounds.max.y, HEAD_HALF_WIDTH);
    }
}
