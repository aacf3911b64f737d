//! View frustum for visibility culling

use super::bounds::{BoundingBox, BoundingSphere};
use crate::foundation::math::{Mat4, Vec3, Vec4};

/// Plane in 3D space; points with positive signed distance are inside
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Plane from `(a, b, c, d)` coefficients of `ax + by + cz + d = 0`
    fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = Vec3::new(coefficients.x, coefficients.y, coefficients.z);
        let length = normal.magnitude();
        if length <= f32::EPSILON {
            return Self { normal: Vec3::zeros(), distance: 0.0 };
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone)]
pub struct Frustum {
    /// Six planes defining the frustum (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann: each plane is the sum or difference of the fourth row
    /// with one of the first three rows of the clip matrix. Assumes clip depth
    /// in [-1, 1].
    pub fn from_matrix(vp_matrix: &Mat4) -> Self {
        let row = |i: usize| {
            Vec4::new(vp_matrix[(i, 0)], vp_matrix[(i, 1)], vp_matrix[(i, 2)], vp_matrix[(i, 3)])
        };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 + r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Check if a point is inside the frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.distance_to_point(point) >= 0.0)
    }

    /// Check if a sphere is inside or intersects the frustum
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|p| p.distance_to_point(sphere.center) >= -sphere.radius)
    }

    /// Check if a box is inside or intersects the frustum
    pub fn intersects_box(&self, bounds: &BoundingBox) -> bool {
        for plane in &self.planes {
            // the corner furthest along the plane normal
            let positive = Vec3::new(
                if plane.normal.x >= 0.0 { bounds.max.x } else { bounds.min.x },
                if plane.normal.y >= 0.0 { bounds.max.y } else { bounds.min.y },
                if plane.normal.z >= 0.0 { bounds.max.z } else { bounds.min.z },
            );
            if plane.distance_to_point(positive) < 0.0 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;

    fn camera_frustum() -> Frustum {
        let view = Mat4::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y());
        let proj = Mat4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        Frustum::from_matrix(&(proj * view))
    }

    #[test]
    fn test_point_in_front_of_camera_is_inside() {
        let frustum = camera_frustum();
        assert!(frustum.contains_point(Vec3::zeros()));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 20.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -200.0)));
        assert!(!frustum.contains_point(Vec3::new(50.0, 0.0, 0.0)));
    }

    #[test]
    fn test_sphere_and_box_culling() {
        let frustum = camera_frustum();
        assert!(frustum.intersects_sphere(&BoundingSphere::new(Vec3::zeros(), 1.0)));
        assert!(!frustum.intersects_sphere(&BoundingSphere::new(Vec3::new(50.0, 0.0, 0.0), 1.0)));
        let straddling = BoundingBox::new(Vec3::new(9.0, -1.0, -1.0), Vec3::new(40.0, 1.0, 1.0));
        assert!(frustum.intersects_box(&straddling));
        let outside = BoundingBox::new(Vec3::new(30.0, -1.0, -1.0), Vec3::new(40.0, 1.0, 1.0));
        assert!(!frustum.intersects_box(&outside));
    }
}
