//! Ray casting primitives
//!
//! Rays, triangles and the closest-approach helpers used by line and point
//! hit testing.

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};

/// A ray for intersection tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// The origin point of the ray
    pub origin: Vec3,
    /// The direction of the ray (normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Creates a new ray with the given origin and direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Get a point along the ray at distance t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray under a transform, re-normalized
    ///
    /// Distances along the result are in the target space; convert hits back by
    /// transforming the hit point, not by reusing `t`.
    #[must_use]
    pub fn transform(&self, matrix: &Mat4) -> Self {
        Self::new(
            matrix.transform_point3(&self.origin),
            matrix.transform_vector3(&self.direction),
        )
    }

    /// Parameter of the closest point on the ray to `point` (clamped to >= 0)
    pub fn closest_t(&self, point: &Vec3) -> f32 {
        (point - self.origin).dot(&self.direction).max(0.0)
    }

    /// Distance from the ray to a point
    pub fn distance_to_point(&self, point: &Vec3) -> f32 {
        (self.point_at(self.closest_t(point)) - point).magnitude()
    }

    /// Closest approach between the ray and segment `a`-`b`
    pub fn closest_to_segment(&self, a: &Vec3, b: &Vec3) -> SegmentApproach {
        let seg = b - a;
        let w0 = self.origin - a;
        let aa = self.direction.dot(&self.direction);
        let bb = self.direction.dot(&seg);
        let cc = seg.dot(&seg);
        let dd = self.direction.dot(&w0);
        let ee = seg.dot(&w0);
        let denom = aa * cc - bb * bb;

        let (mut t, mut s) = if denom.abs() < 1e-8 || cc < 1e-12 {
            (0.0, if cc < 1e-12 { 0.0 } else { (ee / cc).clamp(0.0, 1.0) })
        } else {
            ((bb * ee - cc * dd) / denom, ((aa * ee - bb * dd) / denom).clamp(0.0, 1.0))
        };

        // re-solve t for the clamped s, then s for the clamped t
        if cc >= 1e-12 {
            t = ((a + seg * s - self.origin).dot(&self.direction) / aa).max(0.0);
            s = ((self.origin + self.direction * t - a).dot(&seg) / cc).clamp(0.0, 1.0);
        } else {
            t = self.closest_t(a);
        }
        let on_ray = self.point_at(t);
        let on_segment = a + seg * s;
        SegmentApproach {
            ray_t: t,
            segment_t: s,
            point_on_ray: on_ray,
            point_on_segment: on_segment,
            distance: (on_ray - on_segment).magnitude(),
        }
    }
}

/// Result of [`Ray::closest_to_segment`]
#[derive(Debug, Clone, Copy)]
pub struct SegmentApproach {
    /// Parameter along the ray
    pub ray_t: f32,
    /// Parameter along the segment in [0, 1]
    pub segment_t: f32,
    /// Closest point on the ray
    pub point_on_ray: Vec3,
    /// Closest point on the segment
    pub point_on_segment: Vec3,
    /// Separation at the closest approach
    pub distance: f32,
}

/// Triangle primitive for mesh picking
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    /// First vertex
    pub v0: Vec3,
    /// Second vertex
    pub v1: Vec3,
    /// Third vertex
    pub v2: Vec3,
}

impl Triangle {
    /// Creates a new triangle
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    /// Calculates the normal of the triangle (right-hand rule)
    pub fn normal(&self) -> Vec3 {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;
        edge1.cross(&edge2).normalize()
    }

    /// Calculates the centroid (center point) of the triangle
    pub fn centroid(&self) -> Vec3 {
        (self.v0 + self.v1 + self.v2) / 3.0
    }

    /// Möller-Trumbore ray-triangle intersection, two sided
    ///
    /// Returns (t, u, v) with barycentric u/v if hit, None otherwise.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, f32, f32)> {
        const EPSILON: f32 = 0.000001;

        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;

        let h = ray.direction.cross(&edge2);
        let a = edge1.dot(&h);

        // parallel
        if a.abs() < EPSILON {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(&h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(&edge1);
        let v = f * ray.direction.dot(&q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(&q);
        if t > EPSILON {
            Some((t, u, v))
        } else {
            None
        }
    }
}
