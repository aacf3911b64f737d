//! Bounding volumes
//!
//! Boxes are axis aligned in whatever space they are expressed in. Transforming
//! a box takes the 8 transformed corners and re-wraps them, so the result is
//! conservative under rotation.

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl BoundingBox {
    /// An inverted box that contains nothing; merging anything into it yields that thing
    pub const EMPTY: Self = Self {
        min: Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
        max: Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
    };

    /// Create a new box from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create a box centered at a point with given half extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box containing all points; `EMPTY` for no points
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |acc, p| acc.include_point(*p))
    }

    /// True when the box contains no volume and no point
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Get the center of the box
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the box
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Full size along each axis
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// The 8 corners, ordered by the same bit layout as octree octants
    pub fn corners(&self) -> [Vec3; 8] {
        let mut corners = [Vec3::zeros(); 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            *corner = Vec3::new(
                if i & 1 != 0 { self.max.x } else { self.min.x },
                if i & 2 != 0 { self.max.y } else { self.min.y },
                if i & 4 != 0 { self.max.z } else { self.min.z },
            );
        }
        corners
    }

    /// Grow to include a point
    #[must_use]
    pub fn include_point(self, point: Vec3) -> Self {
        Self {
            min: self.min.inf(&point),
            max: self.max.sup(&point),
        }
    }

    /// Union of two boxes
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Image of this box under a transform
    #[must_use]
    pub fn transform(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let corners = self.corners();
        corners
            .iter()
            .fold(Self::EMPTY, |acc, c| acc.include_point(matrix.transform_point3(c)))
    }

    /// Check if this box contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if `other` lies completely inside this box
    pub fn contains_box(&self, other: &Self) -> bool {
        !other.is_empty() && self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Check if this box intersects another box
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Expand on all sides by `amount`
    #[must_use]
    pub fn inflate(&self, amount: f32) -> Self {
        let delta = Vec3::new(amount, amount, amount);
        Self::new(self.min - delta, self.max + delta)
    }

    /// Make the box a cube around its center using the largest extent
    #[must_use]
    pub fn cubify(&self) -> Self {
        let extents = self.extents();
        let half = extents.x.max(extents.y).max(extents.z);
        Self::from_center_extents(self.center(), Vec3::new(half, half, half))
    }

    /// Test ray intersection with this box using the slab method
    ///
    /// Returns the distance to the entry point if the ray intersects, `None`
    /// otherwise. A ray starting inside the box reports 0.
    pub fn intersect_ray(&self, ray_origin: Vec3, ray_dir: Vec3) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let inv_dir = Vec3::new(
            if ray_dir.x != 0.0 { 1.0 / ray_dir.x } else { f32::INFINITY },
            if ray_dir.y != 0.0 { 1.0 / ray_dir.y } else { f32::INFINITY },
            if ray_dir.z != 0.0 { 1.0 / ray_dir.z } else { f32::INFINITY },
        );

        let mut tmin = f32::NEG_INFINITY;
        let mut tmax = f32::INFINITY;
        for axis in 0..3 {
            if ray_dir[axis] == 0.0 {
                if ray_origin[axis] < self.min[axis] || ray_origin[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            let t1 = (self.min[axis] - ray_origin[axis]) * inv_dir[axis];
            let t2 = (self.max[axis] - ray_origin[axis]) * inv_dir[axis];
            tmin = tmin.max(t1.min(t2));
            tmax = tmax.min(t1.max(t2));
        }

        if tmax >= tmin && tmax >= 0.0 {
            Some(tmin.max(0.0))
        } else {
            None
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Center position
    pub center: Vec3,
    /// Radius; negative means empty
    pub radius: f32,
}

impl BoundingSphere {
    /// Sphere that contains nothing
    pub const EMPTY: Self = Self {
        center: Vec3::new(0.0, 0.0, 0.0),
        radius: -1.0,
    };

    /// Creates a new bounding sphere with the given center and radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere circumscribing a box
    pub fn from_box(bounds: &BoundingBox) -> Self {
        if bounds.is_empty() {
            return Self::EMPTY;
        }
        Self::new(bounds.center(), bounds.extents().magnitude())
    }

    /// Tightest sphere around the box of `points`, widened to reach every point
    pub fn from_points(points: &[Vec3]) -> Self {
        let bounds = BoundingBox::from_points(points);
        if bounds.is_empty() {
            return Self::EMPTY;
        }
        let center = bounds.center();
        let radius = points
            .iter()
            .map(|p| (p - center).magnitude())
            .fold(0.0f32, f32::max);
        Self::new(center, radius)
    }

    /// True when the sphere is empty
    pub fn is_empty(&self) -> bool {
        self.radius < 0.0
    }

    /// Sphere under a transform; the radius scales by the largest axis scale
    #[must_use]
    pub fn transform(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::new(matrix.transform_point3(&self.center), self.radius * matrix.max_scale())
    }

    /// Smallest sphere enclosing both spheres
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        let offset = other.center - self.center;
        let distance = offset.magnitude();
        if distance + other.radius <= self.radius {
            return *self;
        }
        if distance + self.radius <= other.radius {
            return *other;
        }
        let radius = (distance + self.radius + other.radius) * 0.5;
        let center = self.center + offset * ((radius - self.radius) / distance);
        Self::new(center, radius)
    }

    /// Check if this sphere intersects with another
    pub fn intersects(&self, other: &Self) -> bool {
        let distance_squared = (self.center - other.center).magnitude_squared();
        let radius_sum = self.radius + other.radius;
        distance_squared <= radius_sum * radius_sum
    }
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_box_contains_point() {
        let b = BoundingBox::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(b.contains_point(Vec3::zeros()));
        assert!(b.contains_point(Vec3::new(0.5, 0.5, 0.5)));
        assert!(!b.contains_point(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_box_intersects() {
        let b1 = BoundingBox::new(Vec3::zeros(), Vec3::new(2.0, 2.0, 2.0));
        let b2 = BoundingBox::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 3.0, 3.0));
        let b3 = BoundingBox::new(Vec3::new(5.0, 5.0, 5.0), Vec3::new(7.0, 7.0, 7.0));
        assert!(b1.intersects(&b2));
        assert!(!b1.intersects(&b3));
    }

    #[test]
    fn test_empty_box_merge_is_identity() {
        let b = BoundingBox::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(BoundingBox::EMPTY.merge(&b), b);
        assert_eq!(b.merge(&BoundingBox::EMPTY), b);
        assert!(BoundingBox::EMPTY.transform(&Mat4::identity()).is_empty());
    }

    #[test]
    fn test_box_transform_translation_and_scale() {
        let b = BoundingBox::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let m = Mat4::new_translation(&Vec3::new(10.0, 0.0, 0.0)) * Mat4::new_scaling(2.0);
        let t = b.transform(&m);
        assert_relative_eq!(t.min, Vec3::new(8.0, -2.0, -2.0), epsilon = 1e-5);
        assert_relative_eq!(t.max, Vec3::new(12.0, 2.0, 2.0), epsilon = 1e-5);
    }

    #[test]
    fn test_ray_box_hit_and_miss() {
        let b = BoundingBox::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let hit = b.intersect_ray(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert_relative_eq!(hit.unwrap(), 4.0, epsilon = 1e-5);
        assert!(b.intersect_ray(Vec3::new(3.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0)).is_none());
        assert!(b.intersect_ray(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 1.0)).is_none());
        assert_eq!(b.intersect_ray(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0)), Some(0.0));
    }

    #[test]
    fn test_sphere_merge_contains_both() {
        let a = BoundingSphere::new(Vec3::zeros(), 1.0);
        let b = BoundingSphere::new(Vec3::new(4.0, 0.0, 0.0), 1.0);
        let m = a.merge(&b);
        assert_relative_eq!(m.radius, 3.0, epsilon = 1e-5);
        assert_relative_eq!(m.center, Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_sphere_transform_scales_radius() {
        let s = BoundingSphere::new(Vec3::zeros(), 1.0);
        let m = Mat4::new_nonuniform_scaling(&Vec3::new(1.0, 3.0, 1.0));
        assert_relative_eq!(s.transform(&m).radius, 3.0, epsilon = 1e-5);
    }
}
