//! Math utilities and types
//!
//! Column-vector conventions throughout: a point `p` is taken to world space by
//! `model * p`, and a child's total transform is `parent_total * local`.

use nalgebra::{Matrix4, Point3, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Math utility functions
pub mod utils {
    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * std::f32::consts::PI / 180.0
    }
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Right-handed perspective projection mapping depth to [-1, 1]
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed orthographic projection of a `width` x `height` volume
    fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Transform a point, including the perspective divide
    fn transform_point3(&self, point: &Vec3) -> Vec3;

    /// Transform a direction (ignores translation)
    fn transform_vector3(&self, vector: &Vec3) -> Vec3;

    /// Largest axis scale of the upper 3x3 block
    fn max_scale(&self) -> f32;

    /// Inverse, or identity when the matrix is singular
    fn inverse_or_identity(&self) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_perspective(aspect, fov_y, near, far)
    }

    fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Mat4 {
        let half_w = width * 0.5;
        let half_h = height * 0.5;
        Mat4::new_orthographic(-half_w, half_w, -half_h, half_h, near, far)
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
    }

    fn transform_point3(&self, point: &Vec3) -> Vec3 {
        self.transform_point(&Point3::from(*point)).coords
    }

    fn transform_vector3(&self, vector: &Vec3) -> Vec3 {
        self.transform_vector(vector)
    }

    fn max_scale(&self) -> f32 {
        let sx = Vec3::new(self.m11, self.m21, self.m31).magnitude();
        let sy = Vec3::new(self.m12, self.m22, self.m32).magnitude();
        let sz = Vec3::new(self.m13, self.m23, self.m33).magnitude();
        sx.max(sy).max(sz)
    }

    fn inverse_or_identity(&self) -> Mat4 {
        self.try_inverse().unwrap_or_else(Mat4::identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_column_vector_composition_scales_before_translating() {
        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)) * Mat4::new_scaling(2.0);
        let p = m.transform_point3(&Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Vec3::new(3.0, 2.0, 3.0), epsilon = 1e-5);
    }

    #[test]
    fn test_max_scale() {
        let m = Mat4::new_nonuniform_scaling(&Vec3::new(1.0, 4.0, 2.0));
        assert_relative_eq!(m.max_scale(), 4.0);
    }

    #[test]
    fn test_look_at_maps_target_to_negative_z() {
        let view = Mat4::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), Vec3::y());
        let p = view.transform_point3(&Vec3::zeros());
        assert_relative_eq!(p, Vec3::new(0.0, 0.0, -5.0), epsilon = 1e-5);
    }

    #[test]
    fn test_singular_inverse_falls_back_to_identity() {
        assert_eq!(Mat4::zeros().inverse_or_identity(), Mat4::identity());
        assert_relative_eq!(utils::deg_to_rad(180.0), std::f32::consts::PI);
    }
}
