//! # 3D Camera
//!
//! Camera abstraction used by the render context, the frustum check and every
//! hit test that starts from a screen position.
//!
//! ## Design Principles
//! - **Device-agnostic**: no device types in camera math
//! - **Immutable operation**: matrix getters never modify camera state
//! - **Pixel aware**: screen helpers take pixel coordinates with a top-left origin

use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec2, Vec3, Vec4};
use crate::geometry::Ray;

/// Size of the area being rendered into, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge in pixels
    pub x: f32,
    /// Top edge in pixels
    pub y: f32,
    /// Width in pixels
    pub width: f32,
    /// Height in pixels
    pub height: f32,
}

impl Viewport {
    /// Full viewport of the given size
    pub fn new(width: f32, height: f32) -> Self {
        Self { x: 0.0, y: 0.0, width, height }
    }

    /// Sub-rectangle of a surface
    pub fn with_offset(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Width over height, 1 when the height is zero
    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 { self.width / self.height } else { 1.0 }
    }

    /// Check if a pixel position lies inside the rectangle
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.x && point.x <= self.x + self.width &&
        point.y >= self.y && point.y <= self.y + self.height
    }

    /// Pixel position to normalized device coordinates (y up)
    pub fn to_ndc(&self, point: Vec2) -> Vec2 {
        Vec2::new(
            (point.x - self.x) / self.width * 2.0 - 1.0,
            1.0 - (point.y - self.y) / self.height * 2.0,
        )
    }

    /// Normalized device coordinates to a pixel position
    pub fn from_ndc(&self, ndc: Vec2) -> Vec2 {
        Vec2::new(
            self.x + (ndc.x + 1.0) * 0.5 * self.width,
            self.y + (1.0 - ndc.y) * 0.5 * self.height,
        )
    }

    /// Integer size of the viewport, at least 1x1
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.width.max(1.0) as u32, self.height.max(1.0) as u32)
    }
}

/// How the camera projects view space
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective with the camera's field of view
    Perspective,
    /// Parallel projection of a view volume `width` units wide
    Orthographic {
        /// Width of the view volume in world units
        width: f32,
    },
}

/// 3D camera for perspective and orthographic projections
///
/// # Coordinate System
/// Right-handed, Y-up view space looking down -Z. Clip depth is in [-1, 1].
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation (typically [0, 1, 0])
    pub up: Vec3,

    /// Field of view angle in radians (for perspective projection)
    pub fov: f32,

    /// Aspect ratio (width / height) for projection calculations
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,

    /// Projection kind
    pub projection: Projection,
}

impl Camera {
    /// Create a new perspective camera with standard Y-up orientation
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Field of view angle in degrees (converted to radians internally)
    /// * `aspect` - Aspect ratio (width / height) of the viewport
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    ///
    /// # Example
    /// ```rust
    /// use scene_engine::foundation::math::Vec3;
    /// use scene_engine::render::Camera;
    ///
    /// let camera = Camera::perspective(Vec3::new(0.0, 2.0, 5.0), 60.0, 16.0 / 9.0, 0.1, 100.0);
    /// assert!(camera.get_view_projection_matrix().try_inverse().is_some());
    /// ```
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
            projection: Projection::Perspective,
        }
    }

    /// Create an orthographic camera whose view volume is `width` units wide
    pub fn orthographic(position: Vec3, width: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Orthographic { width },
            ..Self::perspective(position, 45.0, aspect, near, far)
        }
    }

    /// Update camera position in world space
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        log::trace!("Camera position updated to: {:?}", position);
    }

    /// Update camera target (look-at point)
    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        log::trace!("Camera target updated to: {:?}", target);
    }

    /// Configure camera to look at a specific point with custom up vector
    ///
    /// The up vector doesn't need to be perpendicular to the view direction;
    /// the view matrix orthonormalizes it.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
        log::trace!("Camera look_at updated - target: {:?}, up: {:?}", target, up);
    }

    /// Update camera aspect ratio for viewport changes
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > 0.01 {
            log::debug!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.aspect = aspect;
    }

    /// Normalized direction from the camera position to its target
    pub fn look_direction(&self) -> Vec3 {
        (self.target - self.position)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| Vec3::new(0.0, 0.0, -1.0))
    }

    /// Generate view matrix for world-to-camera space transformation
    pub fn get_view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.target, self.up)
    }

    /// Generate the projection matrix for the current projection kind
    pub fn get_projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective => Mat4::perspective(self.fov, self.aspect, self.near, self.far),
            Projection::Orthographic { width } => {
                Mat4::orthographic(width, width / self.aspect.max(f32::EPSILON), self.near, self.far)
            }
        }
    }

    /// Generate combined view-projection matrix (`P × V`)
    pub fn get_view_projection_matrix(&self) -> Mat4 {
        self.get_projection_matrix() * self.get_view_matrix()
    }

    /// Convert normalized device coordinates to a world-space ray
    ///
    /// # Arguments
    /// * `screen_x` - NDC X coordinate (-1 to 1, left to right)
    /// * `screen_y` - NDC Y coordinate (-1 to 1, bottom to top)
    ///
    /// # Mathematical Process
    /// 1. Unproject the NDC point on the near and far planes
    /// 2. Perspective divide both points
    /// 3. Ray from the near point towards the far point
    ///
    /// A perspective ray starts at the camera position; an orthographic ray
    /// starts on the near plane under the cursor.
    pub fn screen_to_world_ray(&self, screen_x: f32, screen_y: f32) -> Ray {
        let inv_view_proj = self.get_view_projection_matrix().inverse_or_identity();

        let unproject = |z: f32| {
            let h = inv_view_proj * Vec4::new(screen_x, screen_y, z, 1.0);
            Vec3::new(h.x / h.w, h.y / h.w, h.z / h.w)
        };
        let world_near = unproject(-1.0);
        let world_far = unproject(1.0);

        let origin = match self.projection {
            Projection::Perspective => self.position,
            Projection::Orthographic { .. } => world_near,
        };
        Ray::new(origin, world_far - world_near)
    }

    /// World-space ray through a pixel of `viewport`
    pub fn pixel_to_ray(&self, pixel: Vec2, viewport: &Viewport) -> Ray {
        let ndc = viewport.to_ndc(pixel);
        self.screen_to_world_ray(ndc.x, ndc.y)
    }

    /// Pixel position of a world point; `None` when behind the camera
    pub fn project_to_screen(&self, world: Vec3, viewport: &Viewport) -> Option<Vec2> {
        let clip = self.get_view_projection_matrix() * Vec4::new(world.x, world.y, world.z, 1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        Some(viewport.from_ndc(Vec2::new(clip.x / clip.w, clip.y / clip.w)))
    }
}

impl Default for Camera {
    /// Perspective camera at (0, 3, 3) looking at the origin with a 45° FOV
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 3.0, 3.0),
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
            projection: Projection::Perspective,
        }
    }
}
