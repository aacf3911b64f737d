//! Scene-level behaviour tests
//!
//! Unit tests live next to each module; these drive whole frames through a
//! [`Scene`](super::Scene) with a recording device.


use crate::foundation::math::Vec3;
use crate::render::{Camera, RenderContext, Viewport};

use super::Scene;

/// Context with a camera on +Z looking at the origin
fn looking_down_z(scene: &Scene, distance: f32, width: f32, height: f32) -> RenderContext {
    crate::foundation::logging::init_for_tests();
    let mut camera = Camera::perspective(Vec3::new(0.0, 0.0, distance), 45.0, 1.0, 0.1, 500.0);
    camera.look_at(Vec3::zeros(), Vec3::y());
    scene.create_context(camera, Viewport::new(width, height))
}
