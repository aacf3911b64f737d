//! Sorting groups
//!
//! A sorting group periodically reorders its children by distance from the
//! camera so transparent geometry blends back-to-front. The resulting child
//! order is: untouched children, opaque (front-to-back), transparent
//! (back-to-front).

use std::cmp::Ordering;
use std::time::Duration;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::config::SortingConfig;
use crate::foundation::math::Vec3;
use crate::foundation::time::IntervalTimer;
use crate::geometry::{BoundingBox, BoundingSphere};
use crate::render::RenderType;

/// Both lists must be longer than this before they are sorted in parallel
pub const PARALLEL_SORT_THRESHOLD: usize = 50;

/// Distance metric used to order children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortingMethod {
    /// Distance to the center of the world bounding box
    BoundingBoxCenter,
    /// Distance to the nearest corner of the world bounding box
    #[default]
    BoundingBoxCorners,
    /// Distance to the surface of the world bounding sphere
    BoundingSphereSurface,
}

impl SortingMethod {
    /// Distance from `camera` to a child with the given world bounds
    ///
    /// Children without bounds sort as if they sat at the camera.
    pub fn distance(self, camera: Vec3, bounds: &BoundingBox, sphere: &BoundingSphere) -> f32 {
        match self {
            SortingMethod::BoundingBoxCenter => {
                if bounds.is_empty() {
                    return 0.0;
                }
                (bounds.center() - camera).norm()
            }
            SortingMethod::BoundingBoxCorners => {
                if bounds.is_empty() {
                    return 0.0;
                }
                bounds
                    .corners()
                    .iter()
                    .map(|c| (c - camera).norm())
                    .fold(f32::MAX, f32::min)
            }
            SortingMethod::BoundingSphereSurface => {
                if sphere.is_empty() {
                    return 0.0;
                }
                (sphere.center - camera).norm() - sphere.radius
            }
        }
    }
}

/// One child as seen by the sorter
#[derive(Debug, Clone, Copy)]
pub struct SortItem<T> {
    /// Child handle
    pub id: T,
    /// Pass the child renders in
    pub render_type: RenderType,
    /// Value of the sorting metric
    pub distance: f32,
}

fn back_to_front<T>(items: &mut [SortItem<T>]) {
    items.sort_by(|a, b| b.distance.partial_cmp(&a.distance).unwrap_or(Ordering::Equal));
}

fn front_to_back<T>(items: &mut [SortItem<T>]) {
    items.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
}

/// Reorder children; every sort is stable
pub fn sort_children<T: Copy + Send>(items: Vec<SortItem<T>>, sort_transparent_only: bool) -> Vec<T> {
    let total = items.len();
    let mut others = Vec::new();
    let mut opaque = Vec::new();
    let mut transparent = Vec::new();
    for item in items {
        match item.render_type {
            RenderType::Transparent => transparent.push(item),
            RenderType::Opaque if !sort_transparent_only => opaque.push(item),
            _ => others.push(item),
        }
    }

    if opaque.len() > PARALLEL_SORT_THRESHOLD && transparent.len() > PARALLEL_SORT_THRESHOLD {
        trace!(
            "Sorting {} opaque and {} transparent children in parallel",
            opaque.len(),
            transparent.len()
        );
        rayon::join(|| front_to_back(&mut opaque), || back_to_front(&mut transparent));
    } else {
        front_to_back(&mut opaque);
        back_to_front(&mut transparent);
    }

    let mut order = Vec::with_capacity(total);
    order.extend(others.iter().map(|i| i.id));
    order.extend(opaque.iter().map(|i| i.id));
    order.extend(transparent.iter().map(|i| i.id));
    order
}

/// Per-node state of a sorting group
#[derive(Debug, Clone)]
pub struct SortingGroupState {
    timer: IntervalTimer,
    /// Distance metric
    pub method: SortingMethod,
    /// Leave opaque children in place
    pub sort_transparent_only: bool,
}

impl SortingGroupState {
    /// State from the configured defaults
    pub fn new(config: &SortingConfig) -> Self {
        Self {
            timer: IntervalTimer::new(Duration::from_millis(config.interval_ms)),
            method: config.method,
            sort_transparent_only: config.sort_transparent_only,
        }
    }

    /// Time between two sorts
    pub fn interval(&self) -> Duration {
        self.timer.interval()
    }

    /// Change the time between two sorts
    pub fn set_interval(&mut self, interval: Duration) {
        self.timer.set_interval(interval);
    }

    /// Sort on the next update regardless of the interval
    pub fn request_sort(&mut self) {
        self.timer.expire();
    }

    /// True (once per interval) when the group should sort now
    pub fn should_sort(&mut self) -> bool {
        self.timer.tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn item(id: usize, render_type: RenderType, distance: f32) -> SortItem<usize> {
        SortItem { id, render_type, distance }
    }

    #[test]
    fn test_metrics() {
        let camera = Vec3::zeros();
        let bounds = BoundingBox::new(Vec3::new(3.0, -1.0, -1.0), Vec3::new(5.0, 1.0, 1.0));
        let sphere = BoundingSphere::new(Vec3::new(4.0, 0.0, 0.0), 1.5);

        assert_relative_eq!(SortingMethod::BoundingBoxCenter.distance(camera, &bounds, &sphere), 4.0);
        assert_relative_eq!(
            SortingMethod::BoundingBoxCorners.distance(camera, &bounds, &sphere),
            (9.0f32 + 1.0 + 1.0).sqrt()
        );
        assert_relative_eq!(SortingMethod::BoundingSphereSurface.distance(camera, &bounds, &sphere), 2.5);
        assert_eq!(
            SortingMethod::BoundingBoxCenter.distance(camera, &BoundingBox::EMPTY, &sphere),
            0.0
        );
    }

    #[test]
    fn test_transparent_only_keeps_others_in_place() {
        let items = vec![
            item(0, RenderType::Transparent, 1.0),
            item(1, RenderType::Opaque, 9.0),
            item(2, RenderType::Transparent, 5.0),
            item(3, RenderType::None, 0.0),
            item(4, RenderType::Opaque, 2.0),
            item(5, RenderType::Transparent, 3.0),
        ];
        assert_eq!(sort_children(items, true), vec![1, 3, 4, 2, 5, 0]);
    }

    #[test]
    fn test_opaque_front_to_back_when_enabled() {
        let items = vec![
            item(0, RenderType::Opaque, 7.0),
            item(1, RenderType::Transparent, 1.0),
            item(2, RenderType::PostProc, 0.0),
            item(3, RenderType::Opaque, 2.0),
            item(4, RenderType::Transparent, 4.0),
        ];
        assert_eq!(sort_children(items, false), vec![2, 3, 0, 4, 1]);
    }

    #[test]
    fn test_equal_distances_are_stable() {
        let items = (0..5).map(|i| item(i, RenderType::Transparent, 1.0)).collect();
        assert_eq!(sort_children(items, true), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_large_lists_sort_in_parallel_with_same_result() {
        let n = PARALLEL_SORT_THRESHOLD + 10;
        let items: Vec<_> = (0..2 * n)
            .map(|i| {
                let render_type = if i % 2 == 0 { RenderType::Opaque } else { RenderType::Transparent };
                item(i, render_type, ((i * 37) % 101) as f32)
            })
            .collect();
        let lookup = items.clone();
        let order = sort_children(items, false);
        assert_eq!(order.len(), 2 * n);

        let (opaque, transparent) = order.split_at(n);
        assert!(opaque.windows(2).all(|w| lookup[w[0]].distance <= lookup[w[1]].distance));
        assert!(transparent.windows(2).all(|w| lookup[w[0]].distance >= lookup[w[1]].distance));
        assert!(opaque.iter().all(|&i| lookup[i].render_type == RenderType::Opaque));
    }

    #[test]
    fn test_first_update_always_sorts() {
        let mut state = SortingGroupState::new(&SortingConfig::default());
        assert_eq!(state.interval(), Duration::from_millis(500));
        assert!(state.should_sort());
        assert!(!state.should_sort());
        state.request_sort();
        assert!(state.should_sort());
    }
}
