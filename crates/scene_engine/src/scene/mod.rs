//! # Scene Graph
//!
//! Retained-mode node tree on top of the render cores.
//!
//! ## Frame Flow
//!
//! ```text
//! mutations --> Scene::update --> Scene::render
//!                    |
//!                    +--> Scene::hit_test
//! ```
//!
//! Mutations keep transforms and transformed bounds exact at once. Group
//! aggregate bounds, octrees, sorting group order and screen-spaced views are
//! brought up to date by [`Scene::update`].

pub mod assets;
pub mod graph;
pub mod hit_test;
pub mod instancing;
pub mod node;
mod render_pass;
pub mod screen_spaced;
pub mod sorting;
mod update;

#[cfg(test)]
mod tests;

pub use assets::SceneAssets;
pub use graph::{Scene, SceneError};
pub use hit_test::{HitTag, HitTestMode, HitTestResult};
pub use instancing::InstanceSet;
pub use node::{NodeFlags, NodeId, NodeKind, PostEffectKind, SceneNode, ScreenSpacedKind};
pub use screen_spaced::{
    compute_view, GizmoPart, ScreenSpacedPlacement, ScreenSpacedProjection, ScreenSpacedSettings, ScreenSpacedState,
};
pub use sorting::{SortingGroupState, SortingMethod};
