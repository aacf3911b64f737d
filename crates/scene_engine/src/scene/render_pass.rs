//! Frame rendering
//!
//! One traversal buckets the visible nodes by [`RenderType`] and fills the
//! per-frame lists post effects read. The buckets are then drawn in frame
//! order: opaque sorted by [`crate::render::OrderKey`], transparent in
//! traversal order, post effects, and finally every screen-spaced subtree
//! inside its own rectangle.

use log::trace;

use crate::render::{DeviceContext, EffectAttributes, RenderContext, RenderType};

use super::graph::Scene;
use super::node::NodeId;

#[derive(Debug, Default)]
struct FrameBuckets {
    opaque: Vec<NodeId>,
    transparent: Vec<NodeId>,
    post_effects: Vec<NodeId>,
    screen_spaced: Vec<NodeId>,
}

impl Scene {
    /// Draw the scene
    ///
    /// Call [`Scene::update`] first and [`RenderContext::begin_frame`] before
    /// both. Textures released by detached cores are handed back to the
    /// device before anything is drawn.
    pub fn render(&mut self, ctx: &mut RenderContext, device: &mut dyn DeviceContext) {
        self.host.flush_releases(device);

        let mut buckets = FrameBuckets::default();
        self.collect(self.root, ctx, &mut buckets, true);
        trace!(
            "Frame buckets: {} opaque, {} transparent, {} post, {} screen-spaced",
            buckets.opaque.len(),
            buckets.transparent.len(),
            buckets.post_effects.len(),
            buckets.screen_spaced.len()
        );

        self.draw_geometry_buckets(ctx, device, &mut buckets);
        for id in &buckets.post_effects {
            if self.render_node(*id, ctx, device) {
                ctx.stats.post_effects_run += 1;
            }
        }
        for id in &buckets.screen_spaced {
            self.render_screen_spaced(*id, ctx, device);
        }
    }

    /// Bucket `id` and its subtree
    ///
    /// In world space (`world == true`) leaf nodes outside the frustum are
    /// culled and flagged nodes are put on post-effect lists. Groups are always
    /// descended: a screen-spaced descendant adds nothing to their bounds.
    /// Screen-spaced subtrees are collected with `world == false`.
    fn collect(&self, id: NodeId, ctx: &mut RenderContext, buckets: &mut FrameBuckets, world: bool) {
        let Some(node) = self.nodes.get(id) else { return };
        if !node.is_visible() {
            return;
        }
        if world && !node.kind.is_group() && !node.test_view_frustum(ctx) {
            ctx.stats.nodes_culled += 1;
            return;
        }

        match node.render_type() {
            RenderType::ScreenSpaced => {
                if world {
                    buckets.screen_spaced.push(id);
                }
                return;
            }
            RenderType::PostProc => {
                if world {
                    buckets.post_effects.push(id);
                }
            }
            render_type @ (RenderType::Opaque | RenderType::Transparent) => {
                if node.core.can_render(ctx) {
                    if world {
                        for attributes in &node.post_effects {
                            let effect = attributes.name().to_string();
                            if let Some(item) = node.core.draw_item(id, &node.total_transform, attributes.clone()) {
                                ctx.add_post_effect_node(&effect, item);
                            }
                        }
                    }
                    if render_type == RenderType::Opaque {
                        if world {
                            if let Some(item) =
                                node.core.draw_item(id, &node.total_transform, EffectAttributes::default())
                            {
                                ctx.push_opaque_draw(item);
                            }
                        }
                        buckets.opaque.push(id);
                    } else {
                        buckets.transparent.push(id);
                    }
                }
            }
            RenderType::None => {}
        }

        let visible_children = match node.octree.as_ref() {
            Some(octree) if world && ctx.enable_view_frustum_check => octree.query_frustum(ctx.frustum()),
            _ => None,
        };
        for child in &node.children {
            if let Some(candidates) = &visible_children {
                let exempt = self
                    .nodes
                    .get(*child)
                    .is_some_and(|c| c.kind.is_group() || c.bounds_with_transform.is_empty());
                if !exempt && !candidates.contains(child) {
                    ctx.stats.nodes_culled += 1;
                    continue;
                }
            }
            self.collect(*child, ctx, buckets, world);
        }
    }

    fn draw_geometry_buckets(
        &mut self,
        ctx: &mut RenderContext,
        device: &mut dyn DeviceContext,
        buckets: &mut FrameBuckets,
    ) {
        let nodes = &self.nodes;
        buckets
            .opaque
            .sort_by_key(|id| nodes.get(*id).map(|n| n.order_key).unwrap_or_default());
        for id in buckets.opaque.iter().chain(&buckets.transparent) {
            self.render_node(*id, ctx, device);
        }
    }

    fn render_node(&mut self, id: NodeId, ctx: &mut RenderContext, device: &mut dyn DeviceContext) -> bool {
        let Some(node) = self.nodes.get_mut(id) else { return false };
        if !node.core.can_render(ctx) {
            return false;
        }
        let world = node.total_transform;
        node.core.render(ctx, device, &world);
        ctx.stats.nodes_rendered += 1;
        true
    }

    /// Draw a screen-spaced subtree with its private camera, then restore the
    /// main camera and viewport
    fn render_screen_spaced(&mut self, id: NodeId, ctx: &mut RenderContext, device: &mut dyn DeviceContext) {
        if !self.render_node(id, ctx, device) {
            return;
        }
        let mut buckets = FrameBuckets::default();
        if let Some(node) = self.nodes.get(id) {
            for child in &node.children {
                self.collect(*child, ctx, &mut buckets, false);
            }
        }
        self.draw_geometry_buckets(ctx, device, &mut buckets);
        ctx.pop_view_override();
        device.set_viewport(ctx.viewport());
    }
}
