//! Per-frame scene update
//!
//! Runs before render and hit test: brings aggregate bounds, octrees,
//! sorting group order and screen-spaced views in line with the mutations
//! made since the last frame.

use log::trace;

use crate::geometry::{BoundingBox, BoundingSphere};
use crate::render::RenderContext;
use crate::spatial::OctreeItem;

use super::graph::Scene;
use super::node::{NodeFlags, NodeId, NodeKind};
use super::sorting::{sort_children, SortItem};

impl Scene {
    /// Prepare the scene for rendering with `ctx`'s camera
    pub fn update(&mut self, ctx: &RenderContext) {
        self.update_screen_spaced_views(ctx);
        self.update_bounds();
        self.update_octrees();
        self.update_sorting(ctx);
    }

    /// Recompute aggregate bounds of dirty groups, children first
    fn update_bounds(&mut self) {
        if !self.nodes[self.root].flags.contains(NodeFlags::BOUNDS_DIRTY) {
            return;
        }
        let mut dirty: Vec<NodeId> = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else { continue };
            if node.flags.contains(NodeFlags::BOUNDS_DIRTY) {
                dirty.push(id);
                stack.extend(node.children.iter().copied());
            }
        }

        for id in dirty.into_iter().rev() {
            let Some(node) = self.nodes.get(id) else { continue };
            if !node.kind.is_group() || matches!(node.kind, NodeKind::ScreenSpaced(_)) {
                self.nodes[id].set_flag(NodeFlags::BOUNDS_DIRTY, false);
                continue;
            }
            let (bounds, sphere) = node
                .children
                .iter()
                .filter_map(|c| self.nodes.get(*c))
                .fold((BoundingBox::EMPTY, BoundingSphere::EMPTY), |(b, s), child| {
                    (
                        b.merge(&child.bounds.transform(&child.local_transform)),
                        s.merge(&child.bounding_sphere.transform(&child.local_transform)),
                    )
                });

            let node = &mut self.nodes[id];
            node.set_flag(NodeFlags::BOUNDS_DIRTY, false);
            if node.bounds == bounds && node.bounding_sphere == sphere {
                continue;
            }
            node.bounds = bounds;
            node.bounding_sphere = sphere;
            node.update_bounds_with_transform();
            let (parent, world) = (node.parent, node.bounds_with_transform);
            self.queue_octree_update(parent, id, world);
        }
    }

    /// Apply pending octree changes; rebuild trees that cannot absorb them
    fn update_octrees(&mut self) {
        let enabled = self.host.config.octree.enabled;
        let ids: Vec<NodeId> = self.nodes.keys().collect();
        for id in ids {
            let node = &self.nodes[id];
            if let (Some(instances), Some(geometry)) = (&node.instances, node.core.geometry()) {
                if instances.octree().needs_update() {
                    let mesh_bounds = geometry.bounds();
                    if let Some(instances) = self.nodes[id].instances.as_mut() {
                        instances.update_octree(&mesh_bounds);
                    }
                }
            }

            let node = &self.nodes[id];
            let Some(octree) = node.octree.as_ref() else { continue };
            if !enabled || !octree.needs_update() {
                continue;
            }
            let items: Vec<OctreeItem<NodeId>> = node
                .children
                .iter()
                .filter_map(|c| self.nodes.get(*c))
                .filter(|c| !c.bounds_with_transform.is_empty())
                .map(|c| OctreeItem { id: c.id, bounds: c.bounds_with_transform })
                .collect();
            let Some(octree) = self.nodes[id].octree.as_mut() else { continue };
            if octree.rebuild_requested() || !octree.process_pending_items() {
                trace!("Rebuilding octree of {:?} over {} children", id, items.len());
                octree.rebuild_tree(items);
            }
        }
    }

    /// Reorder the children of sorting groups whose interval elapsed
    fn update_sorting(&mut self, ctx: &RenderContext) {
        let camera = ctx.camera_position();
        let ids: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.sorting.is_some())
            .map(|(id, _)| id)
            .collect();
        for id in ids {
            let Some(sorting) = self.nodes[id].sorting.as_mut() else { continue };
            if !sorting.should_sort() {
                continue;
            }
            let (method, transparent_only) = (sorting.method, sorting.sort_transparent_only);
            let items: Vec<SortItem<NodeId>> = self.nodes[id]
                .children
                .iter()
                .filter_map(|c| self.nodes.get(*c))
                .map(|c| SortItem {
                    id: c.id,
                    render_type: c.render_type(),
                    distance: method.distance(camera, &c.bounds_with_transform, &c.bounding_sphere_with_transform),
                })
                .collect();
            trace!("Sorting {} children of {:?} by {:?}", items.len(), id, method);
            self.nodes[id].children = sort_children(items, transparent_only);
        }
    }
}
