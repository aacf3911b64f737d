//! GPU vertex layouts and the geometry buffer manager
//!
//! [`GeometryBufferManager`] turns CPU geometry into packed vertex/index bytes
//! once per [`GeometryId`] and hands out shared proxies. Attaching a second
//! node with the same geometry, or re-attaching after a detach while another
//! owner is alive, returns the existing proxy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use log::trace;

use crate::geometry::{Geometry, GeometryData, GeometryId};

/// Mesh vertex layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    /// Position
    pub position: [f32; 3],
    /// Normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub texcoord: [f32; 2],
}

/// Line vertex layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    /// Position
    pub position: [f32; 3],
    /// Color
    pub color: [f32; 4],
}

/// Point vertex layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointVertex {
    /// Position
    pub position: [f32; 3],
    /// Color
    pub color: [f32; 4],
}

/// Primitive topology of a buffer set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Indexed triangles
    TriangleList,
    /// Indexed segments
    LineList,
    /// Non-indexed points
    PointList,
}

static NEXT_PROXY_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one buffer allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferProxyId(pub u64);

/// Packed vertex and index data for one geometry
///
/// The device uploads the bytes the first time it sees a proxy id and keeps
/// the native buffers until the proxy is dropped by every owner.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryBufferProxy {
    id: BufferProxyId,
    geometry: GeometryId,
    topology: Topology,
    vertex_data: Vec<u8>,
    vertex_stride: u32,
    vertex_count: u32,
    index_data: Vec<u8>,
    index_count: u32,
}

impl GeometryBufferProxy {
    /// Pack a geometry into vertex and index bytes
    pub fn from_geometry(geometry: &Geometry) -> Self {
        const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
        let (topology, vertex_data, vertex_stride, indices): (_, Vec<u8>, usize, &[u32]) =
            match geometry.data() {
                GeometryData::Mesh(mesh) => {
                    let vertices: Vec<MeshVertex> = mesh
                        .positions
                        .iter()
                        .enumerate()
                        .map(|(i, p)| MeshVertex {
                            position: (*p).into(),
                            normal: mesh.normals.get(i).map_or([0.0, 1.0, 0.0], |n| (*n).into()),
                            texcoord: mesh.texcoords.get(i).map_or([0.0, 0.0], |t| (*t).into()),
                        })
                        .collect();
                    (
                        Topology::TriangleList,
                        bytemuck::cast_slice(&vertices).to_vec(),
                        std::mem::size_of::<MeshVertex>(),
                        mesh.indices.as_slice(),
                    )
                }
                GeometryData::Line(line) => {
                    let vertices: Vec<LineVertex> = line
                        .positions
                        .iter()
                        .enumerate()
                        .map(|(i, p)| LineVertex {
                            position: (*p).into(),
                            color: line.colors.get(i).map_or(WHITE, |c| (*c).into()),
                        })
                        .collect();
                    (
                        Topology::LineList,
                        bytemuck::cast_slice(&vertices).to_vec(),
                        std::mem::size_of::<LineVertex>(),
                        line.indices.as_slice(),
                    )
                }
                GeometryData::Point(points) => {
                    let vertices: Vec<PointVertex> = points
                        .positions
                        .iter()
                        .enumerate()
                        .map(|(i, p)| PointVertex {
                            position: (*p).into(),
                            color: points.colors.get(i).map_or(WHITE, |c| (*c).into()),
                        })
                        .collect();
                    (
                        Topology::PointList,
                        bytemuck::cast_slice(&vertices).to_vec(),
                        std::mem::size_of::<PointVertex>(),
                        &[][..],
                    )
                }
            };

        Self {
            id: BufferProxyId(NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed)),
            geometry: geometry.id(),
            topology,
            vertex_data,
            vertex_stride: vertex_stride as u32,
            vertex_count: geometry.vertex_count() as u32,
            index_data: bytemuck::cast_slice(indices).to_vec(),
            index_count: indices.len() as u32,
        }
    }

    /// Allocation identity
    pub fn id(&self) -> BufferProxyId {
        self.id
    }

    /// Geometry the buffers were built from
    pub fn geometry_id(&self) -> GeometryId {
        self.geometry
    }

    /// Primitive topology
    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Packed vertex bytes
    pub fn vertex_data(&self) -> &[u8] {
        &self.vertex_data
    }

    /// Bytes per vertex
    pub fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Packed `u32` index bytes
    pub fn index_data(&self) -> &[u8] {
        &self.index_data
    }

    /// Number of indices
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// True when the buffers hold the same content, ignoring allocation identity
    pub fn same_content(&self, other: &Self) -> bool {
        self.geometry == other.geometry
            && self.topology == other.topology
            && self.vertex_stride == other.vertex_stride
            && self.vertex_data == other.vertex_data
            && self.index_data == other.index_data
    }
}

#[derive(Debug)]
struct BufferEntry {
    proxy: Arc<GeometryBufferProxy>,
    refs: usize,
}

/// Shares buffer proxies between every owner of the same geometry
#[derive(Debug, Default)]
pub struct GeometryBufferManager {
    entries: HashMap<GeometryId, BufferEntry>,
}

impl GeometryBufferManager {
    /// Empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Proxy for a geometry, building it on first request
    pub fn acquire(&mut self, geometry: &Geometry) -> Arc<GeometryBufferProxy> {
        let entry = self.entries.entry(geometry.id()).or_insert_with(|| {
            trace!("Building buffers for geometry {:?}", geometry.id());
            BufferEntry {
                proxy: Arc::new(GeometryBufferProxy::from_geometry(geometry)),
                refs: 0,
            }
        });
        entry.refs += 1;
        Arc::clone(&entry.proxy)
    }

    /// Drop one owner; returns true when the buffers were freed
    pub fn release(&mut self, geometry: GeometryId) -> bool {
        let Some(entry) = self.entries.get_mut(&geometry) else {
            return false;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            self.entries.remove(&geometry);
            trace!("Released buffers for geometry {:?}", geometry);
            return true;
        }
        false
    }

    /// Owners of a geometry's buffers
    pub fn ref_count(&self, geometry: GeometryId) -> usize {
        self.entries.get(&geometry).map_or(0, |e| e.refs)
    }

    /// Number of live buffer sets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no buffers are live
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::geometry::{LineData, MeshData};

    fn triangle() -> Geometry {
        Geometry::mesh(MeshData {
            positions: vec![Vec3::zeros(), Vec3::x(), Vec3::y()],
            indices: vec![0, 1, 2],
            ..Default::default()
        })
    }

    #[test]
    fn test_mesh_packing() {
        let proxy = GeometryBufferProxy::from_geometry(&triangle());
        assert_eq!(proxy.topology(), Topology::TriangleList);
        assert_eq!(proxy.vertex_stride() as usize, std::mem::size_of::<MeshVertex>());
        assert_eq!(proxy.vertex_data().len(), 3 * std::mem::size_of::<MeshVertex>());
        assert_eq!(proxy.index_count(), 3);
        let stride = std::mem::size_of::<MeshVertex>();
        let v0: MeshVertex = bytemuck::pod_read_unaligned(&proxy.vertex_data()[..stride]);
        let v1: MeshVertex = bytemuck::pod_read_unaligned(&proxy.vertex_data()[stride..stride * 2]);
        assert_eq!(v1.position, [1.0, 0.0, 0.0]);
        assert_eq!(v0.normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_line_packing_defaults_to_white() {
        let g = Geometry::line(LineData::from_segments(&[(Vec3::zeros(), Vec3::x())]));
        let proxy = GeometryBufferProxy::from_geometry(&g);
        let stride = std::mem::size_of::<LineVertex>();
        assert_eq!(proxy.vertex_data().len(), 2 * stride);
        let v0: LineVertex = bytemuck::pod_read_unaligned(&proxy.vertex_data()[..stride]);
        assert_eq!(v0.color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(proxy.topology(), Topology::LineList);
    }

    #[test]
    fn test_shared_geometry_shares_proxy() {
        let mut manager = GeometryBufferManager::new();
        let g = triangle();
        let a = manager.acquire(&g);
        let b = manager.acquire(&g);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.ref_count(g.id()), 2);
        assert!(!manager.release(g.id()));
        assert!(manager.release(g.id()));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_reacquire_after_free_rebuilds_identical_content() {
        let mut manager = GeometryBufferManager::new();
        let g = triangle();
        let first = manager.acquire(&g);
        manager.release(g.id());
        let second = manager.acquire(&g);
        assert_ne!(first.id(), second.id());
        assert!(first.same_content(&second));
    }
}
