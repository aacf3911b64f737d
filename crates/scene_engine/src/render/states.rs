//! Pipeline state descriptions and reference-counted state pools
//!
//! Identical descriptions share one [`StateId`]; the device is expected to key
//! its native state objects by that id. A state is forgotten when its last
//! owner releases it.

use std::collections::HashMap;
use std::hash::Hash;

/// Which pool a [`StateId`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// Blend state
    Blend,
    /// Rasterizer state
    Raster,
    /// Depth-stencil state
    DepthStencil,
    /// Sampler state
    Sampler,
}

/// Handle to a pooled state description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId {
    /// Owning pool
    pub kind: StateKind,
    /// Index inside the pool
    pub index: u32,
}

/// Color blending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// No blending
    #[default]
    Opaque,
    /// Source-over with source alpha
    AlphaBlend,
    /// Source added to destination
    Additive,
    /// Color writes disabled
    NoColorWrite,
}

/// Blend state description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendStateDesc {
    /// Blend mode
    pub mode: BlendMode,
}

/// Face culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Draw both faces
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    #[default]
    Back,
}

/// Polygon fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    /// Filled triangles
    #[default]
    Solid,
    /// Edges only
    Wireframe,
}

/// Rasterizer state description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RasterStateDesc {
    /// Face culling
    pub cull: CullMode,
    /// Polygon fill
    pub fill: FillMode,
    /// Constant depth bias
    pub depth_bias: i32,
    /// Multisample rasterization
    pub multisample: bool,
}

/// Comparison used by depth and stencil tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunc {
    /// Never passes
    Never,
    /// Passes when less
    #[default]
    Less,
    /// Passes when less or equal
    LessEqual,
    /// Passes when equal
    Equal,
    /// Passes when not equal
    NotEqual,
    /// Passes when greater
    Greater,
    /// Always passes
    Always,
}

/// What happens to the stencil value when the test passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    /// Keep the stored value
    #[default]
    Keep,
    /// Store the reference value
    Replace,
    /// Set to zero
    Zero,
}

/// Depth-stencil state description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilDesc {
    /// Enable depth test
    pub depth_test: bool,
    /// Enable depth writes
    pub depth_write: bool,
    /// Depth comparison
    pub depth_func: CompareFunc,
    /// Enable stencil test
    pub stencil_test: bool,
    /// Stencil comparison against the reference
    pub stencil_func: CompareFunc,
    /// Operation on pass
    pub stencil_pass: StencilOp,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_func: CompareFunc::Less,
            stencil_test: false,
            stencil_func: CompareFunc::Always,
            stencil_pass: StencilOp::Keep,
        }
    }
}

impl DepthStencilDesc {
    /// No depth or stencil work at all (full-screen passes)
    pub const DISABLED: Self = Self {
        depth_test: false,
        depth_write: false,
        depth_func: CompareFunc::Always,
        stencil_test: false,
        stencil_func: CompareFunc::Always,
        stencil_pass: StencilOp::Keep,
    };

    /// Write the reference into stencil wherever geometry is drawn
    pub const STENCIL_WRITE: Self = Self {
        depth_test: false,
        depth_write: false,
        depth_func: CompareFunc::Always,
        stencil_test: true,
        stencil_func: CompareFunc::Always,
        stencil_pass: StencilOp::Replace,
    };

    /// Draw only where stencil differs from the reference
    pub const STENCIL_OUTSIDE: Self = Self {
        depth_test: false,
        depth_write: false,
        depth_func: CompareFunc::Always,
        stencil_test: true,
        stencil_func: CompareFunc::NotEqual,
        stencil_pass: StencilOp::Keep,
    };

    /// Draw only where depth test fails (occluded geometry)
    pub const DEPTH_GREATER: Self = Self {
        depth_test: true,
        depth_write: false,
        depth_func: CompareFunc::Greater,
        stencil_test: false,
        stencil_func: CompareFunc::Always,
        stencil_pass: StencilOp::Keep,
    };
}

/// Texture filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    /// Nearest texel
    Point,
    /// Bilinear
    #[default]
    Linear,
}

/// Texture addressing outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Repeat
    Wrap,
    /// Clamp to edge
    #[default]
    Clamp,
}

/// Sampler state description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDesc {
    /// Filtering
    pub filter: Filter,
    /// Addressing
    pub address: AddressMode,
}

impl SamplerDesc {
    /// Linear clamp, used by every full-screen pass
    pub const LINEAR_CLAMP: Self = Self { filter: Filter::Linear, address: AddressMode::Clamp };
    /// Point clamp
    pub const POINT_CLAMP: Self = Self { filter: Filter::Point, address: AddressMode::Clamp };
}

#[derive(Debug, Clone)]
struct PoolEntry<D> {
    desc: D,
    refs: usize,
}

/// Reference-counted pool of state descriptions of one kind
#[derive(Debug, Clone)]
pub struct StatePool<D> {
    kind: StateKind,
    by_desc: HashMap<D, StateId>,
    entries: HashMap<StateId, PoolEntry<D>>,
    next_index: u32,
}

impl<D: Clone + Eq + Hash> StatePool<D> {
    /// Create an empty pool
    pub fn new(kind: StateKind) -> Self {
        Self {
            kind,
            by_desc: HashMap::new(),
            entries: HashMap::new(),
            next_index: 0,
        }
    }

    /// Register a description, sharing the id of an identical one
    pub fn register(&mut self, desc: D) -> StateId {
        if let Some(id) = self.by_desc.get(&desc) {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.refs += 1;
            }
            return *id;
        }
        let id = StateId { kind: self.kind, index: self.next_index };
        self.next_index += 1;
        self.by_desc.insert(desc.clone(), id);
        self.entries.insert(id, PoolEntry { desc, refs: 1 });
        id
    }

    /// Add an owner to an existing state
    pub fn retain(&mut self, id: StateId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.refs += 1;
        }
    }

    /// Drop one owner; returns true when the state was freed
    pub fn release(&mut self, id: StateId) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        entry.refs -= 1;
        if entry.refs > 0 {
            return false;
        }
        if let Some(entry) = self.entries.remove(&id) {
            self.by_desc.remove(&entry.desc);
        }
        true
    }

    /// Description behind an id
    pub fn get(&self, id: StateId) -> Option<&D> {
        self.entries.get(&id).map(|e| &e.desc)
    }

    /// Owners of a state, 0 when unknown
    pub fn ref_count(&self, id: StateId) -> usize {
        self.entries.get(&id).map_or(0, |e| e.refs)
    }

    /// Number of distinct live states
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no state is live
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One pool per state kind
#[derive(Debug, Clone)]
pub struct StatePools {
    /// Blend states
    pub blend: StatePool<BlendStateDesc>,
    /// Rasterizer states
    pub raster: StatePool<RasterStateDesc>,
    /// Depth-stencil states
    pub depth_stencil: StatePool<DepthStencilDesc>,
    /// Samplers
    pub sampler: StatePool<SamplerDesc>,
}

impl Default for StatePools {
    fn default() -> Self {
        Self {
            blend: StatePool::new(StateKind::Blend),
            raster: StatePool::new(StateKind::Raster),
            depth_stencil: StatePool::new(StateKind::DepthStencil),
            sampler: StatePool::new(StateKind::Sampler),
        }
    }
}

impl StatePools {
    /// Release a state in whichever pool owns it
    pub fn release(&mut self, id: StateId) -> bool {
        match id.kind {
            StateKind::Blend => self.blend.release(id),
            StateKind::Raster => self.raster.release(id),
            StateKind::DepthStencil => self.depth_stencil.release(id),
            StateKind::Sampler => self.sampler.release(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_descriptions_share_one_id() {
        let mut pool = StatePool::new(StateKind::Blend);
        let a = pool.register(BlendStateDesc { mode: BlendMode::AlphaBlend });
        let b = pool.register(BlendStateDesc { mode: BlendMode::AlphaBlend });
        let c = pool.register(BlendStateDesc { mode: BlendMode::Additive });
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.ref_count(a), 2);
    }

    #[test]
    fn test_state_freed_with_last_owner() {
        let mut pools = StatePools::default();
        let id = pools.sampler.register(SamplerDesc::LINEAR_CLAMP);
        pools.sampler.retain(id);
        assert!(!pools.release(id));
        assert!(pools.sampler.get(id).is_some());
        assert!(pools.release(id));
        assert!(pools.sampler.get(id).is_none());
        assert!(!pools.release(id));
        // re-registering after free gets a fresh id
        let again = pools.sampler.register(SamplerDesc::LINEAR_CLAMP);
        assert_ne!(again, id);
    }
}
