//! # Render Cores
//!
//! Every scene node owns exactly one [`RenderCore`]. The core holds the GPU
//! side of the node: technique, passes, buffers and offscreen targets. All of
//! it is acquired on attach and given back on detach.
//!
//! ## Lifecycle
//!
//! ```text
//! Detached --attach--> Attaching --ok--> Attached --detach--> Detaching --> Detached
//!                          |
//!                          +--error--> Detached
//! ```
//!
//! Attaching an attached core and detaching a detached core are no-ops.
//! Rendering is only legal while attached.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::config::RenderConfig;
use crate::foundation::math::Mat4;
use crate::geometry::{Geometry, GeometryKind};
use crate::scene::NodeId;

use super::context::{DrawItem, RenderContext};
use super::device::DeviceContext;
use super::host::RenderHost;
use super::material::{Material, MaterialId};
use super::post_effects::{
    BloomCore, BlurCore, EffectAttributes, FxaaCore, OutlineCore, OutlineStyle, XRayCore, XRayStyle,
};
use super::scene_cores::{GeometryCore, InstancingCore, ScreenSpacedCore};

static NEXT_CORE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a render core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreId(pub u64);

/// Position in the attach state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachState {
    /// No GPU resources held
    #[default]
    Detached,
    /// Acquiring resources
    Attaching,
    /// Ready to render
    Attached,
    /// Releasing resources
    Detaching,
}

/// Which pass of the frame a core renders in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderType {
    /// Never rendered directly (groups)
    None,
    /// Opaque pass, sorted by [`OrderKey`]
    Opaque,
    /// Transparent pass, traversal order
    Transparent,
    /// After opaque and transparent geometry
    PostProc,
    /// Last, into a private viewport
    ScreenSpaced,
}

/// Opaque sort key: render order in the high 16 bits, material id in the low 16
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct OrderKey(pub u32);

impl OrderKey {
    /// Combine a render order and a material id
    pub fn new(render_order: u16, material: MaterialId) -> Self {
        Self((render_order as u32) << 16 | material.0 as u32)
    }

    /// Render order part
    pub fn render_order(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Material part
    pub fn material(self) -> MaterialId {
        MaterialId(self.0 as u16)
    }
}

/// Why a core failed to attach
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AttachError {
    /// The effects manager has no technique of that name
    #[error("Technique '{0}' not found")]
    TechniqueNotFound(String),

    /// A custom core refused to attach
    #[error("{0}")]
    Custom(String),
}

/// Extension point for cores defined outside the crate
pub trait CustomCore: fmt::Debug + Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Pass the core renders in
    fn render_type(&self) -> RenderType;

    /// Acquire resources
    fn on_attach(&mut self, host: &mut RenderHost) -> Result<(), AttachError>;

    /// Release everything acquired in `on_attach`
    fn on_detach(&mut self, host: &mut RenderHost);

    /// Extra readiness checks
    fn can_render(&self, _ctx: &RenderContext) -> bool {
        true
    }

    /// Draw
    fn render(&mut self, ctx: &mut RenderContext, device: &mut dyn DeviceContext, world: &Mat4);
}

/// Kind-specific state of a core
#[derive(Debug)]
pub enum RenderCoreKind {
    /// Renders nothing (groups, sorting groups)
    Empty,
    /// Triangle mesh
    Mesh(GeometryCore),
    /// Line list
    Line(GeometryCore),
    /// Point list
    Point(GeometryCore),
    /// Instanced mesh
    Instancing(InstancingCore),
    /// Screen-spaced subtree
    ScreenSpaced(ScreenSpacedCore),
    /// Blur of flagged nodes
    Blur(BlurCore),
    /// Bloom of the frame
    Bloom(BloomCore),
    /// Outline or border highlight of flagged nodes
    Outline(OutlineCore),
    /// X-ray or x-ray grid of flagged nodes
    XRay(XRayCore),
    /// Anti-aliasing of the frame
    Fxaa(FxaaCore),
    /// User-defined core
    Custom(Box<dyn CustomCore>),
}

impl RenderCoreKind {
    /// Short name for logs
    pub fn name(&self) -> &str {
        match self {
            RenderCoreKind::Empty => "empty",
            RenderCoreKind::Mesh(_) => "mesh",
            RenderCoreKind::Line(_) => "line",
            RenderCoreKind::Point(_) => "point",
            RenderCoreKind::Instancing(_) => "instancing",
            RenderCoreKind::ScreenSpaced(_) => "screen_spaced",
            RenderCoreKind::Blur(_) => "blur",
            RenderCoreKind::Bloom(_) => "bloom",
            RenderCoreKind::Outline(core) => match core.style {
                OutlineStyle::MeshOutlineBlur => "outline",
                OutlineStyle::BorderHighlight => "border_highlight",
            },
            RenderCoreKind::XRay(core) => match core.style {
                XRayStyle::Plain => "xray",
                XRayStyle::Grid => "xray_grid",
            },
            RenderCoreKind::Fxaa(_) => "fxaa",
            RenderCoreKind::Custom(custom) => custom.name(),
        }
    }

    fn geometry_core(&self) -> Option<&GeometryCore> {
        match self {
            RenderCoreKind::Mesh(core) | RenderCoreKind::Line(core) | RenderCoreKind::Point(core) => Some(core),
            RenderCoreKind::Instancing(core) => Some(&core.base),
            _ => None,
        }
    }

    fn geometry_core_mut(&mut self) -> Option<&mut GeometryCore> {
        match self {
            RenderCoreKind::Mesh(core) | RenderCoreKind::Line(core) | RenderCoreKind::Point(core) => Some(core),
            RenderCoreKind::Instancing(core) => Some(&mut core.base),
            _ => None,
        }
    }

    fn render_type(&self) -> RenderType {
        match self {
            RenderCoreKind::Empty => RenderType::None,
            RenderCoreKind::ScreenSpaced(_) => RenderType::ScreenSpaced,
            RenderCoreKind::Blur(_)
            | RenderCoreKind::Bloom(_)
            | RenderCoreKind::Outline(_)
            | RenderCoreKind::XRay(_)
            | RenderCoreKind::Fxaa(_) => RenderType::PostProc,
            RenderCoreKind::Custom(custom) => custom.render_type(),
            geometry => match geometry.geometry_core() {
                Some(core) if core.is_transparent() => RenderType::Transparent,
                _ => RenderType::Opaque,
            },
        }
    }

    fn on_attach(&mut self, host: &mut RenderHost) -> Result<(), AttachError> {
        match self {
            RenderCoreKind::Empty => Ok(()),
            RenderCoreKind::Mesh(core) | RenderCoreKind::Line(core) | RenderCoreKind::Point(core) => {
                core.on_attach(host)
            }
            RenderCoreKind::Instancing(core) => core.base.on_attach(host),
            RenderCoreKind::ScreenSpaced(core) => core.on_attach(host),
            RenderCoreKind::Blur(core) => core.on_attach(host),
            RenderCoreKind::Bloom(core) => core.on_attach(host),
            RenderCoreKind::Outline(core) => core.on_attach(host),
            RenderCoreKind::XRay(core) => core.on_attach(host),
            RenderCoreKind::Fxaa(core) => core.on_attach(host),
            RenderCoreKind::Custom(core) => core.on_attach(host),
        }
    }

    fn on_detach(&mut self, host: &mut RenderHost) {
        match self {
            RenderCoreKind::Empty => {}
            RenderCoreKind::Mesh(core) | RenderCoreKind::Line(core) | RenderCoreKind::Point(core) => {
                core.on_detach(host)
            }
            RenderCoreKind::Instancing(core) => core.base.on_detach(host),
            RenderCoreKind::ScreenSpaced(core) => core.on_detach(),
            RenderCoreKind::Blur(core) => core.on_detach(host),
            RenderCoreKind::Bloom(core) => core.on_detach(host),
            RenderCoreKind::Outline(core) => core.on_detach(host),
            RenderCoreKind::XRay(core) => core.on_detach(host),
            RenderCoreKind::Fxaa(core) => core.on_detach(host),
            RenderCoreKind::Custom(core) => core.on_detach(host),
        }
    }

    fn can_render(&self, ctx: &RenderContext) -> bool {
        match self {
            RenderCoreKind::Empty => false,
            RenderCoreKind::Mesh(core) | RenderCoreKind::Line(core) | RenderCoreKind::Point(core) => {
                core.can_render()
            }
            RenderCoreKind::Instancing(core) => core.can_render(),
            RenderCoreKind::ScreenSpaced(core) => core.can_render(),
            RenderCoreKind::Blur(core) => core.can_render(),
            RenderCoreKind::Bloom(core) => core.can_render(),
            RenderCoreKind::Outline(core) => core.can_render(),
            RenderCoreKind::XRay(core) => core.can_render(),
            RenderCoreKind::Fxaa(core) => core.can_render(),
            RenderCoreKind::Custom(core) => core.can_render(ctx),
        }
    }

    fn render(&mut self, ctx: &mut RenderContext, device: &mut dyn DeviceContext, world: &Mat4) {
        match self {
            RenderCoreKind::Empty => {}
            RenderCoreKind::Mesh(core) | RenderCoreKind::Line(core) | RenderCoreKind::Point(core) => {
                core.render(ctx, device, world, 1)
            }
            RenderCoreKind::Instancing(core) => core.render(ctx, device, world),
            RenderCoreKind::ScreenSpaced(core) => core.render(ctx, device),
            RenderCoreKind::Blur(core) => core.render(ctx, device),
            RenderCoreKind::Bloom(core) => core.render(ctx, device),
            RenderCoreKind::Outline(core) => core.render(ctx, device),
            RenderCoreKind::XRay(core) => core.render(ctx, device),
            RenderCoreKind::Fxaa(core) => core.render(ctx, device),
            RenderCoreKind::Custom(core) => core.render(ctx, device, world),
        }
    }
}

/// GPU-side representation of one scene node
#[derive(Debug)]
pub struct RenderCore {
    id: CoreId,
    state: AttachState,
    kind: RenderCoreKind,
}

impl RenderCore {
    /// Detached core of the given kind
    pub fn new(kind: RenderCoreKind) -> Self {
        Self {
            id: CoreId(NEXT_CORE_ID.fetch_add(1, Ordering::Relaxed)),
            state: AttachState::Detached,
            kind,
        }
    }

    /// Core that renders nothing
    pub fn empty() -> Self {
        Self::new(RenderCoreKind::Empty)
    }

    /// Identity
    pub fn id(&self) -> CoreId {
        self.id
    }

    /// Attach state
    pub fn state(&self) -> AttachState {
        self.state
    }

    /// True while attached
    pub fn is_attached(&self) -> bool {
        self.state == AttachState::Attached
    }

    /// Kind-specific state
    pub fn kind(&self) -> &RenderCoreKind {
        &self.kind
    }

    /// Kind-specific state, mutable
    pub fn kind_mut(&mut self) -> &mut RenderCoreKind {
        &mut self.kind
    }

    /// Pass this core renders in
    pub fn render_type(&self) -> RenderType {
        self.kind.render_type()
    }

    /// Acquire GPU resources; a no-op when already attached
    ///
    /// On failure the core logs a warning and stays detached.
    pub fn attach(&mut self, host: &mut RenderHost) -> Result<(), AttachError> {
        if self.state == AttachState::Attached {
            return Ok(());
        }
        self.state = AttachState::Attaching;
        match self.kind.on_attach(host) {
            Ok(()) => {
                self.state = AttachState::Attached;
                debug!("Attached {} core {:?}", self.kind.name(), self.id);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to attach {} core {:?}: {}", self.kind.name(), self.id, e);
                self.kind.on_detach(host);
                self.state = AttachState::Detached;
                Err(e)
            }
        }
    }

    /// Release GPU resources; a no-op unless attached
    pub fn detach(&mut self, host: &mut RenderHost) {
        if self.state != AttachState::Attached {
            return;
        }
        self.state = AttachState::Detaching;
        self.kind.on_detach(host);
        self.state = AttachState::Detached;
        debug!("Detached {} core {:?}", self.kind.name(), self.id);
    }

    /// Attached and ready for this frame
    pub fn can_render(&self, ctx: &RenderContext) -> bool {
        self.is_attached() && self.kind.can_render(ctx)
    }

    /// Draw
    ///
    /// # Panics
    /// When the core is not attached.
    pub fn render(&mut self, ctx: &mut RenderContext, device: &mut dyn DeviceContext, world: &Mat4) {
        assert!(
            self.is_attached(),
            "render called on {} core {:?} in state {:?}",
            self.kind.name(),
            self.id,
            self.state
        );
        self.kind.render(ctx, device, world);
    }

    /// Geometry drawn by this core, if it draws one
    pub fn geometry(&self) -> Option<&Arc<Geometry>> {
        self.kind.geometry_core()?.geometry()
    }

    /// Geometry kind this core accepts
    pub fn expected_geometry(&self) -> Option<GeometryKind> {
        self.kind.geometry_core().map(GeometryCore::expected_kind)
    }

    /// Geometry core (mesh, line, point, instancing)
    pub fn geometry_core(&self) -> Option<&GeometryCore> {
        self.kind.geometry_core()
    }

    /// Geometry core, mutable; thickness and transparency are tuned here
    pub fn geometry_core_mut(&mut self) -> Option<&mut GeometryCore> {
        self.kind.geometry_core_mut()
    }

    /// Replace the geometry; returns false for cores without geometry
    pub fn set_geometry(&mut self, geometry: Option<Arc<Geometry>>, host: &mut RenderHost) -> bool {
        let attached = self.is_attached();
        match self.kind.geometry_core_mut() {
            Some(core) => {
                core.set_geometry(geometry, host, attached);
                true
            }
            None => false,
        }
    }

    /// Replace the material; returns false for cores without material
    pub fn set_material(&mut self, material: Material, host: &mut RenderHost) -> bool {
        let attached = self.is_attached();
        match self.kind.geometry_core_mut() {
            Some(core) => {
                core.set_material(material, host, attached);
                true
            }
            None => false,
        }
    }

    /// Opaque sort key for a render order
    pub fn order_key(&self, render_order: u16) -> OrderKey {
        let material = self.kind.geometry_core().map_or(MaterialId::default(), GeometryCore::material_id);
        OrderKey::new(render_order, material)
    }

    /// Draw description for post effects, when the core has buffers
    pub fn draw_item(&self, node: NodeId, world: &Mat4, attributes: EffectAttributes) -> Option<DrawItem> {
        if !self.is_attached() {
            return None;
        }
        match &self.kind {
            RenderCoreKind::Mesh(core) | RenderCoreKind::Line(core) | RenderCoreKind::Point(core) => {
                core.draw_item(node, world, attributes)
            }
            RenderCoreKind::Instancing(core) => core.draw_item(node, world, attributes),
            _ => None,
        }
    }
}

/// Constructor registered with the [`CoreFactory`]
pub type CoreConstructor = Box<dyn Fn(&RenderConfig) -> RenderCoreKind + Send + Sync>;

/// Named constructors for render cores
pub struct CoreFactory {
    constructors: HashMap<String, CoreConstructor>,
}

impl fmt::Debug for CoreFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("CoreFactory").field("constructors", &names).finish()
    }
}

impl Default for CoreFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CoreFactory {
    /// Factory without constructors
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Factory with every built-in core registered
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        factory.register("empty", |_| RenderCoreKind::Empty);
        factory.register("mesh", |_| RenderCoreKind::Mesh(GeometryCore::new(GeometryKind::Mesh)));
        factory.register("line", |_| RenderCoreKind::Line(GeometryCore::new(GeometryKind::Line)));
        factory.register("point", |_| RenderCoreKind::Point(GeometryCore::new(GeometryKind::Point)));
        factory.register("instancing", |_| RenderCoreKind::Instancing(InstancingCore::new()));
        factory.register("screen_spaced", |_| RenderCoreKind::ScreenSpaced(ScreenSpacedCore::new()));
        factory.register("blur", |c| RenderCoreKind::Blur(BlurCore::new(c.post_effects.blur.clone())));
        factory.register("bloom", |c| RenderCoreKind::Bloom(BloomCore::new(c.post_effects.bloom.clone())));
        factory.register("outline", |c| {
            RenderCoreKind::Outline(OutlineCore::new(OutlineStyle::MeshOutlineBlur, c.post_effects.outline.clone()))
        });
        factory.register("border_highlight", |c| {
            RenderCoreKind::Outline(OutlineCore::new(OutlineStyle::BorderHighlight, c.post_effects.outline.clone()))
        });
        factory.register("xray", |c| {
            RenderCoreKind::XRay(XRayCore::new(XRayStyle::Plain, c.post_effects.xray.clone()))
        });
        factory.register("xray_grid", |c| {
            RenderCoreKind::XRay(XRayCore::new(XRayStyle::Grid, c.post_effects.xray.clone()))
        });
        factory.register("fxaa", |c| RenderCoreKind::Fxaa(FxaaCore::new(c.post_effects.fxaa_level)));
        factory
    }

    /// Register (or replace) a constructor
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&RenderConfig) -> RenderCoreKind + Send + Sync + 'static,
    {
        self.constructors.insert(name.to_string(), Box::new(constructor));
    }

    /// True when `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Build a detached core
    pub fn create(&self, name: &str, config: &RenderConfig) -> Option<RenderCore> {
        self.constructors.get(name).map(|ctor| RenderCore::new(ctor(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{test_context, triangle_geometry, RecordingDevice};
    use crate::render::technique::technique_names;

    #[derive(Debug)]
    struct FailingCore;

    impl CustomCore for FailingCore {
        fn name(&self) -> &str {
            "failing"
        }

        fn render_type(&self) -> RenderType {
            RenderType::Opaque
        }

        fn on_attach(&mut self, _host: &mut RenderHost) -> Result<(), AttachError> {
            Err(AttachError::Custom("no device memory".to_string()))
        }

        fn on_detach(&mut self, _host: &mut RenderHost) {}

        fn render(&mut self, _ctx: &mut RenderContext, _device: &mut dyn DeviceContext, _world: &Mat4) {}
    }

    fn mesh_core(host: &mut RenderHost) -> RenderCore {
        let mut core = RenderCore::new(RenderCoreKind::Mesh(GeometryCore::new(GeometryKind::Mesh)));
        core.set_geometry(Some(triangle_geometry()), host);
        core
    }

    #[test]
    fn test_order_key_packs_render_order_above_material() {
        let key = OrderKey::new(3, MaterialId(7));
        assert_eq!(key.0, (3 << 16) | 7);
        assert_eq!(key.render_order(), 3);
        assert_eq!(key.material(), MaterialId(7));
        assert!(OrderKey::new(1, MaterialId(u16::MAX)) < OrderKey::new(2, MaterialId(0)));
    }

    #[test]
    fn test_attach_is_idempotent() {
        let mut host = RenderHost::default();
        let mut core = mesh_core(&mut host);
        core.attach(&mut host).unwrap();
        core.attach(&mut host).unwrap();
        assert_eq!(core.state(), AttachState::Attached);
        assert_eq!(host.buffers.len(), 1);
        let geometry = core.geometry().unwrap().id();
        assert_eq!(host.buffers.ref_count(geometry), 1);

        core.detach(&mut host);
        core.detach(&mut host);
        assert_eq!(core.state(), AttachState::Detached);
        assert!(host.buffers.is_empty());
    }

    #[test]
    fn test_failed_attach_returns_to_detached() {
        let mut host = RenderHost::default();
        let mut core = RenderCore::new(RenderCoreKind::Custom(Box::new(FailingCore)));
        assert!(matches!(core.attach(&mut host), Err(AttachError::Custom(_))));
        assert_eq!(core.state(), AttachState::Detached);

        host.effects.remove_technique(technique_names::MESH);
        let mut mesh = mesh_core(&mut host);
        assert_eq!(
            mesh.attach(&mut host),
            Err(AttachError::TechniqueNotFound(technique_names::MESH.to_string()))
        );
        assert!(!mesh.is_attached());
        assert!(host.buffers.is_empty());
    }

    #[test]
    #[should_panic(expected = "render called on mesh core")]
    fn test_render_while_detached_panics() {
        let mut host = RenderHost::default();
        let mut core = mesh_core(&mut host);
        let mut ctx = test_context(8, 8);
        core.render(&mut ctx, &mut RecordingDevice::default(), &Mat4::identity());
    }

    #[test]
    fn test_render_type_follows_kind_and_material() {
        let mut host = RenderHost::default();
        let mut core = mesh_core(&mut host);
        assert_eq!(core.render_type(), RenderType::Opaque);
        core.set_material(Material::new("glass").with_alpha(0.2), &mut host);
        assert_eq!(core.render_type(), RenderType::Transparent);
        assert_eq!(RenderCore::empty().render_type(), RenderType::None);

        let factory = CoreFactory::with_defaults();
        let config = RenderConfig::default();
        for name in ["blur", "bloom", "outline", "border_highlight", "xray", "xray_grid", "fxaa"] {
            let core = factory.create(name, &config).unwrap();
            assert_eq!(core.render_type(), RenderType::PostProc, "{name}");
            assert_eq!(core.kind().name(), name);
        }
        assert!(factory.create("volumetric_fog", &config).is_none());
    }

    #[test]
    fn test_cores_have_unique_ids() {
        let a = RenderCore::empty();
        let b = RenderCore::empty();
        assert_ne!(a.id(), b.id());
    }
}
