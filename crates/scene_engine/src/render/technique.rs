//! Techniques, shader passes and the effects manager
//!
//! A technique is a named set of passes. Cores resolve the technique and their
//! passes once, at attach time, and keep the `Arc`s until detach. Asking for a
//! pass that does not exist yields a null pass; rendering with a null pass is a
//! silent no-op.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use super::states::{
    BlendMode, BlendStateDesc, CompareFunc, CullMode, DepthStencilDesc, RasterStateDesc, SamplerDesc, StateId,
    StatePools,
};

/// Built-in technique names
pub mod technique_names {
    /// Triangle meshes
    pub const MESH: &str = "mesh";
    /// Line lists
    pub const LINE: &str = "line";
    /// Point lists
    pub const POINT: &str = "point";
    /// Instanced meshes
    pub const INSTANCING: &str = "instancing_mesh";
    /// Screen-spaced gizmo setup
    pub const SCREEN_SPACED: &str = "screen_spaced";
    /// Blur post effect
    pub const POST_EFFECT_BLUR: &str = "post_effect_blur";
    /// Bloom post effect
    pub const POST_EFFECT_BLOOM: &str = "post_effect_bloom";
    /// Mesh outline blur and border highlight
    pub const POST_EFFECT_OUTLINE: &str = "post_effect_mesh_outline";
    /// X-ray
    pub const POST_EFFECT_XRAY: &str = "post_effect_xray";
    /// X-ray grid
    pub const POST_EFFECT_XRAY_GRID: &str = "post_effect_xray_grid";
    /// FXAA
    pub const POST_EFFECT_FXAA: &str = "post_effect_fxaa";
}

/// Built-in pass names
pub mod pass_names {
    /// Regular shaded draw
    pub const DEFAULT: &str = "default";
    /// Alpha blended draw
    pub const TRANSPARENT: &str = "transparent";
    /// Depth-only draw
    pub const DEPTH_PREPASS: &str = "depth_prepass";
    /// Clear depth inside a screen-spaced viewport
    pub const CLEAR_DEPTH: &str = "clear_depth";
    /// Draw flagged geometry as a flat silhouette
    pub const SILHOUETTE: &str = "silhouette";
    /// Draw flagged geometry writing stencil and color
    pub const SILHOUETTE_STENCIL: &str = "silhouette_stencil";
    /// Separable blur, vertical step
    pub const BLUR_VERTICAL: &str = "blur_vertical";
    /// Separable blur, horizontal step
    pub const BLUR_HORIZONTAL: &str = "blur_horizontal";
    /// Filtered copy into a smaller or larger target
    pub const COPY: &str = "copy";
    /// Blend a blurred image onto the primary target
    pub const BLUR_COMPOSITE: &str = "blur_composite";
    /// Bright region extraction
    pub const BLOOM_EXTRACT: &str = "bloom_extract";
    /// Additive combine of a coarser level into a finer one
    pub const BLOOM_COMBINE: &str = "bloom_combine";
    /// Final bloom composite
    pub const BLOOM_COMPOSITE: &str = "bloom_composite";
    /// Edge detection for border highlight
    pub const BORDER_DETECT: &str = "border_detect";
    /// Stencil-tested outline composite
    pub const OUTLINE_COMPOSITE: &str = "outline_composite";
    /// Stencil mark of the visible part of flagged geometry
    pub const XRAY_MARK_VISIBLE: &str = "xray_mark_visible";
    /// Occluded draw of flagged geometry
    pub const XRAY_OCCLUDED: &str = "xray_occluded";
    /// FXAA full-screen pass
    pub const FXAA: &str = "fxaa";
}

/// Value description of one pass, used to register techniques
#[derive(Debug, Clone, PartialEq)]
pub struct PassDescription {
    /// Pass name
    pub name: String,
    /// Blend state
    pub blend: BlendStateDesc,
    /// Rasterizer state
    pub raster: RasterStateDesc,
    /// Depth-stencil state
    pub depth_stencil: DepthStencilDesc,
}

impl PassDescription {
    /// Pass with default (opaque, depth tested) states
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blend: BlendStateDesc::default(),
            raster: RasterStateDesc::default(),
            depth_stencil: DepthStencilDesc::default(),
        }
    }

    /// Full-screen pass: no depth, no culling
    pub fn fullscreen(name: &str, blend: BlendMode) -> Self {
        Self {
            blend: BlendStateDesc { mode: blend },
            raster: RasterStateDesc { cull: CullMode::None, ..RasterStateDesc::default() },
            depth_stencil: DepthStencilDesc::DISABLED,
            ..Self::new(name)
        }
    }

    /// Builder-style blend mode
    #[must_use]
    pub fn with_blend(mut self, mode: BlendMode) -> Self {
        self.blend = BlendStateDesc { mode };
        self
    }

    /// Builder-style depth-stencil state
    #[must_use]
    pub fn with_depth_stencil(mut self, desc: DepthStencilDesc) -> Self {
        self.depth_stencil = desc;
        self
    }
}

/// Value description of a technique
#[derive(Debug, Clone, PartialEq)]
pub struct TechniqueDescription {
    /// Technique name
    pub name: String,
    /// Passes
    pub passes: Vec<PassDescription>,
}

impl TechniqueDescription {
    /// Technique with the given passes
    pub fn new(name: &str, passes: Vec<PassDescription>) -> Self {
        Self { name: name.to_string(), passes }
    }
}

/// A resolved pass: pooled state ids ready to bind
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderPass {
    name: String,
    technique: String,
    states: Option<PassStates>,
}

/// State ids bound together with a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassStates {
    /// Blend state
    pub blend: StateId,
    /// Rasterizer state
    pub raster: StateId,
    /// Depth-stencil state
    pub depth_stencil: StateId,
}

impl ShaderPass {
    /// The pass returned for unknown names; binds nothing
    pub fn null() -> Self {
        Self {
            name: String::new(),
            technique: String::new(),
            states: None,
        }
    }

    /// True for the null pass
    pub fn is_null(&self) -> bool {
        self.states.is_none()
    }

    /// Pass name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning technique name
    pub fn technique(&self) -> &str {
        &self.technique
    }

    /// Pooled states, `None` for the null pass
    pub fn states(&self) -> Option<PassStates> {
        self.states
    }
}

/// A named collection of passes
#[derive(Debug)]
pub struct Technique {
    name: String,
    passes: HashMap<String, Arc<ShaderPass>>,
    null_pass: Arc<ShaderPass>,
}

impl Technique {
    /// Technique name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pass by name, or the null pass
    pub fn get_pass(&self, name: &str) -> Arc<ShaderPass> {
        match self.passes.get(name) {
            Some(pass) => Arc::clone(pass),
            None => {
                debug!("Technique '{}' has no pass '{}'", self.name, name);
                Arc::clone(&self.null_pass)
            }
        }
    }

    /// True when the technique defines the pass
    pub fn has_pass(&self, name: &str) -> bool {
        self.passes.contains_key(name)
    }

    /// Names of all passes
    pub fn pass_names(&self) -> impl Iterator<Item = &str> {
        self.passes.keys().map(String::as_str)
    }
}

/// Resolves techniques by name and owns the shared state pools
#[derive(Debug)]
pub struct EffectsManager {
    techniques: HashMap<String, Arc<Technique>>,
    states: StatePools,
}

impl Default for EffectsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectsManager {
    /// Manager without any technique
    pub fn new() -> Self {
        Self {
            techniques: HashMap::new(),
            states: StatePools::default(),
        }
    }

    /// Manager with every built-in technique registered
    pub fn with_default_techniques() -> Self {
        let mut manager = Self::new();
        for description in default_techniques() {
            manager.register_technique(description);
        }
        manager
    }

    /// Register (or replace) a technique, pooling its pass states
    pub fn register_technique(&mut self, description: TechniqueDescription) -> Arc<Technique> {
        self.remove_technique(&description.name);

        let mut passes = HashMap::new();
        for pass in description.passes {
            let states = PassStates {
                blend: self.states.blend.register(pass.blend),
                raster: self.states.raster.register(pass.raster),
                depth_stencil: self.states.depth_stencil.register(pass.depth_stencil),
            };
            passes.insert(
                pass.name.clone(),
                Arc::new(ShaderPass {
                    name: pass.name,
                    technique: description.name.clone(),
                    states: Some(states),
                }),
            );
        }
        let technique = Arc::new(Technique {
            name: description.name.clone(),
            passes,
            null_pass: Arc::new(ShaderPass::null()),
        });
        debug!("Registered technique '{}'", description.name);
        self.techniques.insert(description.name, Arc::clone(&technique));
        technique
    }

    /// Remove a technique and release its states
    ///
    /// Cores that already hold the technique keep working with it until they
    /// detach.
    pub fn remove_technique(&mut self, name: &str) -> bool {
        let Some(technique) = self.techniques.remove(name) else {
            return false;
        };
        for pass in technique.passes.values() {
            if let Some(states) = pass.states {
                self.states.release(states.blend);
                self.states.release(states.raster);
                self.states.release(states.depth_stencil);
            }
        }
        true
    }

    /// Technique by name
    pub fn technique(&self, name: &str) -> Option<Arc<Technique>> {
        let found = self.techniques.get(name).cloned();
        if found.is_none() {
            warn!("Technique '{}' not found", name);
        }
        found
    }

    /// Shorthand for `technique(t)?.get_pass(p)`; null pass when either is missing
    pub fn pass(&self, technique: &str, pass: &str) -> Arc<ShaderPass> {
        self.technique(technique)
            .map_or_else(|| Arc::new(ShaderPass::null()), |t| t.get_pass(pass))
    }

    /// Register a sampler, sharing identical ones
    pub fn acquire_sampler(&mut self, desc: SamplerDesc) -> StateId {
        self.states.sampler.register(desc)
    }

    /// Release a sampler obtained from [`Self::acquire_sampler`]
    pub fn release_sampler(&mut self, id: StateId) {
        self.states.sampler.release(id);
    }

    /// Shared state pools
    pub fn states(&self) -> &StatePools {
        &self.states
    }

    /// Number of registered techniques
    pub fn technique_count(&self) -> usize {
        self.techniques.len()
    }
}

/// Descriptions of every built-in technique
pub fn default_techniques() -> Vec<TechniqueDescription> {
    use self::pass_names as p;
    use self::technique_names as t;

    let geometry = |name: &str| {
        TechniqueDescription::new(
            name,
            vec![
                PassDescription::new(p::DEFAULT),
                PassDescription::new(p::TRANSPARENT).with_blend(BlendMode::AlphaBlend),
                PassDescription::new(p::DEPTH_PREPASS).with_blend(BlendMode::NoColorWrite),
            ],
        )
    };
    let no_cull = |name: &str| PassDescription {
        raster: RasterStateDesc { cull: CullMode::None, ..RasterStateDesc::default() },
        ..PassDescription::new(name)
    };

    let xray = |name: &str| {
        TechniqueDescription::new(
            name,
            vec![
                PassDescription::new(p::DEPTH_PREPASS).with_blend(BlendMode::NoColorWrite),
                PassDescription::new(p::XRAY_MARK_VISIBLE)
                    .with_blend(BlendMode::NoColorWrite)
                    .with_depth_stencil(DepthStencilDesc {
                        depth_test: true,
                        depth_func: CompareFunc::LessEqual,
                        ..DepthStencilDesc::STENCIL_WRITE
                    }),
                PassDescription::new(p::XRAY_OCCLUDED)
                    .with_blend(BlendMode::AlphaBlend)
                    .with_depth_stencil(DepthStencilDesc::DEPTH_GREATER),
            ],
        )
    };

    vec![
        geometry(t::MESH),
        geometry(t::LINE),
        geometry(t::POINT),
        geometry(t::INSTANCING),
        TechniqueDescription::new(
            t::SCREEN_SPACED,
            vec![PassDescription::fullscreen(p::CLEAR_DEPTH, BlendMode::NoColorWrite)],
        ),
        TechniqueDescription::new(
            t::POST_EFFECT_BLUR,
            vec![
                no_cull(p::SILHOUETTE).with_depth_stencil(DepthStencilDesc::DISABLED),
                PassDescription::fullscreen(p::BLUR_VERTICAL, BlendMode::Opaque),
                PassDescription::fullscreen(p::BLUR_HORIZONTAL, BlendMode::Opaque),
                PassDescription::fullscreen(p::COPY, BlendMode::Opaque),
                PassDescription::fullscreen(p::BLUR_COMPOSITE, BlendMode::AlphaBlend),
            ],
        ),
        TechniqueDescription::new(
            t::POST_EFFECT_BLOOM,
            vec![
                PassDescription::fullscreen(p::BLOOM_EXTRACT, BlendMode::Opaque),
                PassDescription::fullscreen(p::BLUR_VERTICAL, BlendMode::Opaque),
                PassDescription::fullscreen(p::BLUR_HORIZONTAL, BlendMode::Opaque),
                PassDescription::fullscreen(p::COPY, BlendMode::Opaque),
                PassDescription::fullscreen(p::BLOOM_COMBINE, BlendMode::Additive),
                PassDescription::fullscreen(p::BLOOM_COMPOSITE, BlendMode::Additive),
            ],
        ),
        TechniqueDescription::new(
            t::POST_EFFECT_OUTLINE,
            vec![
                no_cull(p::SILHOUETTE_STENCIL).with_depth_stencil(DepthStencilDesc::STENCIL_WRITE),
                PassDescription::fullscreen(p::BLUR_VERTICAL, BlendMode::Opaque),
                PassDescription::fullscreen(p::BLUR_HORIZONTAL, BlendMode::Opaque),
                PassDescription::fullscreen(p::COPY, BlendMode::Opaque),
                PassDescription::fullscreen(p::BORDER_DETECT, BlendMode::Opaque),
                PassDescription::fullscreen(p::OUTLINE_COMPOSITE, BlendMode::AlphaBlend)
                    .with_depth_stencil(DepthStencilDesc::STENCIL_OUTSIDE),
            ],
        ),
        xray(t::POST_EFFECT_XRAY),
        xray(t::POST_EFFECT_XRAY_GRID),
        TechniqueDescription::new(
            t::POST_EFFECT_FXAA,
            vec![PassDescription::fullscreen(p::FXAA, BlendMode::Opaque)],
        ),
    ]
}
