//! Render host: the shared services cores attach against

use log::debug;

use crate::config::RenderConfig;
use crate::scene::assets::SceneAssets;

use super::buffers::GeometryBufferManager;
use super::core::CoreFactory;
use super::device::{DeviceContext, TextureId};
use super::material::MaterialRegistry;
use super::technique::EffectsManager;

/// Services shared by every render core of a scene
#[derive(Debug)]
pub struct RenderHost {
    /// Techniques and pooled states
    pub effects: EffectsManager,
    /// Shared geometry buffers
    pub buffers: GeometryBufferManager,
    /// Material variable ids
    pub materials: MaterialRegistry,
    /// Procedural geometry shared by gizmo nodes
    pub assets: SceneAssets,
    /// Render configuration
    pub config: RenderConfig,
    /// Named core constructors
    pub core_factory: CoreFactory,
    released_textures: Vec<TextureId>,
}

impl Default for RenderHost {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

impl RenderHost {
    /// Host with the built-in techniques and cores
    pub fn new(config: RenderConfig) -> Self {
        Self {
            effects: EffectsManager::with_default_techniques(),
            buffers: GeometryBufferManager::new(),
            materials: MaterialRegistry::new(),
            assets: SceneAssets::new(),
            config,
            core_factory: CoreFactory::with_defaults(),
            released_textures: Vec::new(),
        }
    }

    /// Queue textures for release at the start of the next frame
    pub fn defer_texture_release(&mut self, textures: impl IntoIterator<Item = TextureId>) {
        self.released_textures.extend(textures);
    }

    /// Textures waiting for release
    pub fn pending_releases(&self) -> usize {
        self.released_textures.len()
    }

    /// Release queued textures; returns how many were released
    pub fn flush_releases(&mut self, device: &mut dyn DeviceContext) -> usize {
        let count = self.released_textures.len();
        for texture in self.released_textures.drain(..) {
            device.release_texture(texture);
        }
        if count > 0 {
            debug!("Released {} offscreen textures", count);
        }
        count
    }
}
