//! Material system for rendering
//!
//! Materials are plain values. The [`MaterialRegistry`] assigns each distinct
//! material name a small variable id; nodes sharing a material share the id,
//! which is what the opaque pass sorts on after render order.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

/// Material properties for 3D rendering
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Registry key; materials with the same name share a variable id
    pub name: String,

    /// Diffuse color (RGBA)
    pub diffuse: [f32; 4],

    /// Emissive color (RGB)
    pub emissive: [f32; 3],

    /// Specular exponent
    pub shininess: f32,
}

impl Material {
    /// Create a named white material
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            diffuse: [1.0, 1.0, 1.0, 1.0],
            emissive: [0.0, 0.0, 0.0],
            shininess: 30.0,
        }
    }

    /// Set the diffuse color
    #[must_use]
    pub fn with_color(mut self, r: f32, g: f32, b: f32) -> Self {
        self.diffuse = [r, g, b, self.diffuse[3]];
        self
    }

    /// Set the alpha/transparency
    #[must_use]
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.diffuse[3] = alpha.clamp(0.0, 1.0);
        self
    }

    /// Set the emissive color
    #[must_use]
    pub fn with_emissive(mut self, r: f32, g: f32, b: f32) -> Self {
        self.emissive = [r, g, b];
        self
    }

    /// True when the material needs blending
    pub fn is_transparent(&self) -> bool {
        self.diffuse[3] < 1.0
    }

    /// Constant block uploaded with each draw
    pub fn constants(&self) -> MaterialConstants {
        MaterialConstants {
            diffuse: self.diffuse,
            emissive: [self.emissive[0], self.emissive[1], self.emissive[2], 0.0],
            shininess: [self.shininess, 0.0, 0.0, 0.0],
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default")
    }
}

/// GPU layout of a material
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    /// Diffuse RGBA
    pub diffuse: [f32; 4],
    /// Emissive RGB, padded
    pub emissive: [f32; 4],
    /// Shininess, padded
    pub shininess: [f32; 4],
}

/// Unique identifier for registered materials; 0 means "no material"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MaterialId(pub u16);

#[derive(Debug)]
struct RegistryEntry {
    id: MaterialId,
    refs: usize,
}

/// Assigns and reference counts material variable ids
#[derive(Debug, Default)]
pub struct MaterialRegistry {
    entries: HashMap<String, RegistryEntry>,
    free_ids: Vec<u16>,
    next_id: u16,
}

impl MaterialRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for a material, allocating one for a new name
    pub fn acquire(&mut self, material: &Material) -> MaterialId {
        if let Some(entry) = self.entries.get_mut(&material.name) {
            entry.refs += 1;
            return entry.id;
        }
        let raw = self.free_ids.pop().unwrap_or_else(|| {
            self.next_id = self.next_id.wrapping_add(1).max(1);
            self.next_id
        });
        let id = MaterialId(raw);
        self.entries.insert(material.name.clone(), RegistryEntry { id, refs: 1 });
        id
    }

    /// Drop one owner of a material name
    pub fn release(&mut self, material: &Material) {
        let Some(entry) = self.entries.get_mut(&material.name) else {
            return;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            if let Some(entry) = self.entries.remove(&material.name) {
                self.free_ids.push(entry.id.0);
            }
        }
    }

    /// Registered id of a material name
    pub fn id_of(&self, name: &str) -> Option<MaterialId> {
        self.entries.get(name).map(|e| e.id)
    }

    /// Number of live material ids
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no material is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
