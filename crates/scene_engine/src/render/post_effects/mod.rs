//! Post-effect cores
//!
//! Every effect follows the same shape: viewport-sized offscreen targets that
//! are only reallocated on resize, flagged nodes drawn offscreen with an
//! effect pass, full-screen passes ping-ponging between targets, and a final
//! composite onto the primary target.
//!
//! Nodes opt into an effect through an attribute string such as
//! `"outline[color:#FF0000;scale:2] xray"`. Entries are separated by whitespace
//! or commas; key/value pairs inside brackets by semicolons.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use super::camera::Viewport;
use super::core::AttachError;
use super::device::{DeviceContext, TargetRef};
use super::host::RenderHost;
use super::states::{SamplerDesc, StateId};
use super::technique::ShaderPass;

pub mod targets;
pub mod blur;
pub mod bloom;
pub mod outline;
pub mod xray;
pub mod fxaa;

pub use targets::{OffscreenTarget, PingPong};
pub use blur::{BlurCore, BlurDepth};
pub use bloom::{bloom_chain_sizes, BloomCore};
pub use outline::{OutlineCore, OutlineMode, OutlineStyle};
pub use xray::{XRayCore, XRayStyle};
pub use fxaa::{FxaaConstants, FxaaCore, FxaaLevel, FxaaParameters};

/// Effect names nodes use to opt in
pub mod effect_names {
    /// Blur
    pub const BLUR: &str = "blur";
    /// Mesh outline blur
    pub const OUTLINE: &str = "outline";
    /// Border highlight
    pub const BORDER_HIGHLIGHT: &str = "border_highlight";
    /// X-ray
    pub const XRAY: &str = "xray";
    /// X-ray grid
    pub const XRAY_GRID: &str = "xray_grid";
}

/// Constant buffer slots shared by every core
pub mod constant_slots {
    /// Per-draw model constants
    pub const MODEL: u32 = 0;
    /// Material constants
    pub const MATERIAL: u32 = 1;
    /// Post-effect parameters
    pub const POST_EFFECT: u32 = 2;
    /// Per-instance matrices
    pub const INSTANCES: u32 = 3;
}

/// Errors from parsing effect attribute strings
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EffectParseError {
    /// Brackets do not balance
    #[error("Unbalanced brackets in effect attributes: {0}")]
    UnbalancedBrackets(String),

    /// An entry has no effect name before its attribute list
    #[error("Missing effect name in: {0}")]
    MissingName(String),

    /// A key/value pair is not of the form `key:value`
    #[error("Malformed attribute '{0}'")]
    MalformedAttribute(String),

    /// A color value could not be parsed
    #[error("Invalid color '{0}'")]
    InvalidColor(String),
}

/// One effect entry of a node's attribute string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EffectAttributes {
    name: String,
    attributes: BTreeMap<String, String>,
}

impl EffectAttributes {
    /// Entry with a name and no attributes
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Parse a single entry such as `outline[color:#FF0000]`
    pub fn parse(entry: &str) -> Result<Self, EffectParseError> {
        let entry = entry.trim();
        let (name, rest) = match entry.find('[') {
            Some(open) => {
                if !entry.ends_with(']') {
                    return Err(EffectParseError::UnbalancedBrackets(entry.to_string()));
                }
                (&entry[..open], Some(&entry[open + 1..entry.len() - 1]))
            }
            None => (entry, None),
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(EffectParseError::MissingName(entry.to_string()));
        }
        if name.contains(']') {
            return Err(EffectParseError::UnbalancedBrackets(entry.to_string()));
        }

        let mut attributes = BTreeMap::new();
        for pair in rest.unwrap_or("").split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once(':')
                .ok_or_else(|| EffectParseError::MalformedAttribute(pair.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(EffectParseError::MalformedAttribute(pair.to_string()));
            }
            attributes.insert(key.to_string(), value.trim().to_string());
        }

        Ok(Self {
            name: name.to_string(),
            attributes,
        })
    }

    /// Parse a full attribute string into its entries
    pub fn parse_list(text: &str) -> Result<Vec<Self>, EffectParseError> {
        let mut entries = Vec::new();
        let mut depth = 0usize;
        let mut start = 0usize;
        for (i, ch) in text.char_indices() {
            match ch {
                '[' => depth += 1,
                ']' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| EffectParseError::UnbalancedBrackets(text.to_string()))?;
                }
                c if depth == 0 && (c.is_whitespace() || c == ',') => {
                    if !text[start..i].trim().is_empty() {
                        entries.push(Self::parse(&text[start..i])?);
                    }
                    start = i + c.len_utf8();
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(EffectParseError::UnbalancedBrackets(text.to_string()));
        }
        if !text[start..].trim().is_empty() {
            entries.push(Self::parse(&text[start..])?);
        }
        Ok(entries)
    }

    /// Effect name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw attribute value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Attribute parsed as a float
    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// `color` attribute, falling back to `default` when absent or invalid
    pub fn color_or(&self, default: [f32; 4]) -> [f32; 4] {
        match self.get("color").map(parse_color) {
            Some(Ok(color)) => color,
            Some(Err(e)) => {
                log::warn!("Effect '{}': {}", self.name, e);
                default
            }
            None => default,
        }
    }
}

/// Parse `#RRGGBB`, `#AARRGGBB` or `r,g,b[,a]` (components in [0, 1])
pub fn parse_color(text: &str) -> Result<[f32; 4], EffectParseError> {
    let text = text.trim();
    let invalid = || EffectParseError::InvalidColor(text.to_string());

    if let Some(hex) = text.strip_prefix('#') {
        let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
        let channel = |shift: u32| ((value >> shift) & 0xFF) as f32 / 255.0;
        return match hex.len() {
            6 => Ok([channel(16), channel(8), channel(0), 1.0]),
            8 => Ok([channel(16), channel(8), channel(0), channel(24)]),
            _ => Err(invalid()),
        };
    }

    let parts: Vec<f32> = text
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;
    match parts.as_slice() {
        [r, g, b] => Ok([*r, *g, *b, 1.0]),
        [r, g, b, a] => Ok([*r, *g, *b, *a]),
        _ => Err(invalid()),
    }
}

/// Constant block shared by full-screen passes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PostEffectConstants {
    /// Effect color
    pub color: [f32; 4],
    /// Effect specific parameters
    pub params: [f32; 4],
    /// Target width, height and their reciprocals
    pub viewport: [f32; 4],
}

impl PostEffectConstants {
    /// Constants for a `width` x `height` target
    pub fn new(color: [f32; 4], params: [f32; 4], width: u32, height: u32) -> Self {
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        Self {
            color,
            params,
            viewport: [w, h, 1.0 / w, 1.0 / h],
        }
    }
}

/// Technique, passes and sampler an effect core holds while attached
#[derive(Debug)]
pub struct EffectResources {
    technique_name: String,
    pass_names: &'static [&'static str],
    passes: HashMap<&'static str, Arc<ShaderPass>>,
    null_pass: ShaderPass,
    sampler: Option<StateId>,
}

impl EffectResources {
    /// Resources for `technique_name`, resolving `pass_names` on attach
    pub fn new(technique_name: &str, pass_names: &'static [&'static str]) -> Self {
        Self {
            technique_name: technique_name.to_string(),
            pass_names,
            passes: HashMap::new(),
            null_pass: ShaderPass::null(),
            sampler: None,
        }
    }

    /// Technique the effect renders with
    pub fn technique_name(&self) -> &str {
        &self.technique_name
    }

    /// Resolve the technique and passes, and take a sampler
    pub fn acquire(&mut self, host: &mut RenderHost) -> Result<(), AttachError> {
        let technique = host
            .effects
            .technique(&self.technique_name)
            .ok_or_else(|| AttachError::TechniqueNotFound(self.technique_name.clone()))?;
        self.passes = self
            .pass_names
            .iter()
            .map(|name| (*name, technique.get_pass(name)))
            .collect();
        self.sampler = Some(host.effects.acquire_sampler(SamplerDesc::LINEAR_CLAMP));
        Ok(())
    }

    /// Drop the passes and return the sampler
    pub fn release(&mut self, host: &mut RenderHost) {
        self.passes.clear();
        if let Some(sampler) = self.sampler.take() {
            host.effects.release_sampler(sampler);
        }
    }

    /// Resolved pass, or the null pass
    pub fn pass(&self, name: &str) -> &ShaderPass {
        self.passes.get(name).map_or(&self.null_pass, |p| p.as_ref())
    }

    /// Linear clamp sampler, while attached
    pub fn sampler(&self) -> Option<StateId> {
        self.sampler
    }

    /// True once the technique has been resolved
    pub fn is_ready(&self) -> bool {
        !self.technique_name.is_empty() && !self.passes.is_empty()
    }
}

/// Run one full-screen pass reading `source` and writing `destination`
pub(crate) fn fullscreen_pass(
    device: &mut dyn DeviceContext,
    pass: &ShaderPass,
    sampler: Option<StateId>,
    source: TargetRef,
    destination: TargetRef,
    size: (u32, u32),
    constants: &PostEffectConstants,
) {
    if pass.is_null() {
        return;
    }
    device.set_render_targets(Some(destination), None);
    device.set_viewport(&Viewport::new(size.0 as f32, size.1 as f32));
    device.bind_pass(pass);
    if let Some(sampler) = sampler {
        device.bind_sampler(0, sampler);
    }
    device.update_constants(constant_slots::POST_EFFECT, bytemuck::bytes_of(constants));
    device.bind_texture(0, source);
    device.draw_fullscreen_quad();
}

/// Vertical then horizontal blur, `iterations` times, inside a ping-pong pair
///
/// The blurred image ends up in `targets.current()`.
pub(crate) fn separable_blur(
    device: &mut dyn DeviceContext,
    vertical: &ShaderPass,
    horizontal: &ShaderPass,
    sampler: Option<StateId>,
    targets: &mut PingPong,
    iterations: u32,
    scale: [f32; 2],
) {
    let size = targets.size();
    let constants = PostEffectConstants::new([0.0; 4], [scale[0], scale[1], 0.0, 0.0], size.0, size.1);
    for _ in 0..iterations {
        for pass in [vertical, horizontal] {
            let (Some(source), Some(destination)) = (targets.current(), targets.next()) else {
                return;
            };
            fullscreen_pass(
                device,
                pass,
                sampler,
                TargetRef::Texture(source),
                TargetRef::Texture(destination),
                size,
                &constants,
            );
            targets.swap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_list_with_attributes() {
        let entries = EffectAttributes::parse_list("outline[color:#FF0000;scale:2] xray").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name(), "outline");
        assert_eq!(entries[0].get("color"), Some("#FF0000"));
        assert_eq!(entries[0].get_f32("scale"), Some(2.0));
        assert_eq!(entries[1], EffectAttributes::new("xray"));
    }

    #[test]
    fn test_comma_separated_entries_and_rgb_values() {
        let entries = EffectAttributes::parse_list("blur,border_highlight[color:0,1,0]").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].color_or([0.0; 4]), [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            EffectAttributes::parse_list("outline[color:#FF0000"),
            Err(EffectParseError::UnbalancedBrackets(_))
        ));
        assert!(matches!(
            EffectAttributes::parse_list("[color:#FF0000]"),
            Err(EffectParseError::MissingName(_))
        ));
        assert!(matches!(
            EffectAttributes::parse_list("outline[color]"),
            Err(EffectParseError::MalformedAttribute(_))
        ));
        assert!(EffectAttributes::parse_list("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_color_forms() {
        assert_eq!(parse_color("#FF0000").unwrap(), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(parse_color("#00FF00FF").unwrap(), [1.0, 0.0, 1.0, 0.0]);
        let half_red = parse_color("#80FF0000").unwrap();
        assert_eq!(half_red[..3], [1.0, 0.0, 0.0]);
        assert_relative_eq!(half_red[3], 128.0 / 255.0);
        assert_eq!(parse_color("0.5, 0.25, 1, 0.5").unwrap(), [0.5, 0.25, 1.0, 0.5]);
        assert!(parse_color("#12345").is_err());
        assert!(parse_color("red").is_err());
    }

    #[test]
    fn test_invalid_color_falls_back() {
        let attrs = EffectAttributes::new("outline").with("color", "nope");
        assert_eq!(attrs.color_or([0.1, 0.2, 0.3, 0.4]), [0.1, 0.2, 0.3, 0.4]);
    }
}
