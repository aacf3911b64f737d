//! Offscreen targets owned by post-effect cores
//!
//! Targets are created lazily on first render and recreated only when the
//! requested size changes. Textures are handed back to the host's deferred
//! release queue on detach since detaching has no device at hand.

use log::trace;

use crate::render::device::{DeviceContext, TargetRef, TextureDesc, TextureFormat, TextureId};

/// One lazily sized offscreen texture
#[derive(Debug, Clone, PartialEq)]
pub struct OffscreenTarget {
    format: TextureFormat,
    sample_count: u32,
    texture: Option<(TextureId, u32, u32)>,
}

impl OffscreenTarget {
    /// Single-sample color target
    pub fn color(format: TextureFormat) -> Self {
        Self {
            format,
            sample_count: 1,
            texture: None,
        }
    }

    /// Depth-stencil target
    pub fn depth_stencil(sample_count: u32) -> Self {
        Self {
            format: TextureFormat::Depth24Stencil8,
            sample_count: sample_count.max(1),
            texture: None,
        }
    }

    /// Texture of the requested size, recreating it when the size changed
    pub fn ensure_size(&mut self, device: &mut dyn DeviceContext, width: u32, height: u32) -> TextureId {
        let (width, height) = (width.max(1), height.max(1));
        if let Some((texture, w, h)) = self.texture {
            if w == width && h == height {
                return texture;
            }
            trace!("Resizing offscreen target {}x{} -> {}x{}", w, h, width, height);
            device.release_texture(texture);
        }
        let desc = match self.format {
            TextureFormat::Depth24Stencil8 => TextureDesc::depth_stencil(width, height, self.sample_count),
            format => TextureDesc::color(width, height, format),
        };
        let texture = device.create_texture(&desc);
        self.texture = Some((texture, width, height));
        texture
    }

    /// Current texture, if created
    pub fn texture(&self) -> Option<TextureId> {
        self.texture.map(|(t, _, _)| t)
    }

    /// Current texture as a bindable target
    pub fn target(&self) -> Option<TargetRef> {
        self.texture().map(TargetRef::Texture)
    }

    /// Current size, `(0, 0)` before creation
    pub fn size(&self) -> (u32, u32) {
        self.texture.map_or((0, 0), |(_, w, h)| (w, h))
    }

    /// Forget the texture and return it for release
    pub fn take(&mut self) -> Option<TextureId> {
        self.texture.take().map(|(t, _, _)| t)
    }
}

/// Two same-sized targets that alternate as source and destination
#[derive(Debug, Clone, PartialEq)]
pub struct PingPong {
    targets: [OffscreenTarget; 2],
    current: usize,
}

impl PingPong {
    /// Pair of color targets
    pub fn new(format: TextureFormat) -> Self {
        Self {
            targets: [OffscreenTarget::color(format), OffscreenTarget::color(format)],
            current: 0,
        }
    }

    /// Size both targets; resets which one is current
    pub fn ensure_size(&mut self, device: &mut dyn DeviceContext, width: u32, height: u32) {
        for target in &mut self.targets {
            target.ensure_size(device, width, height);
        }
        self.current = 0;
    }

    /// Texture holding the latest result
    pub fn current(&self) -> Option<TextureId> {
        self.targets[self.current].texture()
    }

    /// Texture the next pass writes to
    pub fn next(&self) -> Option<TextureId> {
        self.targets[1 - self.current].texture()
    }

    /// Exchange source and destination
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Size of the pair
    pub fn size(&self) -> (u32, u32) {
        self.targets[0].size()
    }

    /// Forget both textures and return them for release
    pub fn take(&mut self) -> Vec<TextureId> {
        self.current = 0;
        self.targets.iter_mut().filter_map(OffscreenTarget::take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{DeviceCall, RecordingDevice};

    #[test]
    fn test_target_is_recreated_only_on_resize() {
        let mut device = RecordingDevice::default();
        let mut target = OffscreenTarget::color(TextureFormat::Rgba8);
        let a = target.ensure_size(&mut device, 64, 32);
        let b = target.ensure_size(&mut device, 64, 32);
        assert_eq!(a, b);
        assert_eq!(device.count(|c| matches!(c, DeviceCall::CreateTexture(_))), 1);

        let c = target.ensure_size(&mut device, 128, 32);
        assert_ne!(a, c);
        assert!(device.calls.contains(&DeviceCall::ReleaseTexture(a)));
        assert_eq!(target.size(), (128, 32));
    }

    #[test]
    fn test_ping_pong_swaps() {
        let mut device = RecordingDevice::default();
        let mut pair = PingPong::new(TextureFormat::Rgba8);
        assert!(pair.current().is_none());
        pair.ensure_size(&mut device, 16, 16);
        let (first, second) = (pair.current().unwrap(), pair.next().unwrap());
        assert_ne!(first, second);
        pair.swap();
        assert_eq!(pair.current(), Some(second));
        assert_eq!(pair.take().len(), 2);
        assert_eq!(pair.size(), (0, 0));
    }
}
