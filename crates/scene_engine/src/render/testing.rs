//! Recording device used by unit tests

use std::sync::Arc;

use crate::foundation::math::{Mat4, Vec3};
use crate::geometry::{Geometry, MeshData};
use crate::scene::NodeId;

use super::buffers::{BufferProxyId, GeometryBufferProxy};
use super::camera::{Camera, Viewport};
use super::context::{DrawItem, RenderContext};
use super::material::Material;
use super::post_effects::EffectAttributes;
use super::device::{DeviceContext, TargetRef, TextureDesc, TextureId};
use super::states::StateId;
use super::technique::ShaderPass;

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateTexture(TextureDesc),
    ReleaseTexture(TextureId),
    SetRenderTargets(Option<TargetRef>, Option<TargetRef>),
    ClearRenderTarget(TargetRef),
    ClearDepthStencil(TargetRef),
    SetViewport(Viewport),
    /// `(technique, pass)`
    BindPass(String, String),
    SetStencilReference(u32),
    BindTexture(u32, TargetRef),
    BindSampler(u32, StateId),
    UpdateConstants(u32, Vec<u8>),
    DrawGeometry(BufferProxyId, u32),
    DrawFullscreenQuad,
    Resolve(TargetRef, TextureId),
    Copy(TargetRef, TextureId),
}

/// Device that records every call and hands out sequential texture ids
#[derive(Debug, Default)]
pub struct RecordingDevice {
    pub calls: Vec<DeviceCall>,
    next_texture: u64,
}

impl RecordingDevice {
    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }

    /// Number of binds of a pass name
    pub fn pass_binds(&self, pass: &str) -> usize {
        self.count(|c| matches!(c, DeviceCall::BindPass(_, p) if p == pass))
    }

    /// Pass names in bind order
    pub fn bound_passes(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::BindPass(_, p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    /// Buffer ids in draw order
    pub fn drawn(&self) -> Vec<BufferProxyId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::DrawGeometry(id, _) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn live_textures(&self) -> usize {
        let created = self.count(|c| matches!(c, DeviceCall::CreateTexture(_)));
        let released = self.count(|c| matches!(c, DeviceCall::ReleaseTexture(_)));
        created - released
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl DeviceContext for RecordingDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        self.next_texture += 1;
        self.calls.push(DeviceCall::CreateTexture(*desc));
        TextureId(self.next_texture)
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.calls.push(DeviceCall::ReleaseTexture(texture));
    }

    fn set_render_targets(&mut self, color: Option<TargetRef>, depth_stencil: Option<TargetRef>) {
        self.calls.push(DeviceCall::SetRenderTargets(color, depth_stencil));
    }

    fn clear_render_target(&mut self, target: TargetRef, _color: [f32; 4]) {
        self.calls.push(DeviceCall::ClearRenderTarget(target));
    }

    fn clear_depth_stencil(&mut self, target: TargetRef, _depth: f32, _stencil: u8) {
        self.calls.push(DeviceCall::ClearDepthStencil(target));
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.calls.push(DeviceCall::SetViewport(*viewport));
    }

    fn bind_pass(&mut self, pass: &ShaderPass) {
        self.calls
            .push(DeviceCall::BindPass(pass.technique().to_string(), pass.name().to_string()));
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.calls.push(DeviceCall::SetStencilReference(reference));
    }

    fn bind_texture(&mut self, slot: u32, texture: TargetRef) {
        self.calls.push(DeviceCall::BindTexture(slot, texture));
    }

    fn bind_sampler(&mut self, slot: u32, sampler: StateId) {
        self.calls.push(DeviceCall::BindSampler(slot, sampler));
    }

    fn update_constants(&mut self, slot: u32, data: &[u8]) {
        self.calls.push(DeviceCall::UpdateConstants(slot, data.to_vec()));
    }

    fn draw_geometry(&mut self, buffers: &GeometryBufferProxy, instance_count: u32) {
        self.calls.push(DeviceCall::DrawGeometry(buffers.id(), instance_count));
    }

    fn draw_fullscreen_quad(&mut self) {
        self.calls.push(DeviceCall::DrawFullscreenQuad);
    }

    fn resolve_texture(&mut self, source: TargetRef, destination: TextureId) {
        self.calls.push(DeviceCall::Resolve(source, destination));
    }

    fn copy_texture(&mut self, source: TargetRef, destination: TextureId) {
        self.calls.push(DeviceCall::Copy(source, destination));
    }
}

/// Single triangle in the XY plane
pub fn triangle_geometry() -> Arc<Geometry> {
    Arc::new(Geometry::mesh(MeshData {
        positions: vec![Vec3::zeros(), Vec3::x(), Vec3::y()],
        indices: vec![0, 1, 2],
        ..Default::default()
    }))
}

/// Draw of a fresh triangle flagged for `effect`
pub fn draw_item(effect: &str) -> DrawItem {
    DrawItem {
        node: NodeId::default(),
        world: Mat4::identity(),
        buffers: Arc::new(GeometryBufferProxy::from_geometry(&triangle_geometry())),
        instances: None,
        material: Material::default().constants(),
        attributes: EffectAttributes::new(effect),
    }
}

/// Context with the default camera and a `width` x `height` viewport
pub fn test_context(width: u32, height: u32) -> RenderContext {
    RenderContext::new(Camera::default(), Viewport::new(width as f32, height as f32))
}
