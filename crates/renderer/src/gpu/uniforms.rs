use bytemuck::{Pod, Zeroable};

use crate::input::{InputSnapshot, MAX_RIPPLES, RIPPLE_LIFETIME};
use crate::types::ViewportSize;

/// Per-frame uniform block shared by every WGSL effect (`Frame` in
/// `common.wgsl`). 160 bytes, std140-compatible.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct FrameUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub rate: f32,
    /// xy: normalised pointer, z: pointer active, w: ripple count.
    pub pointer: [f32; 4],
    /// xy: normalised position, z: age in seconds, w: strength.
    pub ripples: [[f32; 4]; MAX_RIPPLES],
}

impl FrameUniforms {
    pub fn new(size: ViewportSize) -> Self {
        Self {
            resolution: size.as_f32(),
            ..Self::zeroed()
        }
    }

    pub fn set_resolution(&mut self, size: ViewportSize) {
        self.resolution = size.as_f32();
    }

    pub fn set_input(&mut self, input: &InputSnapshot) {
        let pointer = input.pointer.unwrap_or([-1.0, -1.0]);
        let count = input.ripples.len().min(MAX_RIPPLES);
        self.pointer = [
            pointer[0],
            pointer[1],
            if input.active { 1.0 } else { 0.0 },
            count as f32,
        ];
        self.ripples = [[0.0; 4]; MAX_RIPPLES];
        let lifetime = RIPPLE_LIFETIME.as_secs_f32();
        for (slot, ripple) in self.ripples.iter_mut().zip(&input.ripples) {
            let strength = (1.0 - ripple.age / lifetime).clamp(0.0, 1.0);
            *slot = [ripple.position[0], ripple.position[1], ripple.age, strength];
        }
    }
}

/// One instanced point sprite: clip-space centre, size in pixels and colour.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub(crate) struct PointInstance {
    pub position: [f32; 2],
    pub size: f32,
    pub glow: f32,
    pub color: [f32; 4],
}

impl PointInstance {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32x4];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PointInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }
}
