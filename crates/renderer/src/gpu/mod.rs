//! `wgpu` backend for wallpaper surfaces.
//!
//! - `context` owns the instance plus the adapter/device shared by every
//!   display, created lazily against the first surface.
//! - `surface` implements [`crate::RenderSurface`] for one winit window and
//!   hides swapchain loss behind `acquire`.
//! - `pipeline` builds the two pipeline shapes effects use: a full-screen
//!   fragment pass and instanced point sprites.
//! - `uniforms` holds the `bytemuck` layouts shared with the WGSL sources.

mod context;
mod pipeline;
mod surface;
mod uniforms;

pub use context::GpuContext;
pub use surface::{GpuDevice, WgpuSurface};
pub(crate) use pipeline::{fullscreen_pipeline, point_pipeline, uniform_binding};
pub(crate) use uniforms::{FrameUniforms, PointInstance};

use crate::effect::EffectError;

/// Runs `build` inside validation and out-of-memory error scopes so resource
/// creation failures surface as [`EffectError::Gpu`] instead of reaching the
/// device's uncaptured-error handler.
pub(crate) fn with_error_scope<T>(
    device: &wgpu::Device,
    build: impl FnOnce() -> T,
) -> Result<T, EffectError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    match validation.or(out_of_memory) {
        Some(err) => Err(EffectError::Gpu(err.to_string())),
        None => Ok(value),
    }
}
