use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use winit::window::Window;

use crate::effect::RenderSurface;
use crate::types::ViewportSize;

/// What effects allocate against: shared device and queue plus the format of
/// the surface they will draw into.
#[derive(Clone)]
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub format: wgpu::TextureFormat,
}

pub struct WgpuSurface {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    gpu: GpuDevice,
    config: Mutex<wgpu::SurfaceConfiguration>,
    /// Latest size reported by the event loop, packed as `width << 32 | height`.
    /// Frame threads read it without touching the window.
    size: AtomicU64,
}

impl WgpuSurface {
    pub(crate) fn new(
        window: Arc<Window>,
        surface: wgpu::Surface<'static>,
        adapter: &wgpu::Adapter,
        mut gpu: GpuDevice,
        size: ViewportSize,
    ) -> Result<Self> {
        let caps = surface.get_capabilities(adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        let present_mode = if caps.present_modes.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            caps.present_modes
                .first()
                .copied()
                .ok_or_else(|| anyhow!("surface reports no present modes"))?
        };
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        tracing::debug!(?format, ?present_mode, size = %size, "configuring wallpaper surface");

        gpu.format = format;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        if !size.is_empty() {
            surface.configure(&gpu.device, &config);
        }

        Ok(Self {
            window,
            surface,
            gpu,
            config: Mutex::new(config),
            size: AtomicU64::new(pack(size)),
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Records a size change observed on the event-loop thread.
    pub fn note_resized(&self, size: ViewportSize) {
        self.size.store(pack(size), Ordering::Release);
    }

    /// Next swapchain texture, or `None` when this frame should be skipped.
    /// Lost and outdated swapchains are reconfigured for the next frame.
    pub fn acquire(&self) -> Option<wgpu::SurfaceTexture> {
        match self.surface.get_current_texture() {
            Ok(frame) => Some(frame),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let config = self.config.lock();
                tracing::debug!(width = config.width, height = config.height, "surface lost; reconfiguring");
                self.surface.configure(&self.gpu.device, &config);
                None
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::trace!("surface timeout; skipping frame");
                None
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                tracing::error!("surface out of memory; skipping frame");
                None
            }
            Err(other) => {
                tracing::warn!(error = ?other, "surface error; skipping frame");
                None
            }
        }
    }
}

impl RenderSurface for WgpuSurface {
    type Device = GpuDevice;

    fn device(&self) -> &GpuDevice {
        &self.gpu
    }

    fn drawable_size(&self) -> ViewportSize {
        unpack(self.size.load(Ordering::Acquire))
    }

    fn reconfigure(&self, size: ViewportSize) {
        if size.is_empty() {
            return;
        }
        let mut config = self.config.lock();
        if config.width == size.width && config.height == size.height {
            return;
        }
        config.width = size.width;
        config.height = size.height;
        self.surface.configure(&self.gpu.device, &config);
    }
}

fn pack(size: ViewportSize) -> u64 {
    (u64::from(size.width) << 32) | u64::from(size.height)
}

fn unpack(value: u64) -> ViewportSize {
    ViewportSize::new((value >> 32) as u32, value as u32)
}
