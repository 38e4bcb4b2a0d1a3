use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use winit::window::Window;

use crate::display::PlatformError;
use crate::types::ViewportSize;

use super::surface::{GpuDevice, WgpuSurface};

/// Adapter and device shared by every wallpaper surface.
struct SharedDevice {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl SharedDevice {
    fn new(instance: &wgpu::Instance, compatible: &wgpu::Surface<'_>) -> Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: Some(compatible),
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        tracing::info!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("shader-bg device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        device.on_uncaptured_error(Box::new(|err| {
            tracing::error!(error = %err, "uncaptured GPU error");
        }));

        Ok(Self {
            adapter,
            device,
            queue,
        })
    }
}

/// Owns the `wgpu` instance and hands out one [`WgpuSurface`] per window.
pub struct GpuContext {
    instance: wgpu::Instance,
    shared: Option<SharedDevice>,
}

impl GpuContext {
    pub fn new() -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });
        Self {
            instance,
            shared: None,
        }
    }

    /// Creates a surface for `window`, picking the adapter on first use.
    pub fn create_surface(
        &mut self,
        window: Arc<Window>,
        size: ViewportSize,
    ) -> Result<Arc<WgpuSurface>, PlatformError> {
        let surface = self
            .instance
            .create_surface(Arc::clone(&window))
            .map_err(|err| PlatformError::Surface(err.to_string()))?;

        let shared = match self.shared.take() {
            Some(shared) => shared,
            None => SharedDevice::new(&self.instance, &surface)
                .map_err(|err| PlatformError::Surface(format!("{err:#}")))?,
        };
        let shared = self.shared.insert(shared);
        if !shared.adapter.is_surface_supported(&surface) {
            return Err(PlatformError::Surface(
                "selected GPU adapter cannot present to this display".to_string(),
            ));
        }

        let gpu = GpuDevice {
            device: shared.device.clone(),
            queue: shared.queue.clone(),
            format: wgpu::TextureFormat::Bgra8Unorm,
        };
        WgpuSurface::new(window, surface, &shared.adapter, gpu, size)
            .map(Arc::new)
            .map_err(|err| PlatformError::Surface(format!("{err:#}")))
    }
}

impl Default for GpuContext {
    fn default() -> Self {
        Self::new()
    }
}
