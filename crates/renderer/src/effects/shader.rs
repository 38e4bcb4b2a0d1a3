use std::sync::Arc;
use std::time::Instant;

use wgpu::util::DeviceExt;

use crate::effect::{Effect, EffectError, UpdateCadence};
use crate::gpu::{self, FrameUniforms, GpuDevice, WgpuSurface};
use crate::input::InputHub;
use crate::types::{DisplayId, ViewportSize};

use super::DEFAULT_RATE;

/// Static description of a full-screen fragment effect.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ShaderSpec {
    pub name: &'static str,
    pub display_name: &'static str,
    /// WGSL defining `fs_main`; `common.wgsl` is prepended.
    pub source: &'static str,
    pub time_scale: f32,
}

struct ShaderResources {
    gpu: GpuDevice,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl ShaderResources {
    fn new(gpu: &GpuDevice, spec: &ShaderSpec, uniforms: &FrameUniforms) -> Self {
        let layout = gpu::uniform_binding(&gpu.device);
        let pipeline =
            gpu::fullscreen_pipeline(&gpu.device, gpu.format, &layout, spec.name, spec.source);
        let uniform_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("frame uniforms"),
                contents: bytemuck::bytes_of(uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame uniforms"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        Self {
            gpu: gpu.clone(),
            pipeline,
            uniform_buffer,
            bind_group,
        }
    }
}

/// Full-screen fragment shader animated by time and, for interactive
/// effects, pointer input.
pub(crate) struct ShaderEffect {
    spec: ShaderSpec,
    input: Option<Arc<InputHub>>,
    display: Option<DisplayId>,
    cadence: UpdateCadence,
    started: Option<Instant>,
    uniforms: FrameUniforms,
    dirty: bool,
    resources: Option<ShaderResources>,
}

impl ShaderEffect {
    pub fn new(spec: ShaderSpec) -> Self {
        Self {
            spec,
            input: None,
            display: None,
            cadence: UpdateCadence::new(DEFAULT_RATE),
            started: None,
            uniforms: FrameUniforms::new(ViewportSize::default()),
            dirty: false,
            resources: None,
        }
    }

    pub fn interactive(spec: ShaderSpec, input: Arc<InputHub>) -> Self {
        Self {
            input: Some(input),
            ..Self::new(spec)
        }
    }
}

impl Effect<WgpuSurface> for ShaderEffect {
    fn name(&self) -> &'static str {
        self.spec.name
    }

    fn display_name(&self) -> &'static str {
        self.spec.display_name
    }

    fn bind_display(&mut self, display: DisplayId) {
        self.display = Some(display);
    }

    fn setup(&mut self, gpu: &GpuDevice, size: ViewportSize) -> Result<(), EffectError> {
        self.uniforms.set_resolution(size);
        let spec = self.spec;
        let uniforms = self.uniforms;
        let resources = gpu::with_error_scope(&gpu.device, || {
            ShaderResources::new(gpu, &spec, &uniforms)
        })?;
        self.resources = Some(resources);
        self.dirty = true;
        Ok(())
    }

    fn update_viewport_size(&mut self, size: ViewportSize) {
        self.uniforms.set_resolution(size);
        self.dirty = true;
    }

    fn update(&mut self, now: Instant) {
        if self.cadence.step(now).is_none() {
            return;
        }
        let started = *self.started.get_or_insert(now);
        self.uniforms.time = now.saturating_duration_since(started).as_secs_f32() * self.spec.time_scale;
        if let (Some(input), Some(display)) = (&self.input, self.display) {
            self.uniforms.set_input(&input.snapshot(display, now));
        }
        self.dirty = true;
    }

    fn draw(&mut self, surface: &WgpuSurface) {
        if !self.dirty {
            return;
        }
        let Some(resources) = self.resources.as_ref() else {
            return;
        };
        let Some(frame) = surface.acquire() else {
            return;
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        resources.gpu.queue.write_buffer(
            &resources.uniform_buffer,
            0,
            bytemuck::bytes_of(&self.uniforms),
        );
        let mut encoder = resources
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(self.spec.name),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(self.spec.name),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&resources.pipeline);
            pass.set_bind_group(0, &resources.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        resources.gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.dirty = false;
    }

    fn set_update_rate(&mut self, rate: f64) {
        self.cadence.set_rate(rate);
        self.uniforms.rate = rate as f32;
    }
}
