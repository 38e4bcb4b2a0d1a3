use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wgpu::util::DeviceExt;

use crate::effect::{Effect, EffectError, UpdateCadence};
use crate::gpu::{self, FrameUniforms, GpuDevice, PointInstance, WgpuSurface};
use crate::types::ViewportSize;

use super::DEFAULT_RATE;

/// Longest simulation step; longer gaps (sleep, occlusion) are clamped so
/// particles do not tunnel.
const MAX_STEP: Duration = Duration::from_millis(100);

/// CPU-side particle system rendered as instanced point sprites.
pub(crate) trait ParticleSim: Send + 'static {
    /// Number of particles appropriate for `size`.
    fn budget(&self, size: ViewportSize) -> usize;

    /// Re-seeds `count` particles around the viewport centre.
    fn reset(&mut self, size: ViewportSize, count: usize, rng: &mut StdRng);

    fn step(&mut self, dt: f32, time: f32, size: ViewportSize);

    fn write(&self, size: ViewportSize, time: f32, out: &mut Vec<PointInstance>);
}

struct ParticleResources {
    gpu: GpuDevice,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    instance_buffer: wgpu::Buffer,
    capacity: usize,
}

fn instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("particle instances"),
        size: (std::mem::size_of::<PointInstance>() * capacity.max(1)) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

impl ParticleResources {
    fn new(gpu: &GpuDevice, label: &str, uniforms: &FrameUniforms, capacity: usize) -> Self {
        let layout = gpu::uniform_binding(&gpu.device);
        let pipeline = gpu::point_pipeline(&gpu.device, gpu.format, &layout, label);
        let uniform_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("particle uniforms"),
                contents: bytemuck::bytes_of(uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("particle uniforms"),
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
            instance_buffer: instance_buffer(&gpu.device, capacity),
            capacity,
        }
    }
}

pub(crate) struct ParticleEffect<S: ParticleSim> {
    name: &'static str,
    display_name: &'static str,
    sim: S,
    rng: StdRng,
    size: ViewportSize,
    count: usize,
    cadence: UpdateCadence,
    started: Option<Instant>,
    uniforms: FrameUniforms,
    instances: Vec<PointInstance>,
    dirty: bool,
    resources: Option<ParticleResources>,
}

impl<S: ParticleSim> ParticleEffect<S> {
    pub fn new(name: &'static str, display_name: &'static str, sim: S) -> Self {
        Self {
            name,
            display_name,
            sim,
            rng: StdRng::from_entropy(),
            size: ViewportSize::default(),
            count: 0,
            cadence: UpdateCadence::new(DEFAULT_RATE),
            started: None,
            uniforms: FrameUniforms::new(ViewportSize::default()),
            instances: Vec::new(),
            dirty: false,
            resources: None,
        }
    }

    #[cfg(test)]
    fn seeded(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn elapsed(&self, now: Instant) -> f32 {
        self.started
            .map_or(0.0, |started| now.saturating_duration_since(started).as_secs_f32())
    }

    fn reseed(&mut self, size: ViewportSize) {
        self.size = size;
        self.count = self.sim.budget(size);
        self.sim.reset(size, self.count, &mut self.rng);
        self.uniforms.set_resolution(size);
        self.instances.clear();
        self.sim.write(size, self.uniforms.time, &mut self.instances);
        self.dirty = true;
    }
}

impl<S: ParticleSim> Effect<WgpuSurface> for ParticleEffect<S> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn display_name(&self) -> &'static str {
        self.display_name
    }

    fn setup(&mut self, gpu: &GpuDevice, size: ViewportSize) -> Result<(), EffectError> {
        self.reseed(size);
        let name = self.name;
        let uniforms = self.uniforms;
        let capacity = self.count;
        let resources = gpu::with_error_scope(&gpu.device, || {
            ParticleResources::new(gpu, name, &uniforms, capacity)
        })?;
        self.resources = Some(resources);
        Ok(())
    }

    fn update_viewport_size(&mut self, size: ViewportSize) {
        self.size = size;
        self.uniforms.set_resolution(size);
        self.dirty = true;
    }

    fn handle_significant_resize(&mut self, size: ViewportSize) {
        self.reseed(size);
        if let Some(resources) = self.resources.as_mut() {
            if self.count > resources.capacity {
                tracing::debug!(
                    effect = self.name,
                    from = resources.capacity,
                    to = self.count,
                    "growing particle buffer"
                );
                resources.instance_buffer = instance_buffer(&resources.gpu.device, self.count);
                resources.capacity = self.count;
            }
        }
    }

    fn update(&mut self, now: Instant) {
        let Some(dt) = self.cadence.step(now) else {
            return;
        };
        self.started.get_or_insert(now);
        let time = self.elapsed(now);
        self.uniforms.time = time;
        self.sim
            .step(dt.min(MAX_STEP).as_secs_f32(), time, self.size);
        self.instances.clear();
        self.sim.write(self.size, time, &mut self.instances);
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
        let visible = self.instances.len().min(resources.capacity);
        let queue = &resources.gpu.queue;
        queue.write_buffer(&resources.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));
        queue.write_buffer(
            &resources.instance_buffer,
            0,
            bytemuck::cast_slice(&self.instances[..visible]),
        );

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = resources
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(self.name),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(self.name),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.0,
                            g: 0.0,
                            b: 0.015,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&resources.pipeline);
            pass.set_bind_group(0, &resources.bind_group, &[]);
            pass.set_vertex_buffer(0, resources.instance_buffer.slice(..));
            pass.draw(0..6, 0..visible as u32);
        }
        queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.dirty = false;
    }

    fn set_update_rate(&mut self, rate: f64) {
        self.cadence.set_rate(rate);
        self.uniforms.rate = rate as f32;
    }
}

fn to_clip(size: ViewportSize, x: f32, y: f32) -> [f32; 2] {
    let [w, h] = size.as_f32();
    [x / w.max(1.0) * 2.0 - 1.0, 1.0 - y / h.max(1.0) * 2.0]
}

#[derive(Debug, Clone, Copy, Default)]
struct Body {
    position: [f32; 2],
    velocity: [f32; 2],
    hue: f32,
}

/// Particles orbiting a slowly wandering attractor.
#[derive(Debug, Default)]
pub(crate) struct GravityWell {
    bodies: Vec<Body>,
}

impl GravityWell {
    const STRENGTH: f32 = 90_000.0;
    const SOFTENING: f32 = 400.0;

    fn attractor(size: ViewportSize, time: f32) -> [f32; 2] {
        let [w, h] = size.as_f32();
        [
            w * 0.5 + (time * 0.13).sin() * w * 0.12,
            h * 0.5 + (time * 0.17).cos() * h * 0.12,
        ]
    }
}

impl ParticleSim for GravityWell {
    fn budget(&self, size: ViewportSize) -> usize {
        (size.area() / 1_500).clamp(400, 3_000) as usize
    }

    fn reset(&mut self, size: ViewportSize, count: usize, rng: &mut StdRng) {
        let [w, h] = size.as_f32();
        let centre = [w * 0.5, h * 0.5];
        let spread = w.min(h) * 0.45;
        self.bodies = (0..count)
            .map(|_| {
                let angle = rng.gen_range(0.0..std::f32::consts::TAU);
                let radius = spread * rng.gen_range(0.05f32..1.0).sqrt();
                let speed = (Self::STRENGTH / (radius + 40.0)).sqrt() * rng.gen_range(0.8..1.1);
                Body {
                    position: [
                        centre[0] + angle.cos() * radius,
                        centre[1] + angle.sin() * radius,
                    ],
                    velocity: [-angle.sin() * speed, angle.cos() * speed],
                    hue: rng.gen_range(0.0..1.0),
                }
            })
            .collect();
    }

    fn step(&mut self, dt: f32, time: f32, size: ViewportSize) {
        let anchor = Self::attractor(size, time);
        for body in &mut self.bodies {
            let dx = anchor[0] - body.position[0];
            let dy = anchor[1] - body.position[1];
            let dist_sq = dx * dx + dy * dy + Self::SOFTENING;
            let inv = Self::STRENGTH / (dist_sq * dist_sq.sqrt());
            body.velocity[0] += dx * inv * dt;
            body.velocity[1] += dy * inv * dt;
            body.velocity[0] *= 0.999;
            body.velocity[1] *= 0.999;
            body.position[0] += body.velocity[0] * dt;
            body.position[1] += body.velocity[1] * dt;
        }
    }

    fn write(&self, size: ViewportSize, _time: f32, out: &mut Vec<PointInstance>) {
        out.extend(self.bodies.iter().map(|body| {
            let speed = body.velocity[0].hypot(body.velocity[1]);
            let heat = (speed / 400.0).clamp(0.0, 1.0);
            PointInstance {
                position: to_clip(size, body.position[0], body.position[1]),
                size: 1.5 + heat * 1.5,
                glow: 0.6,
                color: [0.4 + 0.6 * heat, 0.5 + 0.3 * body.hue, 1.0 - 0.5 * heat, 0.8],
            }
        }));
    }
}

/// Lorenz attractor traced by a swarm of points, rotating about its axis.
#[derive(Debug, Default)]
pub(crate) struct LorenzSwarm {
    points: Vec<[f32; 3]>,
}

impl LorenzSwarm {
    const SIGMA: f32 = 10.0;
    const RHO: f32 = 28.0;
    const BETA: f32 = 8.0 / 3.0;
    const SPEED: f32 = 0.35;
}

impl ParticleSim for LorenzSwarm {
    fn budget(&self, _size: ViewportSize) -> usize {
        2_000
    }

    fn reset(&mut self, _size: ViewportSize, count: usize, rng: &mut StdRng) {
        self.points = (0..count)
            .map(|_| {
                [
                    rng.gen_range(-15.0..15.0),
                    rng.gen_range(-20.0..20.0),
                    rng.gen_range(5.0..40.0),
                ]
            })
            .collect();
    }

    fn step(&mut self, dt: f32, _time: f32, _size: ViewportSize) {
        let h = dt * Self::SPEED;
        for p in &mut self.points {
            let [x, y, z] = *p;
            let dx = Self::SIGMA * (y - x);
            let dy = x * (Self::RHO - z) - y;
            let dz = x * y - Self::BETA * z;
            *p = [x + dx * h, y + dy * h, z + dz * h];
        }
    }

    fn write(&self, size: ViewportSize, time: f32, out: &mut Vec<PointInstance>) {
        let [w, h] = size.as_f32();
        let scale = w.min(h) / 70.0;
        let (sin, cos) = (time * 0.1).sin_cos();
        out.extend(self.points.iter().map(|&[x, y, z]| {
            let rx = x * cos - y * sin;
            let depth = (x * sin + y * cos + 30.0) / 60.0;
            let px = w * 0.5 + rx * scale;
            let py = h * 0.5 - (z - 25.0) * scale;
            PointInstance {
                position: to_clip(size, px, py),
                size: 1.0 + depth.clamp(0.0, 1.0),
                glow: 0.3,
                color: [0.9, 0.45 + 0.4 * depth.clamp(0.0, 1.0), 0.25, 0.7],
            }
        }));
    }
}
