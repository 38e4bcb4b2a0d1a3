//! Built-in effects.
//!
//! Two families: full-screen WGSL fragment shaders ([`shader`]) and CPU
//! particle simulations drawn as instanced point sprites ([`particles`]).
//! Both advance their animation only at the rate the pacing policy hands
//! them and skip presenting when nothing changed.

mod particles;
mod shader;

use std::sync::Arc;

use crate::effect::{Effect, EffectDescriptor};
use crate::gpu::WgpuSurface;
use crate::input::InputHub;

use particles::{GravityWell, LorenzSwarm, ParticleEffect};
use shader::{ShaderEffect, ShaderSpec};

/// Update rate effects use until the pacing policy publishes one.
pub(crate) const DEFAULT_RATE: f64 = 30.0;

/// Stable name of the effect constructed when another one fails setup.
pub const FALLBACK_EFFECT: &str = "noise_halo";

const NOISE_HALO: ShaderSpec = ShaderSpec {
    name: "noise_halo",
    display_name: "Noise Halo",
    source: include_str!("shaders/noise_halo.wgsl"),
    time_scale: 1.0,
};

const SIMPLE_PLASMA: ShaderSpec = ShaderSpec {
    name: "simple_plasma",
    display_name: "Simple Plasma",
    source: include_str!("shaders/plasma.wgsl"),
    time_scale: 1.0,
};

const GALAXY_SPIRAL: ShaderSpec = ShaderSpec {
    name: "galaxy_spiral",
    display_name: "Galaxy Spiral",
    source: include_str!("shaders/galaxy_spiral.wgsl"),
    time_scale: 1.0,
};

const RAIN_RIPPLES: ShaderSpec = ShaderSpec {
    name: "rain_ripples",
    display_name: "Rain Ripples",
    source: include_str!("shaders/rain_ripples.wgsl"),
    time_scale: 1.0,
};

fn boxed(effect: impl Effect<WgpuSurface> + 'static) -> Box<dyn Effect<WgpuSurface>> {
    Box::new(effect)
}

/// The built-in registry contents, in selection order.
pub fn builtin_effects(input: Arc<InputHub>) -> Vec<EffectDescriptor<WgpuSurface>> {
    vec![
        EffectDescriptor::new(NOISE_HALO.name, NOISE_HALO.display_name, || {
            boxed(ShaderEffect::new(NOISE_HALO))
        })
        .with_alias("noise"),
        EffectDescriptor::new("particles_in_gravity", "Particles in Gravity", || {
            boxed(ParticleEffect::new(
                "particles_in_gravity",
                "Particles in Gravity",
                GravityWell::default(),
            ))
        })
        .with_alias("gravity"),
        EffectDescriptor::new("rotating_lorenz", "Rotating Lorenz", || {
            boxed(ParticleEffect::new(
                "rotating_lorenz",
                "Rotating Lorenz",
                LorenzSwarm::default(),
            ))
        })
        .with_alias("lorenz"),
        EffectDescriptor::new(SIMPLE_PLASMA.name, SIMPLE_PLASMA.display_name, || {
            boxed(ShaderEffect::new(SIMPLE_PLASMA))
        })
        .with_alias("plasma"),
        EffectDescriptor::new(GALAXY_SPIRAL.name, GALAXY_SPIRAL.display_name, || {
            boxed(ShaderEffect::new(GALAXY_SPIRAL))
        })
        .with_alias("galaxy"),
        EffectDescriptor::new(RAIN_RIPPLES.name, RAIN_RIPPLES.display_name, move || {
            boxed(ShaderEffect::interactive(RAIN_RIPPLES, Arc::clone(&input)))
        })
        .with_alias("ripples")
        .interactive(),
    ]
}
