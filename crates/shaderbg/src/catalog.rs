use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use renderer::{
    builtin_effects, EffectRegistry, InputHub, RenderSurface, WgpuSurface, DEFAULT_EFFECT_INDEX,
    FALLBACK_EFFECT,
};
use tracing::warn;
use wallconfig::WallConfig;

use crate::state::AppState;

/// Registry of the built-in effects with the configured fallback applied.
pub fn build_registry(
    config: &WallConfig,
    input: Arc<InputHub>,
) -> Result<EffectRegistry<WgpuSurface>> {
    let registry =
        EffectRegistry::register(builtin_effects(input)).context("invalid effect catalog")?;
    let fallback_name = config.effects.fallback.as_deref().unwrap_or(FALLBACK_EFFECT);
    let fallback = match registry.position(fallback_name) {
        Some(index) => index,
        None => {
            warn!(name = fallback_name, "unknown fallback effect in config; using {FALLBACK_EFFECT}");
            registry.position(FALLBACK_EFFECT).unwrap_or(0)
        }
    };
    Ok(registry.with_fallback(fallback))
}

/// Default used when no `--effect`/`SHADER_BG_EFFECT` hint is given: the
/// config file's `effects.default`, then the last selection, then the
/// built-in default.
pub fn startup_default<S: RenderSurface>(
    registry: &EffectRegistry<S>,
    config: &WallConfig,
    state: &AppState,
) -> usize {
    if let Some(name) = config.effects.default.as_deref() {
        match registry.position(name) {
            Some(index) => return index,
            None => warn!(name, "unknown default effect in config; ignoring"),
        }
    }
    state
        .last_effect
        .as_deref()
        .and_then(|name| registry.position(name))
        .unwrap_or(DEFAULT_EFFECT_INDEX)
}

/// One line per effect: index, stable name, alias and display name. The
/// `selected` entry is marked with `*`.
pub fn render_catalog<S: RenderSurface>(registry: &EffectRegistry<S>, selected: usize) -> String {
    let mut out = String::new();
    for (index, descriptor) in registry.descriptors().iter().enumerate() {
        let marker = if index == selected { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "{marker} {index:>2}  {:<22} {:<8} {}",
            descriptor.stable_name,
            descriptor.alias.unwrap_or("-"),
            descriptor.display_name,
        );
    }
    out
}
