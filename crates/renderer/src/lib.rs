//! Render lifecycle and frame pacing for shader-bg.
//!
//! One wallpaper window per active display, each with its own effect
//! instance. The pieces fit together like this:
//!
//! ```text
//!   EffectRegistry ── SelectionCell ──┐
//!                                     ▼
//!   DisplayManager ──▶ SurfaceCoordinator (per display) ◀── PaceCell ◀── PacingPolicy
//!        │                   ▲    │
//!        │ rebuild           │    └─▶ Effect::update / Effect::draw
//!        ▼                   │
//!   DisplayPlatform     FrameDriver (thread per display)
//! ```
//!
//! `SurfaceCoordinator` owns the effect and serialises construction,
//! switching, ticking and teardown behind a single render guard so an effect
//! is never drawn while it is being replaced or released. `DisplayManager`
//! reacts to topology and session changes by tearing every binding down and
//! rebuilding from a fresh enumeration.
//!
//! Everything above the `gpu`, `effects` and `window` modules is generic over
//! [`RenderSurface`] and [`DisplayPlatform`], which keeps the lifecycle logic
//! testable without a GPU or a window system.

pub mod cell;
pub mod coordinator;
pub mod display;
pub mod driver;
pub mod effect;
pub mod effects;
pub mod gpu;
pub mod input;
pub mod registry;
pub mod resize;
pub mod types;
pub mod window;

#[cfg(test)]
mod testing;

pub use cell::{ObserverId, PaceCell, SelectionCell, WatchCell};
pub use coordinator::{
    CoordinatorOptions, CoordinatorPhase, CoordinatorStats, SurfaceCoordinator, SwitchOutcome,
    TickOutcome,
};
pub use display::{
    DisplayEvent, DisplayManager, DisplayPlatform, ManagerOptions, PlatformError, SessionState,
    WallpaperWindow,
};
pub use driver::FrameDriver;
pub use effect::{
    Effect, EffectDescriptor, EffectError, EffectFactory, RenderSurface, UpdateCadence,
};
pub use effects::{builtin_effects, FALLBACK_EFFECT};
pub use gpu::{GpuContext, GpuDevice, WgpuSurface};
pub use input::{InputHub, InputListener, InputSink, InputSnapshot, Ripple, MAX_RIPPLES};
pub use registry::{EffectRegistry, RegistryError, DEFAULT_EFFECT_INDEX};
pub use resize::{ResizeKind, ResizePolicy};
pub use types::{Display, DisplayId, DisplayPower, NativeWindowId, ViewportSize};
pub use window::{layout_fingerprint, WinitPlatform, WinitWallpaperWindow};

pub use pacing::{Pace, PacingTier};
