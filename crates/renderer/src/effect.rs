use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::types::{DisplayId, ViewportSize};

/// Render target owned by one wallpaper window.
///
/// Implementations are shared between the control thread (which resizes and
/// tears them down) and the frame driver (which draws), so everything goes
/// through `&self`.
pub trait RenderSurface: Send + Sync + 'static {
    /// GPU handle effects allocate their resources against.
    type Device: Send + Sync;

    fn device(&self) -> &Self::Device;

    /// Current drawable size; zero while the window is hidden or minimised.
    fn drawable_size(&self) -> ViewportSize;

    /// Brings the swapchain in line with `size` before an effect is built or
    /// resized against it.
    fn reconfigure(&self, _size: ViewportSize) {}
}

#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("GPU rejected effect resources: {0}")]
    Gpu(String),
    #[error("effect setup failed: {0}")]
    Setup(String),
    #[error("effect setup panicked: {0}")]
    Panicked(String),
}

/// A visual effect instance bound to one surface.
///
/// All hooks run on the frame driver thread while the owning coordinator
/// holds its guard, so implementations never see concurrent calls.
pub trait Effect<S: RenderSurface>: Send {
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str {
        self.name()
    }

    fn preferred_rate_when_visible(&self) -> u32 {
        60
    }

    fn preferred_rate_when_occluded(&self) -> u32 {
        30
    }

    /// Called once before setup so input-aware effects can filter per display.
    fn bind_display(&mut self, _display: DisplayId) {}

    /// Allocates GPU resources. A failure here discards the instance.
    fn setup(&mut self, device: &S::Device, size: ViewportSize) -> Result<(), EffectError>;

    fn update_viewport_size(&mut self, size: ViewportSize);

    /// Resize large enough to warrant rebuilding size-dependent state.
    fn handle_significant_resize(&mut self, size: ViewportSize) {
        self.update_viewport_size(size);
    }

    fn update(&mut self, now: Instant);

    fn draw(&mut self, surface: &S);

    /// Simulation rate in updates per second chosen by the pacing policy.
    fn set_update_rate(&mut self, _rate: f64) {}
}

pub type EffectFactory<S> = Arc<dyn Fn() -> Box<dyn Effect<S>> + Send + Sync>;

/// Registry entry: names plus a factory producing fresh instances.
pub struct EffectDescriptor<S: RenderSurface> {
    pub stable_name: &'static str,
    pub display_name: &'static str,
    pub alias: Option<&'static str>,
    pub interactive: bool,
    factory: EffectFactory<S>,
}

impl<S: RenderSurface> EffectDescriptor<S> {
    pub fn new(
        stable_name: &'static str,
        display_name: &'static str,
        factory: impl Fn() -> Box<dyn Effect<S>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            stable_name,
            display_name,
            alias: None,
            interactive: false,
            factory: Arc::new(factory),
        }
    }

    pub fn with_alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    /// Marks effects that consume pointer input.
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn instantiate(&self) -> Box<dyn Effect<S>> {
        (self.factory)()
    }

    /// Case-insensitive match against the stable name or the alias.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.trim();
        self.stable_name.eq_ignore_ascii_case(name)
            || self
                .alias
                .is_some_and(|alias| alias.eq_ignore_ascii_case(name))
    }
}

impl<S: RenderSurface> Clone for EffectDescriptor<S> {
    fn clone(&self) -> Self {
        Self {
            stable_name: self.stable_name,
            display_name: self.display_name,
            alias: self.alias,
            interactive: self.interactive,
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<S: RenderSurface> fmt::Debug for EffectDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectDescriptor")
            .field("stable_name", &self.stable_name)
            .field("display_name", &self.display_name)
            .field("alias", &self.alias)
            .field("interactive", &self.interactive)
            .finish_non_exhaustive()
    }
}

/// Self-imposed update cadence for effects.
///
/// Effects are ticked at the display's frame interval but only advance their
/// simulation at the rate the pacing policy hands them.
#[derive(Debug, Clone)]
pub struct UpdateCadence {
    interval: Duration,
    last: Option<Instant>,
}

impl UpdateCadence {
    pub fn new(rate: f64) -> Self {
        Self {
            interval: interval_for(rate),
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.interval = interval_for(rate);
    }

    /// Returns the time since the previous accepted step, or `None` when the
    /// interval has not elapsed yet. The first call is always accepted.
    pub fn step(&mut self, now: Instant) -> Option<Duration> {
        match self.last {
            None => {
                self.last = Some(now);
                Some(Duration::ZERO)
            }
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < self.interval {
                    return None;
                }
                self.last = Some(now);
                Some(elapsed)
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

fn interval_for(rate: f64) -> Duration {
    if rate.is_finite() && rate > 0.0 {
        Duration::from_secs_f64(1.0 / rate)
    } else {
        Duration::ZERO
    }
}
