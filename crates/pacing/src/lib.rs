//! System-wide frame pacing.
//!
//! The policy samples coarse desktop signals on a fixed interval and decides
//! between two update-rate tiers:
//!
//! ```text
//!   SystemProbe ──▶ detect_occlusion() ──▶ PacingTier ──(flip only)──▶ Pace
//!        │
//!        └──▶ Utilization (logged, never decides)
//! ```
//!
//! Only tier flips produce a [`Pace`]; repeated samples in the same tier are
//! silent. Probe failures count as "visible" so rendering is never starved by
//! a broken window list.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("system probe unavailable: {0}")]
    Unavailable(String),
    #[error("system query failed: {0}")]
    Query(String),
}

/// Axis-aligned rectangle in global desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);
        if right <= left || bottom <= top {
            0.0
        } else {
            (right - left) * (bottom - top)
        }
    }
}

/// One on-screen window reported by the probe.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSample {
    pub owner: String,
    /// Stacking level; anything at or below zero sits at desktop level.
    pub layer: i32,
    pub bounds: Rect,
}

/// Coarse load figures in the 0..=1 range, when the platform can provide them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Utilization {
    pub cpu: Option<f32>,
    pub gpu: Option<f32>,
}

/// Source of the desktop signals the policy samples.
pub trait SystemProbe {
    fn display_bounds(&mut self) -> Result<Vec<Rect>, ProbeError>;
    fn foreground_windows(&mut self) -> Result<Vec<WindowSample>, ProbeError>;
    fn utilization(&mut self) -> Option<Utilization> {
        None
    }
}

/// Probe used when no platform probe is available; always reports "visible".
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProbe;

impl SystemProbe for NullProbe {
    fn display_bounds(&mut self) -> Result<Vec<Rect>, ProbeError> {
        Err(ProbeError::Unavailable("no system probe configured".into()))
    }

    fn foreground_windows(&mut self) -> Result<Vec<WindowSample>, ProbeError> {
        Err(ProbeError::Unavailable("no system probe configured".into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingTier {
    Visible,
    Occluded,
}

/// The published rate decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pace {
    pub rate: f64,
    pub tier: PacingTier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PacingConfig {
    pub high_rate: f64,
    pub low_rate: f64,
    pub occlusion_threshold: f64,
    pub sample_interval: Duration,
    pub activation_delay: Duration,
    /// Window owners never counted as occluders (our own process).
    pub ignored_owners: Vec<String>,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self::from(&wallconfig::PacingSection::default())
    }
}

impl From<&wallconfig::PacingSection> for PacingConfig {
    fn from(section: &wallconfig::PacingSection) -> Self {
        Self {
            high_rate: section.high_rate,
            low_rate: section.low_rate,
            occlusion_threshold: section.occlusion_threshold,
            sample_interval: section.sample_interval,
            activation_delay: section.activation_delay,
            ignored_owners: vec!["shader-bg".to_string(), "shaderbg".to_string()],
        }
    }
}

pub struct PacingPolicy {
    config: PacingConfig,
    tier: PacingTier,
    next_sample: Option<Instant>,
}

impl PacingPolicy {
    /// Starts in the visible tier at the high rate.
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            tier: PacingTier::Visible,
            next_sample: None,
        }
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    pub fn current(&self) -> Pace {
        self.pace_for(self.tier)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_sample
    }

    /// Samples when the interval has elapsed (or immediately on the first call).
    pub fn poll(&mut self, probe: &mut dyn SystemProbe, now: Instant) -> Option<Pace> {
        if let Some(deadline) = self.next_sample {
            if now < deadline {
                return None;
            }
        }
        self.next_sample = Some(now + self.config.sample_interval);
        self.sample(probe)
    }

    /// Pulls the next sample forward to `activation_delay` from now, e.g. after
    /// another application came to the foreground.
    pub fn nudge(&mut self, now: Instant) {
        let wanted = now + self.config.activation_delay;
        self.next_sample = Some(match self.next_sample {
            Some(existing) if existing <= wanted => existing,
            _ => wanted,
        });
    }

    /// Takes one sample and returns the new pace only if the tier flipped.
    pub fn sample(&mut self, probe: &mut dyn SystemProbe) -> Option<Pace> {
        let occluded = match (probe.display_bounds(), probe.foreground_windows()) {
            (Ok(displays), Ok(windows)) => detect_occlusion(
                &displays,
                &windows,
                self.config.occlusion_threshold,
                &self.config.ignored_owners,
            ),
            (Err(err), _) | (_, Err(err)) => {
                warn!(error = %err, "window enumeration failed; assuming wallpaper visible");
                false
            }
        };

        if let Some(load) = probe.utilization() {
            debug!(cpu = ?load.cpu, gpu = ?load.gpu, "system utilization sample");
        }

        let tier = if occluded {
            PacingTier::Occluded
        } else {
            PacingTier::Visible
        };
        if tier == self.tier {
            return None;
        }
        self.tier = tier;
        let pace = self.pace_for(tier);
        info!(?tier, rate = pace.rate, "frame pacing tier changed");
        Some(pace)
    }

    fn pace_for(&self, tier: PacingTier) -> Pace {
        let rate = match tier {
            PacingTier::Visible => self.config.high_rate,
            PacingTier::Occluded => self.config.low_rate,
        };
        Pace { rate, tier }
    }
}

/// True when any window above desktop level covers more than `threshold` of
/// some display's area.
pub fn detect_occlusion(
    displays: &[Rect],
    windows: &[WindowSample],
    threshold: f64,
    ignored_owners: &[String],
) -> bool {
    windows
        .iter()
        .filter(|window| window.layer > 0)
        .filter(|window| {
            !ignored_owners
                .iter()
                .any(|owner| window.owner.contains(owner.as_str()))
        })
        .any(|window| {
            displays.iter().any(|display| {
                let area = display.area();
                area > 0.0 && window.bounds.intersection_area(display) > area * threshold
            })
        })
}
