//! Global pointer input for interactive effects.
//!
//! A platform listener feeds desktop-space pointer positions, clicks and key
//! presses into an [`InputSink`]. Effects read per-display [`InputSnapshot`]s with
//! coordinates normalised to their own surface. The listener is only started
//! when an effect first asks for input, so non-interactive effects never pay
//! for a global hook.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::types::{Display, DisplayId};

pub const MAX_RIPPLES: usize = 8;
pub const RIPPLE_LIFETIME: Duration = Duration::from_secs(2);
/// Pointer is reported inactive after this long without movement.
pub const POINTER_IDLE: Duration = Duration::from_secs(2);

/// Source of global pointer and keyboard events.
pub trait InputListener: Send {
    fn start(&mut self, sink: InputSink) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ripple {
    /// Normalised position inside the display, origin top-left.
    pub position: [f32; 2],
    /// Seconds since the click or key press.
    pub age: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSnapshot {
    /// Normalised pointer position when it is over this display.
    pub pointer: Option<[f32; 2]>,
    /// Pointer moved within [`POINTER_IDLE`].
    pub active: bool,
    pub ripples: Vec<Ripple>,
}

#[derive(Debug, Clone, Copy)]
struct Click {
    x: f64,
    y: f64,
    at: Instant,
}

#[derive(Default)]
struct InputState {
    layout: Vec<Display>,
    pointer: Option<Click>,
    clicks: VecDeque<Click>,
}

/// Write side handed to the platform listener.
#[derive(Clone)]
pub struct InputSink {
    state: Arc<Mutex<InputState>>,
}

impl InputSink {
    /// Pointer moved to `(x, y)` in desktop coordinates.
    pub fn pointer_moved(&self, x: f64, y: f64, now: Instant) {
        let mut state = self.state.lock();
        let moved = state
            .pointer
            .is_none_or(|last| last.x != x || last.y != y);
        if moved {
            state.pointer = Some(Click { x, y, at: now });
        }
    }

    /// Primary button pressed at `(x, y)`.
    pub fn pressed(&self, x: f64, y: f64, now: Instant) {
        let mut state = self.state.lock();
        state.push_click(Click { x, y, at: now });
    }

    /// Key pressed. `position` is the key's normalised place on the keyboard;
    /// the ripple lands at that spot on the display under the pointer, or on
    /// the first display when the pointer is unknown.
    pub fn key_pressed(&self, position: [f32; 2], now: Instant) {
        let mut state = self.state.lock();
        let target = match state.pointer {
            Some(pointer) => state
                .layout
                .iter()
                .find(|display| display.contains(pointer.x, pointer.y)),
            None => None,
        }
        .or_else(|| state.layout.first());
        let Some(display) = target else {
            return;
        };
        let x = f64::from(display.origin.0)
            + f64::from(position[0].clamp(0.0, 1.0)) * f64::from(display.size.width);
        let y = f64::from(display.origin.1)
            + f64::from(position[1].clamp(0.0, 1.0)) * f64::from(display.size.height);
        state.push_click(Click { x, y, at: now });
    }
}

impl InputState {
    fn push_click(&mut self, click: Click) {
        if self.clicks.len() == MAX_RIPPLES {
            self.clicks.pop_front();
        }
        self.clicks.push_back(click);
    }
}

pub struct InputHub {
    state: Arc<Mutex<InputState>>,
    listener: Mutex<Option<Box<dyn InputListener>>>,
    started: AtomicBool,
}

impl InputHub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(InputState::default())),
            listener: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_listener(listener: Box<dyn InputListener>) -> Self {
        let hub = Self::new();
        *hub.listener.lock() = Some(listener);
        hub
    }

    pub fn sink(&self) -> InputSink {
        InputSink {
            state: Arc::clone(&self.state),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Display geometry used to partition input per surface.
    pub fn set_layout(&self, displays: &[Display]) {
        self.state.lock().layout = displays.to_vec();
    }

    /// Input as seen by `display`. Starts the listener on first use.
    pub fn snapshot(&self, display: DisplayId, now: Instant) -> InputSnapshot {
        self.ensure_started();
        let mut state = self.state.lock();
        state
            .clicks
            .retain(|click| now.saturating_duration_since(click.at) < RIPPLE_LIFETIME);

        let Some(bounds) = state.layout.iter().find(|d| d.id == display).cloned() else {
            return InputSnapshot::default();
        };
        let normalise = |x: f64, y: f64| -> [f32; 2] {
            [
                ((x - f64::from(bounds.origin.0)) / f64::from(bounds.size.width.max(1))) as f32,
                ((y - f64::from(bounds.origin.1)) / f64::from(bounds.size.height.max(1))) as f32,
            ]
        };

        let (pointer, active) = match state.pointer {
            Some(pointer) if bounds.contains(pointer.x, pointer.y) => (
                Some(normalise(pointer.x, pointer.y)),
                now.saturating_duration_since(pointer.at) < POINTER_IDLE,
            ),
            _ => (None, false),
        };
        let ripples = state
            .clicks
            .iter()
            .filter(|click| bounds.contains(click.x, click.y))
            .map(|click| Ripple {
                position: normalise(click.x, click.y),
                age: now.saturating_duration_since(click.at).as_secs_f32(),
            })
            .collect();
        InputSnapshot {
            pointer,
            active,
            ripples,
        }
    }

    fn ensure_started(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(mut listener) = self.listener.lock().take() else {
            return;
        };
        match listener.start(self.sink()) {
            Ok(()) => info!("global input listener started"),
            Err(err) => warn!(error = %err, "input listener unavailable; interactive effects run without pointer input"),
        }
    }
}

impl Default for InputHub {
    fn default() -> Self {
        Self::new()
    }
}
