use std::fmt;

use winit::dpi::PhysicalSize;

/// Drawable size of a wallpaper surface in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-area surface cannot be drawn into.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Width over height; zero for an empty size.
    pub fn aspect(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            f64::from(self.width) / f64::from(self.height)
        }
    }

    pub fn as_f32(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

impl From<PhysicalSize<u32>> for ViewportSize {
    fn from(size: PhysicalSize<u32>) -> Self {
        Self::new(size.width, size.height)
    }
}

impl From<ViewportSize> for PhysicalSize<u32> {
    fn from(size: ViewportSize) -> Self {
        PhysicalSize::new(size.width, size.height)
    }
}

impl fmt::Display for ViewportSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Stable identifier of a physical display for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayId(pub u64);

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "display-{:x}", self.0)
    }
}

/// Power state reported by the platform for a connected display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPower {
    /// Connected but not part of the desktop (mirrored or disabled).
    Online,
    /// Part of the desktop and awake.
    Active,
    Asleep,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Display {
    pub id: DisplayId,
    pub name: String,
    /// Top-left corner in the global desktop coordinate space.
    pub origin: (i32, i32),
    pub size: ViewportSize,
    pub scale_factor: f64,
    pub power: DisplayPower,
}

impl Display {
    pub fn is_active(&self) -> bool {
        self.power == DisplayPower::Active
    }

    /// Whether a point in desktop coordinates falls inside this display.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (left, top) = (f64::from(self.origin.0), f64::from(self.origin.1));
        x >= left
            && y >= top
            && x < left + f64::from(self.size.width)
            && y < top + f64::from(self.size.height)
    }
}

/// Platform handle of a wallpaper window, used by screenshot tooling to map
/// windows back to displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeWindowId(pub u64);

impl fmt::Display for NativeWindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}
