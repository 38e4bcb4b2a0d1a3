use crate::types::ViewportSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeKind {
    Unchanged,
    /// Small enough to keep size-dependent state; the effect only learns the
    /// new dimensions.
    Minor,
    /// Aspect or pixel change big enough that the effect should re-derive its
    /// layout (e.g. re-centre particles, reallocate buffers).
    Significant,
}

/// Classifies viewport changes so effects are not rebuilt for every
/// off-by-one notification from the windowing system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizePolicy {
    /// Per-axis pixel delta at or above which a resize is significant.
    pub pixel_threshold: u32,
    /// Relative aspect-ratio change above which a resize is significant.
    pub aspect_tolerance: f64,
}

impl Default for ResizePolicy {
    fn default() -> Self {
        Self {
            pixel_threshold: 4,
            aspect_tolerance: 0.01,
        }
    }
}

impl ResizePolicy {
    pub fn classify(&self, previous: ViewportSize, next: ViewportSize) -> ResizeKind {
        if previous == next {
            return ResizeKind::Unchanged;
        }
        if previous.is_empty() || next.is_empty() {
            return ResizeKind::Significant;
        }

        let dw = previous.width.abs_diff(next.width);
        let dh = previous.height.abs_diff(next.height);
        if dw.max(dh) >= self.pixel_threshold.max(1) {
            return ResizeKind::Significant;
        }

        let (a, b) = (previous.aspect(), next.aspect());
        let relative = (a - b).abs() / a.max(b);
        if relative > self.aspect_tolerance {
            ResizeKind::Significant
        } else {
            ResizeKind::Minor
        }
    }
}

impl From<&wallconfig::SurfaceSection> for ResizePolicy {
    fn from(section: &wallconfig::SurfaceSection) -> Self {
        Self {
            pixel_threshold: section.resize_pixel_threshold,
            aspect_tolerance: section.resize_aspect_tolerance,
        }
    }
}
