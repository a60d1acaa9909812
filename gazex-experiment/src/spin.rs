use gazex_core::{RenderSurface, TargetVisual};
use gazex_timing::{ms_to_ns, ns_to_secs};

/// Spinning fixation wheel shown at screen center before a trial starts.
/// The same wheel, spun faster over a blank screen, is the attention getter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixatorSpin {
    start_ns: u64,
    duration_ns: u64,
    degrees_per_sec: f32,
}

impl FixatorSpin {
    pub const DEFAULT_SPEED: f32 = 360.0;

    pub fn new(start_ns: u64, duration_ms: u64) -> Self {
        Self {
            start_ns,
            duration_ns: ms_to_ns(duration_ms),
            degrees_per_sec: Self::DEFAULT_SPEED,
        }
    }

    pub fn with_speed(mut self, degrees_per_sec: f32) -> Self {
        self.degrees_per_sec = degrees_per_sec;
        self
    }

    pub fn angle_at(&self, now: u64) -> f32 {
        let secs = ns_to_secs(now.saturating_sub(self.start_ns)) as f32;
        (secs * self.degrees_per_sec).rem_euclid(360.0)
    }

    pub fn is_complete(&self, now: u64) -> bool {
        now.saturating_sub(self.start_ns) >= self.duration_ns
    }

    /// Draws one frame of the wheel over `targets`. Returns true, without
    /// drawing, once the spin has run its duration.
    pub fn frame(&self, now: u64, surface: &mut dyn RenderSurface, targets: &[TargetVisual]) -> bool {
        if self.is_complete(now) {
            return true;
        }
        surface.draw_fixator(targets, self.angle_at(now));
        false
    }
}
