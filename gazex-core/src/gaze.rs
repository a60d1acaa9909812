use serde::{Deserialize, Serialize};

/// One reading from the gaze source, in centered screen coordinates (+y up).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub x: f32,
    pub y: f32,
    pub timestamp_ns: u64,
    #[serde(default = "valid_by_default")]
    pub valid: bool,
}

fn valid_by_default() -> bool {
    true
}

impl GazeSample {
    pub fn new(x: f32, y: f32, timestamp_ns: u64) -> Self {
        Self {
            x,
            y,
            timestamp_ns,
            valid: true,
        }
    }

    pub fn invalid(timestamp_ns: u64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            timestamp_ns,
            valid: false,
        }
    }
}

/// Pull-based, non-blocking gaze source. `None` means "no current reading".
pub trait GazeSampleSource {
    fn sample(&mut self) -> Option<GazeSample>;
}

impl<F> GazeSampleSource for F
where
    F: FnMut() -> Option<GazeSample>,
{
    fn sample(&mut self) -> Option<GazeSample> {
        self()
    }
}

/// Converts between centered coordinates (origin at screen center, +y up) and
/// top-left pixel coordinates (+y down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenGeometry {
    pub width: f32,
    pub height: f32,
}

impl ScreenGeometry {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn to_top_left(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (x + self.width / 2.0, self.height / 2.0 - y)
    }

    pub fn to_centered(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (x - self.width / 2.0, self.height / 2.0 - y)
    }
}
