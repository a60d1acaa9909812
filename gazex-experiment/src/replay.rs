//! Scripted gaze input and a drawing-free surface, for headless runs and tests.

use gazex_core::{GazeSample, GazeSampleSource, RenderSurface, TargetVisual};
use gazex_timing::{Timer, ms_to_ns};
use serde::{Deserialize, Serialize};

/// Gaze held at `position` for `[start_ms, end_ms)`. `None` is an explicit gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeSegment {
    pub start_ms: u64,
    pub end_ms: u64,
    #[serde(default)]
    pub position: Option<(f32, f32)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GazeTrace {
    pub segments: Vec<GazeSegment>,
}

impl GazeTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Appends a fixation on `position` lasting `duration_ms` after the current end.
    pub fn fixate(mut self, position: (f32, f32), duration_ms: u64) -> Self {
        let start_ms = self.end_ms();
        self.segments.push(GazeSegment {
            start_ms,
            end_ms: start_ms + duration_ms,
            position: Some(position),
        });
        self
    }

    /// Appends a stretch with no reading.
    pub fn gap(mut self, duration_ms: u64) -> Self {
        let start_ms = self.end_ms();
        self.segments.push(GazeSegment {
            start_ms,
            end_ms: start_ms + duration_ms,
            position: None,
        });
        self
    }

    pub fn end_ms(&self) -> u64 {
        self.segments.iter().map(|s| s.end_ms).max().unwrap_or(0)
    }

    /// Position at `offset_ms` from trace start. The first matching segment wins.
    pub fn position_at(&self, offset_ms: f64) -> Option<(f32, f32)> {
        self.segments
            .iter()
            .find(|s| (s.start_ms as f64) <= offset_ms && offset_ms < s.end_ms as f64)
            .and_then(|s| s.position)
    }
}

/// Replays a [`GazeTrace`] against a timer. Trace time zero is the timer's
/// reading at construction.
#[derive(Debug, Clone)]
pub struct ScriptedGazeSource<T: Timer> {
    trace: GazeTrace,
    timer: T,
    origin_ns: u64,
}

impl<T: Timer> ScriptedGazeSource<T> {
    pub fn new(trace: GazeTrace, timer: T) -> Self {
        let origin_ns = timer.now();
        Self {
            trace,
            timer,
            origin_ns,
        }
    }

    /// Rebases trace time zero to the timer's current reading.
    pub fn restart(&mut self) {
        self.origin_ns = self.timer.now();
    }

    pub fn is_exhausted(&self) -> bool {
        self.timer.now() >= self.origin_ns + ms_to_ns(self.trace.end_ms())
    }
}

impl<T: Timer> GazeSampleSource for ScriptedGazeSource<T> {
    fn sample(&mut self) -> Option<GazeSample> {
        let now = self.timer.now();
        let offset_ms = now.saturating_sub(self.origin_ns) as f64 / 1_000_000.0;
        self.trace
            .position_at(offset_ms)
            .map(|(x, y)| GazeSample::new(x, y, now))
    }
}

/// Counts presentation calls and keeps the last frame.
#[derive(Debug, Default, Clone)]
pub struct HeadlessSurface {
    pub frames: usize,
    pub static_presents: usize,
    pub fixator_frames: usize,
    pub last_frame: Vec<TargetVisual>,
    pub last_angle: Option<f32>,
}

impl RenderSurface for HeadlessSurface {
    fn draw_frame(&mut self, targets: &[TargetVisual]) {
        self.frames += 1;
        self.last_frame.clear();
        self.last_frame.extend_from_slice(targets);
    }

    fn present_static(&mut self, targets: &[TargetVisual]) {
        self.static_presents += 1;
        self.last_frame.clear();
        self.last_frame.extend_from_slice(targets);
    }

    fn draw_fixator(&mut self, targets: &[TargetVisual], angle_deg: f32) {
        self.fixator_frames += 1;
        self.last_angle = Some(angle_deg);
        self.last_frame.clear();
        self.last_frame.extend_from_slice(targets);
    }
}
