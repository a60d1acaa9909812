use thiserror::Error;

use crate::stimulus::TargetVisual;

/// Presentation side of the loop. Calls are side effects only; a surface that
/// cannot draw is expected to log and carry on.
pub trait RenderSurface {
    /// One animation frame: every target in its current appearance.
    fn draw_frame(&mut self, targets: &[TargetVisual]);

    /// The idle presentation: every target at baseline.
    fn present_static(&mut self, targets: &[TargetVisual]) {
        self.draw_frame(targets);
    }

    /// Static targets with the spinning fixator at screen center.
    fn draw_fixator(&mut self, targets: &[TargetVisual], angle_deg: f32);
}

#[derive(Debug, Error)]
#[error("sound cue '{name}' failed: {message}")]
pub struct CueError {
    pub name: String,
    pub message: String,
}

/// Fire-and-forget sound. Failures are reported but never stop an animation.
pub trait SoundCue: Send + Sync {
    fn play(&self) -> Result<(), CueError>;
    fn stop(&self) -> Result<(), CueError> {
        Ok(())
    }
}
