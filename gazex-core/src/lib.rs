pub mod gaze;
pub mod phase;
pub mod region;
pub mod stimulus;
pub mod surface;
pub mod trial;

pub use gaze::{GazeSample, GazeSampleSource, ScreenGeometry};
pub use phase::{Phase, StandardPhase};
pub use region::{Geometry, Region, RegionOfInterest};
pub use stimulus::{Stimulus, StimulusShape, TargetId, TargetVisual};
pub use surface::{CueError, RenderSurface, SoundCue};
pub use trial::{
    ExecutedSelection, SchedulerState, SelectionEvent, TerminationReason, TrialSummary,
};
