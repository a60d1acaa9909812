pub mod animation;
pub mod attempts;
pub mod config;
pub mod error;
pub mod fixation;
pub mod replay;
pub mod scheduler;
pub mod sink;
pub mod spin;
pub mod state;
pub mod trial;

pub use animation::{AnimationCues, LoomAnimation, LoomState};
pub use attempts::{AttemptPolicy, AttemptTracker, NextStep};
pub use config::{
    AnimationConfig, CooldownPolicy, ExperimentConfig, MAX_DURATION_MS, PhaseConfig,
    TargetConfig, TrialConfig,
};
pub use error::{ConfigError, ExperimentError, SinkError};
pub use fixation::FixationTracker;
pub use replay::{GazeSegment, GazeTrace, HeadlessSurface, ScriptedGazeSource};
pub use scheduler::{Candidate, SchedulerMode, SelectionScheduler, TickOutcome};
pub use sink::{JsonLinesSink, MemorySink, SelectionEventSink, SequenceRecord};
pub use spin::FixatorSpin;
pub use state::{ExperimentEvent, ExperimentStateMachine};
pub use trial::{GazeTrial, PolicyDecision, TrainingTrial, TrialPolicy, TrialState};
