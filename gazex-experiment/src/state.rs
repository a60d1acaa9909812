use gazex_core::{GazeSample, Phase, RenderSurface, TargetVisual, TrialSummary};
use gazex_timing::{Timer, ms_to_ns};
use rand::Rng;
use tracing::info;

use crate::animation::AnimationCues;
use crate::attempts::{AttemptPolicy, AttemptTracker, NextStep};
use crate::config::ExperimentConfig;
use crate::error::{ConfigError, ExperimentError};
use crate::scheduler::SchedulerMode;
use crate::sink::SelectionEventSink;
use crate::spin::FixatorSpin;
use crate::trial::{GazeTrial, TrainingTrial};

const ATTENTION_GETTER_SPEED: f32 = 720.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentEvent {
    StartPressed,
    TrainingTrialComplete { trial_id: usize },
    GazeTrialComplete(TrialSummary),
    AttentionGetterComplete,
    IntervalElapsed,
}

#[derive(Debug)]
enum Stage {
    AwaitingStart,
    Training(TrainingTrial),
    GazeSpin(FixatorSpin),
    Gaze(GazeTrial),
    AttentionGetter(FixatorSpin),
    Interval { until_ns: u64 },
    /// Completion reported, waiting for `handle_event`.
    Waiting,
    Finished,
}

/// Phase orchestration: welcome, training trials, gaze-triggered attempts, debrief.
///
/// `update` advances whatever is on screen and reports completions as events;
/// `handle_event` applies them.
#[derive(Debug)]
pub struct ExperimentStateMachine<P, T>
where
    P: Phase,
    T: Timer,
{
    phase: P,
    timer: T,
    config: ExperimentConfig,
    cues: AnimationCues,
    stage: Stage,
    attempts: AttemptTracker,
    trial_number: usize,
    phase_trial_number: usize,
    results: Vec<TrialSummary>,
    blank: Vec<TargetVisual>,
}

impl<P, T> ExperimentStateMachine<P, T>
where
    P: Phase,
    T: Timer,
{
    pub fn new<R: Rng + ?Sized>(
        mut config: ExperimentConfig,
        timer: T,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.phases.randomize_positions {
            config.shuffle_positions(rng);
        }
        for t in &config.targets {
            info!(target_id = %t.id(), shape = ?t.shape, position = ?t.position, "target placed");
        }
        let attempts = AttemptTracker::new(AttemptPolicy::from_config(&config.phases));
        let mut machine = Self {
            phase: P::default(),
            timer,
            config,
            cues: AnimationCues::default(),
            stage: Stage::AwaitingStart,
            attempts,
            trial_number: 0,
            phase_trial_number: 0,
            results: Vec::new(),
            blank: Vec::new(),
        };
        machine.begin_next();
        Ok(machine)
    }

    pub fn with_cues(mut self, cues: AnimationCues) -> Self {
        self.cues = cues;
        self
    }

    pub fn update(
        &mut self,
        sample: Option<&GazeSample>,
        surface: &mut dyn RenderSurface,
        sink: &mut dyn SelectionEventSink,
    ) -> Result<Vec<ExperimentEvent>, ExperimentError> {
        let now = self.timer.now();
        let mut events = Vec::new();

        match &mut self.stage {
            Stage::AwaitingStart | Stage::Waiting | Stage::Finished => {}
            Stage::Training(trial) => {
                if trial.frame(now, surface) {
                    events.push(ExperimentEvent::TrainingTrialComplete {
                        trial_id: trial.trial_id(),
                    });
                    self.stage = Stage::Waiting;
                }
            }
            Stage::GazeSpin(spin) => {
                let baseline = self.config.baseline_visuals();
                if spin.frame(now, surface, &baseline) {
                    let mode = SchedulerMode {
                        allow_queue: self.config.trial.allow_queue,
                        seed: None,
                    };
                    let trial = GazeTrial::new(&self.config, self.trial_number, now, mode)
                        .with_cues(self.cues.clone());
                    self.stage = Stage::Gaze(trial);
                }
            }
            Stage::Gaze(trial) => {
                if let Some(summary) = trial.frame(now, sample, surface, sink)? {
                    events.push(ExperimentEvent::GazeTrialComplete(summary));
                    self.stage = Stage::Waiting;
                }
            }
            Stage::AttentionGetter(spin) => {
                if spin.frame(now, surface, &self.blank) {
                    events.push(ExperimentEvent::AttentionGetterComplete);
                    self.stage = Stage::Waiting;
                }
            }
            Stage::Interval { until_ns } => {
                if now >= *until_ns {
                    events.push(ExperimentEvent::IntervalElapsed);
                    self.stage = Stage::Waiting;
                }
            }
        }

        Ok(events)
    }

    pub fn handle_event(&mut self, event: ExperimentEvent) -> bool {
        let waiting = matches!(self.stage, Stage::Waiting);
        match event {
            ExperimentEvent::StartPressed if self.is_awaiting_start() => {
                info!(phase = ?self.phase, "start pressed");
                if !self.advance_phase() {
                    self.stage = Stage::Finished;
                    return false;
                }
                self.begin_next();
                true
            }
            ExperimentEvent::TrainingTrialComplete { trial_id } if waiting => {
                info!(trial = trial_id, "training trial recorded");
                self.complete_trial();
                true
            }
            ExperimentEvent::GazeTrialComplete(summary) if waiting => {
                self.attempts.record(summary.termination);
                self.results.push(summary);
                self.complete_trial();
                true
            }
            ExperimentEvent::AttentionGetterComplete if waiting => {
                self.attempts.attention_getter_played();
                self.begin_next();
                true
            }
            ExperimentEvent::IntervalElapsed if waiting => {
                self.begin_next();
                true
            }
            _ => false,
        }
    }

    fn complete_trial(&mut self) {
        self.trial_number += 1;
        self.phase_trial_number += 1;
        let until_ns = self.timer.now() + ms_to_ns(self.config.phases.inter_trial_interval_ms);
        self.stage = Stage::Interval { until_ns };
    }

    fn advance_phase(&mut self) -> bool {
        match self.phase.next() {
            Some(next) => {
                info!(from = ?self.phase, to = ?next, "phase change");
                self.phase = next;
                self.phase_trial_number = 0;
                true
            }
            None => false,
        }
    }

    /// Picks the next stage for the current phase, moving through phases that
    /// have nothing left to run.
    fn begin_next(&mut self) {
        loop {
            let now = self.timer.now();
            if self.phase.awaits_start() {
                self.stage = Stage::AwaitingStart;
                return;
            }
            if self.phase.is_training() {
                if self.phase_trial_number < self.config.phases.training_trials {
                    let trial = TrainingTrial::new(&self.config, self.trial_number, now)
                        .with_cues(self.cues.clone());
                    self.stage = Stage::Training(trial);
                    return;
                }
            } else if self.phase.is_gaze_triggered() {
                match self.attempts.next_step() {
                    NextStep::RunTrial => {
                        self.stage =
                            Stage::GazeSpin(FixatorSpin::new(now, self.config.phases.fixator_spin_ms));
                        return;
                    }
                    NextStep::AttentionGetter => {
                        info!(
                            attempts = self.attempts.attempts(),
                            "playing attention getter"
                        );
                        let spin = FixatorSpin::new(now, self.config.phases.attention_getter_ms)
                            .with_speed(ATTENTION_GETTER_SPEED);
                        self.stage = Stage::AttentionGetter(spin);
                        return;
                    }
                    NextStep::Finished => {
                        info!(
                            attempts = self.attempts.attempts(),
                            successes = self.attempts.successes(),
                            "gaze phase finished"
                        );
                    }
                }
            }
            if !self.advance_phase() {
                info!(trials = self.trial_number, "experiment finished");
                self.stage = Stage::Finished;
                return;
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.stage, Stage::Finished)
    }

    pub fn is_awaiting_start(&self) -> bool {
        matches!(self.stage, Stage::AwaitingStart)
    }

    /// True while a gaze-triggered trial (not its fixator spin) is on screen.
    pub fn is_gaze_trial_running(&self) -> bool {
        matches!(self.stage, Stage::Gaze(_))
    }

    pub fn current_phase(&self) -> &P {
        &self.phase
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Gaze-triggered trial summaries, in order.
    pub fn results(&self) -> &[TrialSummary] {
        &self.results
    }

    pub fn attempts(&self) -> &AttemptTracker {
        &self.attempts
    }

    /// (current trial, trials in phase), 1-based.
    pub fn trial_progress(&self) -> Option<(usize, usize)> {
        if self.phase.is_training() {
            Some((
                self.phase_trial_number + 1,
                self.config.phases.training_trials,
            ))
        } else if self.phase.is_gaze_triggered() {
            Some((
                self.phase_trial_number + 1,
                self.config.phases.max_gaze_attempts as usize,
            ))
        } else {
            None
        }
    }
}
