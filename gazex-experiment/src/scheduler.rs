//! Gaze-triggered selection scheduler.
//!
//! One active animation slot and one lookahead slot. Each [`SelectionScheduler::tick`]
//! runs, in this order: update the active animation, promote the queued
//! candidate, classify the current gaze sample against every region. The
//! scheduler never reads a clock; `now` is always supplied by the caller.

use gazex_core::{
    GazeSample, RegionOfInterest, RenderSurface, SchedulerState, SelectionEvent, StimulusShape,
    TargetId, TargetVisual, TerminationReason, TrialSummary,
};
use gazex_timing::{ms_to_ns, ns_to_ms};
use tracing::{debug, info};

use crate::animation::{AnimationCues, LoomAnimation};
use crate::config::{AnimationConfig, CooldownPolicy, ExperimentConfig};
use crate::error::SinkError;
use crate::fixation::FixationTracker;
use crate::sink::SelectionEventSink;
use crate::trial::TrialState;

/// A sustained fixation that qualified for selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub target: TargetId,
    pub detected_ns: u64,
    pub fixation_duration_ns: u64,
}

/// Per-phase behavior of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerMode {
    /// Capture a second choice while an animation is playing.
    pub allow_queue: bool,
    /// Start the trial with this target already queued; it is promoted on the first tick.
    pub seed: Option<TargetId>,
}

impl SchedulerMode {
    pub fn immediate_only() -> Self {
        Self {
            allow_queue: false,
            seed: None,
        }
    }

    pub fn queued() -> Self {
        Self {
            allow_queue: true,
            seed: None,
        }
    }

    pub fn seeded(mut self, target: TargetId) -> Self {
        self.seed = Some(target);
        self
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub state: SchedulerState,
    /// Target whose animation entered the active slot this tick.
    pub started: Option<TargetId>,
    /// Target whose animation finished this tick.
    pub completed: Option<TargetId>,
    /// Nothing active and nothing queued: the caller should present the static screen.
    pub needs_idle_redraw: bool,
}

#[derive(Debug)]
struct ActiveAnimation {
    candidate: Candidate,
    animation: LoomAnimation,
}

#[derive(Debug)]
pub struct SelectionScheduler {
    regions: Vec<RegionOfInterest>,
    baseline: Vec<TargetVisual>,
    animation: AnimationConfig,
    cues: AnimationCues,
    required_fixation_ns: u64,
    cooldown_ns: u64,
    max_selections: u32,
    cooldown_policy: CooldownPolicy,
    mode: SchedulerMode,
    tracker: FixationTracker,
    trial: TrialState,
    active: Option<ActiveAnimation>,
    queued: Option<Candidate>,
    draining: bool,
}

impl SelectionScheduler {
    /// `config` is expected to have passed [`ExperimentConfig::validate`].
    pub fn new(config: &ExperimentConfig, trial_id: usize, start_ns: u64, mode: SchedulerMode) -> Self {
        let regions = config.regions();
        let queued = mode
            .seed
            .filter(|seed| regions.iter().any(|r| r.target == *seed))
            .map(|target| Candidate {
                target,
                detected_ns: start_ns,
                fixation_duration_ns: 0,
            });
        Self {
            regions,
            baseline: config.baseline_visuals(),
            animation: config.animation,
            cues: AnimationCues::default(),
            required_fixation_ns: ms_to_ns(config.trial.required_fixation_ms),
            cooldown_ns: ms_to_ns(config.trial.cooldown_ms),
            max_selections: config.trial.max_selections_per_trial,
            cooldown_policy: config.trial.cooldown_policy,
            mode,
            tracker: FixationTracker::new(),
            trial: TrialState::new(trial_id, start_ns),
            active: None,
            queued,
            draining: false,
        }
    }

    pub fn with_cues(mut self, cues: AnimationCues) -> Self {
        self.cues = cues;
        self
    }

    pub fn tick(
        &mut self,
        now: u64,
        sample: Option<&GazeSample>,
        surface: &mut dyn RenderSurface,
        sink: &mut dyn SelectionEventSink,
    ) -> Result<TickOutcome, SinkError> {
        let mut started = None;
        let mut completed = None;

        if let Some(active) = self.active.as_mut() {
            if active.animation.update(now, surface, &self.baseline) {
                let target = active.candidate.target;
                self.active = None;
                self.trial.last_triggered.insert(target, now);
                info!(
                    trial = self.trial.trial_id,
                    target_id = %target,
                    "animation complete"
                );
                completed = Some(target);
            }
        }

        if !self.draining && self.active.is_none() && self.trial.selection_count < self.max_selections {
            if let Some(candidate) = self.queued {
                sink.record(&self.executed_event(&candidate, now))?;
                self.queued = None;
                info!(
                    trial = self.trial.trial_id,
                    target_id = %candidate.target,
                    selection = self.trial.selection_count + 1,
                    "queued selection promoted"
                );
                self.activate(candidate, now);
                started = Some(candidate.target);
            }
        }

        if !self.draining {
            for i in 0..self.regions.len() {
                let target = self.regions[i].target;
                if !self.tracker.observe(&self.regions[i], sample, now) {
                    continue;
                }
                let fixation_ns = self.tracker.duration(target);
                if fixation_ns < self.required_fixation_ns {
                    continue;
                }
                if self.trial.cooldown_active(target, now, self.cooldown_ns) {
                    debug!(target_id = %target, "fixation ignored during cooldown");
                    continue;
                }
                let candidate = Candidate {
                    target,
                    detected_ns: now,
                    fixation_duration_ns: fixation_ns,
                };
                if self.classify(candidate, now, sink)? {
                    started = Some(target);
                }
            }
        }

        Ok(TickOutcome {
            state: self.state(),
            started,
            completed,
            needs_idle_redraw: self.active.is_none() && self.queued.is_none(),
        })
    }

    /// Returns true when the candidate was started immediately.
    fn classify(
        &mut self,
        candidate: Candidate,
        now: u64,
        sink: &mut dyn SelectionEventSink,
    ) -> Result<bool, SinkError> {
        let count = self.trial.selection_count;
        match self.active.as_ref().map(|a| a.candidate.target) {
            None if count < self.max_selections => {
                sink.record(&self.executed_event(&candidate, now))?;
                info!(
                    trial = self.trial.trial_id,
                    target_id = %candidate.target,
                    selection = count + 1,
                    fixation_ms = ns_to_ms(candidate.fixation_duration_ns),
                    "selection triggered"
                );
                self.activate(candidate, now);
                Ok(true)
            }
            Some(active)
                if self.mode.allow_queue
                    && candidate.target != active
                    && count + 1 < self.max_selections
                    && self.queued.is_none_or(|q| q.target != candidate.target) =>
            {
                sink.record(&self.queued_event(&candidate, now))?;
                match self.queued.replace(candidate) {
                    Some(previous) => info!(
                        trial = self.trial.trial_id,
                        replaced = %previous.target,
                        target_id = %candidate.target,
                        "queued selection replaced"
                    ),
                    None => info!(
                        trial = self.trial.trial_id,
                        target_id = %candidate.target,
                        "selection queued"
                    ),
                }
                self.tracker.clear(candidate.target);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    fn activate(&mut self, candidate: Candidate, now: u64) {
        let target = candidate.target;
        let position = self.position_of(target);
        self.trial.record_execution(target, position, now);
        if self.cooldown_policy == CooldownPolicy::ResetOthers {
            self.trial.last_triggered.retain(|t, _| *t == target);
        }
        self.trial.last_triggered.insert(target, now);
        self.tracker.clear(target);

        let baseline = self
            .baseline
            .iter()
            .find(|v| v.target == target)
            .copied()
            .unwrap_or(TargetVisual {
                target,
                shape: StimulusShape::Circle,
                position,
                size: self.animation.init_size,
                opacity: self.animation.init_opacity,
                orientation: 0.0,
            });
        let mut animation = LoomAnimation::new(baseline, &self.animation, self.cues.clone());
        animation.start(now);
        self.active = Some(ActiveAnimation {
            candidate,
            animation,
        });
    }

    fn executed_event(&self, candidate: &Candidate, now: u64) -> SelectionEvent {
        self.event(candidate, now, self.trial.selection_count + 1, false)
    }

    fn queued_event(&self, candidate: &Candidate, now: u64) -> SelectionEvent {
        self.event(candidate, now, self.trial.selection_count + 1, true)
    }

    fn event(&self, candidate: &Candidate, now: u64, selection_num: u32, queued: bool) -> SelectionEvent {
        let from_start = ns_to_ms(now.saturating_sub(self.trial.start_ns));
        let from_previous = self
            .trial
            .last_selection_ns
            .map_or(from_start, |prev| ns_to_ms(now.saturating_sub(prev)));
        SelectionEvent {
            trial_id: self.trial.trial_id,
            selection_num,
            target: candidate.target,
            position: self.position_of(candidate.target),
            fixation_duration_ms: ns_to_ms(candidate.fixation_duration_ns),
            queued,
            was_executed: !queued,
            timestamp_ns: now,
            rt_from_trial_start_ms: from_start,
            rt_from_previous_selection_ms: from_previous,
        }
    }

    fn position_of(&self, target: TargetId) -> (f32, f32) {
        self.baseline
            .iter()
            .find(|v| v.target == target)
            .map_or((0.0, 0.0), |v| v.position)
    }

    /// Stops promotion and classification, drops the queued candidate and lets
    /// the active animation run out.
    pub fn drain(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;
        if let Some(dropped) = self.queued.take() {
            info!(
                trial = self.trial.trial_id,
                target_id = %dropped.target,
                "queued selection discarded at deadline"
            );
        }
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn state(&self) -> SchedulerState {
        match (&self.active, &self.queued) {
            (Some(_), Some(_)) => SchedulerState::ActiveQueued,
            (Some(_), None) => SchedulerState::Active,
            (None, _) if self.trial.selection_count >= self.max_selections => SchedulerState::Done,
            (None, _) => SchedulerState::Idle,
        }
    }

    pub fn selection_count(&self) -> u32 {
        self.trial.selection_count
    }

    pub fn max_selections(&self) -> u32 {
        self.max_selections
    }

    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_target(&self) -> Option<TargetId> {
        self.active.as_ref().map(|a| a.candidate.target)
    }

    pub fn queued_target(&self) -> Option<TargetId> {
        self.queued.map(|c| c.target)
    }

    pub fn trial(&self) -> &TrialState {
        &self.trial
    }

    /// Every target at rest, in configured order.
    pub fn baseline(&self) -> &[TargetVisual] {
        &self.baseline
    }

    pub fn finish(&mut self, reason: TerminationReason, now: u64) -> TrialSummary {
        self.queued = None;
        if let Some(mut active) = self.active.take() {
            active.animation.cancel();
        }
        self.trial.finish(reason, now)
    }
}
