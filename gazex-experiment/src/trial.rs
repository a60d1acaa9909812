use std::collections::HashMap;
use std::time::Duration;

use gazex_core::{
    ExecutedSelection, GazeSample, GazeSampleSource, RenderSurface, TargetId, TargetVisual,
    TerminationReason, TrialSummary,
};
use gazex_timing::{Timer, ms_to_ns, ns_to_ms};
use tracing::info;

use crate::animation::{AnimationCues, LoomAnimation};
use crate::config::{AnimationConfig, ExperimentConfig, TrialConfig};
use crate::error::ExperimentError;
use crate::scheduler::{SchedulerMode, SelectionScheduler};
use crate::sink::SelectionEventSink;
use crate::spin::FixatorSpin;

/// Mutable bookkeeping of one gaze-triggered trial. Created fresh per trial.
#[derive(Debug, Clone)]
pub struct TrialState {
    pub trial_id: usize,
    pub start_ns: u64,
    pub selection_count: u32,
    /// Time the most recent selection entered the active slot.
    pub last_selection_ns: Option<u64>,
    /// Per-target time of the latest trigger, promotion or completion.
    pub last_triggered: HashMap<TargetId, u64>,
    pub termination: Option<TerminationReason>,
    pub executed: Vec<ExecutedSelection>,
}

impl TrialState {
    pub fn new(trial_id: usize, start_ns: u64) -> Self {
        Self {
            trial_id,
            start_ns,
            selection_count: 0,
            last_selection_ns: None,
            last_triggered: HashMap::new(),
            termination: None,
            executed: Vec::new(),
        }
    }

    pub fn cooldown_active(&self, target: TargetId, now: u64, cooldown_ns: u64) -> bool {
        self.last_triggered
            .get(&target)
            .is_some_and(|&last| now.saturating_sub(last) < cooldown_ns)
    }

    pub fn elapsed(&self, now: u64) -> u64 {
        now.saturating_sub(self.start_ns)
    }

    pub(crate) fn record_execution(&mut self, target: TargetId, position: (f32, f32), now: u64) {
        let since = self.last_selection_ns.unwrap_or(self.start_ns);
        self.executed.push(ExecutedSelection {
            target,
            position,
            timestamp_ns: now,
            latency_ms: ns_to_ms(now.saturating_sub(since)),
        });
        self.selection_count += 1;
        self.last_selection_ns = Some(now);
    }

    pub(crate) fn finish(&mut self, reason: TerminationReason, now: u64) -> TrialSummary {
        self.termination = Some(reason);
        TrialSummary {
            trial_id: self.trial_id,
            termination: reason,
            selection_count: self.selection_count,
            start_ns: self.start_ns,
            end_ns: now,
            selections: self.executed.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Continue,
    /// Deadline passed with an animation in flight: let it finish, take nothing new.
    Drain,
    Terminate(TerminationReason),
}

/// Trial-level termination rules, evaluated before every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialPolicy {
    pub max_duration_ns: u64,
    pub initial_timeout_ns: u64,
    pub inter_selection_timeout_ns: u64,
    pub max_selections: u32,
    pub hard_deadline: bool,
}

impl TrialPolicy {
    pub fn from_config(config: &TrialConfig) -> Self {
        Self {
            max_duration_ns: ms_to_ns(config.max_trial_duration_ms),
            initial_timeout_ns: ms_to_ns(config.initial_selection_timeout_ms),
            inter_selection_timeout_ns: ms_to_ns(config.inter_selection_timeout_ms),
            max_selections: config.max_selections_per_trial,
            hard_deadline: config.hard_deadline,
        }
    }

    pub fn check(&self, trial: &TrialState, has_active: bool, now: u64) -> PolicyDecision {
        let count = trial.selection_count;
        let elapsed = trial.elapsed(now);

        if count >= self.max_selections && !has_active {
            return PolicyDecision::Terminate(TerminationReason::Complete);
        }
        if elapsed >= self.max_duration_ns {
            return if has_active && !self.hard_deadline {
                PolicyDecision::Drain
            } else {
                PolicyDecision::Terminate(TerminationReason::Timeout)
            };
        }
        if count == 0 && elapsed >= self.initial_timeout_ns {
            return PolicyDecision::Terminate(TerminationReason::NoFirstSelection);
        }
        if count > 0 && !has_active {
            let last = trial.last_selection_ns.unwrap_or(trial.start_ns);
            if now.saturating_sub(last) >= self.inter_selection_timeout_ns {
                return PolicyDecision::Terminate(TerminationReason::SelectionStall);
            }
        }
        PolicyDecision::Continue
    }
}

/// A gaze-triggered trial: the scheduler run under [`TrialPolicy`].
#[derive(Debug)]
pub struct GazeTrial {
    scheduler: SelectionScheduler,
    policy: TrialPolicy,
    summary: Option<TrialSummary>,
    /// Finished, but the sink rejected the summary; retried on the next frame.
    unrecorded: Option<TrialSummary>,
}

impl GazeTrial {
    pub fn new(config: &ExperimentConfig, trial_id: usize, start_ns: u64, mode: SchedulerMode) -> Self {
        info!(trial = trial_id, ?mode, "gaze trial started");
        Self {
            scheduler: SelectionScheduler::new(config, trial_id, start_ns, mode),
            policy: TrialPolicy::from_config(&config.trial),
            summary: None,
            unrecorded: None,
        }
    }

    pub fn with_cues(mut self, cues: AnimationCues) -> Self {
        self.scheduler = self.scheduler.with_cues(cues);
        self
    }

    pub fn scheduler(&self) -> &SelectionScheduler {
        &self.scheduler
    }

    pub fn summary(&self) -> Option<&TrialSummary> {
        self.summary.as_ref()
    }

    /// One loop iteration. Returns the summary once the trial has ended and the
    /// sink has accepted it, and keeps returning it on later calls.
    pub fn frame(
        &mut self,
        now: u64,
        sample: Option<&GazeSample>,
        surface: &mut dyn RenderSurface,
        sink: &mut dyn SelectionEventSink,
    ) -> Result<Option<TrialSummary>, ExperimentError> {
        if let Some(summary) = &self.summary {
            return Ok(Some(summary.clone()));
        }
        if let Some(summary) = self.unrecorded.take() {
            return self.publish(summary, sink);
        }

        match self
            .policy
            .check(self.scheduler.trial(), self.scheduler.has_active(), now)
        {
            PolicyDecision::Continue => {}
            PolicyDecision::Drain => {
                if !self.scheduler.is_draining() {
                    info!(
                        trial = self.scheduler.trial().trial_id,
                        "deadline reached, letting the active animation finish"
                    );
                    self.scheduler.drain();
                }
            }
            PolicyDecision::Terminate(reason) => {
                let summary = self.scheduler.finish(reason, now);
                surface.present_static(self.scheduler.baseline());
                info!(
                    trial = summary.trial_id,
                    %reason,
                    selections = summary.selection_count,
                    duration_ms = ns_to_ms(summary.end_ns.saturating_sub(summary.start_ns)),
                    "gaze trial ended"
                );
                return self.publish(summary, sink);
            }
        }

        let outcome = self.scheduler.tick(now, sample, surface, sink)?;
        if outcome.needs_idle_redraw {
            surface.present_static(self.scheduler.baseline());
        }
        Ok(None)
    }

    fn publish(
        &mut self,
        summary: TrialSummary,
        sink: &mut dyn SelectionEventSink,
    ) -> Result<Option<TrialSummary>, ExperimentError> {
        if let Err(e) = sink.record_summary(&summary) {
            self.unrecorded = Some(summary);
            return Err(e.into());
        }
        self.summary = Some(summary.clone());
        Ok(Some(summary))
    }

    /// Drives the trial to completion, pacing frames with `timer`.
    pub fn run<T, G>(
        mut self,
        timer: &T,
        frame_interval: Duration,
        source: &mut G,
        surface: &mut dyn RenderSurface,
        sink: &mut dyn SelectionEventSink,
    ) -> Result<TrialSummary, ExperimentError>
    where
        T: Timer,
        G: GazeSampleSource + ?Sized,
    {
        loop {
            let sample = source.sample();
            if let Some(summary) = self.frame(timer.now(), sample.as_ref(), surface, sink)? {
                return Ok(summary);
            }
            timer.sleep(frame_interval);
        }
    }
}

/// Training trial: fixator spin, then every target's animation once, in
/// configured order, regardless of gaze.
#[derive(Debug)]
pub struct TrainingTrial {
    trial_id: usize,
    baseline: Vec<TargetVisual>,
    animation: AnimationConfig,
    cues: AnimationCues,
    spin: FixatorSpin,
    spun: bool,
    current: Option<LoomAnimation>,
    next: usize,
    finished: bool,
}

impl TrainingTrial {
    pub fn new(config: &ExperimentConfig, trial_id: usize, start_ns: u64) -> Self {
        info!(trial = trial_id, "training trial started");
        Self {
            trial_id,
            baseline: config.baseline_visuals(),
            animation: config.animation,
            cues: AnimationCues::default(),
            spin: FixatorSpin::new(start_ns, config.phases.fixator_spin_ms),
            spun: false,
            current: None,
            next: 0,
            finished: false,
        }
    }

    pub fn with_cues(mut self, cues: AnimationCues) -> Self {
        self.cues = cues;
        self
    }

    pub fn trial_id(&self) -> usize {
        self.trial_id
    }

    /// Target currently animating, if any.
    pub fn current_target(&self) -> Option<TargetId> {
        self.current.as_ref().map(LoomAnimation::target)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// One loop iteration; true once every target has animated.
    pub fn frame(&mut self, now: u64, surface: &mut dyn RenderSurface) -> bool {
        if self.finished {
            return true;
        }
        if !self.spun {
            if !self.spin.frame(now, surface, &self.baseline) {
                return false;
            }
            self.spun = true;
        }

        if let Some(animation) = self.current.as_mut() {
            if !animation.update(now, surface, &self.baseline) {
                return false;
            }
            self.current = None;
        }

        match self.baseline.get(self.next) {
            Some(&visual) => {
                let mut animation = LoomAnimation::new(visual, &self.animation, self.cues.clone());
                animation.start(now);
                self.current = Some(animation);
                self.next += 1;
                surface.present_static(&self.baseline);
                false
            }
            None => {
                surface.present_static(&self.baseline);
                self.finished = true;
                info!(trial = self.trial_id, "training trial complete");
                true
            }
        }
    }

    pub fn run<T: Timer>(mut self, timer: &T, frame_interval: Duration, surface: &mut dyn RenderSurface) {
        while !self.frame(timer.now(), surface) {
            timer.sleep(frame_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::HeadlessSurface;
    use crate::sink::MemorySink;
    use gazex_timing::ManualTimer;

    const MS: u64 = 1_000_000;

    fn policy() -> TrialPolicy {
        TrialPolicy::from_config(&TrialConfig {
            max_selections_per_trial: 3,
            ..TrialConfig::default()
        })
    }

    fn state_with(count: u32, last_ms: Option<u64>) -> TrialState {
        let mut state = TrialState::new(0, 0);
        state.selection_count = count;
        state.last_selection_ns = last_ms.map(|ms| ms * MS);
        state
    }

    #[test]
    fn cooldown_is_inactive_before_any_trigger() {
        let state = TrialState::new(0, 0);
        assert!(!state.cooldown_active(TargetId::new("trial-a"), 0, 500 * MS));
    }

    #[test]
    fn cooldown_window_is_half_open() {
        let mut state = TrialState::new(0, 0);
        let a = TargetId::new("trial-b");
        state.last_triggered.insert(a, 1_000 * MS);
        assert!(state.cooldown_active(a, 1_499 * MS, 500 * MS));
        assert!(!state.cooldown_active(a, 1_500 * MS, 500 * MS));
        assert!(!state.cooldown_active(a, 1_000 * MS, 0));
    }

    #[test]
    fn execution_latencies_chain() {
        let mut state = TrialState::new(3, 1_000 * MS);
        let a = TargetId::new("trial-c");
        state.record_execution(a, (0.0, 0.0), 2_200 * MS);
        state.record_execution(a, (0.0, 0.0), 5_000 * MS);
        assert_eq!(state.selection_count, 2);
        assert_eq!(state.executed[0].latency_ms, 1_200.0);
        assert_eq!(state.executed[1].latency_ms, 2_800.0);
        let summary = state.finish(TerminationReason::SelectionStall, 9_000 * MS);
        assert_eq!(summary.selections.len(), 2);
        assert_eq!(state.termination, Some(TerminationReason::SelectionStall));
    }

    #[test]
    fn policy_rules() {
        let p = policy();
        use PolicyDecision::*;
        use TerminationReason::*;
        assert_eq!(p.check(&state_with(0, None), false, 4_999 * MS), Continue);
        assert_eq!(
            p.check(&state_with(0, None), false, 5_000 * MS),
            Terminate(NoFirstSelection)
        );
        assert_eq!(p.check(&state_with(1, Some(1_000)), true, 9_000 * MS), Continue);
        assert_eq!(
            p.check(&state_with(1, Some(1_000)), false, 6_000 * MS),
            Terminate(SelectionStall)
        );
        assert_eq!(p.check(&state_with(3, Some(8_000)), true, 9_000 * MS), Continue);
        assert_eq!(
            p.check(&state_with(3, Some(8_000)), false, 9_000 * MS),
            Terminate(Complete)
        );
        assert_eq!(p.check(&state_with(2, Some(14_000)), true, 15_000 * MS), Drain);
        assert_eq!(
            p.check(&state_with(2, Some(14_000)), false, 15_000 * MS),
            Terminate(Timeout)
        );
        // Complete wins over the deadline.
        assert_eq!(
            p.check(&state_with(3, Some(14_000)), false, 16_000 * MS),
            Terminate(Complete)
        );
    }

    #[test]
    fn hard_deadline_does_not_drain() {
        let p = TrialPolicy {
            hard_deadline: true,
            ..policy()
        };
        assert_eq!(
            p.check(&state_with(1, Some(14_000)), true, 15_000 * MS),
            PolicyDecision::Terminate(TerminationReason::Timeout)
        );
    }

    #[test]
    fn training_animates_every_target_in_order() {
        let config = ExperimentConfig::default();
        let timer = ManualTimer::new();
        let mut surface = HeadlessSurface::default();
        let mut trial = TrainingTrial::new(&config, 0, timer.now());
        let mut order = Vec::new();
        while !trial.frame(timer.now(), &mut surface) {
            if let Some(t) = trial.current_target() {
                if order.last() != Some(&t) {
                    order.push(t);
                }
            }
            timer.advance(Duration::from_millis(10));
        }
        let expected: Vec<TargetId> = config.targets.iter().map(|t| t.id()).collect();
        assert_eq!(order, expected);
        assert!(surface.fixator_frames >= 100);
        // Spin, then four back-to-back animations.
        let total = 1_000 + 4 * 1_750;
        assert!(timer.now() >= total * MS && timer.now() <= (total + 50) * MS);
    }

    #[test]
    fn terminated_trial_keeps_returning_its_summary() {
        let mut config = ExperimentConfig::default();
        config.trial.initial_selection_timeout_ms = 100;
        let mut trial = GazeTrial::new(&config, 7, 0, SchedulerMode::queued());
        let mut surface = HeadlessSurface::default();
        let mut sink = MemorySink::new();
        assert!(trial.frame(50 * MS, None, &mut surface, &mut sink).unwrap().is_none());
        let summary = trial
            .frame(100 * MS, None, &mut surface, &mut sink)
            .unwrap()
            .unwrap();
        assert_eq!(summary.termination, TerminationReason::NoFirstSelection);
        assert_eq!(sink.summaries.len(), 1);
        let again = trial.frame(200 * MS, None, &mut surface, &mut sink).unwrap();
        assert_eq!(again, Some(summary));
        assert_eq!(sink.summaries.len(), 1);
    }
}
