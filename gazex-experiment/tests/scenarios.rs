use std::time::Duration;

use gazex_core::{
    GazeSample, GazeSampleSource, SchedulerState, SelectionEvent, StimulusShape, TargetId,
    TerminationReason, TrialSummary,
};
use gazex_experiment::{
    ExperimentConfig, ExperimentError, GazeTrace, GazeTrial, HeadlessSurface, MemorySink,
    SchedulerMode, ScriptedGazeSource, SelectionEventSink, SelectionScheduler, SinkError,
    TargetConfig,
};
use gazex_timing::{ManualTimer, Timer};

const MS: u64 = 1_000_000;
const A: (f32, f32) = (-500.0, 0.0);
const B: (f32, f32) = (0.0, 0.0);
const C: (f32, f32) = (500.0, 0.0);

fn three_targets() -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    config.targets = vec![
        TargetConfig::new("scn-a", StimulusShape::Circle, A),
        TargetConfig::new("scn-b", StimulusShape::Cross, B),
        TargetConfig::new("scn-c", StimulusShape::Star, C),
    ];
    for t in &mut config.targets {
        t.aoi_width = 400.0;
        t.aoi_height = 400.0;
    }
    config.trial.required_fixation_ms = 250;
    config.validate().unwrap();
    config
}

struct Harness {
    scheduler: SelectionScheduler,
    surface: HeadlessSurface,
    sink: MemorySink,
    now_ms: u64,
}

impl Harness {
    fn new(config: &ExperimentConfig) -> Self {
        Self {
            scheduler: SelectionScheduler::new(config, 1, 0, SchedulerMode::queued()),
            surface: HeadlessSurface::default(),
            sink: MemorySink::new(),
            now_ms: 0,
        }
    }

    /// Ticks every 10 ms for `duration_ms`, gazing at `at`.
    fn hold(&mut self, at: Option<(f32, f32)>, duration_ms: u64) {
        let end = self.now_ms + duration_ms;
        while self.now_ms < end {
            let now = self.now_ms * MS;
            let sample = at.map(|(x, y)| GazeSample::new(x, y, now));
            self.scheduler
                .tick(now, sample.as_ref(), &mut self.surface, &mut self.sink)
                .unwrap();
            self.now_ms += 10;
        }
    }

    fn events(&self) -> &[SelectionEvent] {
        &self.sink.events
    }
}

fn id(label: &str) -> TargetId {
    TargetId::new(label)
}

#[test]
fn scenario_a_sustained_fixation_starts_an_animation() {
    let mut h = Harness::new(&three_targets());
    h.hold(Some(A), 300);

    assert_eq!(h.events().len(), 1);
    let e = &h.events()[0];
    assert_eq!(e.target, id("scn-a"));
    assert!(!e.queued);
    assert!(e.was_executed);
    assert_eq!(e.selection_num, 1);
    assert_eq!(e.trial_id, 1);
    assert_eq!(h.scheduler.state(), SchedulerState::Active);
    assert_eq!(h.scheduler.active_target(), Some(id("scn-a")));
}

#[test]
fn scenario_b_second_choice_is_queued_then_replaced() {
    let mut h = Harness::new(&three_targets());
    h.hold(Some(A), 300);
    h.hold(Some(B), 260);

    assert_eq!(h.events().len(), 2);
    let queued = &h.events()[1];
    assert_eq!(queued.target, id("scn-b"));
    assert!(queued.queued);
    assert!(!queued.was_executed);
    assert_eq!(h.scheduler.state(), SchedulerState::ActiveQueued);

    h.hold(Some(C), 260);
    assert_eq!(h.scheduler.queued_target(), Some(id("scn-c")));
    // Only the new queued row; B gets no terminal record.
    assert_eq!(h.events().len(), 3);
    assert_eq!(h.events()[2].target, id("scn-c"));
    assert!(h.events()[2].queued);
    assert!(h.events().iter().filter(|e| e.target == id("scn-b")).count() == 1);
}

#[test]
fn scenario_c_completion_promotes_the_queued_candidate() {
    let mut h = Harness::new(&three_targets());
    h.hold(Some(A), 300);
    h.hold(Some(B), 260);
    h.hold(Some(C), 260);
    let count_before = h.scheduler.selection_count();
    assert_eq!(count_before, 1);

    // A triggered at 250 ms and completes at 2000 ms.
    h.hold(None, 2_000 - h.now_ms);
    assert_eq!(h.scheduler.active_target(), Some(id("scn-a")));
    h.hold(None, 10);

    assert_eq!(h.scheduler.selection_count(), count_before + 1);
    assert_eq!(h.scheduler.active_target(), Some(id("scn-c")));
    assert_eq!(h.scheduler.queued_target(), None);
    assert_eq!(h.events().len(), 4);
    let promoted = &h.events()[3];
    assert_eq!(promoted.target, id("scn-c"));
    assert!(!promoted.queued);
    assert!(promoted.was_executed);
    assert_eq!(promoted.selection_num, 2);
    assert_eq!(promoted.timestamp_ns, 2_000 * MS);
    assert_eq!(promoted.rt_from_previous_selection_ms, 1_750.0);
}

#[test]
fn scenario_d_no_fixation_times_out() {
    let mut config = ExperimentConfig::default();
    config.trial.max_trial_duration_ms = 3_000;
    config.trial.initial_selection_timeout_ms = 5_000;
    let timer = ManualTimer::new();
    let mut source = ScriptedGazeSource::new(GazeTrace::new().gap(10_000), timer.clone());
    let mut surface = HeadlessSurface::default();
    let mut sink = MemorySink::new();

    let summary = GazeTrial::new(&config, 0, timer.now(), SchedulerMode::queued())
        .run(
            &timer,
            Duration::from_millis(10),
            &mut source,
            &mut surface,
            &mut sink,
        )
        .unwrap();

    assert_eq!(summary.termination, TerminationReason::Timeout);
    assert_eq!(summary.selection_count, 0);
    assert_eq!(summary.end_ns, 3_000 * MS);
    assert!(sink.events.is_empty());
    assert_eq!(sink.summaries, vec![summary]);
    assert!(surface.static_presents > 0);
}

#[test]
fn scenario_e_cap_reached_completes_the_trial() {
    let mut config = ExperimentConfig::default();
    config.trial.max_selections_per_trial = 4;
    config.trial.allow_queue = false;
    let pos: Vec<(f32, f32)> = config.targets.iter().map(|t| t.position).collect();
    let trace = GazeTrace::new()
        .fixate(pos[0], 400)
        .fixate(pos[1], 2_100)
        .fixate(pos[2], 1_700)
        .fixate(pos[3], 1_800)
        .gap(5_000);

    let timer = ManualTimer::new();
    let mut source = ScriptedGazeSource::new(trace, timer.clone());
    let mut surface = HeadlessSurface::default();
    let mut sink = MemorySink::new();
    let mode = SchedulerMode::immediate_only();
    let mut trial = GazeTrial::new(&config, 0, timer.now(), mode);

    let summary = loop {
        let sample = source.sample();
        if let Some(summary) = trial
            .frame(timer.now(), sample.as_ref(), &mut surface, &mut sink)
            .unwrap()
        {
            break summary;
        }
        if trial.scheduler().selection_count() == 4 && !trial.scheduler().has_active() {
            assert_eq!(trial.scheduler().state(), SchedulerState::Done);
        }
        timer.advance(Duration::from_millis(10));
    };

    assert_eq!(summary.termination, TerminationReason::Complete);
    assert!(summary.is_success());
    assert_eq!(summary.selection_count, 4);
    let expected: Vec<TargetId> = config.targets.iter().map(|t| t.id()).collect();
    assert_eq!(summary.target_sequence(), expected);
    // Triggers at 330, 2080, 3830, 5580 ms; the last animation ends at 7330 ms.
    assert_eq!(summary.timing_sequence_ms(), vec![330, 1_750, 1_750, 1_750]);
    assert_eq!(summary.end_ns, 7_340 * MS);
    assert_eq!(sink.executed().count(), 4);
    assert!(sink.events.iter().all(|e| !e.queued));
}

struct FailingSink {
    fail: bool,
    fail_summary: bool,
    inner: MemorySink,
}

impl SelectionEventSink for FailingSink {
    fn record(&mut self, event: &SelectionEvent) -> Result<(), SinkError> {
        if self.fail {
            Err(SinkError::Io(std::io::Error::other("disk full")))
        } else {
            self.inner.record(event)
        }
    }

    fn record_summary(&mut self, summary: &TrialSummary) -> Result<(), SinkError> {
        if self.fail_summary {
            Err(SinkError::Io(std::io::Error::other("disk full")))
        } else {
            self.inner.record_summary(summary)
        }
    }
}

#[test]
fn sink_failure_propagates_and_leaves_state_untouched() {
    let config = three_targets();
    let mut scheduler = SelectionScheduler::new(&config, 0, 0, SchedulerMode::queued());
    let mut surface = HeadlessSurface::default();
    let mut sink = FailingSink {
        fail: true,
        fail_summary: false,
        inner: MemorySink::new(),
    };

    let mut failed_at = None;
    for t in (0..=300).step_by(10) {
        let now = t * MS;
        let sample = GazeSample::new(A.0, A.1, now);
        if let Err(e) = scheduler.tick(now, Some(&sample), &mut surface, &mut sink) {
            assert!(matches!(e, SinkError::Io(_)));
            failed_at.get_or_insert(t);
        }
    }
    assert_eq!(failed_at, Some(250));
    assert_eq!(scheduler.selection_count(), 0);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert!(scheduler.trial().executed.is_empty());
    assert!(scheduler.trial().last_triggered.is_empty());

    sink.fail = false;
    let now = 310 * MS;
    let sample = GazeSample::new(A.0, A.1, now);
    let outcome = scheduler
        .tick(now, Some(&sample), &mut surface, &mut sink)
        .unwrap();
    assert_eq!(outcome.started, Some(id("scn-a")));
    assert_eq!(scheduler.selection_count(), 1);
    assert_eq!(sink.inner.events.len(), 1);
}

#[test]
fn rejected_summary_is_retried_on_the_next_frame() {
    let mut config = ExperimentConfig::default();
    config.trial.initial_selection_timeout_ms = 100;
    let mut trial = GazeTrial::new(&config, 0, 0, SchedulerMode::queued());
    let mut surface = HeadlessSurface::default();
    let mut sink = FailingSink {
        fail: false,
        fail_summary: true,
        inner: MemorySink::new(),
    };

    for t in (0..100).step_by(10) {
        assert_eq!(trial.frame(t * MS, None, &mut surface, &mut sink).unwrap(), None);
    }
    let err = trial.frame(100 * MS, None, &mut surface, &mut sink).unwrap_err();
    assert!(matches!(err, ExperimentError::Sink(SinkError::Io(_))));
    assert!(trial.summary().is_none());
    assert!(sink.inner.summaries.is_empty());

    // Still failing: the summary stays pending.
    assert!(trial.frame(110 * MS, None, &mut surface, &mut sink).is_err());

    sink.fail_summary = false;
    let summary = trial
        .frame(120 * MS, None, &mut surface, &mut sink)
        .unwrap()
        .unwrap();
    assert_eq!(summary.termination, TerminationReason::NoFirstSelection);
    assert_eq!(summary.end_ns, 100 * MS);
    assert_eq!(sink.inner.summaries, vec![summary.clone()]);

    // Recorded exactly once.
    let again = trial.frame(130 * MS, None, &mut surface, &mut sink).unwrap();
    assert_eq!(again, Some(summary));
    assert_eq!(sink.inner.summaries.len(), 1);
}

#[test]
fn soft_deadline_lets_the_active_animation_finish() {
    let mut config = ExperimentConfig::default();
    config.trial.max_trial_duration_ms = 1_000;
    let circle = config.targets[0].position;
    let cross = config.targets[1].position;
    let timer = ManualTimer::new();
    let trace = GazeTrace::new().fixate(circle, 400).fixate(cross, 5_000);
    let mut source = ScriptedGazeSource::new(trace, timer.clone());
    let mut surface = HeadlessSurface::default();
    let mut sink = MemorySink::new();

    let summary = GazeTrial::new(&config, 0, 0, SchedulerMode::queued())
        .run(
            &timer,
            Duration::from_millis(10),
            &mut source,
            &mut surface,
            &mut sink,
        )
        .unwrap();

    // Circle triggers at 330 ms and plays out to 2080 ms; cross was queued but is dropped.
    assert_eq!(summary.termination, TerminationReason::Timeout);
    assert_eq!(summary.selection_count, 1);
    assert_eq!(summary.end_ns, 2_090 * MS);
    assert_eq!(sink.executed().count(), 1);
    assert_eq!(sink.events.iter().filter(|e| e.queued).count(), 1);
}

#[test]
fn hard_deadline_cuts_the_animation() {
    let mut config = ExperimentConfig::default();
    config.trial.max_trial_duration_ms = 1_000;
    config.trial.hard_deadline = true;
    let circle = config.targets[0].position;
    let timer = ManualTimer::new();
    let mut source = ScriptedGazeSource::new(GazeTrace::new().fixate(circle, 400), timer.clone());
    let mut surface = HeadlessSurface::default();
    let mut sink = MemorySink::new();

    let summary = GazeTrial::new(&config, 0, 0, SchedulerMode::queued())
        .run(
            &timer,
            Duration::from_millis(10),
            &mut source,
            &mut surface,
            &mut sink,
        )
        .unwrap();
    assert_eq!(summary.termination, TerminationReason::Timeout);
    assert_eq!(summary.end_ns, 1_000 * MS);
    assert_eq!(summary.selection_count, 1);
}

#[test]
fn inter_selection_stall_ends_the_trial() {
    let mut config = ExperimentConfig::default();
    config.trial.inter_selection_timeout_ms = 3_000;
    let circle = config.targets[0].position;
    let timer = ManualTimer::new();
    let mut source = ScriptedGazeSource::new(GazeTrace::new().fixate(circle, 400), timer.clone());
    let mut surface = HeadlessSurface::default();
    let mut sink = MemorySink::new();

    let summary = GazeTrial::new(&config, 0, 0, SchedulerMode::queued())
        .run(
            &timer,
            Duration::from_millis(10),
            &mut source,
            &mut surface,
            &mut sink,
        )
        .unwrap();
    assert_eq!(summary.termination, TerminationReason::SelectionStall);
    assert_eq!(summary.selection_count, 1);
    assert_eq!(summary.end_ns, 3_330 * MS);
}
