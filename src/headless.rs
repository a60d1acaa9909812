//! Drives the experiment without a window: a manual clock stepped one frame
//! at a time, a scripted gaze trace and a counting surface.

use anyhow::{Context, Result, bail};
use gazex_core::{GazeSampleSource, StandardPhase, TargetId, TrialSummary};
use gazex_experiment::{
    ExperimentConfig, ExperimentEvent, ExperimentStateMachine, GazeTrace, GazeTrial,
    HeadlessSurface, SchedulerMode, ScriptedGazeSource, SelectionEventSink,
};
use gazex_timing::{ManualTimer, Timer, ns_to_ms};
use rand::Rng;
use std::path::Path;
use tracing::info;

pub fn load_config(path: Option<&Path>) -> Result<ExperimentConfig> {
    match path {
        Some(path) => Ok(ExperimentConfig::from_path(path)?),
        None => Ok(ExperimentConfig::default()),
    }
}

pub fn load_trace(path: &Path) -> Result<GazeTrace> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read gaze trace {}", path.display()))?;
    GazeTrace::from_json(&text)
        .with_context(|| format!("failed to parse gaze trace {}", path.display()))
}

/// Runs every phase of the experiment, pressing start automatically. The
/// trace restarts at the beginning of each gaze-triggered trial.
pub fn replay_experiment<R: Rng + ?Sized>(
    config: ExperimentConfig,
    trace: GazeTrace,
    rng: &mut R,
    sink: &mut dyn SelectionEventSink,
) -> Result<Vec<TrialSummary>> {
    let timer = ManualTimer::new();
    let frame_interval = config.frame_interval();
    let mut machine: ExperimentStateMachine<StandardPhase, ManualTimer> =
        ExperimentStateMachine::new(config, timer.clone(), rng)?;
    let mut source = ScriptedGazeSource::new(trace, timer.clone());
    let mut surface = HeadlessSurface::default();
    let mut in_trial = false;

    while !machine.is_finished() {
        if machine.is_awaiting_start() {
            info!(phase = ?machine.current_phase(), "starting automatically");
            machine.handle_event(ExperimentEvent::StartPressed);
            continue;
        }

        let sample = source.sample();
        for event in machine.update(sample.as_ref(), &mut surface, sink)? {
            machine.handle_event(event);
        }

        let running = machine.is_gaze_trial_running();
        if running && !in_trial {
            source.restart();
        }
        in_trial = running;
        timer.sleep(frame_interval);
    }

    info!(
        trials = machine.results().len(),
        successes = machine.attempts().successes(),
        frames = surface.frames,
        simulated_ms = ns_to_ms(timer.now()),
        "replay finished"
    );
    Ok(machine.results().to_vec())
}

/// Runs one gaze-triggered trial from time zero.
pub fn replay_trial(
    config: &ExperimentConfig,
    trace: GazeTrace,
    allow_queue: bool,
    seed: Option<&str>,
    sink: &mut dyn SelectionEventSink,
) -> Result<TrialSummary> {
    config.validate()?;
    if let Some(label) = seed {
        if !config.targets.iter().any(|t| t.label == label) {
            bail!("unknown seed target '{label}'");
        }
    }
    let timer = ManualTimer::new();
    let mode = SchedulerMode {
        allow_queue,
        seed: seed.map(TargetId::new),
    };
    let mut source = ScriptedGazeSource::new(trace, timer.clone());
    let mut surface = HeadlessSurface::default();
    let trial = GazeTrial::new(config, 0, timer.now(), mode);
    Ok(trial.run(
        &timer,
        config.frame_interval(),
        &mut source,
        &mut surface,
        sink,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazex_core::TerminationReason;
    use gazex_experiment::MemorySink;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn circle_trace(config: &ExperimentConfig) -> GazeTrace {
        GazeTrace::new().fixate(config.targets[0].position, 400)
    }

    #[test]
    fn single_trial_stalls_after_one_selection() {
        let config = ExperimentConfig::default();
        let mut sink = MemorySink::new();
        let summary =
            replay_trial(&config, circle_trace(&config), true, None, &mut sink).unwrap();
        assert_eq!(summary.selection_count, 1);
        assert_eq!(summary.termination, TerminationReason::SelectionStall);
        assert_eq!(summary.target_sequence(), vec![config.targets[0].id()]);
        assert_eq!(sink.executed().count(), 1);
        assert_eq!(sink.summaries.len(), 1);
    }

    #[test]
    fn seeded_trial_starts_with_the_seed() {
        let config = ExperimentConfig::default();
        let mut sink = MemorySink::new();
        let summary =
            replay_trial(&config, GazeTrace::new(), true, Some("star"), &mut sink).unwrap();
        assert_eq!(summary.target_sequence().first(), Some(&TargetId::new("star")));
    }

    #[test]
    fn unknown_seed_target_is_rejected() {
        let config = ExperimentConfig::default();
        let mut sink = MemorySink::new();
        let err = replay_trial(&config, GazeTrace::new(), true, Some("hexagon"), &mut sink)
            .unwrap_err();
        assert!(err.to_string().contains("hexagon"));
        assert!(sink.events.is_empty());
    }

    #[test]
    fn experiment_replay_completes_one_gaze_trial() {
        let mut config = ExperimentConfig::default();
        config.phases.training_trials = 0;
        config.phases.gaze_trials = 1;
        config.trial.max_selections_per_trial = 1;
        let trace = circle_trace(&config);
        let mut sink = MemorySink::new();
        let results =
            replay_experiment(config, trace, &mut StdRng::seed_from_u64(3), &mut sink).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].termination, TerminationReason::Complete);
        assert_eq!(sink.executed().count(), 1);
    }

    #[test]
    fn missing_trace_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_trace(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }
}
