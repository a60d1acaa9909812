//! Loom animation: the visual response played for a selected target.
//!
//! Four phases run strictly in order, `Looming → Jiggling → FadeBack → Complete`.
//! Phase boundaries are carried forward by their exact durations rather than by the
//! time of the frame that noticed them, so completion lands exactly at
//! `loom + jiggle + fade` after start regardless of frame cadence.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use gazex_core::{RenderSurface, SoundCue, TargetId, TargetVisual};
use gazex_timing::{Timer, ms_to_ns, ns_to_secs};
use tracing::{debug, warn};

use crate::config::AnimationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoomState {
    Looming,
    Jiggling,
    FadeBack,
    Complete,
}

/// Optional one-shot sounds fired on entry to the loom and jiggle phases.
#[derive(Clone, Default)]
pub struct AnimationCues {
    pub loom: Option<Arc<dyn SoundCue>>,
    pub selection: Option<Arc<dyn SoundCue>>,
}

impl std::fmt::Debug for AnimationCues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationCues")
            .field("loom", &self.loom.is_some())
            .field("selection", &self.selection.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct LoomAnimation {
    config: AnimationConfig,
    baseline: TargetVisual,
    visual: TargetVisual,
    state: LoomState,
    phase_start_ns: Option<u64>,
    current_angle: f32,
    cues: AnimationCues,
    loom_cue_played: bool,
    selection_cue_played: bool,
    frame: Vec<TargetVisual>,
}

impl LoomAnimation {
    /// `baseline` is the target's resting appearance; it is restored on completion.
    pub fn new(baseline: TargetVisual, config: &AnimationConfig, cues: AnimationCues) -> Self {
        Self {
            config: *config,
            baseline,
            visual: baseline,
            state: LoomState::Looming,
            phase_start_ns: None,
            current_angle: 0.0,
            cues,
            loom_cue_played: false,
            selection_cue_played: false,
            frame: Vec::new(),
        }
    }

    /// Pins the animation's time origin. Without it the first `update` starts it.
    pub fn start(&mut self, now: u64) {
        if self.phase_start_ns.is_none() {
            self.phase_start_ns = Some(now);
        }
    }

    pub fn target(&self) -> TargetId {
        self.baseline.target
    }

    pub fn state(&self) -> LoomState {
        self.state
    }

    pub fn visual(&self) -> &TargetVisual {
        &self.visual
    }

    pub fn is_complete(&self) -> bool {
        self.state == LoomState::Complete
    }

    /// Advances the state machine, draws this target over the other static
    /// targets, and reports whether the animation has completed.
    pub fn update(
        &mut self,
        now: u64,
        surface: &mut dyn RenderSurface,
        background: &[TargetVisual],
    ) -> bool {
        let done = self.advance(now);
        self.frame.clear();
        let target = self.target();
        self.frame
            .extend(background.iter().filter(|v| v.target != target).copied());
        self.frame.push(self.visual);
        surface.draw_frame(&self.frame);
        done
    }

    /// State update without drawing.
    pub fn advance(&mut self, now: u64) -> bool {
        self.start(now);
        let cfg = self.config;
        let (loom_ns, jiggle_ns, fade_ns) = (
            ms_to_ns(cfg.loom_ms),
            ms_to_ns(cfg.jiggle_ms),
            ms_to_ns(cfg.fade_ms),
        );

        loop {
            let phase_start = self.phase_start_ns.unwrap_or(now);
            let elapsed = now.saturating_sub(phase_start);
            match self.state {
                LoomState::Looming => {
                    if !self.loom_cue_played {
                        self.loom_cue_played = true;
                        fire(self.cues.loom.as_deref(), "loom", self.target());
                    }
                    if elapsed < loom_ns {
                        let t = elapsed as f32 / loom_ns as f32;
                        self.visual.size = lerp(cfg.init_size, cfg.target_size, t);
                        self.visual.opacity = lerp(cfg.init_opacity, cfg.target_opacity, t);
                        break;
                    }
                    self.visual.size = cfg.target_size;
                    self.visual.opacity = cfg.target_opacity;
                    self.enter(LoomState::Jiggling, phase_start + loom_ns);
                }
                LoomState::Jiggling => {
                    if !self.selection_cue_played {
                        self.selection_cue_played = true;
                        fire(self.cues.selection.as_deref(), "selection", self.target());
                    }
                    if elapsed < jiggle_ns {
                        self.current_angle = self.jiggle_angle(elapsed);
                        self.visual.orientation = self.current_angle;
                        break;
                    }
                    self.current_angle = self.jiggle_angle(jiggle_ns);
                    self.visual.orientation = self.current_angle;
                    self.enter(LoomState::FadeBack, phase_start + jiggle_ns);
                }
                LoomState::FadeBack => {
                    if elapsed < fade_ns {
                        let t = elapsed as f32 / fade_ns as f32;
                        self.visual.size = lerp(cfg.target_size, cfg.init_size, t);
                        self.visual.opacity = lerp(cfg.target_opacity, cfg.init_opacity, t);
                        self.visual.orientation = self.current_angle * (1.0 - t);
                        break;
                    }
                    // Reset happens on this transition only, never again.
                    self.visual = self.baseline;
                    self.current_angle = 0.0;
                    self.enter(LoomState::Complete, phase_start + fade_ns);
                }
                LoomState::Complete => break,
            }
        }
        self.state == LoomState::Complete
    }

    /// Cuts an unfinished animation short: stops any cue it started and puts
    /// the target back at baseline. No-op once complete.
    pub fn cancel(&mut self) {
        if self.is_complete() {
            return;
        }
        if self.loom_cue_played {
            silence(self.cues.loom.as_deref(), "loom", self.target());
        }
        if self.selection_cue_played {
            silence(self.cues.selection.as_deref(), "selection", self.target());
        }
        debug!(target_id = %self.target(), state = ?self.state, "loom cancelled");
        self.visual = self.baseline;
        self.current_angle = 0.0;
        self.state = LoomState::Complete;
    }

    /// Plays the whole animation with frame pacing from `timer`.
    pub fn run_to_completion<T: Timer>(
        &mut self,
        timer: &T,
        frame_interval: Duration,
        surface: &mut dyn RenderSurface,
        background: &[TargetVisual],
    ) {
        self.start(timer.now());
        while !self.update(timer.now(), surface, background) {
            timer.sleep(frame_interval);
        }
    }

    fn enter(&mut self, state: LoomState, phase_start: u64) {
        debug!(target_id = %self.target(), ?state, "loom phase");
        self.state = state;
        self.phase_start_ns = Some(phase_start);
    }

    fn jiggle_angle(&self, elapsed_ns: u64) -> f32 {
        let secs = ns_to_secs(elapsed_ns) as f32;
        self.config.jiggle_amplitude_deg * (2.0 * PI * self.config.jiggle_frequency_hz * secs).sin()
    }
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + t * (to - from)
}

fn fire(cue: Option<&dyn SoundCue>, name: &str, target: TargetId) {
    if let Some(cue) = cue {
        if let Err(e) = cue.play() {
            warn!(target_id = %target, cue = name, error = %e, "sound cue failed");
        }
    }
}

fn silence(cue: Option<&dyn SoundCue>, name: &str, target: TargetId) {
    if let Some(cue) = cue {
        if let Err(e) = cue.stop() {
            warn!(target_id = %target, cue = name, error = %e, "sound cue failed to stop");
        }
    }
}
