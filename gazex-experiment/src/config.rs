use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use gazex_core::{RegionOfInterest, StimulusShape, TargetId, TargetVisual};
use gazex_timing::ms_to_ns;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Whether triggering one target touches the cooldown of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CooldownPolicy {
    /// Each target keeps its own cooldown timer.
    #[default]
    Independent,
    /// A new selection clears every other target's cooldown.
    ResetOthers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub label: String,
    pub shape: StimulusShape,
    /// Centered screen coordinates, +y up.
    pub position: (f32, f32),
    #[serde(default = "default_aoi")]
    pub aoi_width: f32,
    #[serde(default = "default_aoi")]
    pub aoi_height: f32,
}

fn default_aoi() -> f32 {
    450.0
}

impl TargetConfig {
    pub fn new(label: &str, shape: StimulusShape, position: (f32, f32)) -> Self {
        Self {
            label: label.to_string(),
            shape,
            position,
            aoi_width: default_aoi(),
            aoi_height: default_aoi(),
        }
    }

    pub fn id(&self) -> TargetId {
        TargetId::new(&self.label)
    }
}

/// Gaze-triggered trial parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    pub required_fixation_ms: u64,
    /// 0 disables the cooldown.
    pub cooldown_ms: u64,
    pub max_trial_duration_ms: u64,
    pub initial_selection_timeout_ms: u64,
    pub inter_selection_timeout_ms: u64,
    pub max_selections_per_trial: u32,
    pub allow_queue: bool,
    pub cooldown_policy: CooldownPolicy,
    /// Cut an in-flight animation at `max_trial_duration_ms` instead of letting it finish.
    pub hard_deadline: bool,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            required_fixation_ms: 330,
            cooldown_ms: 500,
            max_trial_duration_ms: 15_000,
            initial_selection_timeout_ms: 5_000,
            inter_selection_timeout_ms: 5_000,
            max_selections_per_trial: 5,
            allow_queue: true,
            cooldown_policy: CooldownPolicy::Independent,
            hard_deadline: false,
        }
    }
}

/// Loom / jiggle / fade-back parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub init_size: f32,
    pub target_size: f32,
    pub init_opacity: f32,
    pub target_opacity: f32,
    pub loom_ms: u64,
    pub jiggle_ms: u64,
    pub fade_ms: u64,
    pub jiggle_amplitude_deg: f32,
    pub jiggle_frequency_hz: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            init_size: 300.0,
            target_size: 450.0,
            init_opacity: 0.3,
            target_opacity: 1.0,
            loom_ms: 1_000,
            jiggle_ms: 500,
            fade_ms: 250,
            jiggle_amplitude_deg: 5.0,
            jiggle_frequency_hz: 2.0,
        }
    }
}

impl AnimationConfig {
    pub fn total_ns(&self) -> u64 {
        ms_to_ns(self.loom_ms + self.jiggle_ms + self.fade_ms)
    }
}

/// Phase orchestration: trial counts, attempts and interstitials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    pub training_trials: usize,
    /// Successful gaze-triggered trials required to finish the phase.
    pub gaze_trials: u32,
    pub max_gaze_attempts: u32,
    /// Consecutive failed attempts before the attention getter plays. 0 disables it.
    pub attention_getter_after: u32,
    pub attention_getter_ms: u64,
    pub fixator_spin_ms: u64,
    pub inter_trial_interval_ms: u64,
    pub randomize_positions: bool,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            training_trials: 3,
            gaze_trials: 3,
            max_gaze_attempts: 6,
            attention_getter_after: 2,
            attention_getter_ms: 3_000,
            fixator_spin_ms: 1_000,
            inter_trial_interval_ms: 500,
            randomize_positions: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub targets: Vec<TargetConfig>,
    pub trial: TrialConfig,
    pub animation: AnimationConfig,
    pub phases: PhaseConfig,
    /// Frame pacing for headless runs.
    pub frame_interval_us: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        // Screen quadrants of a 1920x1080 display.
        Self {
            targets: vec![
                TargetConfig::new("circle", StimulusShape::Circle, (-480.0, -270.0)),
                TargetConfig::new("cross", StimulusShape::Cross, (480.0, -270.0)),
                TargetConfig::new("star", StimulusShape::Star, (-480.0, 270.0)),
                TargetConfig::new("t", StimulusShape::Tee, (480.0, 270.0)),
            ],
            trial: TrialConfig::default(),
            animation: AnimationConfig::default(),
            phases: PhaseConfig::default(),
            frame_interval_us: 16_667,
        }
    }
}

impl ExperimentConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        let mut seen = HashSet::new();
        for t in &self.targets {
            if !seen.insert(t.label.as_str()) {
                return Err(ConfigError::DuplicateTarget(t.label.clone()));
            }
            if !(positive_finite(t.aoi_width) && positive_finite(t.aoi_height)) {
                return Err(ConfigError::invalid(
                    &format!("targets.{}.aoi", t.label),
                    "area of interest must have positive width and height",
                ));
            }
        }

        let trial = &self.trial;
        bounded("trial.cooldown_ms", trial.cooldown_ms)?;
        positive("trial.required_fixation_ms", trial.required_fixation_ms)?;
        positive("trial.max_trial_duration_ms", trial.max_trial_duration_ms)?;
        positive(
            "trial.initial_selection_timeout_ms",
            trial.initial_selection_timeout_ms,
        )?;
        positive(
            "trial.inter_selection_timeout_ms",
            trial.inter_selection_timeout_ms,
        )?;
        if trial.max_selections_per_trial == 0 {
            return Err(ConfigError::invalid(
                "trial.max_selections_per_trial",
                "must be at least 1",
            ));
        }

        let anim = &self.animation;
        positive("animation.loom_ms", anim.loom_ms)?;
        positive("animation.jiggle_ms", anim.jiggle_ms)?;
        positive("animation.fade_ms", anim.fade_ms)?;
        if !(positive_finite(anim.init_size) && positive_finite(anim.target_size)) {
            return Err(ConfigError::invalid("animation.size", "sizes must be positive"));
        }
        for (field, v) in [
            ("animation.init_opacity", anim.init_opacity),
            ("animation.target_opacity", anim.target_opacity),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::invalid(field, "opacity must be within 0..=1"));
            }
        }

        let phases = &self.phases;
        positive("phases.fixator_spin_ms", phases.fixator_spin_ms)?;
        bounded("phases.inter_trial_interval_ms", phases.inter_trial_interval_ms)?;
        bounded("phases.attention_getter_ms", phases.attention_getter_ms)?;
        if phases.gaze_trials > 0 && phases.max_gaze_attempts == 0 {
            return Err(ConfigError::invalid(
                "phases.max_gaze_attempts",
                "must allow at least one attempt",
            ));
        }
        if phases.attention_getter_after > 0 {
            positive("phases.attention_getter_ms", phases.attention_getter_ms)?;
        }
        positive("frame_interval_us", self.frame_interval_us)?;
        Ok(())
    }

    pub fn regions(&self) -> Vec<RegionOfInterest> {
        self.targets
            .iter()
            .map(|t| RegionOfInterest::rectangle(t.id(), t.position, t.aoi_width, t.aoi_height))
            .collect()
    }

    /// Every target at rest, in configured order.
    pub fn baseline_visuals(&self) -> Vec<TargetVisual> {
        self.targets
            .iter()
            .map(|t| TargetVisual {
                target: t.id(),
                shape: t.shape,
                position: t.position,
                size: self.animation.init_size,
                opacity: self.animation.init_opacity,
                orientation: 0.0,
            })
            .collect()
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(self.frame_interval_us)
    }

    /// Reassigns the configured positions to targets in random order.
    pub fn shuffle_positions<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut positions: Vec<(f32, f32)> = self.targets.iter().map(|t| t.position).collect();
        positions.shuffle(rng);
        for (target, pos) in self.targets.iter_mut().zip(positions) {
            target.position = pos;
        }
    }
}

/// Upper bound for any millisecond setting: one week. Keeps nanosecond
/// arithmetic on these values, and sums of them, inside `u64`.
pub const MAX_DURATION_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

fn bounded(field: &str, value: u64) -> Result<(), ConfigError> {
    if value > MAX_DURATION_MS {
        Err(ConfigError::invalid(
            field,
            format!("must be at most {MAX_DURATION_MS} ms"),
        ))
    } else {
        Ok(())
    }
}

fn positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    bounded(field, value)
}

/// False for NaN and infinities as well as non-positive values.
fn positive_finite(value: f32) -> bool {
    value.is_finite() && value > 0.0
}
