use gazex_core::TerminationReason;
use tracing::info;

use crate::config::PhaseConfig;

/// Bounds on the gaze-triggered phase: how many attempts, how many must
/// succeed, and when to interleave the attention getter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPolicy {
    pub max_attempts: u32,
    pub required_successes: u32,
    /// Consecutive failures before the attention getter. 0 disables it.
    pub attention_getter_after: u32,
}

impl AttemptPolicy {
    pub fn from_config(config: &PhaseConfig) -> Self {
        Self {
            max_attempts: config.max_gaze_attempts,
            required_successes: config.gaze_trials,
            attention_getter_after: config.attention_getter_after,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    RunTrial,
    AttentionGetter,
    Finished,
}

#[derive(Debug, Clone)]
pub struct AttemptTracker {
    policy: AttemptPolicy,
    attempts: u32,
    successes: u32,
    consecutive_failures: u32,
    outcomes: Vec<TerminationReason>,
}

impl AttemptTracker {
    pub fn new(policy: AttemptPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            successes: 0,
            consecutive_failures: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn next_step(&self) -> NextStep {
        if self.successes >= self.policy.required_successes
            || self.attempts >= self.policy.max_attempts
        {
            NextStep::Finished
        } else if self.policy.attention_getter_after > 0
            && self.consecutive_failures >= self.policy.attention_getter_after
        {
            NextStep::AttentionGetter
        } else {
            NextStep::RunTrial
        }
    }

    pub fn record(&mut self, reason: TerminationReason) {
        self.attempts += 1;
        if reason.is_success() {
            self.successes += 1;
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
        self.outcomes.push(reason);
        info!(
            attempt = self.attempts,
            successes = self.successes,
            %reason,
            "gaze attempt recorded"
        );
    }

    pub fn attention_getter_played(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn successes(&self) -> u32 {
        self.successes
    }

    pub fn outcomes(&self) -> &[TerminationReason] {
        &self.outcomes
    }
}
