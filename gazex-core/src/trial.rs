use serde::{Deserialize, Serialize};

use crate::stimulus::TargetId;

/// Selection scheduler state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerState {
    Idle,
    Active,
    ActiveQueued,
    Done,
}

/// Why a gaze-triggered trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    Timeout,
    NoFirstSelection,
    SelectionStall,
    Complete,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Timeout => "timeout",
            TerminationReason::NoFirstSelection => "no-first-selection",
            TerminationReason::SelectionStall => "selection-stall",
            TerminationReason::Complete => "complete",
        }
    }

    /// Only a trial that collected every selection counts as a success.
    pub fn is_success(&self) -> bool {
        matches!(self, TerminationReason::Complete)
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the selection log. Emitted in order, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionEvent {
    pub trial_id: usize,
    pub selection_num: u32,
    pub target: TargetId,
    pub position: (f32, f32),
    pub fixation_duration_ms: f64,
    pub queued: bool,
    pub was_executed: bool,
    pub timestamp_ns: u64,
    pub rt_from_trial_start_ms: f64,
    /// Equals `rt_from_trial_start_ms` until a first selection has executed.
    pub rt_from_previous_selection_ms: f64,
}

/// A selection that was actually shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedSelection {
    pub target: TargetId,
    pub position: (f32, f32),
    pub timestamp_ns: u64,
    /// From trial start for the first selection, from the previous one after that.
    pub latency_ms: f64,
}

/// Trial-end summary handed to sequence export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub trial_id: usize,
    pub termination: TerminationReason,
    pub selection_count: u32,
    pub start_ns: u64,
    pub end_ns: u64,
    pub selections: Vec<ExecutedSelection>,
}

impl TrialSummary {
    pub fn is_success(&self) -> bool {
        self.termination.is_success()
    }

    pub fn target_sequence(&self) -> Vec<TargetId> {
        self.selections.iter().map(|s| s.target).collect()
    }

    pub fn timing_sequence_ms(&self) -> Vec<u64> {
        self.selections
            .iter()
            .map(|s| s.latency_ms.max(0.0) as u64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_reason_wire_names() {
        for reason in [
            TerminationReason::Timeout,
            TerminationReason::NoFirstSelection,
            TerminationReason::SelectionStall,
            TerminationReason::Complete,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }
        assert!(TerminationReason::Complete.is_success());
        assert!(!TerminationReason::SelectionStall.is_success());
    }

    #[test]
    fn summary_sequences() {
        let summary = TrialSummary {
            trial_id: 1,
            termination: TerminationReason::Timeout,
            selection_count: 2,
            start_ns: 0,
            end_ns: 10,
            selections: vec![
                ExecutedSelection {
                    target: TargetId::new("circle"),
                    position: (0.0, 0.0),
                    timestamp_ns: 1_200_000_000,
                    latency_ms: 1200.0,
                },
                ExecutedSelection {
                    target: TargetId::new("star"),
                    position: (1.0, 1.0),
                    timestamp_ns: 3_000_000_000,
                    latency_ms: 1800.0,
                },
            ],
        };
        assert_eq!(
            summary.target_sequence(),
            vec![TargetId::new("circle"), TargetId::new("star")]
        );
        assert_eq!(summary.timing_sequence_ms(), vec![1200, 1800]);
        assert!(!summary.is_success());
    }

    #[test]
    fn scheduler_state_names() {
        assert_eq!(
            serde_json::to_string(&SchedulerState::ActiveQueued).unwrap(),
            "\"active-queued\""
        );
    }
}
