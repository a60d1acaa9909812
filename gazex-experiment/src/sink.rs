//! Selection log and trial sequence export.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use gazex_core::{SelectionEvent, TargetId, TerminationReason, TrialSummary};
use serde::{Deserialize, Serialize};

use crate::error::SinkError;

/// Receives selection records in emission order.
///
/// A failed `record` must be reported. The scheduler writes the record before
/// touching its state, so an `Err` here leaves the trial as it was.
pub trait SelectionEventSink {
    fn record(&mut self, event: &SelectionEvent) -> Result<(), SinkError>;

    /// Trial-end hand-off for sequence export.
    fn record_summary(&mut self, _summary: &TrialSummary) -> Result<(), SinkError> {
        Ok(())
    }
}

/// In-memory sink.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub events: Vec<SelectionEvent>,
    pub summaries: Vec<TrialSummary>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> impl Iterator<Item = &SelectionEvent> {
        self.events.iter().filter(|e| e.was_executed)
    }
}

impl SelectionEventSink for MemorySink {
    fn record(&mut self, event: &SelectionEvent) -> Result<(), SinkError> {
        self.events.push(event.clone());
        Ok(())
    }

    fn record_summary(&mut self, summary: &TrialSummary) -> Result<(), SinkError> {
        self.summaries.push(summary.clone());
        Ok(())
    }
}

/// Per-trial sequence row: what was shown, where, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub trial_id: usize,
    /// 1-based order of executed selections.
    pub selection_order: Vec<u32>,
    pub target_sequence: Vec<TargetId>,
    pub position_sequence: Vec<(f32, f32)>,
    /// Latency of each selection: from trial start for the first, from the previous one after.
    pub timing_sequence_ms: Vec<u64>,
    pub termination: TerminationReason,
}

impl From<&TrialSummary> for SequenceRecord {
    fn from(summary: &TrialSummary) -> Self {
        Self {
            trial_id: summary.trial_id,
            selection_order: (1..=summary.selections.len() as u32).collect(),
            target_sequence: summary.target_sequence(),
            position_sequence: summary.selections.iter().map(|s| s.position).collect(),
            timing_sequence_ms: summary.timing_sequence_ms(),
            termination: summary.termination,
        }
    }
}

/// One line of the JSON-lines log.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LogRecord<'a> {
    Selection(&'a SelectionEvent),
    Sequence(SequenceRecord),
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    line: u64,
    #[serde(flatten)]
    record: LogRecord<'a>,
}

/// Newline-delimited JSON writer. Every line is flushed before `record` returns.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    line: u64,
}

impl JsonLinesSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, line: 0 }
    }

    pub fn lines_written(&self) -> u64 {
        self.line
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, record: LogRecord<'_>) -> Result<(), SinkError> {
        let envelope = Envelope {
            line: self.line,
            record,
        };
        let text = serde_json::to_string(&envelope)?;
        writeln!(self.writer, "{text}")?;
        self.writer.flush()?;
        self.line += 1;
        Ok(())
    }
}

impl<W: Write> SelectionEventSink for JsonLinesSink<W> {
    fn record(&mut self, event: &SelectionEvent) -> Result<(), SinkError> {
        self.write(LogRecord::Selection(event))
    }

    fn record_summary(&mut self, summary: &TrialSummary) -> Result<(), SinkError> {
        self.write(LogRecord::Sequence(SequenceRecord::from(summary)))
    }
}

impl<S: SelectionEventSink + ?Sized> SelectionEventSink for &mut S {
    fn record(&mut self, event: &SelectionEvent) -> Result<(), SinkError> {
        (**self).record(event)
    }

    fn record_summary(&mut self, summary: &TrialSummary) -> Result<(), SinkError> {
        (**self).record_summary(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazex_core::ExecutedSelection;
    use std::io::{BufRead, BufReader};

    fn event(n: u32) -> SelectionEvent {
        SelectionEvent {
            trial_id: 2,
            selection_num: n,
            target: TargetId::new("circle"),
            position: (-480.0, -270.0),
            fixation_duration_ms: 330.0,
            queued: false,
            was_executed: true,
            timestamp_ns: 1_000_000_000 * n as u64,
            rt_from_trial_start_ms: 1_000.0 * n as f64,
            rt_from_previous_selection_ms: 1_000.0,
        }
    }

    fn summary() -> TrialSummary {
        TrialSummary {
            trial_id: 2,
            termination: TerminationReason::SelectionStall,
            selection_count: 1,
            start_ns: 0,
            end_ns: 9_000_000_000,
            selections: vec![ExecutedSelection {
                target: TargetId::new("star"),
                position: (-480.0, 270.0),
                timestamp_ns: 1_500_000_000,
                latency_ms: 1_500.0,
            }],
        }
    }

    #[test]
    fn writes_tagged_lines_in_order() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.record(&event(1)).unwrap();
        sink.record(&event(2)).unwrap();
        sink.record_summary(&summary()).unwrap();
        assert_eq!(sink.lines_written(), 3);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "selection");
        assert_eq!(lines[0]["line"], 0);
        assert_eq!(lines[0]["target"], "circle");
        assert_eq!(lines[1]["selection_num"], 2);
        assert_eq!(lines[2]["type"], "sequence");
        assert_eq!(lines[2]["target_sequence"][0], "star");
        assert_eq!(lines[2]["timing_sequence_ms"][0], 1500);
        assert_eq!(lines[2]["termination"], "selection-stall");
    }

    #[test]
    fn file_sink_flushes_each_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selections.jsonl");
        let mut sink = JsonLinesSink::create(&path).unwrap();
        sink.record(&event(1)).unwrap();

        // Readable before the sink is dropped.
        let file = File::open(&path).unwrap();
        let lines: Vec<String> = BufReader::new(file).lines().map(Result::unwrap).collect();
        assert_eq!(lines.len(), 1);
        let back: SelectionEvent = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(back, event(1));
    }

    #[test]
    fn sequence_record_from_summary() {
        let record = SequenceRecord::from(&summary());
        assert_eq!(record.selection_order, vec![1]);
        assert_eq!(record.position_sequence, vec![(-480.0, 270.0)]);
    }

    #[test]
    fn memory_sink_filters_executed() {
        let mut sink = MemorySink::new();
        let mut queued = event(2);
        queued.queued = true;
        queued.was_executed = false;
        sink.record(&event(1)).unwrap();
        sink.record(&queued).unwrap();
        assert_eq!(sink.executed().count(), 1);
    }
}
