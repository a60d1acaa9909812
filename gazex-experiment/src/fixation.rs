use std::collections::HashMap;

use gazex_core::{GazeSample, Region, TargetId};

/// Per-region history of consecutive in-region samples.
///
/// A region's history is dropped the moment a sample falls outside it (or no
/// sample arrives at all), so a history never spans a gap.
#[derive(Debug, Default, Clone)]
pub struct FixationTracker {
    histories: HashMap<TargetId, Vec<(GazeSample, u64)>>,
}

impl FixationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the sample landed inside `region`.
    pub fn observe<R: Region + ?Sized>(
        &mut self,
        region: &R,
        sample: Option<&GazeSample>,
        now: u64,
    ) -> bool {
        match sample {
            Some(s) if region.contains(s) => {
                self.histories
                    .entry(region.target())
                    .or_default()
                    .push((*s, now));
                true
            }
            _ => {
                self.clear(region.target());
                false
            }
        }
    }

    /// Nanoseconds between the first and last sample of the current history.
    pub fn duration(&self, target: TargetId) -> u64 {
        match self.histories.get(&target).map(Vec::as_slice) {
            Some([(_, first), .., (_, last)]) => last.saturating_sub(*first),
            _ => 0,
        }
    }

    pub fn history_len(&self, target: TargetId) -> usize {
        self.histories.get(&target).map_or(0, Vec::len)
    }

    pub fn clear(&mut self, target: TargetId) {
        if let Some(h) = self.histories.get_mut(&target) {
            h.clear();
        }
    }

    pub fn reset(&mut self) {
        self.histories.clear();
    }
}
