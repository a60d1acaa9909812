/// Defines experiment phases and behavior
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn next(&self) -> Option<Self>;

    /// Phases that wait for the experimenter before moving on.
    fn awaits_start(&self) -> bool {
        false
    }
    fn is_training(&self) -> bool {
        false
    }
    fn is_gaze_triggered(&self) -> bool {
        false
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum StandardPhase {
    #[default]
    Welcome,
    Training,
    GazeTriggered,
    Debrief,
}

impl Phase for StandardPhase {
    fn next(&self) -> Option<Self> {
        use StandardPhase::*;
        Some(match self {
            Welcome => Training,
            Training => GazeTriggered,
            GazeTriggered => Debrief,
            Debrief => return None,
        })
    }

    fn awaits_start(&self) -> bool {
        matches!(self, StandardPhase::Welcome)
    }

    fn is_training(&self) -> bool {
        matches!(self, StandardPhase::Training)
    }

    fn is_gaze_triggered(&self) -> bool {
        matches!(self, StandardPhase::GazeTriggered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_phases_run_in_order() {
        let mut phase = StandardPhase::default();
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            phase = next;
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                StandardPhase::Welcome,
                StandardPhase::Training,
                StandardPhase::GazeTriggered,
                StandardPhase::Debrief
            ]
        );
        assert!(StandardPhase::Welcome.awaits_start());
        assert!(StandardPhase::Training.is_training());
        assert!(StandardPhase::GazeTriggered.is_gaze_triggered());
    }
}
