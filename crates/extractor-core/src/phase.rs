//! Extraction phases and their display metadata.

/// A stage in the lifecycle of one extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Uploading,
    Extracting,
    Interpreting,
    Saving,
    Complete,
    Error,
}

/// How a phase lane should render relative to the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseSlot {
    Completed,
    Active,
    Pending,
}

impl Phase {
    /// The working phases, in the order a job passes through them.
    pub const WORKING: [Phase; 4] = [
        Phase::Uploading,
        Phase::Extracting,
        Phase::Interpreting,
        Phase::Saving,
    ];

    /// Default status message shown while this phase is active.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Idle => "Ready to upload",
            Self::Uploading => "Uploading file...",
            Self::Extracting => "Extracting text with OCR...",
            Self::Interpreting => "Processing with AI...",
            Self::Saving => "Saving invoice...",
            Self::Complete => "Extraction complete!",
            Self::Error => "Extraction failed",
        }
    }

    /// Nominal wall-clock duration of this phase, used to seed time
    /// estimates before any real progress data exists.
    pub fn nominal_duration_secs(&self) -> u64 {
        match self {
            Self::Idle => 0,
            Self::Uploading => 3,
            Self::Extracting => 22,
            Self::Interpreting => 3,
            Self::Saving => 1,
            Self::Complete => 0,
            Self::Error => 0,
        }
    }

    /// Sum of the nominal durations of all working phases.
    pub fn total_nominal_secs() -> u64 {
        Self::WORKING.iter().map(Phase::nominal_duration_secs).sum()
    }

    /// Position of this phase in the working sequence.
    ///
    /// `None` for `Idle`, `Complete` and `Error`, which sit outside the
    /// ordering.
    pub fn order_index(&self) -> Option<usize> {
        Self::WORKING.iter().position(|p| p == self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Classify this lane against the phase a job is currently in.
    pub fn slot(self, current: Phase) -> PhaseSlot {
        if self == current {
            return PhaseSlot::Active;
        }
        match (self.order_index(), current.order_index()) {
            (Some(mine), Some(cur)) if mine < cur => PhaseSlot::Completed,
            (Some(_), None) if current == Phase::Complete => PhaseSlot::Completed,
            _ => PhaseSlot::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_phases_are_ordered() {
        assert_eq!(Phase::Uploading.order_index(), Some(0));
        assert_eq!(Phase::Extracting.order_index(), Some(1));
        assert_eq!(Phase::Interpreting.order_index(), Some(2));
        assert_eq!(Phase::Saving.order_index(), Some(3));
    }

    #[test]
    fn lifecycle_phases_sit_outside_the_ordering() {
        assert_eq!(Phase::Idle.order_index(), None);
        assert_eq!(Phase::Complete.order_index(), None);
        assert_eq!(Phase::Error.order_index(), None);
    }

    #[test]
    fn only_complete_and_error_are_terminal() {
        assert!(Phase::Complete.is_terminal());
        assert!(Phase::Error.is_terminal());
        for phase in Phase::WORKING {
            assert!(!phase.is_terminal());
        }
        assert!(!Phase::Idle.is_terminal());
    }

    #[test]
    fn nominal_durations_sum_over_working_phases() {
        assert_eq!(Phase::total_nominal_secs(), 29);
    }

    #[test]
    fn slot_splits_lanes_around_the_active_phase() {
        assert_eq!(Phase::Uploading.slot(Phase::Interpreting), PhaseSlot::Completed);
        assert_eq!(Phase::Extracting.slot(Phase::Interpreting), PhaseSlot::Completed);
        assert_eq!(Phase::Interpreting.slot(Phase::Interpreting), PhaseSlot::Active);
        assert_eq!(Phase::Saving.slot(Phase::Interpreting), PhaseSlot::Pending);
    }

    #[test]
    fn all_lanes_complete_once_the_job_completes() {
        for phase in Phase::WORKING {
            assert_eq!(phase.slot(Phase::Complete), PhaseSlot::Completed);
        }
    }

    #[test]
    fn no_lane_is_complete_before_the_job_starts() {
        for phase in Phase::WORKING {
            assert_eq!(phase.slot(Phase::Idle), PhaseSlot::Pending);
        }
    }
}
