//! Worker lifecycle states.

/// Service worker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Script evaluated, no lifecycle event yet
    #[default]
    Parsed,
    /// Install event running
    Installing,
    /// Installed, waiting to activate
    Installed,
    /// Activate event running
    Activating,
    /// Active and controlling pages
    Activated,
    /// Failed or replaced
    Redundant,
}

impl WorkerState {
    /// Fetch events are only routed to an active worker.
    pub fn controls_fetches(self) -> bool {
        self == WorkerState::Activated
    }
}

/// Whether `from -> to` is a legal lifecycle step.
pub fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
    use WorkerState::*;

    matches!(
        (from, to),
        (Parsed, Installing)
            | (Installing, Installed)
            | (Installing, Redundant)
            | (Installed, Activating)
            | (Activating, Activated)
            | (Activating, Redundant)
            | (Activated, Redundant)
    )
}
