//! Supervisor states.

use std::fmt;

/// Where the supervisor is in its lifecycle.
///
/// ```text
/// STOPPED → CONFIGURING → STARTING_LISTENERS → RUNNING → TEARING_DOWN → STOPPED
///                               │                                 ▲
///                               └── socket failure ───────────────┘
/// RECOVERABLE_FAILURE is entered from the web listener's own task and
/// merges into TEARING_DOWN through the control flags.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Configuring,
    StartingListeners,
    Running,
    TearingDown,
    RecoverableFailure,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Stopped => "STOPPED",
            SupervisorState::Configuring => "CONFIGURING",
            SupervisorState::StartingListeners => "STARTING_LISTENERS",
            SupervisorState::Running => "RUNNING",
            SupervisorState::TearingDown => "TEARING_DOWN",
            SupervisorState::RecoverableFailure => "RECOVERABLE_FAILURE",
        };
        f.write_str(name)
    }
}
