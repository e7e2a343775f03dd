use crate::SimError;

/// Host-observable execution state of a core.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    /// Ready to execute the next instruction.
    #[default]
    Running,
    /// A supervisor-call handler asked the run to stop.
    Halted,
    /// A fatal error stopped execution; no further progress until reset.
    Faulted(SimError),
}

impl RunState {
    /// Returns the latched error, if this state is faulted.
    #[must_use]
    pub const fn latched_fault(&self) -> Option<&SimError> {
        match self {
            Self::Faulted(cause) => Some(cause),
            Self::Running | Self::Halted => None,
        }
    }
}
