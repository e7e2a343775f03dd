//! Architectural CPU state model primitives.

/// Core register file, register selectors and `APSR` flags.
pub mod registers;
/// Latched execution state of a [`crate::Core`].
pub mod run_state;

pub use registers::{
    Register, RegisterFile, APSR_C, APSR_FLAGS_MASK, APSR_N, APSR_V, APSR_Z, REGISTER_COUNT,
};
pub use run_state::RunState;
