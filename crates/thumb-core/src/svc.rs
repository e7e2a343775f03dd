//! Supervisor-call table: host callbacks keyed by the 8-bit `svc` immediate.

use std::fmt;

use tracing::debug;

use crate::{CoreState, SimError};

/// What the engine does after a supervisor-call handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum SvcAction {
    /// Keep executing from the (possibly rewritten) program counter.
    #[default]
    Continue,
    /// Stop the run cleanly; the core latches [`crate::RunState::Halted`].
    Halt,
}

/// Host callback invoked for one call number.
///
/// The handler sees the whole machine and may rewrite registers or memory.
pub type SvcHandler = Box<dyn FnMut(&mut CoreState) -> Result<SvcAction, SimError>>;

/// Number of addressable call numbers.
pub const SVC_TABLE_SIZE: usize = 256;

/// Sparse mapping from call number to handler.
pub struct SupervisorCalls {
    handlers: Vec<Option<SvcHandler>>,
}

impl Default for SupervisorCalls {
    fn default() -> Self {
        Self {
            handlers: std::iter::repeat_with(|| None)
                .take(SVC_TABLE_SIZE)
                .collect(),
        }
    }
}

impl fmt::Debug for SupervisorCalls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.registered()).finish()
    }
}

impl SupervisorCalls {
    /// Installs `handler` for `number`, replacing any earlier one.
    pub fn register<F>(&mut self, number: u8, handler: F)
    where
        F: FnMut(&mut CoreState) -> Result<SvcAction, SimError> + 'static,
    {
        self.handlers[usize::from(number)] = Some(Box::new(handler));
    }

    /// Returns `true` when a handler is installed for `number`.
    #[must_use]
    pub fn is_registered(&self, number: u8) -> bool {
        self.handlers[usize::from(number)].is_some()
    }

    /// Iterates over the call numbers that have a handler.
    pub fn registered(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(|number| self.is_registered(*number))
    }

    /// Invokes the handler for `number` against `state`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnhandledSupervisorCall`] when nothing is
    /// registered, or whatever error the handler itself reports.
    pub fn dispatch(&mut self, number: u8, state: &mut CoreState) -> Result<SvcAction, SimError> {
        let handler = self.handlers[usize::from(number)]
            .as_mut()
            .ok_or(SimError::UnhandledSupervisorCall { number })?;
        debug!(number, lr = state.registers.lr(), "svc");
        handler(state)
    }
}

/// Handler that returns to the caller by copying `lr` into `pc`.
///
/// # Errors
///
/// Never fails; the signature matches [`SvcHandler`].
pub fn return_to_caller(state: &mut CoreState) -> Result<SvcAction, SimError> {
    let lr = state.registers.lr();
    state.registers.set_pc(lr);
    Ok(SvcAction::Continue)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::{return_to_caller, SupervisorCalls, SvcAction};
    use crate::{CoreState, SimError};

    #[test]
    fn unregistered_number_is_an_error() {
        let mut table = SupervisorCalls::default();
        let mut state = CoreState::default();
        assert_eq!(
            table.dispatch(7, &mut state),
            Err(SimError::UnhandledSupervisorCall { number: 7 })
        );
    }

    #[test]
    fn handler_receives_mutable_state() {
        let mut table = SupervisorCalls::default();
        table.register(129, return_to_caller);
        let mut state = CoreState::default();
        state.registers.set_lr(0x1235);

        assert_eq!(table.dispatch(129, &mut state), Ok(SvcAction::Continue));
        assert_eq!(state.registers.pc(), 0x1235);
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        let mut table = SupervisorCalls::default();
        table.register(0, |_| Ok(SvcAction::Continue));
        table.register(0, move |_| {
            seen.set(seen.get() + 1);
            Ok(SvcAction::Halt)
        });

        let mut state = CoreState::default();
        assert_eq!(table.dispatch(0, &mut state), Ok(SvcAction::Halt));
        assert_eq!(calls.get(), 1);
        assert_eq!(table.registered().collect::<Vec<_>>(), [0]);
        assert_eq!(format!("{table:?}"), "{0}");
    }
}
