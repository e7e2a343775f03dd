//! Host-facing API for embedding the simulator core.

use thiserror::Error;
use tracing::warn;

use crate::execute::step_one;
use crate::loader::HOST_RETURN_ADDRESS;
use crate::memory::{AddressSpace, DEFAULT_CODE_BYTES, DEFAULT_RAM_BYTES, RAM_BASE};
use crate::state::{RegisterFile, RunState};
use crate::svc::{SupervisorCalls, SvcAction};
use crate::SimError;

/// Top-level configuration for a core instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CoreConfig {
    /// Code-region capacity in bytes.
    pub code_bytes: usize,
    /// Working-memory capacity in bytes.
    pub ram_bytes: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            code_bytes: DEFAULT_CODE_BYTES,
            ram_bytes: DEFAULT_RAM_BYTES,
        }
    }
}

/// Rejected [`CoreConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
    /// A region was configured with no storage.
    #[error("{region} region capacity must be non-zero")]
    ZeroCapacity {
        /// `"code"` or `"working-memory"`.
        region: &'static str,
    },
    /// The code region would reach into working memory.
    #[error("code region of {code_bytes:#x} bytes overlaps working memory at {RAM_BASE:#010x}")]
    CodeOverlapsRam {
        /// Requested code capacity.
        code_bytes: usize,
    },
    /// Working memory would run past the top of the 32-bit address space.
    #[error("working memory of {ram_bytes:#x} bytes runs past the 32-bit address space")]
    RamPastAddressSpace {
        /// Requested working-memory capacity.
        ram_bytes: usize,
    },
}

impl CoreConfig {
    /// Checks that both regions are non-empty and fit the address map.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.code_bytes == 0 {
            return Err(ConfigError::ZeroCapacity { region: "code" });
        }
        if self.ram_bytes == 0 {
            return Err(ConfigError::ZeroCapacity {
                region: "working-memory",
            });
        }
        if self.code_bytes as u64 > u64::from(RAM_BASE) {
            return Err(ConfigError::CodeOverlapsRam {
                code_bytes: self.code_bytes,
            });
        }
        if self.ram_bytes as u64 > u64::from(u32::MAX - RAM_BASE) + 1 {
            return Err(ConfigError::RamPastAddressSpace {
                ram_bytes: self.ram_bytes,
            });
        }
        Ok(())
    }
}

/// Complete machine state handed to the engine and to supervisor calls.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CoreState {
    /// Register file and condition flags.
    pub registers: RegisterFile,
    /// Code region and working memory.
    pub memory: AddressSpace,
}

impl Default for CoreState {
    fn default() -> Self {
        Self::with_config(&CoreConfig::default())
    }
}

impl CoreState {
    /// Zeroed registers and memory sized by `config`.
    #[must_use]
    pub fn with_config(config: &CoreConfig) -> Self {
        Self {
            registers: RegisterFile::default(),
            memory: AddressSpace::new(config.code_bytes, config.ram_bytes),
        }
    }
}

/// Result of one successful `tick()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StepOutcome {
    /// The instruction retired; execution can continue.
    Retired,
    /// A supervisor call asked to halt, or the core was already halted.
    Halted,
}

impl From<SvcAction> for StepOutcome {
    fn from(action: SvcAction) -> Self {
        match action {
            SvcAction::Continue => Self::Retired,
            SvcAction::Halt => Self::Halted,
        }
    }
}

/// Why [`Core::run`] stopped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// A supervisor call halted the core.
    Halted,
    /// The program counter reached the host return address.
    ReturnedToHost,
    /// `max_steps` instructions retired.
    StepLimit,
    /// An instruction faulted; the error is latched.
    Faulted(SimError),
}

/// Summary of a [`Core::run`] call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunOutcome {
    /// Instructions executed during this call.
    pub steps: u64,
    /// Stop condition.
    pub stop: StopReason,
}

/// Simulator instance: machine state, supervisor calls and run state.
#[derive(Debug)]
pub struct Core {
    state: CoreState,
    svc: SupervisorCalls,
    run_state: RunState,
    last_fetch: u32,
}

impl Core {
    /// Builds a core with zeroed registers and memory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` does not validate.
    pub fn new(config: &CoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            state: CoreState::with_config(config),
            svc: SupervisorCalls::default(),
            run_state: RunState::Running,
            last_fetch: 0,
        })
    }

    /// Machine state.
    #[must_use]
    pub const fn state(&self) -> &CoreState {
        &self.state
    }

    /// Mutable machine state, used by loaders and tests.
    pub const fn state_mut(&mut self) -> &mut CoreState {
        &mut self.state
    }

    /// Current run state.
    #[must_use]
    pub const fn run_state(&self) -> &RunState {
        &self.run_state
    }

    /// Address of the instruction most recently fetched by [`Core::tick`].
    ///
    /// After a fault this is the faulting instruction.
    #[must_use]
    pub const fn last_fetch_address(&self) -> u32 {
        self.last_fetch
    }

    /// Installs a supervisor-call handler for `number`.
    pub fn register_svc<F>(&mut self, number: u8, handler: F)
    where
        F: FnMut(&mut CoreState) -> Result<SvcAction, SimError> + 'static,
    {
        self.svc.register(number, handler);
    }

    /// Zeroes the register file and clears a latched halt or fault.
    ///
    /// Memory and registered supervisor calls are preserved.
    pub fn reset(&mut self) {
        self.state.registers.reset();
        self.run_state = RunState::Running;
        self.last_fetch = 0;
    }

    /// Executes one instruction.
    ///
    /// After a halt this keeps returning [`StepOutcome::Halted`], and after a
    /// fault it keeps returning the same error, until [`Core::reset`].
    ///
    /// # Errors
    ///
    /// Returns the [`SimError`] raised by fetch, decode or execute.
    pub fn tick(&mut self) -> Result<StepOutcome, SimError> {
        match &self.run_state {
            RunState::Running => {}
            RunState::Halted => return Ok(StepOutcome::Halted),
            RunState::Faulted(error) => return Err(error.clone()),
        }

        self.last_fetch = self.state.registers.pc().wrapping_sub(1);
        match step_one(&mut self.state, &mut self.svc) {
            Ok(StepOutcome::Retired) => Ok(StepOutcome::Retired),
            Ok(StepOutcome::Halted) => {
                self.run_state = RunState::Halted;
                Ok(StepOutcome::Halted)
            }
            Err(error) => {
                self.run_state = RunState::Faulted(error.clone());
                Err(error)
            }
        }
    }

    /// Ticks until a halt, a fault, a return to the host, or `max_steps`
    /// executed instructions.
    pub fn run(&mut self, max_steps: u64) -> RunOutcome {
        let mut steps = 0;
        let stop = loop {
            if matches!(self.run_state, RunState::Halted) {
                break StopReason::Halted;
            }
            if self.state.registers.pc() & !1 == HOST_RETURN_ADDRESS {
                break StopReason::ReturnedToHost;
            }
            if steps >= max_steps {
                break StopReason::StepLimit;
            }
            match self.tick() {
                Ok(StepOutcome::Retired) => steps += 1,
                Ok(StepOutcome::Halted) => {
                    steps += 1;
                    break StopReason::Halted;
                }
                Err(error) => {
                    warn!(
                        %error,
                        class = ?error.class(),
                        pc = format_args!("{:#010x}", self.state.registers.pc()),
                        "run stopped on fault"
                    );
                    break StopReason::Faulted(error);
                }
            }
        };
        RunOutcome { steps, stop }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, Core, CoreConfig, StepOutcome, StopReason};
    use crate::memory::CodeWrite;
    use crate::{SimError, RAM_BASE};

    #[test]
    fn default_config_validates() {
        assert_eq!(CoreConfig::default().validate(), Ok(()));
    }

    #[test]
    fn invalid_capacities_are_rejected() {
        let zero_code = CoreConfig {
            code_bytes: 0,
            ..CoreConfig::default()
        };
        assert_eq!(
            zero_code.validate(),
            Err(ConfigError::ZeroCapacity { region: "code" })
        );

        let zero_ram = CoreConfig {
            ram_bytes: 0,
            ..CoreConfig::default()
        };
        assert!(matches!(
            Core::new(&zero_ram),
            Err(ConfigError::ZeroCapacity {
                region: "working-memory"
            })
        ));

        let overlapping = CoreConfig {
            code_bytes: RAM_BASE as usize + 4,
            ..CoreConfig::default()
        };
        assert!(matches!(
            overlapping.validate(),
            Err(ConfigError::CodeOverlapsRam { .. })
        ));
    }

    #[test]
    fn tick_retires_and_records_fetch_address() {
        let mut core = Core::new(&CoreConfig::default()).unwrap();
        let state = core.state_mut();
        // movs r0, #1
        state
            .memory
            .write_halfword(0x40, 0x2001, CodeWrite::Allowed)
            .unwrap();
        state.registers.set_pc(0x41);

        assert_eq!(core.tick(), Ok(StepOutcome::Retired));
        assert_eq!(core.last_fetch_address(), 0x40);
        assert_eq!(core.state().registers.pc(), 0x43);
    }

    #[test]
    fn run_with_zero_budget_stops_immediately() {
        let mut core = Core::new(&CoreConfig::default()).unwrap();
        core.state_mut().registers.set_pc(0x41);
        let outcome = core.run(0);
        assert_eq!(outcome.steps, 0);
        assert_eq!(outcome.stop, StopReason::StepLimit);
    }

    #[test]
    fn fetch_outside_memory_faults() {
        let mut core = Core::new(&CoreConfig::default()).unwrap();
        core.state_mut().registers.set_pc(0x1000_0001);
        assert!(matches!(
            core.tick(),
            Err(SimError::AddressOutOfRange { addr: 0x1000_0000, .. })
        ));
    }
}
