//! Instruction-set simulator core for a 32-bit Thumb processor.
//!
//! The crate models the register file, a split code/working-memory address
//! space, ordered decode tables, a single-step execution engine and a
//! supervisor-call table through which programs reach the host.
//!
//! [`Core`] is the usual entry point: load an image with [`load_image`],
//! prepare registers with [`AppHeader::apply`], register supervisor calls and
//! call [`Core::run`].

/// Address space: code region, working memory and width-typed access.
pub mod memory;
pub use memory::{
    resolve_address, validate_alignment, AccessWidth, AddressSpace, CodeWrite, MemoryRegion,
    ResolvedAddress, CODE_BASE, DEFAULT_CODE_BYTES, DEFAULT_RAM_BYTES, RAM_BASE,
};

/// Register file and latched run state.
pub mod state;
pub use state::{Register, RegisterFile, RunState, REGISTER_COUNT};

/// Fault taxonomy shared by every component.
pub mod fault;
pub use fault::{FaultClass, SimError};

/// Ordered decode tables.
pub mod encoding;
pub use encoding::{
    is_wide_prefix, lookup_thumb16, lookup_thumb32, Condition, DecodeRule, OperandFields,
    Operation, THUMB16_DECODE_TABLE, THUMB32_DECODE_TABLE,
};

/// Table-driven decoder and operand extraction.
pub mod decoder;
pub use decoder::{extract_field, DecodedInstruction, Decoder};

/// Fetch/decode/execute step.
pub mod execute;
pub use execute::{execute_instruction, fetch_and_decode, step_one, FlagsUpdate};

/// Supervisor-call table.
pub mod svc;
pub use svc::{return_to_caller, SupervisorCalls, SvcAction, SvcHandler};

/// Host-facing core driver and configuration.
pub mod api;
pub use api::{ConfigError, Core, CoreConfig, CoreState, RunOutcome, StepOutcome, StopReason};

/// Image and application-header loading.
pub mod loader;
pub use loader::{
    load_image, AppHeader, LoadError, APP_HEADER_BYTES, APP_HEADER_MAGIC, DEFAULT_LOAD_ADDRESS,
    HOST_RETURN_ADDRESS,
};

/// Disassembly of decoded instructions.
pub mod disasm;
pub use disasm::disassemble;

#[cfg(test)]
use proptest as _;
