use thiserror::Error;

use crate::memory::AccessWidth;

/// Fault classes used for reporting and host policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Register reference could not be resolved.
    Register,
    /// Address-space alignment, range or protection violation.
    Memory,
    /// Instruction word did not decode or cannot be executed.
    Decode,
    /// Supervisor-call dispatch failure.
    Dispatch,
}

/// Every error the simulator core reports.
///
/// All variants are fatal to the `tick()` that raised them. State mutated
/// before the failing sub-operation is left in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum SimError {
    /// Unknown symbolic or out-of-range numeric register reference.
    #[error("invalid register reference `{0}`")]
    InvalidRegister(String),
    /// Address is not a multiple of the access width.
    #[error("address {addr:#010x} is not aligned for a {width} access")]
    MisalignedAccess {
        /// Requested address.
        addr: u32,
        /// Requested access width.
        width: AccessWidth,
    },
    /// Address resolves to neither the code region nor working memory.
    #[error("address {addr:#010x} is out of range for a {width} access")]
    AddressOutOfRange {
        /// Requested address.
        addr: u32,
        /// Requested access width.
        width: AccessWidth,
    },
    /// Code-region write attempted without the write-enable capability.
    #[error("write to code region at {addr:#010x} without write enable")]
    WriteProtected {
        /// Requested address.
        addr: u32,
    },
    /// No decode rule matches the instruction word.
    #[error("unrecognized opcode {word:#06x}")]
    UnrecognizedOpcode {
        /// Raw instruction word (a 32-bit word for wide encodings).
        word: u32,
    },
    /// Supervisor call executed with no registered handler.
    #[error("no handler registered for svc #{number}")]
    UnhandledSupervisorCall {
        /// 8-bit call number from the instruction.
        number: u8,
    },
    /// Encoding decodes but this core cannot execute it.
    #[error("unimplemented instruction `{mnemonic}` ({word:#06x})")]
    Unimplemented {
        /// Raw instruction word.
        word: u32,
        /// Mnemonic of the matching decode rule.
        mnemonic: &'static str,
    },
}

impl SimError {
    /// Returns the reporting class for this error.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        match self {
            Self::InvalidRegister(_) => FaultClass::Register,
            Self::MisalignedAccess { .. }
            | Self::AddressOutOfRange { .. }
            | Self::WriteProtected { .. } => FaultClass::Memory,
            Self::UnrecognizedOpcode { .. } | Self::Unimplemented { .. } => FaultClass::Decode,
            Self::UnhandledSupervisorCall { .. } => FaultClass::Dispatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FaultClass, SimError};
    use crate::memory::AccessWidth;

    #[test]
    fn class_mapping_matches_fault_taxonomy() {
        assert_eq!(
            SimError::InvalidRegister("r16".into()).class(),
            FaultClass::Register
        );
        assert_eq!(
            SimError::MisalignedAccess {
                addr: 1,
                width: AccessWidth::Word
            }
            .class(),
            FaultClass::Memory
        );
        assert_eq!(
            SimError::WriteProtected { addr: 0 }.class(),
            FaultClass::Memory
        );
        assert_eq!(
            SimError::UnrecognizedOpcode { word: 0xB600 }.class(),
            FaultClass::Decode
        );
        assert_eq!(
            SimError::UnhandledSupervisorCall { number: 3 }.class(),
            FaultClass::Dispatch
        );
    }

    #[test]
    fn messages_carry_hex_context() {
        let err = SimError::AddressOutOfRange {
            addr: 0x1000_0000,
            width: AccessWidth::Halfword,
        };
        assert_eq!(
            err.to_string(),
            "address 0x10000000 is out of range for a halfword access"
        );
        assert_eq!(
            SimError::UnhandledSupervisorCall { number: 129 }.to_string(),
            "no handler registered for svc #129"
        );
    }
}
