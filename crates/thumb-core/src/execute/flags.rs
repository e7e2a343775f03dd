//! APSR update behaviors for different instruction classes.

use crate::state::{RegisterFile, APSR_C, APSR_N, APSR_V, APSR_Z};

/// Describes how APSR should be updated after an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagsUpdate {
    /// Update N and Z from the result; C and V keep their values.
    Nz {
        /// Value the flags are derived from.
        result: u32,
    },
    /// Update N and Z from the result and C from the shifter.
    Nzc {
        /// Value the flags are derived from.
        result: u32,
        /// Carry out.
        carry: bool,
    },
    /// Update all four condition flags.
    Nzcv {
        /// Value the flags are derived from.
        result: u32,
        /// Carry out.
        carry: bool,
        /// Signed overflow.
        overflow: bool,
    },
}

impl FlagsUpdate {
    /// Writes the described flags into `regs`.
    pub const fn apply(self, regs: &mut RegisterFile) {
        let (result, carry, overflow) = match self {
            Self::Nz { result } => (result, None, None),
            Self::Nzc { result, carry } => (result, Some(carry), None),
            Self::Nzcv {
                result,
                carry,
                overflow,
            } => (result, Some(carry), Some(overflow)),
        };
        regs.set_flag(APSR_N, result & (1 << 31) != 0);
        regs.set_flag(APSR_Z, result == 0);
        if let Some(carry) = carry {
            regs.set_flag(APSR_C, carry);
        }
        if let Some(overflow) = overflow {
            regs.set_flag(APSR_V, overflow);
        }
    }
}

/// `x + y + carry_in` with carry-out and signed overflow.
#[must_use]
pub const fn add_with_carry(x: u32, y: u32, carry_in: bool) -> (u32, bool, bool) {
    let wide = x as u64 + y as u64 + carry_in as u64;
    let result = wide as u32;
    let carry = wide > u32::MAX as u64;
    let overflow = ((x ^ result) & (y ^ result)) & (1 << 31) != 0;
    (result, carry, overflow)
}

/// Flags for `x + y + carry_in`.
#[must_use]
pub const fn add_flags(x: u32, y: u32, carry_in: bool) -> (u32, FlagsUpdate) {
    let (result, carry, overflow) = add_with_carry(x, y, carry_in);
    (
        result,
        FlagsUpdate::Nzcv {
            result,
            carry,
            overflow,
        },
    )
}

/// Flags for `x - y`, computed as `x + !y + 1`.
#[must_use]
pub const fn sub_flags(x: u32, y: u32) -> (u32, FlagsUpdate) {
    add_flags(x, !y, true)
}
