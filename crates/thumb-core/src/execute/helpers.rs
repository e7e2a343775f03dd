//! Helper functions for instruction execution.

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use crate::encoding::Condition;
use crate::state::{APSR_C, APSR_N, APSR_V, APSR_Z};

/// Evaluates a branch condition against `APSR`.
#[must_use]
pub const fn condition_passed(cond: Condition, apsr: u32) -> bool {
    let n = apsr & APSR_N != 0;
    let z = apsr & APSR_Z != 0;
    let c = apsr & APSR_C != 0;
    let v = apsr & APSR_V != 0;
    match cond {
        Condition::Eq => z,
        Condition::Ne => !z,
        Condition::Cs => c,
        Condition::Cc => !c,
        Condition::Mi => n,
        Condition::Pl => !n,
        Condition::Vs => v,
        Condition::Vc => !v,
        Condition::Hi => c && !z,
        Condition::Ls => !c || z,
        Condition::Ge => n == v,
        Condition::Lt => n != v,
        Condition::Gt => !z && n == v,
        Condition::Le => z || n != v,
    }
}

/// Sign-extends the low `bits` bits of `value`.
#[must_use]
pub const fn sign_extend(value: u32, bits: u32) -> u32 {
    let shift = 32 - bits;
    (((value << shift) as i32) >> shift) as u32
}

/// Byte offset of a 16-bit conditional branch (`imm8:0`).
#[must_use]
pub const fn conditional_branch_offset(imm8: u32) -> u32 {
    sign_extend(imm8 << 1, 9)
}

/// Byte offset of a 16-bit unconditional branch (`imm11:0`).
#[must_use]
pub const fn branch_offset(imm11: u32) -> u32 {
    sign_extend(imm11 << 1, 12)
}

/// Byte offset of a `bl`/`blx` immediate.
///
/// `packed` is the 24-bit `S:imm10:J1:J2:imm11` value produced by the
/// 32-bit table's immediate mask. The offset is
/// `S:I1:I2:imm10:imm11:0` with `I1 = !(J1 ^ S)` and `I2 = !(J2 ^ S)`,
/// sign-extended from 25 bits.
#[must_use]
pub const fn branch_link_offset(packed: u32) -> u32 {
    let imm11 = packed & 0x7FF;
    let j2 = (packed >> 11) & 1;
    let j1 = (packed >> 12) & 1;
    let imm10 = (packed >> 13) & 0x3FF;
    let s = (packed >> 23) & 1;
    let i1 = !(j1 ^ s) & 1;
    let i2 = !(j2 ^ s) & 1;
    let offset = (s << 24) | (i1 << 23) | (i2 << 22) | (imm10 << 12) | (imm11 << 1);
    sign_extend(offset, 25)
}

/// Logical shift left with carry out. `amount` is the full shift count.
#[must_use]
pub const fn lsl_c(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry_in),
        1..=31 => (value << amount, (value >> (32 - amount)) & 1 != 0),
        32 => (0, value & 1 != 0),
        _ => (0, false),
    }
}

/// Logical shift right with carry out.
#[must_use]
pub const fn lsr_c(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry_in),
        1..=31 => (value >> amount, (value >> (amount - 1)) & 1 != 0),
        32 => (0, value >> 31 != 0),
        _ => (0, false),
    }
}

/// Arithmetic shift right with carry out.
#[must_use]
pub const fn asr_c(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry_in),
        1..=31 => (
            ((value as i32) >> amount) as u32,
            (value >> (amount - 1)) & 1 != 0,
        ),
        _ => (((value as i32) >> 31) as u32, value >> 31 != 0),
    }
}

/// Rotate right with carry out.
#[must_use]
pub const fn ror_c(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    if amount == 0 {
        return (value, carry_in);
    }
    let result = value.rotate_right(amount % 32);
    (result, result >> 31 != 0)
}

/// Registers selected by a low-register list, ascending.
pub fn register_list(bits: u32) -> impl DoubleEndedIterator<Item = usize> {
    (0..8).filter(move |index| bits & (1 << index) != 0)
}
