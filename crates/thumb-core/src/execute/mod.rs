//! Fetch, decode and execute for a single instruction.
//!
//! The stored program counter carries the thumb tag in bit 0. Each halfword
//! is fetched from `pc - 1` and `pc` advances by 2 before execution, so
//! relative targets are computed from the next sequential instruction.
//! A fault abandons the step; side effects already applied stay applied.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::too_many_lines
)]

mod flags;
mod helpers;

pub use flags::{add_with_carry, FlagsUpdate};
pub use helpers::{branch_link_offset, condition_passed, sign_extend};

use tracing::trace;

use crate::decoder::{DecodedInstruction, Decoder};
use crate::encoding::{lookup_thumb16, DataOp, ExtendOp, Operation, Transfer};
use crate::memory::{AccessWidth, CodeWrite};
use crate::state::{Register, RegisterFile, APSR_C};
use crate::svc::SupervisorCalls;
use crate::{CoreState, SimError, StepOutcome};

use flags::{add_flags, sub_flags};
use helpers::{
    asr_c, branch_offset, conditional_branch_offset, lsl_c, lsr_c, register_list, ror_c,
};

/// Fetches the halfword at `pc - 1` and advances `pc` by 2.
///
/// # Errors
///
/// Fails with the address-space error of the fetch; `pc` is left unchanged.
pub fn fetch_halfword(state: &mut CoreState) -> Result<u16, SimError> {
    let pc = state.registers.pc();
    let halfword = state.memory.read_halfword(pc.wrapping_sub(1))?;
    state.registers.set_pc(pc.wrapping_add(2));
    Ok(halfword)
}

/// Fetches and decodes one instruction, reading a second halfword for the
/// 32-bit classes.
///
/// # Errors
///
/// Fails on fetch errors or when no decode rule matches.
pub fn fetch_and_decode(state: &mut CoreState) -> Result<DecodedInstruction, SimError> {
    let first = fetch_halfword(state)?;
    let rule = lookup_thumb16(first)?;
    if rule.op != Operation::WidePrefix {
        return Decoder::with_rule(rule, u32::from(first), false);
    }
    let second = fetch_halfword(state)?;
    Decoder::decode32((u32::from(first) << 16) | u32::from(second))
}

/// Performs one fetch/decode/execute step.
///
/// # Errors
///
/// Returns the first [`SimError`] raised by the step.
pub fn step_one(
    state: &mut CoreState,
    svc: &mut SupervisorCalls,
) -> Result<StepOutcome, SimError> {
    let addr = state.registers.pc().wrapping_sub(1);
    let instr = fetch_and_decode(state)?;
    trace!("{addr:08x}: {instr}");
    execute_instruction(&instr, state, svc)
}

/// Applies the effects of an already fetched instruction.
///
/// `pc` must already point past the instruction, as left by
/// [`fetch_and_decode`].
///
/// # Errors
///
/// Returns memory, dispatch or [`SimError::Unimplemented`] errors.
pub fn execute_instruction(
    instr: &DecodedInstruction,
    state: &mut CoreState,
    svc: &mut SupervisorCalls,
) -> Result<StepOutcome, SimError> {
    let regs = &mut state.registers;
    match instr.op() {
        Operation::MovRegister => {
            let value = read_operand(regs, instr.rm);
            write_result(regs, instr.rd, value, FlagsUpdate::Nz { result: value });
        }
        Operation::LslImmediate => {
            shift_immediate(regs, instr, lsl_c, instr.imm);
        }
        Operation::LsrImmediate => {
            shift_immediate(regs, instr, lsr_c, shift_amount(instr.imm));
        }
        Operation::AsrImmediate => {
            shift_immediate(regs, instr, asr_c, shift_amount(instr.imm));
        }
        Operation::AddRegister => {
            let (result, update) = add_flags(regs.load(instr.rn), regs.load(instr.rm), false);
            write_result(regs, instr.rd, result, update);
        }
        Operation::SubRegister => {
            let (result, update) = sub_flags(regs.load(instr.rn), regs.load(instr.rm));
            write_result(regs, instr.rd, result, update);
        }
        Operation::AddImmediate3 | Operation::AddImmediate8 => {
            let (result, update) = add_flags(regs.load(instr.rn), instr.imm, false);
            write_result(regs, instr.rd, result, update);
        }
        Operation::SubImmediate3 | Operation::SubImmediate8 => {
            let (result, update) = sub_flags(regs.load(instr.rn), instr.imm);
            write_result(regs, instr.rd, result, update);
        }
        Operation::MovImmediate => {
            write_result(regs, instr.rd, instr.imm, FlagsUpdate::Nz { result: instr.imm });
        }
        Operation::CmpImmediate => {
            sub_flags(regs.load(instr.rn), instr.imm).1.apply(regs);
        }
        Operation::DataProcessing(op) => execute_data_processing(regs, instr, op),
        Operation::AddSpRegister => {
            let sp = regs.sp().wrapping_add(read_operand(regs, instr.rm));
            regs.set_sp(sp);
        }
        Operation::AddHigh => {
            let value = read_operand(regs, instr.rd).wrapping_add(read_operand(regs, instr.rm));
            write_high(regs, instr.rd, value);
        }
        Operation::CmpHigh => {
            sub_flags(read_operand(regs, instr.rn), read_operand(regs, instr.rm))
                .1
                .apply(regs);
        }
        Operation::MovHigh => {
            let value = read_operand(regs, instr.rm);
            write_high(regs, instr.rd, value);
        }
        Operation::BranchExchange => {
            let target = read_operand(regs, instr.rm);
            regs.set_pc(target);
        }
        Operation::BranchLinkExchange => {
            let target = read_operand(regs, instr.rm);
            let next = regs.pc();
            regs.set_lr(next);
            regs.set_pc(target);
        }
        Operation::LoadLiteral => {
            let addr = regs.pc().wrapping_add(instr.imm << 2) & !3;
            let value = state.memory.read_word(addr)?;
            state.registers.store(instr.rd, value);
        }
        Operation::LoadStoreRegister(transfer) => {
            let addr = regs.load(instr.rn).wrapping_add(regs.load(instr.rm));
            execute_transfer(state, transfer, instr.rd, addr)?;
        }
        Operation::LoadStoreImmediate(transfer) => {
            let scale = transfer.width().bytes();
            let addr = regs.load(instr.rn).wrapping_add(instr.imm * scale);
            execute_transfer(state, transfer, instr.rd, addr)?;
        }
        Operation::StoreSpRelative => {
            let addr = regs.sp().wrapping_add(instr.imm << 2);
            execute_transfer(state, Transfer::Str, instr.rd, addr)?;
        }
        Operation::LoadSpRelative => {
            let addr = regs.sp().wrapping_add(instr.imm << 2);
            execute_transfer(state, Transfer::Ldr, instr.rd, addr)?;
        }
        Operation::AddPcImmediate => {
            let base = read_operand(regs, Register::PC) & !3;
            regs.store(instr.rd, base.wrapping_add(instr.imm << 2));
        }
        Operation::AddSpImmediate => {
            let value = regs.sp().wrapping_add(instr.imm << 2);
            regs.store(instr.rd, value);
        }
        Operation::AddSpImmediate7 => {
            let sp = regs.sp().wrapping_add(instr.imm << 2);
            regs.set_sp(sp);
        }
        Operation::SubSpImmediate7 => {
            let sp = regs.sp().wrapping_sub(instr.imm << 2);
            regs.set_sp(sp);
        }
        Operation::Extend(op) => {
            let value = regs.load(instr.rm);
            let extended = match op {
                ExtendOp::Sxth => sign_extend(value & 0xFFFF, 16),
                ExtendOp::Sxtb => sign_extend(value & 0xFF, 8),
                ExtendOp::Uxth => value & 0xFFFF,
                ExtendOp::Uxtb => value & 0xFF,
            };
            regs.store(instr.rd, extended);
        }
        Operation::Push => execute_push(state, instr.imm)?,
        Operation::Pop => execute_pop(state, instr.imm)?,
        Operation::StoreMultiple => {
            let mut addr = regs.load(instr.rn);
            for index in register_list(instr.imm) {
                let value = state.registers.load(low_register(index)?);
                state.memory.write_word(addr, value, CodeWrite::Denied)?;
                addr = addr.wrapping_add(4);
            }
            state.registers.store(instr.rn, addr);
        }
        Operation::LoadMultiple => {
            let mut addr = regs.load(instr.rn);
            for index in register_list(instr.imm) {
                let value = state.memory.read_word(addr)?;
                state.registers.store(low_register(index)?, value);
                addr = addr.wrapping_add(4);
            }
            if instr.imm & (1 << instr.rn.index()) == 0 {
                state.registers.store(instr.rn, addr);
            }
        }
        Operation::BranchConditional(cond) => {
            if condition_passed(cond, regs.apsr()) {
                let target = regs
                    .pc()
                    .wrapping_add(2)
                    .wrapping_add(conditional_branch_offset(instr.imm));
                regs.set_pc(target);
            }
        }
        Operation::Branch => {
            let target = regs
                .pc()
                .wrapping_add(2)
                .wrapping_add(branch_offset(instr.imm));
            regs.set_pc(target);
        }
        Operation::SupervisorCall => {
            let number = (instr.imm & 0xFF) as u8;
            return svc.dispatch(number, state).map(StepOutcome::from);
        }
        Operation::BranchLink => {
            let next = regs.pc();
            regs.set_lr(next);
            regs.set_pc(next.wrapping_add(branch_link_offset(instr.imm)));
        }
        Operation::Breakpoint
        | Operation::PermanentlyUndefined
        | Operation::BranchLinkExchangeImmediate => {
            return Err(SimError::Unimplemented {
                word: instr.raw,
                mnemonic: instr.mnemonic(),
            });
        }
        Operation::WidePrefix => {
            return Err(SimError::UnrecognizedOpcode { word: instr.raw });
        }
    }
    Ok(StepOutcome::Retired)
}

/// Reads a register as a data operand. `pc` reads as the instruction
/// address plus 4.
fn read_operand(regs: &RegisterFile, reg: Register) -> u32 {
    if reg == Register::PC {
        (regs.pc() & !1).wrapping_add(2)
    } else {
        regs.load(reg)
    }
}

fn write_result(regs: &mut RegisterFile, rd: Register, value: u32, update: FlagsUpdate) {
    regs.store(rd, value);
    update.apply(regs);
}

/// High-register destination write; writing `pc` branches with the tag set.
fn write_high(regs: &mut RegisterFile, rd: Register, value: u32) {
    if rd == Register::PC {
        regs.set_pc(value | 1);
    } else {
        regs.store(rd, value);
    }
}

fn low_register(index: usize) -> Result<Register, SimError> {
    Register::new(index as u32)
}

/// `lsr`/`asr` encode a shift of 32 as 0.
const fn shift_amount(imm5: u32) -> u32 {
    if imm5 == 0 {
        32
    } else {
        imm5
    }
}

fn shift_immediate(
    regs: &mut RegisterFile,
    instr: &DecodedInstruction,
    shift: fn(u32, u32, bool) -> (u32, bool),
    amount: u32,
) {
    let carry_in = regs.flag_is_set(APSR_C);
    let (result, carry) = shift(regs.load(instr.rm), amount, carry_in);
    write_result(regs, instr.rd, result, FlagsUpdate::Nzc { result, carry });
}

fn execute_data_processing(regs: &mut RegisterFile, instr: &DecodedInstruction, op: DataOp) {
    let n = regs.load(instr.rn);
    let m = regs.load(instr.rm);
    let carry_in = regs.flag_is_set(APSR_C);
    let shift = |f: fn(u32, u32, bool) -> (u32, bool)| {
        let (result, carry) = f(n, m & 0xFF, carry_in);
        (Some(result), FlagsUpdate::Nzc { result, carry })
    };
    let logical = |result: u32| (Some(result), FlagsUpdate::Nz { result });
    let compare = |(_, update): (u32, FlagsUpdate)| (None, update);
    let arith = |(result, update): (u32, FlagsUpdate)| (Some(result), update);

    let (result, update) = match op {
        DataOp::And => logical(n & m),
        DataOp::Eor => logical(n ^ m),
        DataOp::Orr => logical(n | m),
        DataOp::Bic => logical(n & !m),
        DataOp::Mvn => logical(!m),
        DataOp::Mul => logical(n.wrapping_mul(m)),
        DataOp::Lsl => shift(lsl_c),
        DataOp::Lsr => shift(lsr_c),
        DataOp::Asr => shift(asr_c),
        DataOp::Ror => shift(ror_c),
        DataOp::Adc => arith(add_flags(n, m, carry_in)),
        DataOp::Sbc => arith(add_flags(n, !m, carry_in)),
        DataOp::Rsb => arith(sub_flags(0, m)),
        DataOp::Tst => (None, FlagsUpdate::Nz { result: n & m }),
        DataOp::Cmp => compare(sub_flags(n, m)),
        DataOp::Cmn => compare(add_flags(n, m, false)),
    };
    if let Some(result) = result {
        regs.store(instr.rd, result);
    }
    update.apply(regs);
}

fn execute_transfer(
    state: &mut CoreState,
    transfer: Transfer,
    rt: Register,
    addr: u32,
) -> Result<(), SimError> {
    let memory = &mut state.memory;
    if !transfer.is_load() {
        let value = state.registers.load(rt);
        return match transfer.width() {
            AccessWidth::Word => memory.write_word(addr, value, CodeWrite::Denied),
            AccessWidth::Halfword => memory.write_halfword(addr, value as u16, CodeWrite::Denied),
            AccessWidth::Byte => memory.write_byte(addr, value as u8, CodeWrite::Denied),
        };
    }
    let raw = match transfer.width() {
        AccessWidth::Word => memory.read_word(addr)?,
        AccessWidth::Halfword => u32::from(memory.read_halfword(addr)?),
        AccessWidth::Byte => u32::from(memory.read_byte(addr)?),
    };
    let loaded = match transfer {
        Transfer::Ldrsh => sign_extend(raw, 16),
        Transfer::Ldrsb => sign_extend(raw, 8),
        _ => raw,
    };
    state.registers.store(rt, loaded);
    Ok(())
}

/// Pushes `lr` (list bit 8) and then the selected low registers in ascending
/// order, decrementing `sp` by 4 before each store.
///
/// With `lr`, `r0` and `r3` selected from `sp = S` the stack holds `lr` at
/// `S - 4`, `r0` at `S - 8` and `r3` at `S - 12`.
fn execute_push(state: &mut CoreState, list: u32) -> Result<(), SimError> {
    if list & 0x100 != 0 {
        let lr = state.registers.lr();
        push_word(state, lr)?;
    }
    for index in register_list(list) {
        let value = state.registers.load(low_register(index)?);
        push_word(state, value)?;
    }
    Ok(())
}

fn push_word(state: &mut CoreState, value: u32) -> Result<(), SimError> {
    let sp = state.registers.sp().wrapping_sub(4);
    state.memory.write_word(sp, value, CodeWrite::Denied)?;
    state.registers.set_sp(sp);
    Ok(())
}

/// Inverse of [`execute_push`]: low registers from highest to lowest, then
/// `pc` (list bit 8) from the highest address.
fn execute_pop(state: &mut CoreState, list: u32) -> Result<(), SimError> {
    for index in register_list(list).rev() {
        let value = pop_word(state)?;
        state.registers.store(low_register(index)?, value);
    }
    if list & 0x100 != 0 {
        let value = pop_word(state)?;
        state.registers.set_pc(value);
    }
    Ok(())
}

fn pop_word(state: &mut CoreState) -> Result<u32, SimError> {
    let sp = state.registers.sp();
    let value = state.memory.read_word(sp)?;
    state.registers.set_sp(sp.wrapping_add(4));
    Ok(value)
}
