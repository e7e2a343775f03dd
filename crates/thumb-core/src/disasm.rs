//! Instruction disassembly.
//!
//! Renders a [`DecodedInstruction`] as assembler text. Branch targets are
//! absolute when the instruction address is known and `.`-relative
//! otherwise.

use std::fmt::{self, Write};

use crate::decoder::DecodedInstruction;
use crate::encoding::{DataOp, Operation};
use crate::execute::{branch_link_offset, sign_extend};
use crate::state::Register;

/// Disassembles `instr`, which was fetched from `addr` when known.
#[must_use]
pub fn disassemble(instr: &DecodedInstruction, addr: Option<u32>) -> String {
    let mut text = String::new();
    // Writing into a String cannot fail.
    let _ = write_instruction(&mut text, instr, addr);
    text
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_instruction(f, self, None)
    }
}

fn write_instruction(
    out: &mut impl Write,
    instr: &DecodedInstruction,
    addr: Option<u32>,
) -> fmt::Result {
    let m = instr.mnemonic();
    let (rd, rn, rm, imm) = (instr.rd, instr.rn, instr.rm, instr.imm);
    match instr.op() {
        Operation::MovRegister => write!(out, "{m} {rd}, {rm}"),
        Operation::LslImmediate => write!(out, "{m} {rd}, {rm}, #{imm}"),
        Operation::LsrImmediate | Operation::AsrImmediate => {
            let amount = if imm == 0 { 32 } else { imm };
            write!(out, "{m} {rd}, {rm}, #{amount}")
        }
        Operation::AddRegister | Operation::SubRegister => write!(out, "{m} {rd}, {rn}, {rm}"),
        Operation::AddImmediate3 | Operation::SubImmediate3 => {
            write!(out, "{m} {rd}, {rn}, #{imm}")
        }
        Operation::MovImmediate | Operation::AddImmediate8 | Operation::SubImmediate8 => {
            write!(out, "{m} {rd}, #{imm}")
        }
        Operation::CmpImmediate => write!(out, "{m} {rn}, #{imm}"),
        Operation::DataProcessing(DataOp::Rsb) => write!(out, "{m} {rd}, {rm}, #0"),
        Operation::DataProcessing(DataOp::Mul) => write!(out, "{m} {rd}, {rm}, {rd}"),
        Operation::DataProcessing(_) | Operation::AddHigh | Operation::MovHigh => {
            write!(out, "{m} {rd}, {rm}")
        }
        Operation::CmpHigh => write!(out, "{m} {rn}, {rm}"),
        Operation::AddSpRegister => write!(out, "{m} sp, {rm}"),
        Operation::BranchExchange | Operation::BranchLinkExchange => write!(out, "{m} {rm}"),
        Operation::LoadLiteral => write!(out, "{m} {rd}, [pc, #{}]", imm << 2),
        Operation::LoadStoreRegister(_) => write!(out, "{m} {rd}, [{rn}, {rm}]"),
        Operation::LoadStoreImmediate(transfer) => {
            let offset = imm * transfer.width().bytes();
            write!(out, "{m} {rd}, [{rn}, #{offset}]")
        }
        Operation::StoreSpRelative | Operation::LoadSpRelative => {
            write!(out, "{m} {rd}, [sp, #{}]", imm << 2)
        }
        Operation::AddPcImmediate => write!(out, "{m} {rd}, #{}", imm << 2),
        Operation::AddSpImmediate => write!(out, "{m} {rd}, sp, #{}", imm << 2),
        Operation::AddSpImmediate7 | Operation::SubSpImmediate7 => {
            write!(out, "{m} sp, #{}", imm << 2)
        }
        Operation::Extend(_) => write!(out, "{m} {rd}, {rm}"),
        Operation::Push => {
            write!(out, "{m} ")?;
            write_register_list(out, imm, Register::LR)
        }
        Operation::Pop => {
            write!(out, "{m} ")?;
            write_register_list(out, imm, Register::PC)
        }
        Operation::StoreMultiple | Operation::LoadMultiple => {
            write!(out, "{m} {rn}!, ")?;
            write_register_list(out, imm & 0xFF, Register::PC)
        }
        Operation::Breakpoint | Operation::PermanentlyUndefined | Operation::SupervisorCall => {
            write!(out, "{m} #{imm}")
        }
        Operation::BranchConditional(cond) => {
            write!(out, "{m}{} ", cond.suffix())?;
            write_target(out, addr, sign_extend(imm << 1, 9))
        }
        Operation::Branch => {
            write!(out, "{m} ")?;
            write_target(out, addr, sign_extend(imm << 1, 12))
        }
        Operation::BranchLink | Operation::BranchLinkExchangeImmediate => {
            write!(out, "{m} ")?;
            write_target(out, addr, branch_link_offset(imm))
        }
        Operation::WidePrefix => write!(out, ".short {:#06x}", instr.raw),
    }
}

/// Targets are relative to the instruction address plus 4.
fn write_target(out: &mut impl Write, addr: Option<u32>, offset: u32) -> fmt::Result {
    let relative = offset.wrapping_add(4);
    match addr {
        Some(addr) => write!(out, "{:#010x}", addr.wrapping_add(relative)),
        #[allow(clippy::cast_possible_wrap)]
        None => write!(out, ".{:+}", relative as i32),
    }
}

/// Writes `{r0, r3, lr}`; bit 8 of `list` selects `extra`.
fn write_register_list(out: &mut impl Write, list: u32, extra: Register) -> fmt::Result {
    let mut names: Vec<String> = (0..8_u8)
        .filter(|index| list & (1 << index) != 0)
        .map(|index| format!("r{index}"))
        .collect();
    if list & 0x100 != 0 {
        names.push(extra.to_string());
    }
    write!(out, "{{{}}}", names.join(", "))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::disassemble;
    use crate::decoder::Decoder;

    #[rstest]
    #[case(0x2005, "movs r0, #5")]
    #[case(0x0008, "movs r0, r1")]
    #[case(0x0808, "lsrs r0, r1, #32")]
    #[case(0x1842, "adds r2, r0, r1")]
    #[case(0x1C48, "adds r0, r1, #1")]
    #[case(0x280A, "cmp r0, #10")]
    #[case(0x4248, "rsbs r0, r1, #0")]
    #[case(0x4348, "muls r0, r1, r0")]
    #[case(0x448D, "add sp, r1")]
    #[case(0x46F7, "mov pc, lr")]
    #[case(0x4770, "bx lr")]
    #[case(0x4901, "ldr r1, [pc, #4]")]
    #[case(0x5F03, "ldrsh r3, [r0, r4]")]
    #[case(0x6041, "str r1, [r0, #4]")]
    #[case(0x8141, "strh r1, [r0, #10]")]
    #[case(0x9802, "ldr r0, [sp, #8]")]
    #[case(0xA802, "add r0, sp, #8")]
    #[case(0xB084, "sub sp, #16")]
    #[case(0xB248, "sxtb r0, r1")]
    #[case(0xB509, "push {r0, r3, lr}")]
    #[case(0xBD09, "pop {r0, r3, pc}")]
    #[case(0xC006, "stmia r0!, {r1, r2}")]
    #[case(0xDF81, "svc #129")]
    fn renders_sixteen_bit_forms(#[case] word: u16, #[case] text: &str) {
        let instr = Decoder::decode16(word).unwrap();
        assert_eq!(instr.to_string(), text);
        assert_eq!(disassemble(&instr, Some(0x100)), text);
    }

    #[test]
    fn branch_targets_are_absolute_with_an_address() {
        let instr = Decoder::decode16(0xD101).unwrap();
        assert_eq!(disassemble(&instr, Some(0x102)), "bne 0x00000108");
        assert_eq!(instr.to_string(), "bne .+6");

        let instr = Decoder::decode16(0xE7FE).unwrap();
        assert_eq!(disassemble(&instr, Some(0x100)), "b 0x00000100");
        assert_eq!(instr.to_string(), "b .+0");
    }

    #[test]
    fn branch_with_link_target() {
        let instr = Decoder::decode32(0xF000_F850).unwrap();
        assert_eq!(disassemble(&instr, Some(0x9C)), "bl 0x00000140");
    }
}
