#![no_main]

use libfuzzer_sys::fuzz_target;
use thumb_core::{
    disassemble, extract_field, resolve_address, AccessWidth, CodeWrite, CoreState, Decoder,
    SupervisorCalls, SvcAction, DEFAULT_CODE_BYTES, DEFAULT_RAM_BYTES, RAM_BASE,
};

const CODE: u32 = 0x100;

fuzz_target!(|data: &[u8]| {
    if data.len() < 9 {
        return;
    }

    let first = u16::from_le_bytes([data[0], data[1]]);
    let second = u16::from_le_bytes([data[2], data[3]]);
    let addr = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    let width = match data[8] % 3 {
        0 => AccessWidth::Byte,
        1 => AccessWidth::Halfword,
        _ => AccessWidth::Word,
    };

    if let Ok(instr) = Decoder::decode16(first) {
        let _ = disassemble(&instr, Some(CODE));
    }
    let word = (u32::from(first) << 16) | u32::from(second);
    if let Ok(instr) = Decoder::decode32(word) {
        let _ = disassemble(&instr, None);
    }
    let _ = extract_field(word, addr);
    let _ = resolve_address(addr, width, DEFAULT_CODE_BYTES, DEFAULT_RAM_BYTES);

    let mut state = CoreState::default();
    let _ = state.memory.write_halfword(CODE, first, CodeWrite::Allowed);
    let _ = state.memory.write_halfword(CODE + 2, second, CodeWrite::Allowed);
    for (i, byte) in data[9..].iter().take(64).enumerate() {
        let _ = state.memory.write_byte(RAM_BASE + i as u32, *byte, CodeWrite::Denied);
    }
    state.registers.set_pc(CODE | 1);
    state.registers.set_sp(RAM_BASE + 0x800);

    let mut calls = SupervisorCalls::default();
    for number in 0..=u8::MAX {
        calls.register(number, |_| Ok(SvcAction::Continue));
    }
    let _ = thumb_core::step_one(&mut state, &mut calls);
});
