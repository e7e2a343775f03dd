//! End-to-end scenarios: decode priority, calls through the supervisor
//! table, stack layout, branch-with-link targets, image loading and the
//! run loop.

#![allow(
    clippy::pedantic,
    clippy::nursery,
    clippy::cast_possible_truncation,
    clippy::too_many_lines
)]

use proptest as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

use thumb_core::{
    load_image, return_to_caller, AppHeader, CodeWrite, Core, CoreConfig, CoreState, Decoder,
    LoadError, Operation, Register, RunState, SimError, StepOutcome, StopReason, SupervisorCalls,
    SvcAction, APP_HEADER_BYTES, APP_HEADER_MAGIC, DEFAULT_LOAD_ADDRESS, HOST_RETURN_ADDRESS,
    RAM_BASE,
};

const CODE: u32 = 0x100;
const STACK_TOP: u32 = RAM_BASE + 0x800;

fn core_with(program: &[u16]) -> Core {
    let mut core = Core::new(&CoreConfig::default()).unwrap();
    let state = core.state_mut();
    for (i, halfword) in program.iter().enumerate() {
        state
            .memory
            .write_halfword(CODE + 2 * i as u32, *halfword, CodeWrite::Allowed)
            .unwrap();
    }
    state.registers.set_pc(CODE | 1);
    state.registers.set_sp(STACK_TOP);
    core
}

fn reg(core: &Core, index: u32) -> u32 {
    core.state().registers.load(Register::new(index).unwrap())
}

#[rstest]
#[case(0x4485, Operation::AddSpRegister, "add")]
#[case(0x4408, Operation::AddHigh, "add")]
#[case(0x0008, Operation::MovRegister, "movs")]
#[case(0x0048, Operation::LslImmediate, "lsls")]
#[case(0x4770, Operation::BranchExchange, "bx")]
#[case(0x4780, Operation::BranchLinkExchange, "blx")]
#[case(0xE7FE, Operation::Branch, "b")]
#[case(0xE800, Operation::WidePrefix, "32-bit")]
#[case(0xF000, Operation::WidePrefix, "32-bit")]
fn first_matching_rule_wins(#[case] word: u16, #[case] op: Operation, #[case] mnemonic: &str) {
    let instr = Decoder::decode16(word).unwrap();
    assert_eq!(instr.op(), op);
    assert_eq!(instr.mnemonic(), mnemonic);
}

#[test]
fn unassigned_halfword_is_unrecognized() {
    assert_eq!(
        Decoder::decode16(0xB100).map(|instr| instr.op()),
        Err(SimError::UnrecognizedOpcode { word: 0xB100 })
    );
}

#[test]
fn push_stores_link_register_first_then_ascending_low_registers() {
    // push {r0, r3, lr}
    let mut core = core_with(&[0xB509]);
    let regs = &mut core.state_mut().registers;
    regs.store(Register::new(0).unwrap(), 0xAAAA_0000);
    regs.store(Register::new(3).unwrap(), 0xBBBB_0003);
    regs.set_lr(0x0000_0211);

    assert_eq!(core.tick(), Ok(StepOutcome::Retired));

    let memory = &core.state().memory;
    assert_eq!(memory.read_word(STACK_TOP - 4), Ok(0x0000_0211));
    assert_eq!(memory.read_word(STACK_TOP - 8), Ok(0xAAAA_0000));
    assert_eq!(memory.read_word(STACK_TOP - 12), Ok(0xBBBB_0003));
    assert_eq!(core.state().registers.sp(), STACK_TOP - 12);
}

#[test]
fn pop_restores_what_push_saved() {
    // push {r0, r3, lr}; movs r0, #0; movs r3, #0; pop {r0, r3, pc}
    let mut core = core_with(&[0xB509, 0x2000, 0x2300, 0xBD09]);
    core.state_mut()
        .registers
        .store(Register::new(0).unwrap(), 11);
    core.state_mut()
        .registers
        .store(Register::new(3).unwrap(), 33);
    core.state_mut().registers.set_lr(0x0000_0301);

    for _ in 0..4 {
        assert_eq!(core.tick(), Ok(StepOutcome::Retired));
    }

    assert_eq!(reg(&core, 0), 11);
    assert_eq!(reg(&core, 3), 33);
    assert_eq!(core.state().registers.pc(), 0x0000_0301);
    assert_eq!(core.state().registers.sp(), STACK_TOP);
}

#[test]
fn supervisor_call_returns_through_the_link_register() {
    let program = [
        0xF000, 0xF806, // 0x100: bl 0x110
        0x2107, //         0x104: movs r1, #7
        0xDF01, //         0x106: svc #1
        0x0000, 0x0000, 0x0000, 0x0000, // 0x108: filler
        0x202A, //         0x110: movs r0, #42
        0xDF81, //         0x112: svc #129
    ];
    let mut core = core_with(&program);
    core.register_svc(129, return_to_caller);
    core.register_svc(1, |_| Ok(SvcAction::Halt));

    let outcome = core.run(100);

    assert_eq!(outcome.stop, StopReason::Halted);
    assert_eq!(outcome.steps, 5);
    assert_eq!(reg(&core, 0), 42);
    assert_eq!(reg(&core, 1), 7);
    assert_eq!(core.state().registers.lr(), 0x105);
    assert_eq!(core.run_state(), &RunState::Halted);
}

#[test]
fn unregistered_supervisor_call_faults() {
    let mut core = core_with(&[0xDF05]);
    assert_eq!(
        core.tick(),
        Err(SimError::UnhandledSupervisorCall { number: 5 })
    );
}

#[test]
fn handler_state_survives_between_calls() {
    let mut calls = SupervisorCalls::default();
    let mut counter = 0_u32;
    calls.register(3, move |state: &mut CoreState| {
        counter += 1;
        state.registers.store(Register::new(0).unwrap(), counter);
        Ok(SvcAction::Continue)
    });

    let mut state = CoreState::default();
    calls.dispatch(3, &mut state).unwrap();
    calls.dispatch(3, &mut state).unwrap();
    assert_eq!(state.registers.load(Register::new(0).unwrap()), 2);
}

// Targets are computed by hand from S, J1, J2, imm10 and imm11 with
// I1 = !(J1 ^ S) and I2 = !(J2 ^ S).
#[rstest]
// S=0, J1=J2=1, imm11=0x50: offset +0xA0
#[case(0x9C, [0xF000, 0xF850], 0x141)]
// S=1, J1=J2=1, imm10=0x3FF, imm11=0x7FE: offset -4, a branch to itself
#[case(0x200, [0xF7FF, 0xFFFE], 0x201)]
// S=1, J1=J2=1, imm10=0x3FF, imm11=0x7F0: offset -0x20
#[case(0x200, [0xF7FF, 0xFFF0], 0x1E5)]
// S=0, J1=J2=0 sets I1=I2=1: offset +0xC0_0000 lands past the code region
#[case(0x100, [0xF000, 0xD000], 0x00C0_0105)]
fn branch_with_link_targets(#[case] at: u32, #[case] words: [u16; 2], #[case] target: u32) {
    let mut state = CoreState::default();
    for (i, halfword) in words.iter().enumerate() {
        state
            .memory
            .write_halfword(at + 2 * i as u32, *halfword, CodeWrite::Allowed)
            .unwrap();
    }
    state.registers.set_pc(at | 1);

    let outcome = thumb_core::step_one(&mut state, &mut SupervisorCalls::default());

    assert_eq!(outcome, Ok(StepOutcome::Retired));
    assert_eq!(state.registers.pc(), target);
    assert_eq!(state.registers.lr(), (at + 4) | 1);
}

#[test]
fn unknown_wide_instruction_is_fatal() {
    // 0xF000 0x0000 has the wide prefix but no matching 32-bit rule.
    let mut core = core_with(&[0xF000, 0x0000]);
    assert_eq!(
        core.tick(),
        Err(SimError::UnrecognizedOpcode { word: 0xF000_0000 })
    );
}

fn image(header: &AppHeader, code: &[u16], data: &[u32]) -> Vec<u8> {
    let mut bytes = header.to_bytes().to_vec();
    for halfword in code {
        bytes.extend_from_slice(&halfword.to_le_bytes());
    }
    for word in data {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}

fn entry() -> u32 {
    DEFAULT_LOAD_ADDRESS + APP_HEADER_BYTES as u32
}

fn program_header() -> AppHeader {
    AppHeader {
        data_load_start: entry() + 4,
        data_start: RAM_BASE,
        data_end: RAM_BASE + 4,
        bss_start: RAM_BASE + 4,
        bss_end: RAM_BASE + 8,
        entry: entry(),
        magic: APP_HEADER_MAGIC,
        ..AppHeader::default()
    }
}

#[test]
fn loaded_image_runs_until_it_returns_to_the_host() {
    let header = program_header();
    // movs r0, #3; bx lr
    let bytes = image(&header, &[0x2003, 0x4770], &[0xCAFE_F00D]);

    let mut core = Core::new(&CoreConfig::default()).unwrap();
    let state = core.state_mut();
    state
        .memory
        .write_word(RAM_BASE + 4, 0xFFFF_FFFF, CodeWrite::Denied)
        .unwrap();
    load_image(&mut state.memory, DEFAULT_LOAD_ADDRESS, &bytes).unwrap();
    let parsed = AppHeader::read(&state.memory, DEFAULT_LOAD_ADDRESS).unwrap();
    assert_eq!(parsed, header);
    parsed.apply(state).unwrap();

    let outcome = core.run(1_000);

    assert_eq!(outcome.stop, StopReason::ReturnedToHost);
    assert_eq!(outcome.steps, 2);
    assert_eq!(reg(&core, 0), 3);
    assert_eq!(core.state().registers.pc(), HOST_RETURN_ADDRESS);
    assert_eq!(core.state().memory.read_word(RAM_BASE), Ok(0xCAFE_F00D));
    assert_eq!(core.state().memory.read_word(RAM_BASE + 4), Ok(0));
}

#[rstest]
#[case(AppHeader { magic: 0x1234_5678, ..program_header() },
       LoadError::BadMagic { found: 0x1234_5678 })]
#[case(AppHeader { const_start: 0x6000, const_end: 0x6010, ..program_header() },
       LoadError::ConstructorsUnsupported { start: 0x6000, end: 0x6010 })]
#[case(AppHeader { data_end: RAM_BASE - 4, ..program_header() },
       LoadError::InvalidSection { section: "data", start: RAM_BASE, end: RAM_BASE - 4 })]
fn rejected_header_leaves_state_untouched(#[case] header: AppHeader, #[case] expected: LoadError) {
    let bytes = image(&header, &[0x2003, 0x4770], &[0xCAFE_F00D]);
    let parsed = AppHeader::from_bytes(&bytes).unwrap();

    let mut state = CoreState::default();
    let before = state.clone();
    assert_eq!(parsed.apply(&mut state), Err(expected));
    assert_eq!(state, before);
}

#[test]
fn fault_latches_until_reset() {
    // udf #0
    let mut core = core_with(&[0xDE00]);
    let expected = SimError::Unimplemented {
        word: 0xDE00,
        mnemonic: "udf",
    };

    let outcome = core.run(10);
    assert_eq!(outcome.stop, StopReason::Faulted(expected.clone()));
    assert_eq!(outcome.steps, 0);
    assert_eq!(core.run_state(), &RunState::Faulted(expected.clone()));
    assert_eq!(core.last_fetch_address(), CODE);

    let pc = core.state().registers.pc();
    assert_eq!(core.tick(), Err(expected));
    assert_eq!(core.state().registers.pc(), pc);

    core.reset();
    assert_eq!(core.run_state(), &RunState::Running);
    assert_eq!(core.state().registers.pc(), 0);
    assert_eq!(core.state().memory.read_halfword(CODE), Ok(0xDE00));
}

#[test]
fn halt_latches_and_run_returns_immediately() {
    let mut core = core_with(&[0xDF00]);
    core.register_svc(0, |_| Ok(SvcAction::Halt));

    assert_eq!(core.tick(), Ok(StepOutcome::Halted));
    assert_eq!(core.tick(), Ok(StepOutcome::Halted));
    assert_eq!(
        core.run(10),
        thumb_core::RunOutcome {
            steps: 0,
            stop: StopReason::Halted
        }
    );
}

#[test]
fn step_limit_stops_a_tight_loop() {
    // b .
    let mut core = core_with(&[0xE7FE]);
    let outcome = core.run(25);
    assert_eq!(outcome.stop, StopReason::StepLimit);
    assert_eq!(outcome.steps, 25);
    assert_eq!(core.state().registers.pc(), CODE | 1);
}

#[test]
fn untagged_program_counter_faults_on_fetch() {
    let mut core = core_with(&[0x2001]);
    core.state_mut().registers.set_pc(CODE);
    assert!(matches!(
        core.tick(),
        Err(SimError::MisalignedAccess { .. })
    ));
}
