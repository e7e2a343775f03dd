//! Ordered Thumb decode tables.
//!
//! Each table is scanned front to back and the first rule whose
//! `word & mask == value` wins. A sub-encoding carved out of a wider family
//! must therefore sit ahead of that family.

use crate::SimError;

/// Condition field of a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Condition {
    Eq,
    Ne,
    Cs,
    Cc,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
}

impl Condition {
    /// Assembler suffix (`eq`, `ne`, ...).
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Cs => "cs",
            Self::Cc => "cc",
            Self::Mi => "mi",
            Self::Pl => "pl",
            Self::Vs => "vs",
            Self::Vc => "vc",
            Self::Hi => "hi",
            Self::Ls => "ls",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Le => "le",
        }
    }
}

/// Register-form data-processing operations (`0x4000..=0x43FF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum DataOp {
    And,
    Eor,
    Lsl,
    Lsr,
    Asr,
    Adc,
    Sbc,
    Ror,
    Tst,
    Rsb,
    Cmp,
    Cmn,
    Orr,
    Mul,
    Bic,
    Mvn,
}

/// Single-register load/store flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Transfer {
    Str,
    Strh,
    Strb,
    Ldr,
    Ldrh,
    Ldrb,
    Ldrsb,
    Ldrsh,
}

impl Transfer {
    /// Returns `true` for loads.
    #[must_use]
    pub const fn is_load(self) -> bool {
        !matches!(self, Self::Str | Self::Strh | Self::Strb)
    }

    /// Access width of the transfer.
    #[must_use]
    pub const fn width(self) -> crate::AccessWidth {
        match self {
            Self::Str | Self::Ldr => crate::AccessWidth::Word,
            Self::Strh | Self::Ldrh | Self::Ldrsh => crate::AccessWidth::Halfword,
            Self::Strb | Self::Ldrb | Self::Ldrsb => crate::AccessWidth::Byte,
        }
    }
}

/// Sign/zero extension operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ExtendOp {
    Sxth,
    Sxtb,
    Uxth,
    Uxtb,
}

/// Operation identifier carried by a decode rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Operation {
    MovRegister,
    LslImmediate,
    LsrImmediate,
    AsrImmediate,
    AddRegister,
    SubRegister,
    AddImmediate3,
    SubImmediate3,
    MovImmediate,
    CmpImmediate,
    AddImmediate8,
    SubImmediate8,
    DataProcessing(DataOp),
    AddSpRegister,
    AddHigh,
    CmpHigh,
    MovHigh,
    BranchExchange,
    BranchLinkExchange,
    LoadLiteral,
    LoadStoreRegister(Transfer),
    LoadStoreImmediate(Transfer),
    StoreSpRelative,
    LoadSpRelative,
    AddPcImmediate,
    AddSpImmediate,
    AddSpImmediate7,
    SubSpImmediate7,
    Extend(ExtendOp),
    Push,
    Pop,
    Breakpoint,
    StoreMultiple,
    LoadMultiple,
    BranchConditional(Condition),
    PermanentlyUndefined,
    SupervisorCall,
    Branch,
    /// First halfword of a 32-bit instruction.
    WidePrefix,
    BranchLink,
    BranchLinkExchangeImmediate,
}

/// Bit masks of the operand fields inside an instruction word.
///
/// A zero mask means the operand is absent. Masks may be non-contiguous; see
/// [`crate::decoder::extract_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperandFields {
    /// Destination register.
    pub rd: u32,
    /// First source / base register.
    pub rn: u32,
    /// Second source / offset register.
    pub rm: u32,
    /// Immediate, register list or packed offset.
    pub imm: u32,
}

impl OperandFields {
    /// No operands.
    pub const NONE: Self = Self::new(0, 0, 0, 0);

    /// Builds a field descriptor.
    #[must_use]
    pub const fn new(rd: u32, rn: u32, rm: u32, imm: u32) -> Self {
        Self { rd, rn, rm, imm }
    }
}

/// Immutable decode table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeRule {
    /// Bits that must match `value`.
    pub mask: u32,
    /// Expected value of the masked bits.
    pub value: u32,
    /// Operation selected by this rule.
    pub op: Operation,
    /// Assembler mnemonic.
    pub mnemonic: &'static str,
    /// Operand field positions.
    pub fields: OperandFields,
    /// Optional human-readable description.
    pub description: Option<&'static str>,
}

impl DecodeRule {
    /// Returns `true` when `word` is an instance of this encoding.
    #[must_use]
    pub const fn matches(&self, word: u32) -> bool {
        word & self.mask == self.value
    }

    const fn described(self, description: &'static str) -> Self {
        Self {
            description: Some(description),
            ..self
        }
    }
}

const fn rule(
    mask: u32,
    value: u32,
    op: Operation,
    mnemonic: &'static str,
    fields: OperandFields,
) -> DecodeRule {
    DecodeRule {
        mask,
        value,
        op,
        mnemonic,
        fields,
        description: None,
    }
}

const SHIFT_IMM: OperandFields = OperandFields::new(0x0007, 0, 0x0038, 0x07C0);
const THREE_REG: OperandFields = OperandFields::new(0x0007, 0x0038, 0x01C0, 0);
const TWO_REG_IMM3: OperandFields = OperandFields::new(0x0007, 0x0038, 0, 0x01C0);
const REG_IMM8: OperandFields = OperandFields::new(0x0700, 0x0700, 0, 0x00FF);
const DATA_PROC: OperandFields = OperandFields::new(0x0007, 0x0007, 0x0038, 0);
const HIGH_REG: OperandFields = OperandFields::new(0x0087, 0x0087, 0x0078, 0);
const REG_IMM5: OperandFields = OperandFields::new(0x0007, 0x0038, 0, 0x07C0);
const TWO_REG: OperandFields = OperandFields::new(0x0007, 0, 0x0038, 0);
const BRANCH_LINK: OperandFields = OperandFields::new(0, 0, 0, 0x07FF_2FFF);

/// 16-bit decode table, in priority order.
pub const THUMB16_DECODE_TABLE: &[DecodeRule] = &[
    rule(0xFFC0, 0x0000, Operation::MovRegister, "movs", TWO_REG)
        .described("Move register (lsl #0)"),
    rule(0xF800, 0x0000, Operation::LslImmediate, "lsls", SHIFT_IMM),
    rule(0xF800, 0x0800, Operation::LsrImmediate, "lsrs", SHIFT_IMM),
    rule(0xF800, 0x1000, Operation::AsrImmediate, "asrs", SHIFT_IMM)
        .described("Arithmetic shift right"),
    rule(0xFE00, 0x1800, Operation::AddRegister, "adds", THREE_REG),
    rule(0xFE00, 0x1A00, Operation::SubRegister, "subs", THREE_REG),
    rule(0xFE00, 0x1C00, Operation::AddImmediate3, "adds", TWO_REG_IMM3),
    rule(0xFE00, 0x1E00, Operation::SubImmediate3, "subs", TWO_REG_IMM3),
    rule(0xF800, 0x2000, Operation::MovImmediate, "movs", REG_IMM8).described("Move immediate"),
    rule(0xF800, 0x2800, Operation::CmpImmediate, "cmp", REG_IMM8).described("Compare immediate"),
    rule(0xF800, 0x3000, Operation::AddImmediate8, "adds", REG_IMM8),
    rule(0xF800, 0x3800, Operation::SubImmediate8, "subs", REG_IMM8),
    rule(0xFFC0, 0x4000, Operation::DataProcessing(DataOp::And), "ands", DATA_PROC),
    rule(0xFFC0, 0x4040, Operation::DataProcessing(DataOp::Eor), "eors", DATA_PROC),
    rule(0xFFC0, 0x4080, Operation::DataProcessing(DataOp::Lsl), "lsls", DATA_PROC),
    rule(0xFFC0, 0x40C0, Operation::DataProcessing(DataOp::Lsr), "lsrs", DATA_PROC),
    rule(0xFFC0, 0x4100, Operation::DataProcessing(DataOp::Asr), "asrs", DATA_PROC),
    rule(0xFFC0, 0x4140, Operation::DataProcessing(DataOp::Adc), "adcs", DATA_PROC),
    rule(0xFFC0, 0x4180, Operation::DataProcessing(DataOp::Sbc), "sbcs", DATA_PROC),
    rule(0xFFC0, 0x41C0, Operation::DataProcessing(DataOp::Ror), "rors", DATA_PROC),
    rule(0xFFC0, 0x4200, Operation::DataProcessing(DataOp::Tst), "tst", DATA_PROC),
    rule(0xFFC0, 0x4240, Operation::DataProcessing(DataOp::Rsb), "rsbs", DATA_PROC),
    rule(0xFFC0, 0x4280, Operation::DataProcessing(DataOp::Cmp), "cmp", DATA_PROC),
    rule(0xFFC0, 0x42C0, Operation::DataProcessing(DataOp::Cmn), "cmn", DATA_PROC),
    rule(0xFFC0, 0x4300, Operation::DataProcessing(DataOp::Orr), "orrs", DATA_PROC),
    rule(0xFFC0, 0x4340, Operation::DataProcessing(DataOp::Mul), "muls", DATA_PROC),
    rule(0xFFC0, 0x4380, Operation::DataProcessing(DataOp::Bic), "bics", DATA_PROC),
    rule(0xFFC0, 0x43C0, Operation::DataProcessing(DataOp::Mvn), "mvns", DATA_PROC),
    rule(
        0xFF87,
        0x4485,
        Operation::AddSpRegister,
        "add",
        OperandFields::new(0, 0, 0x0078, 0),
    )
    .described("Add register to SP"),
    rule(0xFF00, 0x4400, Operation::AddHigh, "add", HIGH_REG),
    rule(
        0xFF00,
        0x4500,
        Operation::CmpHigh,
        "cmp",
        OperandFields::new(0, 0x0087, 0x0078, 0),
    ),
    rule(
        0xFF00,
        0x4600,
        Operation::MovHigh,
        "mov",
        OperandFields::new(0x0087, 0, 0x0078, 0),
    ),
    rule(
        0xFF87,
        0x4700,
        Operation::BranchExchange,
        "bx",
        OperandFields::new(0, 0, 0x0078, 0),
    ),
    rule(
        0xFF87,
        0x4780,
        Operation::BranchLinkExchange,
        "blx",
        OperandFields::new(0, 0, 0x0078, 0),
    ),
    rule(
        0xF800,
        0x4800,
        Operation::LoadLiteral,
        "ldr",
        OperandFields::new(0x0700, 0, 0, 0x00FF),
    )
    .described("Load from literal pool"),
    rule(0xFE00, 0x5000, Operation::LoadStoreRegister(Transfer::Str), "str", THREE_REG),
    rule(0xFE00, 0x5200, Operation::LoadStoreRegister(Transfer::Strh), "strh", THREE_REG),
    rule(0xFE00, 0x5400, Operation::LoadStoreRegister(Transfer::Strb), "strb", THREE_REG),
    rule(0xFE00, 0x5600, Operation::LoadStoreRegister(Transfer::Ldrsb), "ldrsb", THREE_REG),
    rule(0xFE00, 0x5800, Operation::LoadStoreRegister(Transfer::Ldr), "ldr", THREE_REG),
    rule(0xFE00, 0x5A00, Operation::LoadStoreRegister(Transfer::Ldrh), "ldrh", THREE_REG),
    rule(0xFE00, 0x5C00, Operation::LoadStoreRegister(Transfer::Ldrb), "ldrb", THREE_REG),
    rule(0xFE00, 0x5E00, Operation::LoadStoreRegister(Transfer::Ldrsh), "ldrsh", THREE_REG),
    rule(0xF800, 0x6000, Operation::LoadStoreImmediate(Transfer::Str), "str", REG_IMM5)
        .described("Store word immediate offset"),
    rule(0xF800, 0x6800, Operation::LoadStoreImmediate(Transfer::Ldr), "ldr", REG_IMM5)
        .described("Load word immediate offset"),
    rule(0xF800, 0x7000, Operation::LoadStoreImmediate(Transfer::Strb), "strb", REG_IMM5),
    rule(0xF800, 0x7800, Operation::LoadStoreImmediate(Transfer::Ldrb), "ldrb", REG_IMM5),
    rule(0xF800, 0x8000, Operation::LoadStoreImmediate(Transfer::Strh), "strh", REG_IMM5),
    rule(0xF800, 0x8800, Operation::LoadStoreImmediate(Transfer::Ldrh), "ldrh", REG_IMM5),
    rule(
        0xF800,
        0x9000,
        Operation::StoreSpRelative,
        "str",
        OperandFields::new(0x0700, 0, 0, 0x00FF),
    )
    .described("Store word to stack offset"),
    rule(
        0xF800,
        0x9800,
        Operation::LoadSpRelative,
        "ldr",
        OperandFields::new(0x0700, 0, 0, 0x00FF),
    )
    .described("Load word from stack offset"),
    rule(
        0xF800,
        0xA000,
        Operation::AddPcImmediate,
        "adr",
        OperandFields::new(0x0700, 0, 0, 0x00FF),
    )
    .described("Add immediate to PC"),
    rule(
        0xF800,
        0xA800,
        Operation::AddSpImmediate,
        "add",
        OperandFields::new(0x0700, 0, 0, 0x00FF),
    )
    .described("Add immediate to SP"),
    rule(
        0xFF80,
        0xB000,
        Operation::AddSpImmediate7,
        "add",
        OperandFields::new(0, 0, 0, 0x007F),
    )
    .described("Add to SP"),
    rule(
        0xFF80,
        0xB080,
        Operation::SubSpImmediate7,
        "sub",
        OperandFields::new(0, 0, 0, 0x007F),
    )
    .described("Subtract from SP"),
    rule(0xFFC0, 0xB200, Operation::Extend(ExtendOp::Sxth), "sxth", TWO_REG)
        .described("Sign extend halfword"),
    rule(0xFFC0, 0xB240, Operation::Extend(ExtendOp::Sxtb), "sxtb", TWO_REG)
        .described("Sign extend byte"),
    rule(0xFFC0, 0xB280, Operation::Extend(ExtendOp::Uxth), "uxth", TWO_REG)
        .described("Unsigned extend halfword"),
    rule(0xFFC0, 0xB2C0, Operation::Extend(ExtendOp::Uxtb), "uxtb", TWO_REG)
        .described("Unsigned extend byte"),
    rule(
        0xFE00,
        0xB400,
        Operation::Push,
        "push",
        OperandFields::new(0, 0, 0, 0x01FF),
    ),
    rule(
        0xFE00,
        0xBC00,
        Operation::Pop,
        "pop",
        OperandFields::new(0, 0, 0, 0x01FF),
    ),
    rule(
        0xFF00,
        0xBE00,
        Operation::Breakpoint,
        "bkpt",
        OperandFields::new(0, 0, 0, 0x00FF),
    ),
    rule(
        0xF800,
        0xC000,
        Operation::StoreMultiple,
        "stmia",
        OperandFields::new(0, 0x0700, 0, 0x00FF),
    )
    .described("Store multiple"),
    rule(
        0xF800,
        0xC800,
        Operation::LoadMultiple,
        "ldmia",
        OperandFields::new(0, 0x0700, 0, 0x00FF),
    )
    .described("Load multiple"),
    branch_if(0xD000, Condition::Eq, "Branch if equal"),
    branch_if(0xD100, Condition::Ne, "Branch if not equal"),
    branch_if(0xD200, Condition::Cs, "Branch if carry set"),
    branch_if(0xD300, Condition::Cc, "Branch if carry clear"),
    branch_if(0xD400, Condition::Mi, "Branch if negative"),
    branch_if(0xD500, Condition::Pl, "Branch if positive-or-zero"),
    branch_if(0xD600, Condition::Vs, "Branch if overflow"),
    branch_if(0xD700, Condition::Vc, "Branch if no overflow"),
    branch_if(0xD800, Condition::Hi, "Branch if unsigned higher"),
    branch_if(0xD900, Condition::Ls, "Branch if unsigned lower or the same"),
    branch_if(0xDA00, Condition::Ge, "Branch if signed greater than or equal"),
    branch_if(0xDB00, Condition::Lt, "Branch if signed less than"),
    branch_if(0xDC00, Condition::Gt, "Branch if signed greater than"),
    branch_if(0xDD00, Condition::Le, "Branch if signed less than or equal"),
    rule(
        0xFF00,
        0xDE00,
        Operation::PermanentlyUndefined,
        "udf",
        OperandFields::new(0, 0, 0, 0x00FF),
    ),
    rule(
        0xFF00,
        0xDF00,
        Operation::SupervisorCall,
        "svc",
        OperandFields::new(0, 0, 0, 0x00FF),
    ),
    rule(
        0xF800,
        0xE000,
        Operation::Branch,
        "b",
        OperandFields::new(0, 0, 0, 0x07FF),
    )
    .described("Unconditional branch"),
    rule(0xF800, 0xE800, Operation::WidePrefix, "32-bit", OperandFields::NONE)
        .described("32-bit instruction"),
    rule(0xF000, 0xF000, Operation::WidePrefix, "32-bit", OperandFields::NONE)
        .described("32-bit instruction"),
];

const fn branch_if(value: u32, cond: Condition, description: &'static str) -> DecodeRule {
    rule(
        0xFF00,
        value,
        Operation::BranchConditional(cond),
        "b",
        OperandFields::new(0, 0, 0, 0x00FF),
    )
    .described(description)
}

/// 32-bit decode table (first halfword in the high 16 bits), in priority order.
pub const THUMB32_DECODE_TABLE: &[DecodeRule] = &[
    rule(
        0xF800_D000,
        0xF000_D000,
        Operation::BranchLink,
        "bl",
        BRANCH_LINK,
    )
    .described("Branch with link"),
    rule(
        0xF800_D000,
        0xF000_C000,
        Operation::BranchLinkExchangeImmediate,
        "blx",
        BRANCH_LINK,
    )
    .described("Branch with link and exchange to ARM state"),
];

/// Returns the first rule in `table` that matches `word`.
#[must_use]
pub fn find_rule(table: &'static [DecodeRule], word: u32) -> Option<&'static DecodeRule> {
    table.iter().find(|rule| rule.matches(word))
}

/// Looks up a 16-bit halfword in [`THUMB16_DECODE_TABLE`].
///
/// # Errors
///
/// Returns [`SimError::UnrecognizedOpcode`] when no rule matches.
pub fn lookup_thumb16(word: u16) -> Result<&'static DecodeRule, SimError> {
    find_rule(THUMB16_DECODE_TABLE, u32::from(word))
        .ok_or(SimError::UnrecognizedOpcode { word: u32::from(word) })
}

/// Looks up a combined 32-bit word in [`THUMB32_DECODE_TABLE`].
///
/// # Errors
///
/// Returns [`SimError::UnrecognizedOpcode`] when no rule matches.
pub fn lookup_thumb32(word: u32) -> Result<&'static DecodeRule, SimError> {
    find_rule(THUMB32_DECODE_TABLE, word).ok_or(SimError::UnrecognizedOpcode { word })
}

/// Returns `true` when `halfword` is the first half of a 32-bit instruction.
#[must_use]
pub fn is_wide_prefix(halfword: u16) -> bool {
    lookup_thumb16(halfword).is_ok_and(|rule| rule.op == Operation::WidePrefix)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{
        find_rule, is_wide_prefix, lookup_thumb16, lookup_thumb32, Condition, DataOp, Operation,
        Transfer, THUMB16_DECODE_TABLE, THUMB32_DECODE_TABLE,
    };
    use crate::SimError;

    #[test]
    fn every_rule_value_lies_inside_its_mask() {
        for rule in THUMB16_DECODE_TABLE.iter().chain(THUMB32_DECODE_TABLE) {
            assert_eq!(rule.value & rule.mask, rule.value, "{rule:?}");
            let fields = rule.fields;
            for field in [fields.rd, fields.rn, fields.rm, fields.imm] {
                assert_eq!(field & rule.mask, 0, "operand overlaps opcode bits in {rule:?}");
            }
        }
    }

    #[test]
    fn table_contains_unique_mask_value_pairs() {
        let pairs: HashSet<_> = THUMB16_DECODE_TABLE
            .iter()
            .map(|rule| (rule.mask, rule.value))
            .collect();
        assert_eq!(pairs.len(), THUMB16_DECODE_TABLE.len());
    }

    #[test]
    fn specific_add_sp_encoding_wins_over_general_high_add() {
        let word = 0x4485;
        let general = THUMB16_DECODE_TABLE
            .iter()
            .find(|rule| rule.op == Operation::AddHigh)
            .expect("general add rule");
        assert!(general.matches(word));

        assert_eq!(lookup_thumb16(0x4485).map(|r| r.op), Ok(Operation::AddSpRegister));
        assert_eq!(lookup_thumb16(0x4408).map(|r| r.op), Ok(Operation::AddHigh));
    }

    #[test]
    fn register_move_is_carved_out_of_shift_immediate() {
        assert_eq!(lookup_thumb16(0x0008).map(|r| r.op), Ok(Operation::MovRegister));
        assert_eq!(lookup_thumb16(0x0048).map(|r| r.op), Ok(Operation::LslImmediate));
    }

    #[test]
    fn find_rule_is_first_match_wins() {
        let table = &THUMB16_DECODE_TABLE[1..];
        assert_eq!(
            find_rule(table, 0x0008).map(|r| r.op),
            Some(Operation::LslImmediate)
        );
    }

    #[test]
    fn lookup_matches_known_encodings() {
        let cases = [
            (0xDF81, Operation::SupervisorCall),
            (0xB509, Operation::Push),
            (0xBD09, Operation::Pop),
            (0x2005, Operation::MovImmediate),
            (0x4801, Operation::LoadLiteral),
            (0x4770, Operation::BranchExchange),
            (0x4798, Operation::BranchLinkExchange),
            (0x4348, Operation::DataProcessing(DataOp::Mul)),
            (0x6821, Operation::LoadStoreImmediate(Transfer::Ldr)),
            (0x5C08, Operation::LoadStoreRegister(Transfer::Ldrb)),
            (0xD1FE, Operation::BranchConditional(Condition::Ne)),
            (0xE7FE, Operation::Branch),
            (0xDE00, Operation::PermanentlyUndefined),
        ];
        for (word, op) in cases {
            assert_eq!(lookup_thumb16(word).map(|r| r.op), Ok(op), "{word:#06x}");
        }
    }

    #[test]
    fn unassigned_halfwords_are_unrecognized() {
        for word in [0x4701_u16, 0xB100, 0xB650, 0xBF00] {
            assert_eq!(
                lookup_thumb16(word),
                Err(SimError::UnrecognizedOpcode {
                    word: u32::from(word)
                })
            );
        }
    }

    #[test]
    fn wide_prefix_covers_top_three_classes_only() {
        assert!(!is_wide_prefix(0xE000));
        assert!(!is_wide_prefix(0xE7FF));
        assert!(is_wide_prefix(0xE800));
        assert!(is_wide_prefix(0xF000));
        assert!(is_wide_prefix(0xF7FF));
        assert!(is_wide_prefix(0xF800));
        assert!(is_wide_prefix(0xFFFF));
        assert!(!is_wide_prefix(0xDF00));
    }

    #[test]
    fn wide_table_separates_bl_from_blx() {
        assert_eq!(lookup_thumb32(0xF000_F800).map(|r| r.op), Ok(Operation::BranchLink));
        assert_eq!(
            lookup_thumb32(0xF000_E800).map(|r| r.op),
            Ok(Operation::BranchLinkExchangeImmediate)
        );
        assert_eq!(
            lookup_thumb32(0xF8D0_1000),
            Err(SimError::UnrecognizedOpcode { word: 0xF8D0_1000 })
        );
    }
}
