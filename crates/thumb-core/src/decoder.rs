//! Table-driven instruction decoder.
//!
//! A raw word is matched against the ordered tables in [`crate::encoding`] and
//! its operand fields are pulled out through the winning rule's masks.

use crate::encoding::{lookup_thumb16, lookup_thumb32, DecodeRule, Operation};
use crate::state::Register;
use crate::SimError;

/// Packs the bits of `word` selected by `mask` into the low bits of the
/// result, preserving their ascending order.
///
/// Contiguous masks behave like a shift-and-mask. Split fields such as the
/// `D:Rdn` pair of the high-register forms (mask `0x87`) come out as
/// `Rdn | D << 3`.
#[must_use]
pub const fn extract_field(word: u32, mask: u32) -> u32 {
    let mut remaining = mask;
    let mut out_bit = 0;
    let mut result = 0;
    while remaining != 0 {
        let bit = remaining & remaining.wrapping_neg();
        if word & bit != 0 {
            result |= 1 << out_bit;
        }
        out_bit += 1;
        remaining &= remaining - 1;
    }
    result
}

/// Decoded instruction with all operand fields extracted.
///
/// Operands the rule does not define decode as `r0` / `0`; check
/// [`DecodeRule::fields`] when the distinction matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Rule that matched.
    pub rule: &'static DecodeRule,
    /// Raw word (first halfword in the high 16 bits for wide instructions).
    pub raw: u32,
    /// Whether this came from the 32-bit table.
    pub wide: bool,
    /// Destination register.
    pub rd: Register,
    /// First source / base register.
    pub rn: Register,
    /// Second source / offset register.
    pub rm: Register,
    /// Packed immediate field.
    pub imm: u32,
}

impl DecodedInstruction {
    /// Operation identifier of the matched rule.
    #[must_use]
    pub const fn op(&self) -> Operation {
        self.rule.op
    }

    /// Mnemonic of the matched rule.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        self.rule.mnemonic
    }

    /// Encoded size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u32 {
        if self.wide {
            4
        } else {
            2
        }
    }
}

/// Stateless decoder over the static tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder;

impl Decoder {
    /// Decodes a 16-bit halfword.
    ///
    /// A halfword from one of the wide prefix classes decodes as
    /// [`Operation::WidePrefix`]; the caller must fetch the second half and
    /// call [`Decoder::decode32`].
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnrecognizedOpcode`] when no rule matches.
    pub fn decode16(halfword: u16) -> Result<DecodedInstruction, SimError> {
        let rule = lookup_thumb16(halfword)?;
        Self::with_rule(rule, u32::from(halfword), false)
    }

    /// Decodes a 32-bit word built as `first << 16 | second`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnrecognizedOpcode`] when no rule matches.
    pub fn decode32(word: u32) -> Result<DecodedInstruction, SimError> {
        let rule = lookup_thumb32(word)?;
        Self::with_rule(rule, word, true)
    }

    /// Extracts the operands of `raw` through an already matched rule.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidRegister`] when a register field mask is
    /// wider than four bits.
    pub fn with_rule(
        rule: &'static DecodeRule,
        raw: u32,
        wide: bool,
    ) -> Result<DecodedInstruction, SimError> {
        let fields = rule.fields;
        Ok(DecodedInstruction {
            rule,
            raw,
            wide,
            rd: Register::new(extract_field(raw, fields.rd))?,
            rn: Register::new(extract_field(raw, fields.rn))?,
            rm: Register::new(extract_field(raw, fields.rm))?,
            imm: extract_field(raw, fields.imm),
        })
    }
}
