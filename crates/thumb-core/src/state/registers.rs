use std::fmt;
use std::str::FromStr;

use crate::SimError;

/// Number of architecturally visible core registers (`r0..r15`).
pub const REGISTER_COUNT: usize = 16;
/// `APSR` negative flag.
pub const APSR_N: u32 = 1 << 31;
/// `APSR` zero flag.
pub const APSR_Z: u32 = 1 << 30;
/// `APSR` carry flag.
pub const APSR_C: u32 = 1 << 29;
/// `APSR` overflow flag.
pub const APSR_V: u32 = 1 << 28;
/// Mask of the condition flags held in `APSR`.
pub const APSR_FLAGS_MASK: u32 = APSR_N | APSR_Z | APSR_C | APSR_V;

/// Validated core register index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Register(u8);

impl Register {
    /// Stack pointer (`r13`).
    pub const SP: Self = Self(13);
    /// Link register (`r14`).
    pub const LR: Self = Self(14);
    /// Program counter (`r15`).
    pub const PC: Self = Self(15);

    /// Builds a register from an index in `0..=15`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidRegister`] for any larger index.
    pub fn new(index: u32) -> Result<Self, SimError> {
        u8::try_from(index)
            .ok()
            .filter(|i| usize::from(*i) < REGISTER_COUNT)
            .map(Self)
            .ok_or_else(|| SimError::InvalidRegister(index.to_string()))
    }

    /// Returns the array index for this register.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u32> for Register {
    type Error = SimError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

impl FromStr for Register {
    type Err = SimError;

    /// Accepts `pc`, `lr`, `sp` and the decimal indices `0`..`15`.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "pc" => Ok(Self::PC),
            "lr" => Ok(Self::LR),
            "sp" => Ok(Self::SP),
            _ => Some(name)
                .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|digits| digits.parse::<u32>().ok())
                .and_then(|index| Self::new(index).ok())
                .ok_or_else(|| SimError::InvalidRegister(name.to_owned())),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SP => f.write_str("sp"),
            Self::LR => f.write_str("lr"),
            Self::PC => f.write_str("pc"),
            Self(index) => write!(f, "r{index}"),
        }
    }
}

/// Core register file plus mode shadow fields.
///
/// `msp`, `psp` and `primask` are held and reset but not interpreted by the
/// execution engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    regs: [u32; REGISTER_COUNT],
    apsr: u32,
    msp: u32,
    psp: u32,
    primask: bool,
}

impl RegisterFile {
    /// Reads a register.
    #[must_use]
    pub const fn load(&self, reg: Register) -> u32 {
        self.regs[reg.index()]
    }

    /// Writes a register.
    pub const fn store(&mut self, reg: Register, value: u32) {
        self.regs[reg.index()] = value;
    }

    /// Reads a register by name (`pc`, `lr`, `sp`) or decimal index.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidRegister`] for unknown names.
    pub fn load_named(&self, name: &str) -> Result<u32, SimError> {
        Ok(self.load(name.parse()?))
    }

    /// Writes a register by name (`pc`, `lr`, `sp`) or decimal index.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidRegister`] for unknown names.
    pub fn store_named(&mut self, name: &str, value: u32) -> Result<(), SimError> {
        self.store(name.parse()?, value);
        Ok(())
    }

    /// Zeroes all registers and shadow fields.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Reads the program counter (thumb tag included).
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.load(Register::PC)
    }

    /// Writes the program counter.
    pub const fn set_pc(&mut self, value: u32) {
        self.store(Register::PC, value);
    }

    /// Reads the stack pointer.
    #[must_use]
    pub const fn sp(&self) -> u32 {
        self.load(Register::SP)
    }

    /// Writes the stack pointer.
    pub const fn set_sp(&mut self, value: u32) {
        self.store(Register::SP, value);
    }

    /// Reads the link register.
    #[must_use]
    pub const fn lr(&self) -> u32 {
        self.load(Register::LR)
    }

    /// Writes the link register.
    pub const fn set_lr(&mut self, value: u32) {
        self.store(Register::LR, value);
    }

    /// Reads `APSR`.
    #[must_use]
    pub const fn apsr(&self) -> u32 {
        self.apsr
    }

    /// Writes `APSR`; only the condition flag bits are kept.
    pub const fn set_apsr(&mut self, value: u32) {
        self.apsr = value & APSR_FLAGS_MASK;
    }

    /// Returns `true` when a specific `APSR` flag is set.
    #[must_use]
    pub const fn flag_is_set(&self, flag: u32) -> bool {
        (self.apsr & flag) != 0
    }

    /// Sets or clears a specific `APSR` flag.
    pub const fn set_flag(&mut self, flag: u32, enabled: bool) {
        if enabled {
            self.apsr |= flag & APSR_FLAGS_MASK;
        } else {
            self.apsr &= !(flag & APSR_FLAGS_MASK);
        }
    }

    /// Main stack pointer shadow.
    #[must_use]
    pub const fn msp(&self) -> u32 {
        self.msp
    }

    /// Writes the main stack pointer shadow.
    pub const fn set_msp(&mut self, value: u32) {
        self.msp = value;
    }

    /// Process stack pointer shadow.
    #[must_use]
    pub const fn psp(&self) -> u32 {
        self.psp
    }

    /// Writes the process stack pointer shadow.
    pub const fn set_psp(&mut self, value: u32) {
        self.psp = value;
    }

    /// Interrupt mask shadow.
    #[must_use]
    pub const fn primask(&self) -> bool {
        self.primask
    }

    /// Writes the interrupt mask shadow.
    pub const fn set_primask(&mut self, masked: bool) {
        self.primask = masked;
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CPU state:")?;
        for (row, values) in self.regs[..13].chunks(2).enumerate() {
            let left = row * 2;
            write!(f, "    {:<4} 0x{:08x}", format!("r{left}:"), values[0])?;
            if let Some(right) = values.get(1) {
                write!(f, "    {:<4} 0x{right:08x}", format!("r{}:", left + 1))?;
            }
            writeln!(f)?;
        }
        writeln!(f, "    sp:  0x{:08x}", self.sp())?;
        writeln!(f, "    lr:  0x{:08x}", self.lr())?;
        writeln!(f, "    pc:  0x{:08x}", self.pc())?;
        write!(
            f,
            "    apsr: {}{}{}{}",
            if self.flag_is_set(APSR_N) { 'N' } else { 'n' },
            if self.flag_is_set(APSR_Z) { 'Z' } else { 'z' },
            if self.flag_is_set(APSR_C) { 'C' } else { 'c' },
            if self.flag_is_set(APSR_V) { 'V' } else { 'v' },
        )
    }
}
