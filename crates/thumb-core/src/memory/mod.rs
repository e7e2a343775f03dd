//! Split address space: a code region at 0 and working memory at [`RAM_BASE`].

/// Alignment policy helpers.
pub mod access;
/// Region layout constants and address resolution.
pub mod map;

pub use access::validate_alignment;
pub use map::{
    resolve_address, AccessWidth, MemoryRegion, ResolvedAddress, CODE_BASE, DEFAULT_CODE_BYTES,
    DEFAULT_RAM_BYTES, RAM_BASE,
};

use crate::SimError;

/// Whether a write may land in the code region.
///
/// Only image loading passes [`CodeWrite::Allowed`]; the executing program
/// always writes with [`CodeWrite::Denied`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodeWrite {
    /// Code-region writes fail with [`SimError::WriteProtected`].
    #[default]
    Denied,
    /// Code-region writes are permitted.
    Allowed,
}

/// Two fixed-capacity, zero-initialized, little-endian backing stores.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AddressSpace {
    code: Box<[u8]>,
    ram: Box<[u8]>,
}

impl AddressSpace {
    /// Allocates zeroed code and working-memory regions.
    #[must_use]
    pub fn new(code_bytes: usize, ram_bytes: usize) -> Self {
        Self {
            code: vec![0; code_bytes].into_boxed_slice(),
            ram: vec![0; ram_bytes].into_boxed_slice(),
        }
    }

    /// Capacity of the code region in bytes.
    #[must_use]
    pub fn code_capacity(&self) -> usize {
        self.code.len()
    }

    /// Capacity of the working-memory region in bytes.
    #[must_use]
    pub fn ram_capacity(&self) -> usize {
        self.ram.len()
    }

    /// Resolves an access without touching memory.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::MisalignedAccess`] or
    /// [`SimError::AddressOutOfRange`].
    pub fn resolve(&self, addr: u32, width: AccessWidth) -> Result<ResolvedAddress, SimError> {
        validate_alignment(addr, width)?;
        resolve_address(addr, width, self.code.len(), self.ram.len())
    }

    fn read(&self, addr: u32, width: AccessWidth) -> Result<u32, SimError> {
        let ResolvedAddress { region, offset } = self.resolve(addr, width)?;
        let store = match region {
            MemoryRegion::Code => &self.code,
            MemoryRegion::Ram => &self.ram,
        };
        let bytes = &store[offset..offset + width.bytes() as usize];
        Ok(bytes
            .iter()
            .rev()
            .fold(0_u32, |acc, byte| (acc << 8) | u32::from(*byte)))
    }

    fn write(
        &mut self,
        addr: u32,
        width: AccessWidth,
        value: u32,
        code_write: CodeWrite,
    ) -> Result<(), SimError> {
        let ResolvedAddress { region, offset } = self.resolve(addr, width)?;
        let store = match (region, code_write) {
            (MemoryRegion::Code, CodeWrite::Denied) => {
                return Err(SimError::WriteProtected { addr });
            }
            (MemoryRegion::Code, CodeWrite::Allowed) => &mut self.code,
            (MemoryRegion::Ram, _) => &mut self.ram,
        };
        let len = width.bytes() as usize;
        store[offset..offset + len].copy_from_slice(&value.to_le_bytes()[..len]);
        Ok(())
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Fails with [`SimError::AddressOutOfRange`] outside both regions.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_byte(&self, addr: u32) -> Result<u8, SimError> {
        self.read(addr, AccessWidth::Byte).map(|v| v as u8)
    }

    /// Reads a little-endian halfword.
    ///
    /// # Errors
    ///
    /// Fails on odd or out-of-range addresses.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_halfword(&self, addr: u32) -> Result<u16, SimError> {
        self.read(addr, AccessWidth::Halfword).map(|v| v as u16)
    }

    /// Reads a little-endian word.
    ///
    /// # Errors
    ///
    /// Fails on unaligned or out-of-range addresses.
    pub fn read_word(&self, addr: u32) -> Result<u32, SimError> {
        self.read(addr, AccessWidth::Word)
    }

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// Fails out of range, or in the code region without [`CodeWrite::Allowed`].
    pub fn write_byte(&mut self, addr: u32, value: u8, code_write: CodeWrite) -> Result<(), SimError> {
        self.write(addr, AccessWidth::Byte, u32::from(value), code_write)
    }

    /// Writes the low 16 bits of `value`, little-endian.
    ///
    /// # Errors
    ///
    /// Fails on odd or out-of-range addresses, or in the code region without
    /// [`CodeWrite::Allowed`].
    pub fn write_halfword(
        &mut self,
        addr: u32,
        value: u16,
        code_write: CodeWrite,
    ) -> Result<(), SimError> {
        self.write(addr, AccessWidth::Halfword, u32::from(value), code_write)
    }

    /// Writes a little-endian word.
    ///
    /// # Errors
    ///
    /// Fails on unaligned or out-of-range addresses, or in the code region
    /// without [`CodeWrite::Allowed`].
    pub fn write_word(&mut self, addr: u32, value: u32, code_write: CodeWrite) -> Result<(), SimError> {
        self.write(addr, AccessWidth::Word, value, code_write)
    }
}
