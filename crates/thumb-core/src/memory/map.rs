//! Fixed address-space layout and region resolution.

use std::fmt;

use crate::SimError;

/// Base address of the code region.
pub const CODE_BASE: u32 = 0x0000_0000;
/// Base address of the working-memory region.
pub const RAM_BASE: u32 = 0x2000_0000;
/// Default code-region capacity in bytes (32 KiB).
pub const DEFAULT_CODE_BYTES: usize = 32 * 1024;
/// Default working-memory capacity in bytes (4 KiB).
pub const DEFAULT_RAM_BYTES: usize = 4 * 1024;

/// Width of a single memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessWidth {
    /// 8-bit access.
    Byte,
    /// 16-bit access.
    Halfword,
    /// 32-bit access.
    Word,
}

impl AccessWidth {
    /// Number of bytes moved by an access of this width.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Halfword => 2,
            Self::Word => 4,
        }
    }
}

impl fmt::Display for AccessWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Byte => "byte",
            Self::Halfword => "halfword",
            Self::Word => "word",
        })
    }
}

/// Backing store an address resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryRegion {
    /// Program image and constants, based at [`CODE_BASE`].
    Code,
    /// Freely writable working memory, based at [`RAM_BASE`].
    Ram,
}

/// A resolved access: which region, and the byte offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedAddress {
    /// Region the access lands in.
    pub region: MemoryRegion,
    /// Offset of the first byte inside the region's backing store.
    pub offset: usize,
}

/// Resolves `addr` for an access of `width` against the given capacities.
///
/// The code region matches when `addr` lies in `[0, code_bytes - width)`.
/// Working memory matches when the whole access fits in
/// `[RAM_BASE, RAM_BASE + ram_bytes)`. Alignment is not checked here.
///
/// # Errors
///
/// Returns [`SimError::AddressOutOfRange`] when neither region matches.
pub fn resolve_address(
    addr: u32,
    width: AccessWidth,
    code_bytes: usize,
    ram_bytes: usize,
) -> Result<ResolvedAddress, SimError> {
    let size = u64::from(width.bytes());
    let addr_wide = u64::from(addr);

    let code_limit = (code_bytes as u64).saturating_sub(size);
    if addr_wide < code_limit {
        return Ok(ResolvedAddress {
            region: MemoryRegion::Code,
            offset: (addr - CODE_BASE) as usize,
        });
    }

    if addr >= RAM_BASE {
        let offset = u64::from(addr - RAM_BASE);
        if offset + size <= ram_bytes as u64 {
            return Ok(ResolvedAddress {
                region: MemoryRegion::Ram,
                offset: offset as usize,
            });
        }
    }

    Err(SimError::AddressOutOfRange { addr, width })
}
