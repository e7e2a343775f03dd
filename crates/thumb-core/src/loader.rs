//! Image loading and the application header.
//!
//! An image is copied into the code region with writes enabled. Its header
//! is a 0x34-byte little-endian record of thirteen words that describes the
//! data, bss, constructor and heap sections plus the entry point.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::memory::{AccessWidth, AddressSpace, CodeWrite, RAM_BASE};
use crate::{CoreState, SimError};

/// Required value of [`AppHeader::magic`].
pub const APP_HEADER_MAGIC: u32 = 0xD3FB_F67A;
/// Size of the header record in bytes.
pub const APP_HEADER_BYTES: usize = 0x34;
/// Link-register value a loaded program returns to.
pub const HOST_RETURN_ADDRESS: u32 = 0xFFFF_FFFC;
/// Conventional code-region address images are loaded at.
pub const DEFAULT_LOAD_ADDRESS: u32 = 0x5900;

/// Header validation or application failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Magic word mismatch.
    #[error("application header magic {found:#010x} does not match {APP_HEADER_MAGIC:#010x}")]
    BadMagic {
        /// Magic word found in the header.
        found: u32,
    },
    /// The image has static constructors, which the loader cannot run.
    #[error("constructor section {start:#010x}..{end:#010x} is not supported")]
    ConstructorsUnsupported {
        /// Section start.
        start: u32,
        /// Section end.
        end: u32,
    },
    /// A section ends before it starts.
    #[error("{section} section bounds are inverted: {start:#010x}..{end:#010x}")]
    InvalidSection {
        /// Section name.
        section: &'static str,
        /// Section start.
        start: u32,
        /// Section end.
        end: u32,
    },
    /// Fewer than [`APP_HEADER_BYTES`] bytes were available.
    #[error("application header needs {APP_HEADER_BYTES} bytes, found {len}")]
    Truncated {
        /// Bytes available.
        len: usize,
    },
    /// Address-space failure while loading.
    #[error(transparent)]
    Memory(#[from] SimError),
}

/// Application header, in on-image field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub struct AppHeader {
    pub data_load_start: u32,
    pub data_start: u32,
    pub data_end: u32,
    pub bss_start: u32,
    pub bss_end: u32,
    pub entry: u32,
    pub magic: u32,
    pub version: u32,
    pub const_start: u32,
    pub const_end: u32,
    pub heap_start: u32,
    pub heap_end: u32,
    pub padding: u32,
}

impl AppHeader {
    const fn from_words(w: [u32; APP_HEADER_BYTES / 4]) -> Self {
        Self {
            data_load_start: w[0],
            data_start: w[1],
            data_end: w[2],
            bss_start: w[3],
            bss_end: w[4],
            entry: w[5],
            magic: w[6],
            version: w[7],
            const_start: w[8],
            const_end: w[9],
            heap_start: w[10],
            heap_end: w[11],
            padding: w[12],
        }
    }

    const fn words(&self) -> [u32; APP_HEADER_BYTES / 4] {
        [
            self.data_load_start,
            self.data_start,
            self.data_end,
            self.bss_start,
            self.bss_end,
            self.entry,
            self.magic,
            self.version,
            self.const_start,
            self.const_end,
            self.heap_start,
            self.heap_end,
            self.padding,
        ]
    }

    /// Reads the header from memory at `offset`.
    ///
    /// # Errors
    ///
    /// Fails when any header word is misaligned or out of range.
    pub fn read(memory: &AddressSpace, offset: u32) -> Result<Self, SimError> {
        let mut words = [0; APP_HEADER_BYTES / 4];
        for (delta, word) in (0_u32..).step_by(4).zip(words.iter_mut()) {
            *word = memory.read_word(offset.wrapping_add(delta))?;
        }
        Ok(Self::from_words(words))
    }

    /// Parses the header from the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Truncated`] when `bytes` is too short.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        let record = bytes
            .get(..APP_HEADER_BYTES)
            .ok_or(LoadError::Truncated { len: bytes.len() })?;
        let mut words = [0; APP_HEADER_BYTES / 4];
        for (word, chunk) in words.iter_mut().zip(record.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(Self::from_words(words))
    }

    /// Serializes the header as it appears in an image.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; APP_HEADER_BYTES] {
        let mut bytes = [0; APP_HEADER_BYTES];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.words()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// Checks the magic word and section bounds.
    ///
    /// # Errors
    ///
    /// Returns the first problem found as a [`LoadError`].
    pub const fn validate(&self) -> Result<(), LoadError> {
        if self.magic != APP_HEADER_MAGIC {
            return Err(LoadError::BadMagic { found: self.magic });
        }
        if self.data_end < self.data_start {
            return Err(LoadError::InvalidSection {
                section: "data",
                start: self.data_start,
                end: self.data_end,
            });
        }
        if self.bss_end < self.bss_start {
            return Err(LoadError::InvalidSection {
                section: "bss",
                start: self.bss_start,
                end: self.bss_end,
            });
        }
        if self.const_start < self.const_end {
            return Err(LoadError::ConstructorsUnsupported {
                start: self.const_start,
                end: self.const_end,
            });
        }
        Ok(())
    }

    /// Validates the header, then prepares `state` to run the image.
    ///
    /// Copies the data section from its load address, zeroes bss, and sets
    /// `pc = entry | 1`, `sp` to the last word of working memory and `lr` to
    /// [`HOST_RETURN_ADDRESS`]. Nothing is mutated if validation fails.
    ///
    /// # Errors
    ///
    /// Returns validation errors, or [`LoadError::Memory`] when a section
    /// lies outside writable memory.
    pub fn apply(&self, state: &mut CoreState) -> Result<(), LoadError> {
        self.validate()?;
        debug!(
            entry = format_args!("{:#010x}", self.entry),
            data_bytes = self.data_end - self.data_start,
            bss_bytes = self.bss_end - self.bss_start,
            "applying application header"
        );

        for offset in (0..self.data_end - self.data_start).step_by(4) {
            let value = state
                .memory
                .read_word(self.data_load_start.wrapping_add(offset))?;
            state.memory.write_word(
                self.data_start.wrapping_add(offset),
                value,
                CodeWrite::Denied,
            )?;
        }
        for addr in (self.bss_start..self.bss_end).step_by(4) {
            state.memory.write_word(addr, 0, CodeWrite::Denied)?;
        }

        #[allow(clippy::cast_possible_truncation)]
        let ram_bytes = state.memory.ram_capacity() as u32;
        state.registers.set_pc(self.entry | 1);
        state
            .registers
            .set_sp(RAM_BASE.wrapping_add(ram_bytes).wrapping_sub(4));
        state.registers.set_lr(HOST_RETURN_ADDRESS);
        Ok(())
    }
}

impl fmt::Display for AppHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            "data_load_start",
            "data_start",
            "data_end",
            "bss_start",
            "bss_end",
            "entry",
            "magic",
            "version",
            "const_start",
            "const_end",
            "heap_start",
            "heap_end",
            "padding",
        ];
        for (name, value) in names.iter().zip(self.words()) {
            writeln!(f, "{name}: {value:#010x}")?;
        }
        Ok(())
    }
}

/// Copies `bytes` into memory starting at `base`, with code writes enabled.
///
/// # Errors
///
/// Fails at the first byte that lands outside both regions; earlier bytes
/// stay written.
pub fn load_image(memory: &mut AddressSpace, base: u32, bytes: &[u8]) -> Result<(), SimError> {
    for (offset, byte) in bytes.iter().enumerate() {
        let addr = u32::try_from(offset)
            .ok()
            .and_then(|offset| base.checked_add(offset))
            .ok_or(SimError::AddressOutOfRange {
                addr: base,
                width: AccessWidth::Byte,
            })?;
        memory.write_byte(addr, *byte, CodeWrite::Allowed)?;
    }
    debug!(base = format_args!("{base:#010x}"), len = bytes.len(), "image loaded");
    Ok(())
}
