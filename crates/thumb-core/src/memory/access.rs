//! Alignment policy for width-typed memory accesses.

use crate::{AccessWidth, SimError};

/// Validates that `addr` is naturally aligned for `width`.
///
/// Byte accesses are always aligned.
///
/// # Errors
///
/// Returns [`SimError::MisalignedAccess`] when a halfword address is odd or a
/// word address is not a multiple of four.
pub const fn validate_alignment(addr: u32, width: AccessWidth) -> Result<(), SimError> {
    if addr & (width.bytes() - 1) == 0 {
        Ok(())
    } else {
        Err(SimError::MisalignedAccess { addr, width })
    }
}
