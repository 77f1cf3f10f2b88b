use core::fmt;

use crate::AllocError;

/// Errors returned by mapping operations.
///
/// An operation that fails leaves the page-table hierarchy exactly as it was before the call.
/// Looking up or unmapping an absent page is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// The frame allocator ran out of frames while the hierarchy was being grown.
    AllocationFailure,
    /// The target page is already mapped and remapping was not requested.
    AlreadyMapped,
    /// A mapping of the other page size already covers part of the target range.
    PageSizeConflict,
    /// The page lies in the reserved region or outside the address space, or the page or
    /// frame is not aligned to the requested page size.
    MisalignedOrReservedAddress,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailure => f.write_str("out of frames for page tables"),
            Self::AlreadyMapped => f.write_str("page is already mapped"),
            Self::PageSizeConflict => f.write_str("range is mapped with a different page size"),
            Self::MisalignedOrReservedAddress => {
                f.write_str("address is misaligned, reserved or out of range")
            }
        }
    }
}

impl From<AllocError> for MapError {
    fn from(_: AllocError) -> Self {
        Self::AllocationFailure
    }
}
