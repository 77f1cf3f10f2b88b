//! PAE page-table entries.

use core::fmt;

use crate::{FrameNumber, layout::PageAccess};

bitflags::bitflags! {
    /// Flag bits of a PAE paging-structure entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EntryFlags: u64 {
        /// The entry is valid.
        const PRESENT = 1 << 0;
        /// Writes are allowed through this entry.
        const WRITABLE = 1 << 1;
        /// User-mode accesses are allowed through this entry.
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
        /// In a page-directory entry: maps a 2 MiB page instead of naming a page table.
        const LARGE_PAGE = 1 << 7;
        const GLOBAL = 1 << 8;
        const NO_EXECUTE = 1 << 63;
    }
}

impl From<PageAccess> for EntryFlags {
    fn from(access: PageAccess) -> Self {
        let mut flags = EntryFlags::empty();
        flags.set(EntryFlags::WRITABLE, access.contains(PageAccess::WRITABLE));
        flags.set(EntryFlags::USER, access.contains(PageAccess::USER));
        flags
    }
}

/// A single 64-bit entry of any level of the hierarchy.
///
/// The physical frame is stored in bits 12-51. Which flags are meaningful depends on the
/// level: page-directory-pointer entries only carry [`EntryFlags::PRESENT`], and
/// [`EntryFlags::LARGE_PAGE`] is only honoured in page-directory entries.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct PageEntry(u64);

impl PageEntry {
    /// Physical address mask (bits 12-51).
    const ADDRESS_MASK: u64 = 0x000F_FFFF_FFFF_F000;

    /// Shift from a frame number to the address bits.
    const FRAME_SHIFT: u32 = 12;

    /// An entry that maps nothing.
    pub const fn empty() -> Self {
        Self(0)
    }

    fn with_frame(frame: FrameNumber, flags: EntryFlags) -> Self {
        let addr_bits = ((frame.as_usize() as u64) << Self::FRAME_SHIFT) & Self::ADDRESS_MASK;
        Self(addr_bits | flags.bits())
    }

    /// Creates a page-directory-pointer entry naming a page directory.
    ///
    /// PAE reserves the access bits at this level, so only the present bit is set.
    pub fn directory(frame: FrameNumber) -> Self {
        Self::with_frame(frame, EntryFlags::PRESENT)
    }

    /// Creates a page-directory entry naming a page table.
    ///
    /// Access is granted fully at this level and restricted by the leaf entries.
    pub fn table(frame: FrameNumber) -> Self {
        Self::with_frame(frame, EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER)
    }

    /// Creates a page-table entry mapping a 4 KiB frame.
    pub fn page(frame: FrameNumber, access: PageAccess) -> Self {
        Self::with_frame(frame, EntryFlags::PRESENT | EntryFlags::from(access))
    }

    /// Creates a page-directory entry mapping a 2 MiB frame.
    pub fn large_page(frame: FrameNumber, access: PageAccess) -> Self {
        Self::with_frame(
            frame,
            EntryFlags::PRESENT | EntryFlags::LARGE_PAGE | EntryFlags::from(access),
        )
    }

    /// Returns the flags for this entry.
    pub fn flags(self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.0 & !Self::ADDRESS_MASK)
    }

    /// Returns whether this entry is present.
    pub fn is_present(self) -> bool {
        self.flags().contains(EntryFlags::PRESENT)
    }

    /// Returns whether this entry is present and maps a large page.
    pub fn is_large(self) -> bool {
        self.flags().contains(EntryFlags::PRESENT | EntryFlags::LARGE_PAGE)
    }

    /// Returns the frame named by this entry, or `None` if the entry is not present.
    pub fn frame(self) -> Option<FrameNumber> {
        if self.is_present() {
            Some(FrameNumber::new(
                ((self.0 & Self::ADDRESS_MASK) >> Self::FRAME_SHIFT) as usize,
            ))
        } else {
            None
        }
    }

    /// Returns the access rights granted by this entry.
    pub fn access(self) -> PageAccess {
        let flags = self.flags();
        let mut access = PageAccess::empty();
        access.set(PageAccess::WRITABLE, flags.contains(EntryFlags::WRITABLE));
        access.set(PageAccess::USER, flags.contains(EntryFlags::USER));
        access
    }

    /// Clears this entry (sets it to zero).
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Returns the raw value of this entry.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageEntry")
            .field("frame", &self.frame())
            .field("flags", &self.flags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_entry_is_absent() {
        let entry = PageEntry::empty();
        assert!(!entry.is_present());
        assert_eq!(entry.frame(), None);
    }

    #[test]
    fn page_entry_encoding() {
        let entry = PageEntry::page(FrameNumber::new(0x50), PageAccess::USER_DATA);
        assert_eq!(entry.as_u64(), 0x50_007);
        assert_eq!(entry.frame(), Some(FrameNumber::new(0x50)));
        assert_eq!(entry.access(), PageAccess::USER_DATA);
        assert!(!entry.is_large());
    }

    #[test]
    fn directory_pointer_entry_sets_only_present() {
        let entry = PageEntry::directory(FrameNumber::new(7));
        assert_eq!(entry.flags(), EntryFlags::PRESENT);
    }

    #[test]
    fn large_page_entry() {
        let entry = PageEntry::large_page(FrameNumber::new(0x400), PageAccess::KERNEL);
        assert!(entry.is_large());
        assert_eq!(entry.access(), PageAccess::WRITABLE);
        assert_eq!(entry.frame(), Some(FrameNumber::new(0x400)));
    }

    #[test]
    fn frames_above_four_gib() {
        let frame = FrameNumber::new(0xF_FFFF_F);
        assert_eq!(PageEntry::table(frame).frame(), Some(frame));
    }

    #[test]
    fn clear_removes_everything() {
        let mut entry = PageEntry::table(FrameNumber::new(3));
        entry.clear();
        assert_eq!(entry, PageEntry::empty());
    }
}
