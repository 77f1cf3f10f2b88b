//! Paging geometry and fixed virtual-memory layout.
//!
//! The layout is the 3-level PAE scheme: a 4-entry page-directory-pointer table, 512-entry
//! page directories and 512-entry page tables, all holding 64-bit entries. A large page covers
//! exactly the range of one page-directory entry.

use core::fmt;

use crate::PageNumber;

/// Size of a small page (and of a physical frame) in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Size of a large page in bytes (2 MiB).
pub const LARGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Number of entries in a page table.
pub const PAGE_TABLE_ENTRIES: usize = 512;

/// Number of entries in a page directory.
pub const PAGE_DIRECTORY_ENTRIES: usize = 512;

/// Number of entries in the page-directory-pointer table.
pub const PAGE_DIRECTORY_POINTER_TABLE_ENTRIES: usize = 4;

/// Number of small pages covered by one page-directory entry.
pub const PAGES_PER_DIRECTORY_ENTRY: usize = PAGE_TABLE_ENTRIES;

/// Number of small pages covered by one page-directory-pointer table entry.
pub const PAGES_PER_DIRECTORY: usize = PAGE_TABLE_ENTRIES * PAGE_DIRECTORY_ENTRIES;

/// Number of small pages in the whole virtual address space (4 GiB).
pub const VIRTUAL_PAGES: usize = PAGES_PER_DIRECTORY * PAGE_DIRECTORY_POINTER_TABLE_ENTRIES;

/// Maximum number of bits in a virtual address.
pub const MAX_VIRTUAL_BITS: usize = 32;

/// Maximum number of bits in a physical address.
pub const MAX_PHYSICAL_BITS: usize = 36;

/// Number of frames an entry can name.
pub const PHYSICAL_FRAMES: usize = 1 << (MAX_PHYSICAL_BITS - 12);

/// First page of the region reserved for early boot structures.
pub const RESERVED_START: PageNumber = PageNumber::new(0x80000);

/// First page past the reserved region.
pub const RESERVED_END: PageNumber = PageNumber::new(0xC0000);

/// Page-directory-pointer slot whose directory is shared by every address space.
pub const KERNEL_SLOT: usize = 3;

/// Virtual address at which all of physical memory is visible to the kernel.
pub const IDENTITY_WINDOW_BASE: usize = 0xC000_0000;

/// Number of frames the identity window reaches before the top of the virtual address space.
pub const IDENTITY_WINDOW_FRAMES: usize =
    (((1u64 << MAX_VIRTUAL_BITS) - IDENTITY_WINDOW_BASE as u64) / PAGE_SIZE as u64) as usize;

// A large-page entry must cover exactly one directory entry's worth of address space.
const _: () = assert!(LARGE_PAGE_SIZE == PAGES_PER_DIRECTORY_ENTRY * PAGE_SIZE);
const _: () = assert!(RESERVED_START.as_usize() % PAGES_PER_DIRECTORY_ENTRY == 0);
const _: () = assert!(RESERVED_END.as_usize() % PAGES_PER_DIRECTORY_ENTRY == 0);
const _: () = assert!(RESERVED_END.as_usize() <= KERNEL_SLOT * PAGES_PER_DIRECTORY);

/// The page sizes a mapping can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageSize {
    /// A 4 KiB page, mapped through a page table.
    #[default]
    Small,
    /// A 2 MiB page, mapped directly by a page-directory entry.
    Large,
}

impl PageSize {
    /// Returns the size of the page in bytes.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Small => PAGE_SIZE,
            Self::Large => LARGE_PAGE_SIZE,
        }
    }

    /// Returns the number of small pages (or frames) spanned by one page of this size.
    #[inline]
    pub const fn pages(self) -> usize {
        match self {
            Self::Small => 1,
            Self::Large => PAGES_PER_DIRECTORY_ENTRY,
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Small => f.write_str("4KiB"),
            Self::Large => f.write_str("2MiB"),
        }
    }
}

bitflags::bitflags! {
    /// Access rights requested for a mapping.
    ///
    /// An empty set maps the page read-only and supervisor-only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageAccess: u8 {
        /// The page may be written.
        const WRITABLE = 1 << 0;
        /// The page may be accessed from user mode.
        const USER = 1 << 1;
    }
}

impl PageAccess {
    /// Read/write, supervisor only.
    pub const KERNEL: Self = Self::WRITABLE;

    /// Read/write, accessible from user mode.
    pub const USER_DATA: Self = Self::WRITABLE.union(Self::USER);
}
