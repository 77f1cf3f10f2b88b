#![cfg_attr(not(any(test, feature = "software-emulation")), no_std)]
#![feature(step_trait)]

//! # Polaris Virtual Memory Manager (VMM)
//!
//! The Polaris Virtual Memory Manager builds and edits the three-level PAE page tables that
//! translate 32-bit virtual addresses for the Polaris kernel. It provides:
//!
//! - Address spaces that grow their page directories and page tables on demand and release
//!   them as soon as they are empty.
//! - 4 KiB and 2 MiB mappings, with the kernel's top gigabyte shared by every address space.
//! - A narrow [`FrameAllocator`] interface for the frames that hold the tables themselves.
//! - Software emulation for testing in non-kernel environments.
//!
//! All page-table memory is reached through an [`IdentityWindow`], a fixed offset mapping of
//! physical memory, so editing tables never requires creating a mapping first.

mod address;
mod address_space;
mod arch;
mod entry;
mod error;
mod frame_allocator;
mod kernel_space;
mod layout;
mod numbers;
mod table;
mod walker;

#[cfg(test)]
mod testing;

pub use address::{IdentityWindow, PhysicalAddress, VirtualAddress};
pub use address_space::AddressSpace;
pub use entry::{EntryFlags, PageEntry};
pub use error::MapError;
pub use frame_allocator::{AllocError, FrameAllocator, FreeListAllocator};
pub use kernel_space::KernelSpace;
pub use layout::{
    IDENTITY_WINDOW_BASE, IDENTITY_WINDOW_FRAMES, KERNEL_SLOT, LARGE_PAGE_SIZE, MAX_PHYSICAL_BITS,
    MAX_VIRTUAL_BITS, PAGE_DIRECTORY_ENTRIES, PAGE_DIRECTORY_POINTER_TABLE_ENTRIES, PAGE_SIZE,
    PAGE_TABLE_ENTRIES, PAGES_PER_DIRECTORY, PAGES_PER_DIRECTORY_ENTRY, PHYSICAL_FRAMES,
    PageAccess, PageSize, RESERVED_END, RESERVED_START, VIRTUAL_PAGES,
};
pub use numbers::{FrameNumber, PageNumber};
pub use table::{PageDirectoryPointerTable, PageTable};
pub use walker::{Mapping, TableIndices, Translation};

#[cfg(any(test, feature = "software-emulation"))]
pub use arch::{EmulatedMemory, active_root, tlb_flush_count};
