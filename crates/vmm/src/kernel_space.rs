//! The kernel half of every address space.
//!
//! The top page-directory-pointer slot of every address space links to one page directory
//! owned here. Mapping a kernel page through any address space, or through [`KernelSpace`]
//! directly, makes it visible in all of them. Edits to that directory are serialized by a
//! single lock, and its tables are never pruned or freed.

use crate::{
    FrameAllocator, FrameNumber, IdentityWindow, MapError, PageNumber, PhysicalAddress,
    VirtualAddress,
    layout::{KERNEL_SLOT, PageAccess, PageSize},
    walker::{Mapping, PageTableWalker, Translation, check_target},
};

/// The frame allocator, identity window and shared kernel directory used by every
/// [`AddressSpace`](crate::AddressSpace).
pub struct KernelSpace<A: FrameAllocator> {
    frames: A,
    window: IdentityWindow,
    directory: FrameNumber,
    lock: spin::Mutex<()>,
}

impl<A: FrameAllocator> KernelSpace<A> {
    /// Creates the kernel space, allocating its empty shared directory from `frames`.
    pub fn new(frames: A, window: IdentityWindow) -> Result<Self, MapError> {
        let directory = PageTableWalker::new(window, &frames).create_table()?;
        log::debug!(
            "kernel space: shared directory in frame {}, window at {:#x}",
            directory,
            window.base()
        );
        Ok(Self {
            frames,
            window,
            directory,
            lock: spin::Mutex::new(()),
        })
    }

    /// Returns the frame allocator used for every page-table frame.
    pub fn frames(&self) -> &A {
        &self.frames
    }

    /// Returns the identity window through which page tables are edited.
    pub fn window(&self) -> IdentityWindow {
        self.window
    }

    /// Returns the frame holding the shared kernel directory.
    pub fn directory(&self) -> FrameNumber {
        self.directory
    }

    pub(crate) fn walker(&self) -> PageTableWalker<'_, A> {
        PageTableWalker::new(self.window, &self.frames)
    }

    /// Maps a kernel page, making it visible in every address space.
    ///
    /// `page` must lie in the kernel slot.
    pub fn map_page(
        &self,
        page: PageNumber,
        frame: FrameNumber,
        access: PageAccess,
        page_size: PageSize,
    ) -> Result<(), MapError> {
        check_target(page, Some(frame), page_size)?;
        if page.slot() != KERNEL_SLOT {
            return Err(MapError::MisalignedOrReservedAddress);
        }
        self.map_shared(page, frame, access, page_size, false).map(|_| ())
    }

    /// Removes a kernel mapping from every address space.
    pub fn unmap_page(&self, page: PageNumber) -> Result<Option<Mapping>, MapError> {
        check_target(page, None, PageSize::Small)?;
        if page.slot() != KERNEL_SLOT {
            return Err(MapError::MisalignedOrReservedAddress);
        }
        self.unmap_shared(page)
    }

    /// Looks up a kernel page. Pages outside the kernel slot are reported unmapped.
    pub fn translate(&self, page: PageNumber) -> Translation {
        if !page.is_addressable() || page.slot() != KERNEL_SLOT {
            return Translation::Unmapped;
        }
        let _guard = self.lock.lock();
        self.walker().translate_in_directory(self.directory, page)
    }

    /// Resolves a kernel virtual address to the physical address it maps to.
    pub fn translate_address(&self, address: VirtualAddress) -> Option<PhysicalAddress> {
        let mapping = self.translate(address.page_number()).mapping()?;
        Some(mapping.frame.start() + address.page_offset())
    }

    pub(crate) fn map_shared(
        &self,
        page: PageNumber,
        frame: FrameNumber,
        access: PageAccess,
        page_size: PageSize,
        replace: bool,
    ) -> Result<Option<Mapping>, MapError> {
        let _guard = self.lock.lock();
        self.walker().map_in_directory(self.directory, page, frame, access, page_size, replace)
    }

    pub(crate) fn unmap_shared(&self, page: PageNumber) -> Result<Option<Mapping>, MapError> {
        let _guard = self.lock.lock();
        self.walker().unmap_in_directory(self.directory, page, false)
    }
}
