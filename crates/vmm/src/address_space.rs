//! Per-process address spaces.
//!
//! An [`AddressSpace`] owns a page-directory-pointer table and every page directory and page
//! table below its first three slots. Its top slot links to the kernel directory shared
//! through [`KernelSpace`], so operations on kernel pages are forwarded there.

use crate::{
    FrameAllocator, FrameNumber, KernelSpace, MapError, PageNumber, PhysicalAddress,
    VirtualAddress, arch,
    entry::PageEntry,
    layout::{KERNEL_SLOT, PAGE_DIRECTORY_POINTER_TABLE_ENTRIES, PageAccess, PageSize},
    walker::{Mapping, Translation, check_target},
};

/// A virtual address space.
///
/// Mapping operations take `&mut self`, which serializes edits to the private part of the
/// hierarchy. The root and every private table are released when the address space is
/// dropped; the frames it maps are not.
pub struct AddressSpace<'k, A: FrameAllocator> {
    kernel: &'k KernelSpace<A>,
    root: FrameNumber,
}

impl<'k, A: FrameAllocator> AddressSpace<'k, A> {
    /// Creates an empty address space that shares the kernel's mappings.
    pub fn new(kernel: &'k KernelSpace<A>) -> Result<Self, MapError> {
        let walker = kernel.walker();
        let root = walker.create_table()?;
        walker.set_root_entry(root, KERNEL_SLOT, PageEntry::directory(kernel.directory()));
        log::debug!("address space created with root {}", root.start());
        Ok(Self { kernel, root })
    }

    /// Returns the frame holding the page-directory-pointer table.
    pub fn root_frame(&self) -> FrameNumber {
        self.root
    }

    /// Returns the physical address to load into the translation root register.
    pub fn root_address(&self) -> PhysicalAddress {
        self.root.start()
    }

    /// Makes this address space the active translation on the current CPU.
    ///
    /// # Safety
    ///
    /// The address space must map everything the kernel touches after the switch and must
    /// outlive its activation.
    pub unsafe fn activate(&self) {
        // SAFETY: Upheld by the caller.
        unsafe { arch::load_root(self.root_address()) };
    }

    /// Maps `page` to `frame`, growing the hierarchy as needed.
    ///
    /// Fails with [`MapError::AlreadyMapped`] if the page is mapped; use
    /// [`remap_page`](Self::remap_page) to replace a mapping.
    pub fn map_page(
        &mut self,
        page: PageNumber,
        frame: FrameNumber,
        access: PageAccess,
        page_size: PageSize,
    ) -> Result<(), MapError> {
        self.install(page, frame, access, page_size, false).map(|_| ())
    }

    /// Maps `page` to `frame`, replacing any mapping of the same size.
    ///
    /// Returns the replaced mapping. The stale translation is flushed.
    pub fn remap_page(
        &mut self,
        page: PageNumber,
        frame: FrameNumber,
        access: PageAccess,
        page_size: PageSize,
    ) -> Result<Option<Mapping>, MapError> {
        self.install(page, frame, access, page_size, true)
    }

    fn install(
        &mut self,
        page: PageNumber,
        frame: FrameNumber,
        access: PageAccess,
        page_size: PageSize,
        replace: bool,
    ) -> Result<Option<Mapping>, MapError> {
        check_target(page, Some(frame), page_size)?;

        #[cfg(feature = "detailed-logging")]
        log::trace!(
            "map {} -> {} ({}, {:?}, replace: {})",
            page,
            frame,
            page_size,
            access,
            replace
        );

        if page.slot() == KERNEL_SLOT {
            return self.kernel.map_shared(page, frame, access, page_size, replace);
        }
        self.kernel.walker().map(self.root, page, frame, access, page_size, replace)
    }

    /// Removes the mapping of `page`.
    ///
    /// Returns `Ok(None)` if the page was not mapped. Page tables and page directories left
    /// empty are released, except in the kernel slot.
    pub fn unmap_page(&mut self, page: PageNumber) -> Result<Option<Mapping>, MapError> {
        check_target(page, None, PageSize::Small)?;

        #[cfg(feature = "detailed-logging")]
        log::trace!("unmap {}", page);

        if page.slot() == KERNEL_SLOT {
            return self.kernel.unmap_shared(page);
        }
        self.kernel.walker().unmap(self.root, page)
    }

    /// Maps `count` consecutive small pages to consecutive frames.
    ///
    /// Either every page is mapped or, on failure, the pages mapped by this call are unmapped
    /// again before the error is returned.
    pub fn map_range(
        &mut self,
        first_page: PageNumber,
        first_frame: FrameNumber,
        count: usize,
        access: PageAccess,
    ) -> Result<(), MapError> {
        for offset in 0..count {
            let page = first_page + offset;
            let mapped = self.map_page(page, first_frame + offset, access, PageSize::Small);
            if let Err(error) = mapped {
                for undo in first_page..page {
                    self.unmap_page(undo).ok();
                }
                return Err(error);
            }
        }
        Ok(())
    }

    /// Unmaps `count` consecutive small pages, returning how many mappings were removed.
    ///
    /// The whole range is checked first: a reserved page, or a page of a large mapping that
    /// starts before the range, rejects the call with nothing unmapped.
    pub fn unmap_range(
        &mut self,
        first_page: PageNumber,
        count: usize,
    ) -> Result<usize, MapError> {
        let pages = first_page..first_page + count;
        for page in pages.clone() {
            check_target(page, None, PageSize::Small)?;
            let large_start = page - page.as_usize() % PageSize::Large.pages();
            let in_large = self
                .translate(page)
                .mapping()
                .is_some_and(|mapping| mapping.page_size == PageSize::Large);
            if in_large && large_start < first_page {
                return Err(MapError::MisalignedOrReservedAddress);
            }
        }

        let mut unmapped = 0;
        for page in pages {
            if self.unmap_page(page)?.is_some() {
                unmapped += 1;
            }
        }
        Ok(unmapped)
    }

    /// Looks up `page`.
    pub fn translate(&self, page: PageNumber) -> Translation {
        if page.slot() == KERNEL_SLOT {
            return self.kernel.translate(page);
        }
        self.kernel.walker().translate(self.root, page)
    }

    /// Resolves a virtual address to the physical address it maps to.
    pub fn translate_address(&self, address: VirtualAddress) -> Option<PhysicalAddress> {
        let mapping = self.translate(address.page_number()).mapping()?;
        Some(mapping.frame.start() + address.page_offset())
    }

    /// Returns whether accessing `address` would succeed.
    pub fn check_address_valid(&self, address: VirtualAddress) -> bool {
        self.translate(address.page_number()).is_mapped()
    }

    /// Frees the page directory in `slot` and every page table below it.
    ///
    /// Only the page-table frames are released. Translations are not flushed, so this is meant
    /// for an address space that is not active.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is the shared kernel slot or out of range.
    pub fn free_page_directory(&mut self, slot: usize) {
        assert_ne!(slot, KERNEL_SLOT, "the shared kernel directory cannot be freed");
        assert!(
            slot < PAGE_DIRECTORY_POINTER_TABLE_ENTRIES,
            "page directory slot {slot} out of range"
        );
        self.kernel.walker().free_directory(self.root, slot);
    }
}

impl<A: FrameAllocator> Drop for AddressSpace<'_, A> {
    fn drop(&mut self) {
        let walker = self.kernel.walker();
        for slot in (0..PAGE_DIRECTORY_POINTER_TABLE_ENTRIES).filter(|&slot| slot != KERNEL_SLOT) {
            walker.free_directory(self.root, slot);
        }
        walker.set_root_entry(self.root, KERNEL_SLOT, PageEntry::empty());
        walker.release_table(self.root);
        log::debug!("address space with root {} destroyed", self.root.start());
    }
}
