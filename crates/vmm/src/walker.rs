//! The page-table walk shared by every mapping operation.
//!
//! A page number splits into three indices: the page-directory-pointer slot, the entry in that
//! slot's page directory, and the entry in the page table below it. The walker follows that
//! path through the identity window, growing the hierarchy for `map`, pruning emptied tables
//! for `unmap` and tearing whole subtrees down. Links between levels are frame numbers stored
//! in entries; no table is ever reached through a pointer held across calls.

use crate::{
    FrameAllocator, FrameNumber, IdentityWindow, MapError, PageNumber, arch,
    entry::PageEntry,
    layout::{
        PAGE_DIRECTORY_ENTRIES, PAGE_TABLE_ENTRIES, PAGES_PER_DIRECTORY, PHYSICAL_FRAMES,
        PageAccess, PageSize,
    },
    table::{PageDirectoryPointerTable, PageTable},
};

/// The index path of a page through the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableIndices {
    /// Slot in the page-directory-pointer table.
    pub pointer: usize,
    /// Entry in the page directory.
    pub directory: usize,
    /// Entry in the page table.
    pub table: usize,
}

impl TableIndices {
    /// Splits a page number into its index path.
    pub const fn of(page: PageNumber) -> Self {
        let vpn = page.as_usize();
        Self {
            pointer: vpn / PAGES_PER_DIRECTORY,
            directory: (vpn % PAGES_PER_DIRECTORY) / PAGE_TABLE_ENTRIES,
            table: vpn % PAGE_TABLE_ENTRIES,
        }
    }
}

/// A page's current mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// The frame backing the page.
    ///
    /// For a page inside a large mapping this is the large frame's base plus the page's offset
    /// within it.
    pub frame: FrameNumber,
    /// The size of the mapping the page belongs to.
    pub page_size: PageSize,
    /// The access rights of the mapping.
    pub access: PageAccess,
}

/// The result of looking up a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// The page resolves to a frame.
    Mapped(Mapping),
    /// Accessing the page would fault.
    Unmapped,
}

impl Translation {
    /// Returns whether the page resolves to a frame.
    pub fn is_mapped(self) -> bool {
        matches!(self, Self::Mapped(_))
    }

    /// Returns the mapping, if any.
    pub fn mapping(self) -> Option<Mapping> {
        match self {
            Self::Mapped(mapping) => Some(mapping),
            Self::Unmapped => None,
        }
    }

    /// Returns the frame backing the page, if any.
    pub fn frame(self) -> Option<FrameNumber> {
        self.mapping().map(|mapping| mapping.frame)
    }

    /// Returns the size in bytes of the mapping, or zero if the page is unmapped.
    pub fn size(self) -> usize {
        self.mapping().map_or(0, |mapping| mapping.page_size.bytes())
    }
}

/// Rejects targets that no mapping operation may touch.
///
/// The page must be addressable, outside the reserved region and aligned to `size`; the frame,
/// when given, must be aligned to `size` and expressible in an entry.
pub(crate) fn check_target(
    page: PageNumber,
    frame: Option<FrameNumber>,
    size: PageSize,
) -> Result<(), MapError> {
    let frame_ok =
        frame.is_none_or(|frame| frame.is_aligned(size) && frame.as_usize() < PHYSICAL_FRAMES);
    if !page.is_addressable() || page.is_reserved() || !page.is_aligned(size) || !frame_ok {
        return Err(MapError::MisalignedOrReservedAddress);
    }
    Ok(())
}

/// Walks and edits one page-table hierarchy.
///
/// Every frame named by a present entry is a table frame owned by the hierarchy being edited.
/// The caller serializes edits to that hierarchy, which makes the raw accesses below exclusive.
pub(crate) struct PageTableWalker<'a, A: FrameAllocator + ?Sized> {
    window: IdentityWindow,
    frames: &'a A,
}

impl<'a, A: FrameAllocator + ?Sized> PageTableWalker<'a, A> {
    pub(crate) fn new(window: IdentityWindow, frames: &'a A) -> Self {
        Self { window, frames }
    }

    fn table(&self, frame: FrameNumber) -> *mut PageTable {
        self.window.frame_ptr::<PageTable>(frame)
    }

    fn root(&self, frame: FrameNumber) -> *mut PageDirectoryPointerTable {
        self.window.frame_ptr::<PageDirectoryPointerTable>(frame)
    }

    pub(crate) fn entry(&self, table: FrameNumber, index: usize) -> PageEntry {
        // SAFETY: `table` is a table frame of this hierarchy and nothing else references it.
        unsafe { (*self.table(table)).entry(index) }
    }

    fn set_entry(&self, table: FrameNumber, index: usize, entry: PageEntry) {
        // SAFETY: As in `entry`.
        unsafe { *(*self.table(table)).entry_mut(index) = entry };
    }

    pub(crate) fn root_entry(&self, root: FrameNumber, slot: usize) -> PageEntry {
        // SAFETY: `root` is the root frame of this hierarchy and nothing else references it.
        unsafe { (*self.root(root)).entry(slot) }
    }

    pub(crate) fn set_root_entry(&self, root: FrameNumber, slot: usize, entry: PageEntry) {
        // SAFETY: As in `root_entry`.
        unsafe { *(*self.root(root)).entry_mut(slot) = entry };
    }

    pub(crate) fn present_count(&self, table: FrameNumber) -> usize {
        // SAFETY: As in `entry`.
        unsafe { (*self.table(table)).present_count() }
    }

    /// Acquires a frame and clears it, ready to be linked as an empty table.
    pub(crate) fn create_table(&self) -> Result<FrameNumber, MapError> {
        let frame = self
            .frames
            .acquire_frame()
            .inspect_err(|error| log::error!("cannot grow page tables: {}", error))?;
        // SAFETY: A freshly acquired frame is referenced by nobody.
        unsafe { self.window.zero_frame(frame) };
        log::trace!("page table created in frame {}", frame);
        Ok(frame)
    }

    /// Returns an unlinked table frame to the allocator.
    ///
    /// # Panics
    ///
    /// Panics if the table still holds a present entry; continuing would leave dangling
    /// mappings into a reused frame.
    pub(crate) fn release_table(&self, frame: FrameNumber) {
        let remaining = self.present_count(frame);
        assert!(
            remaining == 0,
            "page table in frame {frame} released with {remaining} present entries"
        );
        self.frames.release_frame(frame);
        log::trace!("page table in frame {} released", frame);
    }

    /// Looks up `page` in the hierarchy rooted at `root`.
    pub(crate) fn translate(&self, root: FrameNumber, page: PageNumber) -> Translation {
        if !page.is_addressable() {
            return Translation::Unmapped;
        }
        match self.root_entry(root, TableIndices::of(page).pointer).frame() {
            Some(directory) => self.translate_in_directory(directory, page),
            None => Translation::Unmapped,
        }
    }

    /// Looks up `page` below a known page directory.
    pub(crate) fn translate_in_directory(
        &self,
        directory: FrameNumber,
        page: PageNumber,
    ) -> Translation {
        let indices = TableIndices::of(page);
        let entry = self.entry(directory, indices.directory);
        let Some(target) = entry.frame() else {
            return Translation::Unmapped;
        };

        if entry.is_large() {
            return Translation::Mapped(Mapping {
                frame: target + indices.table,
                page_size: PageSize::Large,
                access: entry.access(),
            });
        }

        let leaf = self.entry(target, indices.table);
        match leaf.frame() {
            Some(frame) => Translation::Mapped(Mapping {
                frame,
                page_size: PageSize::Small,
                access: leaf.access(),
            }),
            None => Translation::Unmapped,
        }
    }

    /// Maps `page` in the hierarchy rooted at `root`, creating its page directory if needed.
    ///
    /// A directory created by this call is unlinked and released again if the mapping fails,
    /// so a failed call leaves the hierarchy untouched.
    pub(crate) fn map(
        &self,
        root: FrameNumber,
        page: PageNumber,
        frame: FrameNumber,
        access: PageAccess,
        size: PageSize,
        replace: bool,
    ) -> Result<Option<Mapping>, MapError> {
        let slot = TableIndices::of(page).pointer;
        let (directory, created) = match self.root_entry(root, slot).frame() {
            Some(directory) => (directory, false),
            None => {
                let directory = self.create_table()?;
                self.set_root_entry(root, slot, PageEntry::directory(directory));
                (directory, true)
            }
        };

        let result = self.map_in_directory(directory, page, frame, access, size, replace);
        if result.is_err() && created {
            self.set_root_entry(root, slot, PageEntry::empty());
            self.release_table(directory);
        }
        result
    }

    /// Maps `page` below a known page directory, creating its page table if needed.
    ///
    /// Returns the replaced mapping when `replace` is set and the page was mapped.
    pub(crate) fn map_in_directory(
        &self,
        directory: FrameNumber,
        page: PageNumber,
        frame: FrameNumber,
        access: PageAccess,
        size: PageSize,
        replace: bool,
    ) -> Result<Option<Mapping>, MapError> {
        let indices = TableIndices::of(page);
        let entry = self.entry(directory, indices.directory);

        let previous = match size {
            PageSize::Large => {
                if entry.is_present() && !entry.is_large() {
                    return Err(MapError::PageSizeConflict);
                }
                let previous = existing(entry, PageSize::Large, replace)?;
                self.set_entry(
                    directory,
                    indices.directory,
                    PageEntry::large_page(frame, access),
                );
                previous
            }
            PageSize::Small => {
                if entry.is_large() {
                    return Err(MapError::PageSizeConflict);
                }
                let table = match entry.frame() {
                    Some(table) => table,
                    None => {
                        let table = self.create_table()?;
                        self.set_entry(directory, indices.directory, PageEntry::table(table));
                        table
                    }
                };
                let leaf = self.entry(table, indices.table);
                let previous = existing(leaf, PageSize::Small, replace)?;
                self.set_entry(table, indices.table, PageEntry::page(frame, access));
                previous
            }
        };

        if previous.is_some() {
            arch::flush_page(page.start());
        }
        Ok(previous)
    }

    /// Unmaps `page` in the hierarchy rooted at `root`, pruning tables that become empty.
    pub(crate) fn unmap(
        &self,
        root: FrameNumber,
        page: PageNumber,
    ) -> Result<Option<Mapping>, MapError> {
        let slot = TableIndices::of(page).pointer;
        let Some(directory) = self.root_entry(root, slot).frame() else {
            return Ok(None);
        };

        let removed = self.unmap_in_directory(directory, page, true)?;
        if removed.is_some() && self.present_count(directory) == 0 {
            self.set_root_entry(root, slot, PageEntry::empty());
            self.release_table(directory);
        }
        Ok(removed)
    }

    /// Unmaps `page` below a known page directory.
    ///
    /// With `prune` set, a page table left empty is unlinked and released. Unmapping a page
    /// inside a large mapping requires the large mapping's first page.
    pub(crate) fn unmap_in_directory(
        &self,
        directory: FrameNumber,
        page: PageNumber,
        prune: bool,
    ) -> Result<Option<Mapping>, MapError> {
        let indices = TableIndices::of(page);
        let entry = self.entry(directory, indices.directory);
        let Some(target) = entry.frame() else {
            return Ok(None);
        };

        if entry.is_large() {
            if !page.is_aligned(PageSize::Large) {
                return Err(MapError::MisalignedOrReservedAddress);
            }
            self.set_entry(directory, indices.directory, PageEntry::empty());
            arch::flush_page(page.start());
            return Ok(Some(Mapping {
                frame: target,
                page_size: PageSize::Large,
                access: entry.access(),
            }));
        }

        let leaf = self.entry(target, indices.table);
        let Some(frame) = leaf.frame() else {
            return Ok(None);
        };
        self.set_entry(target, indices.table, PageEntry::empty());
        arch::flush_page(page.start());

        if prune && self.present_count(target) == 0 {
            self.set_entry(directory, indices.directory, PageEntry::empty());
            self.release_table(target);
        }

        Ok(Some(Mapping {
            frame,
            page_size: PageSize::Small,
            access: leaf.access(),
        }))
    }

    /// Frees the page directory in `slot` and every page table below it.
    ///
    /// Entries are cleared before the frames they name are released; data frames are left to
    /// their owners. Translations are not invalidated, so the hierarchy must not be active.
    pub(crate) fn free_directory(&self, root: FrameNumber, slot: usize) {
        let Some(directory) = self.root_entry(root, slot).frame() else {
            return;
        };

        let mut tables = 0;
        for index in 0..PAGE_DIRECTORY_ENTRIES {
            let entry = self.entry(directory, index);
            let Some(target) = entry.frame() else {
                continue;
            };
            self.set_entry(directory, index, PageEntry::empty());
            if !entry.is_large() {
                for leaf in 0..PAGE_TABLE_ENTRIES {
                    self.set_entry(target, leaf, PageEntry::empty());
                }
                self.release_table(target);
                tables += 1;
            }
        }

        self.set_root_entry(root, slot, PageEntry::empty());
        self.release_table(directory);
        log::trace!("freed directory in slot {} with {} page tables", slot, tables);
    }
}

/// Reports what a present target entry holds, or refuses to overwrite it.
fn existing(entry: PageEntry, size: PageSize, replace: bool) -> Result<Option<Mapping>, MapError> {
    match entry.frame() {
        None => Ok(None),
        Some(_) if !replace => Err(MapError::AlreadyMapped),
        Some(frame) => Ok(Some(Mapping {
            frame,
            page_size: size,
            access: entry.access(),
        })),
    }
}
