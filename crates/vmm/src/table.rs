//! Paging-structure layouts.
//!
//! Page directories and page tables share one layout, [`PageTable`], which fills exactly one
//! frame. The root [`PageDirectoryPointerTable`] carries its hardware alignment requirement in
//! its type.

use crate::{
    entry::PageEntry,
    layout::{PAGE_DIRECTORY_POINTER_TABLE_ENTRIES, PAGE_SIZE, PAGE_TABLE_ENTRIES},
};

/// A page directory or page table: 512 entries filling one 4 KiB frame.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntry; PAGE_TABLE_ENTRIES],
}

/// The root of a PAE hierarchy: four entries, aligned to their own size.
///
/// The paging-root register takes the table's physical address directly, which requires
/// 32-byte alignment.
#[repr(C, align(32))]
pub struct PageDirectoryPointerTable {
    entries: [PageEntry; PAGE_DIRECTORY_POINTER_TABLE_ENTRIES],
}

const _: () = assert!(core::mem::size_of::<PageTable>() == PAGE_SIZE);
const _: () = assert!(core::mem::size_of::<PageDirectoryPointerTable>() == 32);
const _: () = assert!(core::mem::align_of::<PageDirectoryPointerTable>() == 32);

/// Generates the entry accessors shared by both table layouts.
macro_rules! impl_table_common {
    ($name:ident, $len:expr) => {
        impl $name {
            /// Returns a table with every entry absent.
            pub const fn new() -> Self {
                Self {
                    entries: [PageEntry::empty(); $len],
                }
            }

            /// Returns the entry at `index`.
            ///
            /// # Panics
            ///
            /// Panics if `index` is out of bounds.
            #[inline]
            pub fn entry(&self, index: usize) -> PageEntry {
                self.entries[index]
            }

            /// Returns a mutable reference to the entry at `index`.
            ///
            /// # Panics
            ///
            /// Panics if `index` is out of bounds.
            #[inline]
            pub fn entry_mut(&mut self, index: usize) -> &mut PageEntry {
                &mut self.entries[index]
            }

            /// Returns whether no entry in this table is present.
            pub fn is_empty(&self) -> bool {
                self.entries.iter().all(|entry| !entry.is_present())
            }

            /// Returns the number of present entries.
            pub fn present_count(&self) -> usize {
                self.entries.iter().filter(|entry| entry.is_present()).count()
            }

            /// Returns the number of entries in this table.
            pub const fn len(&self) -> usize {
                self.entries.len()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

impl_table_common!(PageTable, PAGE_TABLE_ENTRIES);
impl_table_common!(PageDirectoryPointerTable, PAGE_DIRECTORY_POINTER_TABLE_ENTRIES);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameNumber, layout::PageAccess};

    #[test]
    fn new_tables_are_empty() {
        assert!(PageTable::new().is_empty());
        assert!(PageDirectoryPointerTable::new().is_empty());
        assert_eq!(PageDirectoryPointerTable::new().len(), 4);
    }

    #[test]
    fn present_count_tracks_entries() {
        let mut table = PageTable::new();
        *table.entry_mut(0) = PageEntry::page(FrameNumber::new(1), PageAccess::KERNEL);
        *table.entry_mut(511) = PageEntry::page(FrameNumber::new(2), PageAccess::KERNEL);
        assert_eq!(table.present_count(), 2);
        assert!(!table.is_empty());

        table.entry_mut(0).clear();
        table.entry_mut(511).clear();
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic]
    fn pointer_table_has_four_slots() {
        let table = PageDirectoryPointerTable::new();
        let _ = table.entry(4);
    }
}
