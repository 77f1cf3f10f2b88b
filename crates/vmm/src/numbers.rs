//! Page and frame number types.
//!
//! Both count in units of [`PAGE_SIZE`], whatever the size of the mapping that uses them. A
//! large page is named by the number of its first small page (or frame).

use crate::{
    address::{PhysicalAddress, VirtualAddress},
    layout::{
        PAGE_SIZE, PAGES_PER_DIRECTORY, PageSize, RESERVED_END, RESERVED_START, VIRTUAL_PAGES,
    },
};
use core::{
    fmt,
    iter::Step,
    ops::{Add, Sub},
};

/// Generates the structure and arithmetic shared by page and frame numbers.
macro_rules! impl_page_number_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new page/frame number.
            #[inline]
            pub const fn new(number: usize) -> Self {
                Self(number)
            }

            /// Returns the raw page/frame number.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Returns whether this number starts a page of the given size.
            #[inline]
            pub const fn is_aligned(self, size: PageSize) -> bool {
                self.0 % size.pages() == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self(self.0 - rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }

        impl Step for $name {
            fn steps_between(start: &Self, end: &Self) -> (usize, Option<usize>) {
                if start <= end {
                    let diff = end.0 - start.0;
                    (diff, Some(diff))
                } else {
                    (0, None)
                }
            }

            fn forward_checked(start: Self, count: usize) -> Option<Self> {
                start.0.checked_add(count).map(Self)
            }

            fn backward_checked(start: Self, count: usize) -> Option<Self> {
                start.0.checked_sub(count).map(Self)
            }
        }
    };
}

impl_page_number_common!(
    FrameNumber,
    "A physical page number.\n\n\
     Names one 4 KiB physical frame. Frames used for page-table structures are obtained\n\
     from a [`FrameAllocator`](crate::FrameAllocator); data frames belong to the caller."
);

impl FrameNumber {
    /// Returns the physical address at the start of this frame.
    #[inline]
    pub const fn start(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 * PAGE_SIZE)
    }
}

impl From<PhysicalAddress> for FrameNumber {
    #[inline]
    fn from(addr: PhysicalAddress) -> Self {
        Self::new(addr.as_usize() / PAGE_SIZE)
    }
}

impl_page_number_common!(
    PageNumber,
    "A virtual page number.\n\n\
     Names one 4 KiB page of the 4 GiB virtual address space."
);

impl PageNumber {
    /// Returns the virtual address at the start of this page.
    #[inline]
    pub const fn start(self) -> VirtualAddress {
        VirtualAddress::new(self.0 * PAGE_SIZE)
    }

    /// Returns whether this page lies inside the virtual address space at all.
    #[inline]
    pub const fn is_addressable(self) -> bool {
        self.0 < VIRTUAL_PAGES
    }

    /// Returns whether this page lies in the region reserved for boot structures.
    #[inline]
    pub const fn is_reserved(self) -> bool {
        RESERVED_START.0 <= self.0 && self.0 < RESERVED_END.0
    }

    /// Returns the page-directory-pointer slot this page falls under.
    #[inline]
    pub const fn slot(self) -> usize {
        self.0 / PAGES_PER_DIRECTORY
    }
}

impl From<VirtualAddress> for PageNumber {
    #[inline]
    fn from(addr: VirtualAddress) -> Self {
        Self::new(addr.as_usize() / PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::KERNEL_SLOT;

    #[test]
    fn frame_start_address() {
        assert_eq!(FrameNumber::new(0x50).start().as_usize(), 0x50 * PAGE_SIZE);
    }

    #[test]
    fn frame_from_unaligned_address() {
        let addr = PhysicalAddress::new(PAGE_SIZE * 3 + 10);
        assert_eq!(FrameNumber::from(addr), FrameNumber::new(3));
    }

    #[test]
    fn page_from_virtual_address() {
        let addr = VirtualAddress::new(0x1000 * PAGE_SIZE + 0x123);
        assert_eq!(PageNumber::from(addr), PageNumber::new(0x1000));
    }

    #[test]
    fn large_alignment() {
        assert!(PageNumber::new(0x200).is_aligned(PageSize::Large));
        assert!(!PageNumber::new(0x201).is_aligned(PageSize::Large));
        assert!(PageNumber::new(0x201).is_aligned(PageSize::Small));
        assert!(!FrameNumber::new(0x50).is_aligned(PageSize::Large));
    }

    #[test]
    fn reserved_region_bounds() {
        assert!(!(RESERVED_START - 1).is_reserved());
        assert!(RESERVED_START.is_reserved());
        assert!((RESERVED_END - 1).is_reserved());
        assert!(!RESERVED_END.is_reserved());
    }

    #[test]
    fn slots() {
        assert_eq!(PageNumber::new(0x1000).slot(), 0);
        assert_eq!(RESERVED_START.slot(), 2);
        assert_eq!(RESERVED_END.slot(), KERNEL_SLOT);
        assert!(!PageNumber::new(VIRTUAL_PAGES).is_addressable());
    }

    #[test]
    fn step_over_range() {
        let pages: Vec<_> = (PageNumber::new(4)..PageNumber::new(7)).collect();
        assert_eq!(
            pages,
            [PageNumber::new(4), PageNumber::new(5), PageNumber::new(6)]
        );
    }

    #[test]
    fn arithmetic() {
        let page = PageNumber::new(10);
        assert_eq!(page + 5, PageNumber::new(15));
        assert_eq!(page - 3, PageNumber::new(7));
        assert_eq!(page - PageNumber::new(3), 7);
    }
}
