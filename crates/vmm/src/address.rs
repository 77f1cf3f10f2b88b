//! Address types and the identity window.
//!
//! [`PhysicalAddress`] and [`VirtualAddress`] are thin wrappers that validate their range on
//! construction. [`IdentityWindow`] is the fixed translation the kernel uses to reach the
//! bytes of any physical frame, and the only way table-editing code touches table memory.

use core::fmt;
use core::ops::{Add, Sub};

use crate::{
    FrameNumber, PageNumber,
    layout::{
        IDENTITY_WINDOW_BASE, IDENTITY_WINDOW_FRAMES, MAX_PHYSICAL_BITS, MAX_VIRTUAL_BITS,
        PAGE_SIZE, PageSize,
    },
};

/// Generates the structure and methods shared by physical and virtual addresses.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Returns the raw address value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Checks if the address is aligned to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                self.0 & (align - 1) == 0
            }

            /// Aligns the address down to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn align_down(self, align: usize) -> Self {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                Self(self.0 & !(align - 1))
            }

            /// Returns the offset of this address within its 4 KiB page or frame.
            #[inline]
            pub const fn page_offset(self) -> usize {
                self.0 & (PAGE_SIZE - 1)
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

        impl From<usize> for $name {
            #[inline]
            fn from(addr: usize) -> Self {
                Self::new(addr)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self::new(self.0 + rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    "A physical memory address.\n\n\
     Limited to the physical address width PAE entries can express."
);

impl PhysicalAddress {
    /// Creates a new physical address.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the maximum physical address width.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            (addr as u64) < (1u64 << MAX_PHYSICAL_BITS),
            "physical address exceeds maximum width"
        );
        Self(addr)
    }

    /// Returns the frame containing this address.
    #[inline]
    pub fn frame_number(self) -> FrameNumber {
        FrameNumber::from(self)
    }
}

impl_address_common!(
    VirtualAddress,
    "A virtual memory address within the 4 GiB address space of a PAE page-table hierarchy."
);

impl VirtualAddress {
    /// Creates a new virtual address.
    ///
    /// # Panics
    ///
    /// Panics if the address does not fit in the 32-bit virtual address space.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            (addr as u64) < (1u64 << MAX_VIRTUAL_BITS),
            "virtual address exceeds maximum width"
        );
        Self(addr)
    }

    /// Returns the page containing this address.
    #[inline]
    pub fn page_number(self) -> PageNumber {
        PageNumber::from(self)
    }
}

/// The fixed offset mapping through which the kernel reaches every physical frame.
///
/// `identity_address(ppn, page_size) = base + ppn * page_size`. The mapping itself is set up
/// during early bring-up, so using the window never requires creating a mapping and editing
/// a page table through it can never fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityWindow {
    base: usize,
    frames: usize,
}

impl IdentityWindow {
    /// The window established by the boot code, starting at 3 GiB.
    pub const fn hardware() -> Self {
        Self {
            base: IDENTITY_WINDOW_BASE,
            frames: IDENTITY_WINDOW_FRAMES,
        }
    }

    /// Creates a window rooted at an arbitrary base, reaching frames `0..frames`.
    ///
    /// # Safety
    ///
    /// Every frame below `frames` must be readable and writable at `base + ppn * PAGE_SIZE`
    /// for as long as the window is in use, and `base` must be aligned to [`PAGE_SIZE`].
    pub const unsafe fn with_base(base: usize, frames: usize) -> Self {
        Self { base, frames }
    }

    /// Returns the number of frames reachable through the window.
    #[inline]
    pub const fn frames(self) -> usize {
        self.frames
    }

    /// Returns whether `frame` can be reached through the window.
    #[inline]
    pub const fn covers(self, frame: FrameNumber) -> bool {
        frame.as_usize() < self.frames
    }

    /// Returns the virtual address at which physical frame 0 is visible.
    #[inline]
    pub const fn base(self) -> usize {
        self.base
    }

    /// Returns the address at which the bytes of `ppn` can be accessed.
    ///
    /// `ppn` counts in units of `page_size`.
    #[inline]
    pub const fn identity_address(self, ppn: FrameNumber, page_size: PageSize) -> usize {
        self.base + ppn.as_usize() * page_size.bytes()
    }

    /// Returns a typed pointer to the start of a 4 KiB frame.
    ///
    /// # Panics
    ///
    /// Panics if the frame lies outside the window or its address does not satisfy the
    /// alignment of `T`.
    #[inline]
    pub fn frame_ptr<T>(self, frame: FrameNumber) -> *mut T {
        assert!(self.covers(frame), "frame {frame} outside the identity window");
        let addr = self.identity_address(frame, PageSize::Small);
        assert!(
            addr % core::mem::align_of::<T>() == 0,
            "identity address {addr:#x} misaligned for table type"
        );
        addr as *mut T
    }

    /// Fills a 4 KiB frame with zeroes.
    ///
    /// # Safety
    ///
    /// The frame must be reachable through this window and must not be referenced by anyone
    /// else while it is being cleared.
    pub unsafe fn zero_frame(self, frame: FrameNumber) {
        let ptr = self.frame_ptr::<u8>(frame);
        // SAFETY: The caller guarantees the frame is mapped by the window and unshared.
        unsafe { core::ptr::write_bytes(ptr, 0, PAGE_SIZE) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_address_limits() {
        let max = (1usize << MAX_PHYSICAL_BITS) - 1;
        assert_eq!(PhysicalAddress::new(max).as_usize(), max);
    }

    #[test]
    #[should_panic(expected = "physical address exceeds maximum width")]
    fn physical_address_too_wide() {
        PhysicalAddress::new(1usize << MAX_PHYSICAL_BITS);
    }

    #[test]
    #[should_panic(expected = "virtual address exceeds maximum width")]
    fn virtual_address_too_wide() {
        VirtualAddress::new(1usize << MAX_VIRTUAL_BITS);
    }

    #[test]
    fn alignment_and_offsets() {
        let addr = VirtualAddress::new(0x1234);
        assert!(!addr.is_aligned(PAGE_SIZE));
        assert_eq!(addr.align_down(PAGE_SIZE), VirtualAddress::new(0x1000));
        assert_eq!(addr.page_offset(), 0x234);
        assert_eq!(addr.page_number(), PageNumber::new(1));
    }

    #[test]
    fn display_and_debug() {
        let addr = PhysicalAddress::new(0x50000);
        assert_eq!(format!("{}", addr), "0x50000");
        assert_eq!(format!("{:?}", addr), "PhysicalAddress(0x50000)");
    }

    #[test]
    fn hardware_window_starts_at_three_gib() {
        let window = IdentityWindow::hardware();
        assert_eq!(
            window.identity_address(FrameNumber::new(0), PageSize::Small),
            0xC000_0000
        );
        assert_eq!(
            window.identity_address(FrameNumber::new(0x50), PageSize::Small),
            0xC005_0000
        );
    }

    #[test]
    fn large_page_numbers_scale_by_large_size() {
        let window = IdentityWindow::hardware();
        assert_eq!(
            window.identity_address(FrameNumber::new(2), PageSize::Large),
            0xC000_0000 + 2 * 2 * 1024 * 1024
        );
    }

    #[test]
    #[should_panic(expected = "misaligned for table type")]
    fn typed_access_checks_alignment() {
        // SAFETY: The pointer is never dereferenced.
        let window = unsafe { IdentityWindow::with_base(0x4, 1) };
        let _ = window.frame_ptr::<u64>(FrameNumber::new(0));
    }

    #[test]
    fn hardware_window_ends_at_four_gib() {
        let window = IdentityWindow::hardware();
        let last = FrameNumber::new(window.frames() - 1);
        assert!(window.covers(last));
        assert!(!window.covers(last + 1));
        assert_eq!(
            window.identity_address(last, PageSize::Small) + PAGE_SIZE,
            1 << MAX_VIRTUAL_BITS
        );
    }

    #[test]
    #[should_panic(expected = "outside the identity window")]
    fn frames_beyond_the_window_are_refused() {
        let _ = IdentityWindow::hardware().frame_ptr::<u64>(FrameNumber::new(0x40000));
    }
}
