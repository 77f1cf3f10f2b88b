//! Software emulation for testing and development.
//!
//! Physical memory is a page-aligned host buffer, and the identity window points at it.
//! Loading a translation root and flushing the TLB only record what happened, per thread, so
//! tests can observe them.

use core::{cell::Cell, ptr::NonNull};
use std::alloc::{Layout, alloc_zeroed, dealloc};

use crate::{
    FrameNumber, IdentityWindow, PhysicalAddress, VirtualAddress, layout::PAGE_SIZE,
};

std::thread_local! {
    static TLB_FLUSHES: Cell<usize> = const { Cell::new(0) };
    static ACTIVE_ROOT: Cell<Option<PhysicalAddress>> = const { Cell::new(None) };
}

/// Records the invalidation of the translation for `address`.
pub fn flush_page(address: VirtualAddress) {
    #[cfg(feature = "detailed-logging")]
    log::trace!("tlb flush {}", address);
    let _ = address;
    TLB_FLUSHES.with(|count| count.set(count.get() + 1));
}

/// Returns how many single-page invalidations this thread has performed.
pub fn tlb_flush_count() -> usize {
    TLB_FLUSHES.with(Cell::get)
}

/// Records `root` as the active translation root for this thread.
///
/// # Safety
///
/// Never unsafe under emulation; the signature matches the hardware implementation.
pub unsafe fn load_root(root: PhysicalAddress) {
    ACTIVE_ROOT.with(|active| active.set(Some(root)));
}

/// Returns the translation root most recently loaded on this thread.
pub fn active_root() -> Option<PhysicalAddress> {
    ACTIVE_ROOT.with(Cell::get)
}

/// Emulated physical memory.
///
/// A zeroed, page-aligned host allocation standing in for RAM. Frame `n` lives at byte offset
/// `n * PAGE_SIZE`.
pub struct EmulatedMemory {
    base: NonNull<u8>,
    frames: usize,
}

impl EmulatedMemory {
    /// Creates `frames` frames of zeroed emulated memory.
    ///
    /// # Panics
    ///
    /// Panics if `frames` is zero or the host allocation fails.
    pub fn new(frames: usize) -> Self {
        assert!(frames > 0, "emulated memory needs at least one frame");
        let layout = Self::layout(frames);
        // SAFETY: The layout has a non-zero size.
        let base = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(base).expect("out of host memory for emulated frames");
        Self { base, frames }
    }

    /// Returns an identity window onto this memory.
    ///
    /// The window must not be used after the memory is dropped.
    pub fn window(&self) -> IdentityWindow {
        // SAFETY: The buffer is page-aligned and covers every frame below `frame_count`.
        unsafe { IdentityWindow::with_base(self.base.as_ptr() as usize, self.frames) }
    }

    /// Returns the number of emulated frames.
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// Returns the first frame past the end of emulated memory.
    pub fn end(&self) -> FrameNumber {
        FrameNumber::new(self.frames)
    }

    fn layout(frames: usize) -> Layout {
        Layout::from_size_align(frames * PAGE_SIZE, PAGE_SIZE)
            .expect("emulated memory size overflows")
    }
}

impl Drop for EmulatedMemory {
    fn drop(&mut self) {
        // SAFETY: `base` was allocated in `new` with exactly this layout.
        unsafe { dealloc(self.base.as_ptr(), Self::layout(self.frames)) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::PageSize;

    #[test]
    fn window_covers_every_frame() {
        let memory = EmulatedMemory::new(3);
        let window = memory.window();
        let last = window.identity_address(FrameNumber::new(2), PageSize::Small);
        assert_eq!(last - window.base(), 2 * PAGE_SIZE);
        assert_eq!(window.base() % PAGE_SIZE, 0);
    }

    #[test]
    fn memory_starts_zeroed() {
        let memory = EmulatedMemory::new(2);
        let ptr = memory.window().frame_ptr::<u64>(FrameNumber::new(1));
        // SAFETY: Frame 1 is inside the emulated buffer.
        assert_eq!(unsafe { ptr.read() }, 0);
    }

    #[test]
    fn flushes_are_counted() {
        let before = tlb_flush_count();
        flush_page(VirtualAddress::new(0x1000));
        assert_eq!(tlb_flush_count(), before + 1);
    }
}
