//! Frame allocation for paging structures.
//!
//! The page-table code only ever asks for single frames, and only for its own directories and
//! tables. [`FrameAllocator`] is that narrow interface; [`FreeListAllocator`] is a simple
//! implementation suitable for early boot and for emulation.

use core::fmt;

use crate::{FrameNumber, IdentityWindow};

/// Errors that can occur while acquiring a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No free frame is available.
    OutOfMemory,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("out of physical frames"),
        }
    }
}

/// A source of physical frames.
///
/// Implementations are shared between every address space and must serialize their own
/// bookkeeping, so both operations take `&self`.
pub trait FrameAllocator {
    /// Takes one free frame out of the pool.
    fn acquire_frame(&self) -> Result<FrameNumber, AllocError>;

    /// Returns a frame previously handed out by [`acquire_frame`](Self::acquire_frame).
    fn release_frame(&self, frame: FrameNumber);
}

impl<A: FrameAllocator + ?Sized> FrameAllocator for &A {
    fn acquire_frame(&self) -> Result<FrameNumber, AllocError> {
        (**self).acquire_frame()
    }

    fn release_frame(&self, frame: FrameNumber) {
        (**self).release_frame(frame)
    }
}

/// Marks the end of the free list.
const NO_FRAME: usize = usize::MAX;

/// Header written into the first bytes of every free frame.
#[repr(C)]
struct FreeFrame {
    next: usize,
}

struct FreeList {
    head: usize,
    free: usize,
    total: usize,
}

/// A LIFO list of free frames threaded through the frames themselves.
///
/// Each free frame stores the number of the next free frame, written through the identity
/// window. The list is protected by a spin lock so it can be shared by every address space.
pub struct FreeListAllocator {
    window: IdentityWindow,
    list: spin::Mutex<FreeList>,
}

impl FreeListAllocator {
    /// Creates an allocator with no frames in it.
    pub const fn new(window: IdentityWindow) -> Self {
        Self {
            window,
            list: spin::Mutex::new(FreeList {
                head: NO_FRAME,
                free: 0,
                total: 0,
            }),
        }
    }

    /// Adds `count` frames starting at `first` to the pool.
    ///
    /// Frames are handed out again in ascending order.
    ///
    /// # Panics
    ///
    /// Panics if any frame of the range lies outside the identity window.
    ///
    /// # Safety
    ///
    /// The frames must be unused RAM reachable through the allocator's identity window, and
    /// must not already be in the pool.
    pub unsafe fn add_range(&self, first: FrameNumber, count: usize) {
        assert!(
            first.as_usize() + count <= self.window.frames(),
            "frames {first}..{} not reachable through the identity window",
            first + count
        );
        let mut list = self.list.lock();
        for frame in (first..first + count).rev() {
            // SAFETY: The caller guarantees the frame is unused and reachable.
            unsafe { self.push(&mut list, frame) };
        }
        list.total += count;
        log::debug!("frame allocator: added {} frames at {}, {} free", count, first, list.free);
    }

    /// Returns the number of frames currently free.
    pub fn free_frames(&self) -> usize {
        self.list.lock().free
    }

    /// Returns the number of frames ever added to the pool.
    pub fn total_frames(&self) -> usize {
        self.list.lock().total
    }

    unsafe fn push(&self, list: &mut FreeList, frame: FrameNumber) {
        assert_ne!(list.head, frame.as_usize(), "frame {frame} released twice");
        let node = self.window.frame_ptr::<FreeFrame>(frame);
        // SAFETY: The frame is free, so nothing else references its contents.
        unsafe { node.write(FreeFrame { next: list.head }) };
        list.head = frame.as_usize();
        list.free += 1;
    }
}

impl FrameAllocator for FreeListAllocator {
    fn acquire_frame(&self) -> Result<FrameNumber, AllocError> {
        let mut list = self.list.lock();
        if list.head == NO_FRAME {
            return Err(AllocError::OutOfMemory);
        }

        let frame = FrameNumber::new(list.head);
        let node = self.window.frame_ptr::<FreeFrame>(frame);
        // SAFETY: Every frame on the list was written by `push` and is still unused.
        list.head = unsafe { node.read().next };
        list.free -= 1;
        Ok(frame)
    }

    fn release_frame(&self, frame: FrameNumber) {
        let mut list = self.list.lock();
        // SAFETY: Only frames obtained from `acquire_frame` are released, and their owner has
        // stopped using them.
        unsafe { self.push(&mut list, frame) };
    }
}
