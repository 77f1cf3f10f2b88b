//! Shared fixtures for unit tests.

use std::collections::BTreeSet;

use crate::{
    AllocError, EmulatedMemory, FrameAllocator, FrameNumber, FreeListAllocator, KernelSpace,
};

/// Frames of emulated memory given to each fixture.
pub(crate) const FIXTURE_FRAMES: usize = 64;

/// Creates emulated memory for a fixture.
pub(crate) fn emulated() -> EmulatedMemory {
    EmulatedMemory::new(FIXTURE_FRAMES)
}

#[derive(Default)]
struct Tracking {
    outstanding: BTreeSet<FrameNumber>,
    acquired: usize,
    released: usize,
    budget: Option<usize>,
}

/// A free-list allocator that audits every frame it hands out.
///
/// Releasing a frame that is not outstanding panics, which catches double frees and data
/// frames released by mistake.
pub(crate) struct TrackingAllocator {
    frames: FreeListAllocator,
    state: spin::Mutex<Tracking>,
}

impl TrackingAllocator {
    pub(crate) fn new(memory: &EmulatedMemory) -> Self {
        let frames = FreeListAllocator::new(memory.window());
        // SAFETY: The emulated frames are unused and reachable through the window.
        unsafe { frames.add_range(FrameNumber::new(0), memory.frame_count()) };
        Self {
            frames,
            state: spin::Mutex::new(Tracking::default()),
        }
    }

    /// Lets `successes` more acquisitions succeed, then fails every one after.
    pub(crate) fn fail_after(&self, successes: usize) {
        self.state.lock().budget = Some(successes);
    }

    pub(crate) fn free_frames(&self) -> usize {
        self.frames.free_frames()
    }

    pub(crate) fn acquired(&self) -> usize {
        self.state.lock().acquired
    }

    pub(crate) fn released(&self) -> usize {
        self.state.lock().released
    }

    pub(crate) fn is_outstanding(&self, frame: FrameNumber) -> bool {
        self.state.lock().outstanding.contains(&frame)
    }
}

impl FrameAllocator for TrackingAllocator {
    fn acquire_frame(&self) -> Result<FrameNumber, AllocError> {
        let mut state = self.state.lock();
        if let Some(budget) = state.budget.as_mut() {
            if *budget == 0 {
                return Err(AllocError::OutOfMemory);
            }
            *budget -= 1;
        }
        let frame = self.frames.acquire_frame()?;
        state.outstanding.insert(frame);
        state.acquired += 1;
        Ok(frame)
    }

    fn release_frame(&self, frame: FrameNumber) {
        {
            let mut state = self.state.lock();
            assert!(
                state.outstanding.remove(&frame),
                "frame {frame} released but not outstanding"
            );
            state.released += 1;
        }
        self.frames.release_frame(frame);
    }
}

/// Emulated memory with a kernel space built on it.
pub(crate) struct Fixture {
    pub(crate) kernel: KernelSpace<TrackingAllocator>,
    // Dropped after the kernel space that points into it.
    _memory: EmulatedMemory,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let memory = emulated();
        let frames = TrackingAllocator::new(&memory);
        let kernel = KernelSpace::new(frames, memory.window()).expect("kernel space");
        Self {
            kernel,
            _memory: memory,
        }
    }

    pub(crate) fn frames(&self) -> &TrackingAllocator {
        self.kernel.frames()
    }
}
