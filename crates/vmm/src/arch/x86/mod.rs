//! Hardware implementation for 32-bit x86 with PAE enabled.
//!
//! CR3 holds the physical address of the page-directory-pointer table. Single translations
//! are dropped with `invlpg`.

use core::arch::asm;

use crate::{PhysicalAddress, VirtualAddress};

/// The interrupt-enable bit of EFLAGS.
const INTERRUPT_FLAG: usize = 1 << 9;

/// Drops any cached translation for the page containing `address` on this CPU.
#[inline]
pub fn flush_page(address: VirtualAddress) {
    // SAFETY: `invlpg` only discards a cached translation.
    unsafe {
        asm!("invlpg [{}]", in(reg) address.as_usize(), options(nostack, preserves_flags));
    }
}

/// Makes the hierarchy rooted at `root` the active translation.
///
/// Interrupts are disabled while CR3 is written and restored to their previous state after.
///
/// # Safety
///
/// The hierarchy must map all code and data the kernel touches after the switch, including
/// the identity window, and must not be edited concurrently.
pub unsafe fn load_root(root: PhysicalAddress) {
    debug_assert!(root.is_aligned(32), "page-directory-pointer table misaligned");

    let eflags: usize;
    // SAFETY: Saving EFLAGS and masking interrupts has no other effect.
    unsafe { asm!("pushfd", "pop {}", "cli", out(reg) eflags) };

    // SAFETY: The caller guarantees the hierarchy is complete and stable.
    unsafe {
        asm!("mov cr3, {}", in(reg) root.as_usize(), options(nostack, preserves_flags));
    }

    if eflags & INTERRUPT_FLAG != 0 {
        // SAFETY: Interrupts were enabled on entry.
        unsafe { asm!("sti", options(nostack)) };
    }
}
