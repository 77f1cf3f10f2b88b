//! Architecture hooks for activating address spaces and invalidating translations.
//!
//! The table format itself is fixed by PAE and lives outside this module. What differs
//! between targets is how the translation root is loaded and how stale TLB entries are
//! dropped: real instructions on 32-bit x86, bookkeeping under software emulation.

// NOTE: We DO include the hardware module even during tests so that rust-analyzer can see it.
#[cfg(target_arch = "x86")]
mod x86;
#[cfg(all(target_arch = "x86", not(test), not(feature = "software-emulation")))]
pub use self::x86::*;

// Use software emulation when running tests or when the feature is explicitly enabled.
#[cfg(any(test, feature = "software-emulation"))]
mod software;
#[cfg(any(test, feature = "software-emulation"))]
pub use self::software::*;

#[cfg(not(any(target_arch = "x86", test, feature = "software-emulation")))]
compile_error!("PAE paging runs on 32-bit x86; enable `software-emulation` on other targets");
