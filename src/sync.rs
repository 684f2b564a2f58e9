//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstractions. All structural changes to
//! the context stack happen inside a masked section so that an interrupt
//! handler calling `spawn`/`terminate` can never observe a half-linked block.
//!
//! On the Cortex-M target the section is provided by `cortex-m`'s
//! single-core implementation (PRIMASK); host tests use the `std`
//! implementation of `critical-section`.

use core::sync::atomic::{AtomicBool, Ordering};

pub use critical_section::CriticalSection;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and restored on exit. Sections nest:
/// an inner `masked` call inside an outer one leaves interrupts disabled
/// until the outermost section ends.
///
/// # Usage
/// ```ignore
/// sync::masked(|cs| {
///     // Access shared state safely
/// });
/// ```
#[inline]
pub fn masked<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

/// Scoped marker for the duration of an `enter`/`exit` callback.
///
/// Those callbacks run inside a masked section and must not change the
/// stack structure; `spawn`/`terminate` consult the flag and refuse.
pub(crate) struct Transition<'a> {
    flag: &'a AtomicBool,
}

impl<'a> Transition<'a> {
    pub(crate) fn begin(flag: &'a AtomicBool, _cs: CriticalSection<'_>) -> Self {
        flag.store(true, Ordering::Relaxed);
        Self { flag }
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}
