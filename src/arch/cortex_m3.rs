//! # Cortex-M3 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M3 (Thumb-2) processor:
//! SysTick configuration, exception priorities and a busy-wait delay.
//!
//! The scheduler itself needs no context switching support. Contexts are
//! plain objects called from the main loop, so the only exception in play is
//! SysTick, which polls the mode switches and may request a `terminate`.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: Priority 0xFF (lowest). It only ever requests stack changes,
//!   and the main loop masks it out while applying them.

use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer to fire at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set SysTick to the lowest exception priority.
///
/// The LPC1768 implements 5 priority bits, so 0xFF reads back as 0xF8.
pub fn set_interrupt_priorities() {
    // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
    // Bits [31:24] = SysTick priority
    const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
    unsafe {
        let val = core::ptr::read_volatile(SHPR3);
        core::ptr::write_volatile(SHPR3, val | (0xFF << 24));
    }
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// Busy-wait for roughly `ms` milliseconds at `SYSTEM_CLOCK_HZ`.
///
/// Only used once the scheduler is gone, where no timer is left to trust.
#[inline]
pub fn delay_ms(ms: u32) {
    const CYCLES_PER_MS: u32 = SYSTEM_CLOCK_HZ / 1000;
    for _ in 0..ms {
        cortex_m::asm::delay(CYCLES_PER_MS);
    }
}
