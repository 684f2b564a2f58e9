//! # CtxOS Configuration
//!
//! Compile-time constants governing the context arena and the demo
//! firmware. All limits are fixed at compile time; there is no
//! dynamic allocation.

/// Size in bytes of the static arena backing every live context and its
/// control block. The LPC1768 has 32 KiB of local SRAM; 2 KiB of it is
/// reserved for the context stack.
pub const ARENA_SIZE: usize = 2 << 10;

/// Strictest alignment any context type may require. Every carve-out is
/// rounded up to a multiple of this so that the block following it is
/// aligned regardless of the size of the context before it.
///
/// Matches `max_align_t` on ARMv7-M (8 bytes, `u64`/`f64`).
pub const MAX_ALIGN: usize = 8;

/// System clock frequency in Hz (LPC1768 PLL0 at 96 MHz).
pub const SYSTEM_CLOCK_HZ: u32 = 96_000_000;

/// SysTick frequency in Hz. The SysTick handler samples the mode
/// switches at this rate.
pub const TICK_HZ: u32 = 1000;

/// Number of DIP switches selecting the demo function.
pub const DIP_COUNT: usize = 3;

/// Number of selectable demo functions (one per DIP combination).
pub const MODE_COUNT: usize = 1 << DIP_COUNT;

/// Number of on-board LEDs used as the status indicator.
pub const ONBOARD_LED_COUNT: usize = 4;

/// Loop calls between two frames of the idle bounce animation.
pub const BOUNCE_PERIOD_TICKS: u32 = 2000;

/// Delay between two frames of the fatal-error animation, in milliseconds.
pub const DIE_FRAME_MS: u32 = 25;
