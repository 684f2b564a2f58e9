//! # CtxOS Demo Firmware
//!
//! Runs on the mbed LPC1768. Three DIP switches pick one of eight demo
//! functions; flipping them at runtime ends the running function and
//! starts the newly selected one.
//!
//! | Mode | Context | Behavior |
//! |------|---------|----------|
//! | 0–6 | `Bouncer` | Bounces a light across the on-board LEDs |
//! | 7 | `Kill` | Fails its `enter` with code 0xff, taking the pipeline down |
//!
//! ## Control Flow
//!
//! 1. `ModeSelect` is spawned as the root context and the loop is started.
//! 2. Every loop call it shows the selected mode on the LEDs and spawns the
//!    matching function on top of itself.
//! 3. The SysTick exception (1 kHz) polls the switches. Once they leave the
//!    running mode it calls `terminate()`, and `ModeSelect` is back on top.
//! 4. Any fatal fault ends in `board::die`, which bounces the LEDs forever.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use cortex_m_rt::{entry, exception};
    #[cfg(feature = "defmt")]
    use defmt_rtt as _;
    use panic_halt as _;

    use ctxos::arch::cortex_m3;
    use ctxos::board::{self, Dips, Leds};
    use ctxos::config::{ARENA_SIZE, BOUNCE_PERIOD_TICKS, MODE_COUNT};
    use ctxos::modes::{Bouncer, Indicator, Kill, ModeSelect, Spawner};
    use ctxos::{ErrorCode, Fault, Scheduler, TaskRef};

    static SCHEDULER: Scheduler<ARENA_SIZE> = Scheduler::with_fatal_handler(board::die);

    const KILL_CODE: ErrorCode = match ErrorCode::from_status(0xff) {
        Some(code) => code,
        None => panic!("kill code must be non-zero"),
    };

    // -----------------------------------------------------------------------
    // Demo functions
    // -----------------------------------------------------------------------

    fn bouncer(parent: TaskRef) -> Option<TaskRef> {
        SCHEDULER.spawn(Some(parent), || Bouncer::new(Leds::steal(), BOUNCE_PERIOD_TICKS))
    }

    fn kill(parent: TaskRef) -> Option<TaskRef> {
        SCHEDULER.spawn(Some(parent), || Kill::new(KILL_CODE))
    }

    static SPAWNERS: [Spawner; MODE_COUNT] = [
        bouncer, bouncer, bouncer, bouncer, bouncer, bouncer, bouncer, kill,
    ];

    // -----------------------------------------------------------------------
    // Entry point
    // -----------------------------------------------------------------------

    /// Firmware entry point. Starts the context loop and never returns.
    #[entry]
    fn main() -> ! {
        // SAFETY: the entry point runs once and nothing else owns the core
        // peripherals.
        let mut cp = unsafe { cortex_m::Peripherals::steal() };

        let mut leds = Leds::init();
        leds.show(0b0100);

        SCHEDULER.spawn(None, || ModeSelect::new(Dips::new(), leds, &SPAWNERS));

        cortex_m3::set_interrupt_priorities();
        cortex_m3::configure_systick(&mut cp.SYST);

        SCHEDULER.start();

        // ModeSelect never terminates itself.
        board::die(Fault::Drained)
    }

    /// Switch poll at `TICK_HZ`.
    #[exception]
    fn SysTick() {
        if board::switch_changed() {
            SCHEDULER.terminate();
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
