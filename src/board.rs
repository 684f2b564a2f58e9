//! # LPC1768 Board Support
//!
//! The mbed LPC1768 peripherals the firmware uses, driven through the GPIO
//! fast-IO registers directly.
//!
//! | Peripheral | Pins | Notes |
//! |------------|------|-------|
//! | On-board LEDs | P1.23, P1.21, P1.20, P1.18 | bit 0 is LED4, bit 3 is LED1 |
//! | Mode DIP switches | P0.4, P0.17, P0.18 | active low, internal pull-ups, P0.4 is the MSB |
//!
//! The switch watch is polled from the SysTick exception: once
//! [`ModeInput::watch`] armed it with the running mode, any other switch
//! combination reports a change exactly once.

use core::cell::Cell;
use core::ptr;

use critical_section::Mutex;

use crate::arch::cortex_m3::delay_ms;
use crate::config::{DIE_FRAME_MS, DIP_COUNT, ONBOARD_LED_COUNT};
use crate::error::Fault;
use crate::modes::{bounce, Indicator, ModeInput};
use crate::sync::masked;

// ---------------------------------------------------------------------------
// GPIO registers
// ---------------------------------------------------------------------------

const FIO0PIN: *const u32 = 0x2009_C014 as *const u32;
const FIO1DIR: *mut u32 = 0x2009_C020 as *mut u32;
const FIO1SET: *mut u32 = 0x2009_C038 as *mut u32;
const FIO1CLR: *mut u32 = 0x2009_C03C as *mut u32;

const LED_PINS: [u32; ONBOARD_LED_COUNT] = [23, 21, 20, 18];
const DIP_PINS: [u32; DIP_COUNT] = [4, 17, 18];

// ---------------------------------------------------------------------------
// LEDs
// ---------------------------------------------------------------------------

/// The four on-board LEDs as one indicator.
pub struct Leds(());

impl Leds {
    /// Configure the LED pins as outputs and switch them all off.
    pub fn init() -> Self {
        let mask = LED_PINS.iter().fold(0u32, |mask, pin| mask | 1 << pin);
        unsafe {
            let dir = ptr::read_volatile(FIO1DIR);
            ptr::write_volatile(FIO1DIR, dir | mask);
            ptr::write_volatile(FIO1CLR, mask);
        }
        Self(())
    }

    /// Handle to LEDs already configured by [`Leds::init`].
    pub fn steal() -> Self {
        Self(())
    }
}

impl Indicator for Leds {
    fn show(&mut self, pattern: u8) {
        let (mut on, mut off) = (0, 0);
        for (bit, pin) in LED_PINS.iter().enumerate() {
            if pattern & (1 << bit) != 0 {
                on |= 1 << pin;
            } else {
                off |= 1 << pin;
            }
        }
        unsafe {
            ptr::write_volatile(FIO1CLR, off);
            ptr::write_volatile(FIO1SET, on);
        }
    }
}

// ---------------------------------------------------------------------------
// DIP switches
// ---------------------------------------------------------------------------

/// Mode the switch watch is armed with, `None` while disarmed.
static WATCH: Mutex<Cell<Option<u8>>> = Mutex::new(Cell::new(None));

/// The mode selection DIP switches.
#[derive(Default)]
pub struct Dips(());

impl Dips {
    /// The pins reset to inputs with pull-ups, so nothing to configure.
    pub fn new() -> Self {
        Self(())
    }
}

impl ModeInput for Dips {
    fn read(&mut self) -> u8 {
        read_dips()
    }

    fn watch(&mut self, selected: Option<u8>) {
        masked(|cs| WATCH.borrow(cs).set(selected));
    }
}

fn read_dips() -> u8 {
    let pins = unsafe { ptr::read_volatile(FIO0PIN) };
    DIP_PINS.iter().fold(0, |mode, pin| {
        let closed = pins & (1 << pin) == 0;
        mode << 1 | u8::from(closed)
    })
}

/// Whether the switches moved away from the watched mode.
///
/// Disarms the watch when it fires. Called from the SysTick exception.
pub fn switch_changed() -> bool {
    masked(|cs| {
        let watch = WATCH.borrow(cs);
        match watch.get() {
            Some(selected) if read_dips() != selected => {
                watch.set(None);
                true
            }
            _ => false,
        }
    })
}

// ---------------------------------------------------------------------------
// Fatal handler
// ---------------------------------------------------------------------------

/// Stop scheduling and bounce the LEDs forever.
pub fn die(fault: Fault) -> ! {
    cortex_m::interrupt::disable();
    log_error!("process terminated with code {}: {}", fault.code(), fault);

    let mut leds = Leds::steal();
    let mut frame = 0;
    loop {
        let (index, next) = bounce(frame, ONBOARD_LED_COUNT);
        leds.show(1 << index);
        frame = next;
        delay_ms(DIE_FRAME_MS);
    }
}
