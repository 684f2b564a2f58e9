//! # Demo Functions
//!
//! The functions the firmware can run, one per DIP switch combination.
//!
//! | Context | Role |
//! |---------|------|
//! | [`ModeSelect`] | Root. Reads the switches and spawns the selected function. |
//! | [`Bouncer`] | Idle function. Bounces a light across the LEDs. |
//! | [`Kill`] | Aborts the pipeline on entry with a fixed code. |
//!
//! ## Switching Modes
//!
//! ```text
//!   ModeSelect::run ──► spawners[mode](this) ──► child spawned
//!   ModeSelect::exit ─► watch(Some(mode))        switch watch armed
//!   switch interrupt ─► mode changed? ──► terminate()
//!   ModeSelect::enter ► watch(None)              back on top, disarmed
//! ```
//!
//! Hardware access goes through the [`ModeInput`] and [`Indicator`] seams so
//! the same contexts run against the LPC1768 board and host fakes.

use crate::config::{MODE_COUNT, ONBOARD_LED_COUNT};
use crate::context::{Context, Cx, TaskRef};
use crate::error::{ErrorCode, Status};

/// Source of the mode selection.
pub trait ModeInput {
    /// Current switch combination, one bit per switch.
    fn read(&mut self) -> u8;

    /// Arm (`Some(mode)`) or disarm (`None`) the switch watch. While armed,
    /// a change away from `mode` must terminate the running function.
    fn watch(&mut self, selected: Option<u8>);
}

/// Bank of on/off lights, one bit per light.
pub trait Indicator {
    fn show(&mut self, pattern: u8);
}

/// Spawns one demo function on top of `parent`.
pub type Spawner = fn(parent: TaskRef) -> Option<TaskRef>;

/// One frame of the bouncing light across `count` lights.
///
/// Returns the light to show for frame `i` and the next frame. The sequence
/// runs `0, 1, .., count - 1, count - 2, .., 1` and repeats.
pub const fn bounce(i: usize, count: usize) -> (usize, usize) {
    if count < 2 {
        return (0, 0);
    }
    let index = if i < count { i } else { count - i % count - 2 };
    (index, (i + 1) % (2 * count - 2))
}

// ---------------------------------------------------------------------------
// Bouncer
// ---------------------------------------------------------------------------

/// Function that does nothing but animate the indicator.
pub struct Bouncer<D> {
    display: D,
    period: u32,
    elapsed: u32,
    frame: usize,
}

impl<D: Indicator> Bouncer<D> {
    /// Advance the animation once every `period` loop calls.
    pub fn new(display: D, period: u32) -> Self {
        Self {
            display,
            period: period.max(1),
            elapsed: 0,
            frame: 0,
        }
    }
}

impl<D: Indicator> Context for Bouncer<D> {
    fn run(&mut self, _cx: &Cx) -> Status {
        self.elapsed += 1;
        if self.elapsed >= self.period {
            self.elapsed = 0;
            let (index, next) = bounce(self.frame, ONBOARD_LED_COUNT);
            self.display.show(1 << index);
            self.frame = next;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Bouncer"
    }
}

// ---------------------------------------------------------------------------
// Kill
// ---------------------------------------------------------------------------

/// Function that fails its own `enter`, taking the whole pipeline down.
pub struct Kill {
    code: ErrorCode,
}

impl Kill {
    pub const fn new(code: ErrorCode) -> Self {
        Self { code }
    }
}

impl Context for Kill {
    fn enter(&mut self, _cx: &Cx) -> Status {
        Err(self.code)
    }

    fn run(&mut self, _cx: &Cx) -> Status {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Kill"
    }
}

// ---------------------------------------------------------------------------
// ModeSelect
// ---------------------------------------------------------------------------

/// Root function: runs the demo function picked by the switches.
pub struct ModeSelect<I, D> {
    input: I,
    display: D,
    spawners: &'static [Spawner; MODE_COUNT],
    selected: u8,
}

impl<I: ModeInput, D: Indicator> ModeSelect<I, D> {
    pub fn new(mut input: I, display: D, spawners: &'static [Spawner; MODE_COUNT]) -> Self {
        let selected = Self::mode(&mut input);
        Self {
            input,
            display,
            spawners,
            selected,
        }
    }

    /// Mode currently selected.
    pub fn selected(&self) -> u8 {
        self.selected
    }

    fn mode(input: &mut I) -> u8 {
        input.read() & (MODE_COUNT - 1) as u8
    }
}

impl<I: ModeInput, D: Indicator> Context for ModeSelect<I, D> {
    fn enter(&mut self, _cx: &Cx) -> Status {
        self.input.watch(None);
        Ok(())
    }

    fn run(&mut self, cx: &Cx) -> Status {
        self.selected = Self::mode(&mut self.input);
        self.display.show(self.selected);
        if (self.spawners[usize::from(self.selected)])(cx.this()).is_none() {
            log_debug!("mode {} not started", self.selected);
        }
        Ok(())
    }

    fn exit(&mut self, _cx: &Cx) -> Status {
        self.input.watch(Some(self.selected));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ModeSelect"
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use super::*;
    use crate::block::BlockId;
    use crate::error::{Fault, Phase};
    use crate::scheduler::Scheduler;
    use crate::testing::code;

    #[derive(Clone, Default)]
    struct Lights(Arc<Mutex<Vec<u8>>>);

    impl Lights {
        fn shown(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Indicator for Lights {
        fn show(&mut self, pattern: u8) {
            self.0.lock().unwrap().push(pattern);
        }
    }

    #[test]
    fn test_bounce_sequence() {
        let mut frame = 0;
        let mut seen = Vec::new();
        for _ in 0..7 {
            let (index, next) = bounce(frame, 4);
            seen.push(index);
            frame = next;
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 2, 1, 0]);
    }

    #[test]
    fn test_bounce_degenerate_counts() {
        assert_eq!(bounce(0, 0), (0, 0));
        assert_eq!(bounce(5, 1), (0, 0));
        assert_eq!(bounce(0, 2), (0, 1));
        assert_eq!(bounce(1, 2), (1, 0));
    }

    #[test]
    fn test_bouncer_advances_once_per_period() {
        let lights = Lights::default();
        let mut bouncer = Bouncer::new(lights.clone(), 2);
        let cx = Cx::new(TaskRef::new(BlockId::HEAD, 1), 1);

        for _ in 0..12 {
            bouncer.run(&cx).unwrap();
        }
        assert_eq!(lights.shown(), vec![1, 2, 4, 8, 4, 2]);
    }

    #[test]
    fn test_kill_fails_enter() {
        let mut kill = Kill::new(code(0xff));
        let cx = Cx::new(TaskRef::new(BlockId::HEAD, 1), 1);
        assert_eq!(kill.enter(&cx), Err(code(0xff)));
    }

    static SCHED: Scheduler<2048> = Scheduler::new();
    static SWITCHES: Mutex<u8> = Mutex::new(0);
    static WATCHES: Mutex<Vec<Option<u8>>> = Mutex::new(Vec::new());

    struct Switches;

    impl ModeInput for Switches {
        fn read(&mut self) -> u8 {
            *SWITCHES.lock().unwrap()
        }

        fn watch(&mut self, selected: Option<u8>) {
            WATCHES.lock().unwrap().push(selected);
        }
    }

    /// Flips the switches to mode 7, then does what the switch interrupt
    /// would do.
    struct Flip;

    impl Context for Flip {
        fn run(&mut self, _cx: &Cx) -> Status {
            *SWITCHES.lock().unwrap() = 7;
            let armed = WATCHES.lock().unwrap().last().copied().flatten();
            if matches!(armed, Some(mode) if mode != 7) {
                SCHED.terminate();
            }
            Ok(())
        }
    }

    fn flip(parent: TaskRef) -> Option<TaskRef> {
        SCHED.spawn(Some(parent), || Flip)
    }

    fn kill(parent: TaskRef) -> Option<TaskRef> {
        SCHED.spawn(Some(parent), || Kill::new(code(0xff)))
    }

    static SPAWNERS: [Spawner; MODE_COUNT] = [flip, flip, flip, flip, flip, flip, flip, kill];

    #[test]
    fn test_mode_select_masks_switch_reading() {
        struct Stuck(u8);

        impl ModeInput for Stuck {
            fn read(&mut self) -> u8 {
                self.0
            }

            fn watch(&mut self, _selected: Option<u8>) {}
        }

        let select = ModeSelect::new(Stuck(0b1111_1010), Lights::default(), &SPAWNERS);
        assert_eq!(select.selected(), 0b010);
    }

    #[test]
    fn test_mode_select_follows_switches() {
        *SWITCHES.lock().unwrap() = 2;
        let lights = Lights::default();

        let root = SCHED.spawn(None, || ModeSelect::new(Switches, lights.clone(), &SPAWNERS));
        assert!(root.is_some());

        assert_eq!(
            SCHED.run(),
            Err(Fault::Callback {
                task: "Kill",
                phase: Phase::Enter,
                code: code(0xff),
            })
        );
        assert_eq!(lights.shown(), vec![2, 7]);
        assert_eq!(
            *WATCHES.lock().unwrap(),
            vec![None, Some(2), None, Some(7)]
        );
        assert_eq!(SCHED.height(), 2);
    }
}
