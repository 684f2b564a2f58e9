//! # Context Lifecycle
//!
//! A context is one unit of cooperative execution living in the arena.
//! The scheduler drives it through the following phases:
//!
//! ```text
//!   spawn ──► (constructed) ──► enter ──► run, run, ...  (top of stack)
//!                                  ▲            │
//!                                  │            ▼ child spawned
//!                        child ends│          exit
//!                                  │            │
//!                                  └── idle, idle, ...  (beneath child)
//!
//!   terminate ──► exit ──► drop  (only ever the top of the stack)
//! ```
//!
//! `enter` and `exit` are always paired and run inside a masked section:
//! they must be short and must not spawn or terminate. `run` and `idle`
//! run with interrupts enabled and may spawn (a child on top of the
//! caller) or terminate (the caller itself, from `run`).
//!
//! Any `Err` returned from a callback is fatal for the whole pipeline.
//! Ending a context normally is done through `terminate`.

use crate::block::BlockId;
use crate::error::Status;

/// Handle naming one specific spawned context.
///
/// A handle never matches a later context placed at the same arena offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskRef {
    block: BlockId,
    generation: u32,
}

impl TaskRef {
    #[inline]
    pub(crate) const fn new(block: BlockId, generation: u32) -> Self {
        Self { block, generation }
    }

    #[inline]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// Per-call frame handed to every lifecycle callback.
#[derive(Debug, Clone, Copy)]
pub struct Cx {
    this: TaskRef,
    depth: usize,
}

impl Cx {
    #[inline]
    pub(crate) const fn new(this: TaskRef, depth: usize) -> Self {
        Self { this, depth }
    }

    /// Handle of the context being called. Pass it as `expected` when
    /// spawning a child.
    #[inline]
    pub const fn this(&self) -> TaskRef {
        self.this
    }

    /// Position in the stack, 1 for the bottom-most context.
    #[inline]
    pub const fn depth(&self) -> usize {
        self.depth
    }
}

/// The capability set every context type implements.
pub trait Context {
    /// Acquire what the context needs while it is on top of the stack.
    fn enter(&mut self, _cx: &Cx) -> Status {
        Ok(())
    }

    /// Called once per loop iteration while on top of the stack.
    fn run(&mut self, cx: &Cx) -> Status;

    /// Called once per loop iteration while a child is on top.
    fn idle(&mut self, _cx: &Cx) -> Status {
        Ok(())
    }

    /// Release what `enter` acquired.
    fn exit(&mut self, _cx: &Cx) -> Status {
        Ok(())
    }

    /// Name used in traces and fault reports.
    fn name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}
