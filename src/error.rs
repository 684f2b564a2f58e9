//! # Errors
//!
//! Status codes returned by context callbacks, the unrecoverable [`Fault`]s
//! handed to the fatal handler, and the benign [`SpawnError`] outcomes a
//! spawning caller resolves on its own.

use core::fmt;
use core::num::NonZeroI32;

use crate::arena::ArenaError;

/// Non-zero status code reported by a failing lifecycle callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorCode(NonZeroI32);

impl ErrorCode {
    /// Interpret a C-style status: `0` is success, anything else an error.
    pub const fn from_status(status: i32) -> Option<Self> {
        match NonZeroI32::new(status) {
            Some(code) => Some(Self(code)),
            None => None,
        }
    }

    pub const fn get(self) -> i32 {
        self.0.get()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a lifecycle callback. `Err` is a fatal pipeline error.
pub type Status = Result<(), ErrorCode>;

/// Lifecycle phase a callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Enter,
    Run,
    Idle,
    Exit,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Enter => "enter",
            Phase::Run => "run",
            Phase::Idle => "idle",
            Phase::Exit => "exit",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecoverable scheduler failure. The scheduler never resumes after one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// A lifecycle callback returned a non-zero status.
    Callback {
        /// Name of the failing context.
        task: &'static str,
        /// Phase that failed.
        phase: Phase,
        /// The status it returned.
        code: ErrorCode,
    },
    /// The arena could not hold a newly spawned context.
    Arena(ArenaError),
    /// `run` was called while the context loop was already running.
    Reentered,
    /// The latched and active blocks are not neighbours in the chain.
    ChainDesync,
    /// The stack emptied where the caller needs it to keep running.
    Drained,
}

impl Fault {
    /// Integer code reported to the outside world (e.g. the death
    /// animation or a debugger).
    pub const fn code(&self) -> i32 {
        match self {
            Fault::Callback { code, .. } => code.get(),
            Fault::Arena(_) => 1,
            Fault::Reentered => 2,
            Fault::ChainDesync => 3,
            Fault::Drained => 4,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Callback { task, phase, code } => {
                write!(f, "pipeline error in {task}::{phase}() with code [{code}]")
            }
            Fault::Arena(err) => write!(f, "context arena: {err}"),
            Fault::Reentered => f.write_str("context loop is already running"),
            Fault::ChainDesync => f.write_str("latched and active contexts are not adjacent"),
            Fault::Drained => f.write_str("context stack drained"),
        }
    }
}

/// Why a spawn request was rejected.
///
/// Everything except `OutOfMemory` is a benign race or misuse outcome that
/// leaves the stack unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpawnError {
    /// The active context is not the one the caller expected.
    Stale,
    /// A structural change is waiting for the loop to process it.
    Busy,
    /// Called from within an `enter`/`exit` callback or a constructor.
    Reentrant,
    /// The arena is exhausted. Fatal when reached through `spawn`.
    OutOfMemory(ArenaError),
    /// The constructor failed; the carved space was rolled back.
    Construct(ErrorCode),
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::Stale => f.write_str("expected context is no longer active"),
            SpawnError::Busy => f.write_str("a stack change is still pending"),
            SpawnError::Reentrant => f.write_str("spawn called during a stack transition"),
            SpawnError::OutOfMemory(err) => write!(f, "out of memory: {err}"),
            SpawnError::Construct(code) => write!(f, "constructor failed with code [{code}]"),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::string::ToString;

    use super::*;

    #[test]
    fn test_error_code_from_status() {
        assert_eq!(ErrorCode::from_status(0), None);
        assert_eq!(ErrorCode::from_status(-2).map(ErrorCode::get), Some(-2));
    }

    #[test]
    fn test_callback_fault_message() {
        let fault = Fault::Callback {
            task: "Kill",
            phase: Phase::Enter,
            code: ErrorCode::from_status(0xff).unwrap(),
        };
        assert_eq!(fault.to_string(), "pipeline error in Kill::enter() with code [255]");
        assert_eq!(fault.code(), 255);
    }

    #[test]
    fn test_fault_codes_are_distinct() {
        let arena = Fault::Arena(ArenaError::OverAligned { align: 16 });
        let codes = [
            arena.code(),
            Fault::Reentered.code(),
            Fault::ChainDesync.code(),
            Fault::Drained.code(),
        ];
        assert_eq!(codes, [1, 2, 3, 4]);
        assert_eq!(
            arena.to_string(),
            "context arena: alignment 16 exceeds the arena maximum of 8"
        );
    }

    #[test]
    fn test_spawn_error_messages() {
        assert_eq!(
            SpawnError::Construct(ErrorCode::from_status(5).unwrap()).to_string(),
            "constructor failed with code [5]"
        );
        assert_eq!(SpawnError::Busy.to_string(), "a stack change is still pending");
    }
}
