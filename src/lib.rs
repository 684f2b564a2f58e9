//! # CtxOS: Cooperative Context Scheduler
//!
//! A stack-discipline cooperative scheduler for ARM Cortex-M3
//! microcontrollers, built for firmware that runs one of several mutually
//! exclusive functions selected by hardware switches.
//!
//! ## Overview
//!
//! Every unit of work is a *context*: an object with `enter`, `run`, `idle`
//! and `exit` callbacks. Contexts form a stack. The top context receives
//! `run` calls; every context beneath it receives `idle` calls, oldest
//! first. A context spawns a child on top of itself and terminates itself
//! when done; both requests may also come from interrupt handlers.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │              Demo Functions (modes.rs)                  │
//! │        ModeSelect · Bouncer · Kill · bounce()           │
//! ├────────────────────────────────────────────────────────┤
//! │                Scheduler (scheduler.rs)                 │
//! │   spawn() · try_spawn() · terminate() · run() · start() │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Contexts    │   Block Chain      │  Sync Primitives  │
//! │  context.rs  │   block.rs         │  sync.rs          │
//! │  ─ Context   │   ─ Block          │  ─ masked()       │
//! │  ─ Cx        │   ─ BlockId        │  ─ Transition     │
//! │  ─ TaskRef   │   ─ HEADER         │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │              Static Arena (arena.rs)                    │
//! │          carve() · reclaim() · round_up()               │
//! ├────────────────────────────────────────────────────────┤
//! │     Board + Arch Port (board.rs, arch/cortex_m3.rs)     │
//! │        LEDs · DIP switches · SysTick · die()            │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: contexts live in a fixed `[u8; ARENA_SIZE]` arena
//! - **Stack discipline**: only the most recently spawned context is
//!   ever destroyed, so the arena is a bump allocator with tail release
//! - **Contiguous layout**: each block header is directly followed by its
//!   context, every carve-out rounded to `MAX_ALIGN`
//! - **Critical sections**: `critical_section::with` (PRIMASK on target)
//!   around every structural change
//!
//! ## Failure Model
//!
//! A non-zero status from any callback, or running out of arena space, is
//! fatal: the scheduler hands a [`Fault`] to the installed fatal handler
//! (the board's death animation) and never resumes.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;

pub mod config;
pub mod sync;
pub mod arena;
pub mod block;
pub mod context;
pub mod error;
pub mod scheduler;
pub mod modes;

#[cfg(target_os = "none")]
pub mod arch;
#[cfg(target_os = "none")]
pub mod board;

#[cfg(test)]
mod testing;

pub use context::{Context, Cx, TaskRef};
pub use error::{ErrorCode, Fault, Phase, SpawnError, Status};
pub use scheduler::Scheduler;
