//! # Scheduler
//!
//! The cooperative context loop. Contexts are pushed onto a stack kept in a
//! static [`Arena`]; the top context receives `run` calls, every context
//! beneath it receives `idle` calls, oldest first.
//!
//! ## Active and Latched
//!
//! Two handles point into the block chain:
//!
//! - **active**: where the stack *should* be. Written by [`Scheduler::spawn`]
//!   and [`Scheduler::terminate`], from the main loop or from interrupts,
//!   always inside a masked section (release store, acquire load).
//! - **latched**: what the loop is currently driving. Only the loop moves
//!   it, once per processed transition.
//!
//! At the top of every iteration the loop compares the two:
//!
//! ```text
//!   active == latched ─► idle(head .. latched), run(latched)
//!   active above       ─► exit(latched), enter(active)            (spawned)
//!   active below       ─► exit(latched), drop, enter(active)      (terminated)
//!   active == none     ─► exit(latched), drop, return             (drained)
//! ```
//!
//! Transitions run with interrupts masked; `idle`/`run` run with interrupts
//! enabled so that switch interrupts can request changes at any time.
//!
//! ## One Change per Iteration
//!
//! While the loop has not processed a change yet, a second one is refused:
//! spawns fail with [`SpawnError::Busy`], a terminate behind a pending spawn
//! is deferred until that spawn has been entered, and a repeated terminate is
//! a no-op. The latched and active blocks therefore never differ by more
//! than one level.

use core::cell::Cell;
use core::marker::PhantomData;
use core::mem::{align_of, size_of};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use critical_section::{CriticalSection, Mutex};

use crate::arena::Arena;
use crate::block::{Block, BlockId, HEADER};
use crate::config::MAX_ALIGN;
use crate::context::{Context, Cx, TaskRef};
use crate::error::{ErrorCode, Fault, Phase, SpawnError};
use crate::sync::{masked, Transition};

/// Rejects over-aligned context types at compile time.
struct AlignCheck<T>(PhantomData<T>);

impl<T> AlignCheck<T> {
    const OK: () = assert!(
        align_of::<T>() <= MAX_ALIGN,
        "context type is over-aligned for the arena"
    );
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// Context stack plus the loop driving it, over an arena of `N` bytes.
///
/// Meant to live in a `static`:
///
/// ```ignore
/// static SCHEDULER: Scheduler<ARENA_SIZE> = Scheduler::with_fatal_handler(die);
///
/// SCHEDULER.spawn(None, || ModeSelect::new(dips, leds, &SPAWNERS));
/// SCHEDULER.start();
/// ```
pub struct Scheduler<const N: usize> {
    arena: Arena<N>,

    /// Block of the context the stack should have on top.
    active: AtomicUsize,

    /// Block of the context the loop is driving. Loop-private, except that
    /// `terminate` reads it inside a masked section.
    latched: AtomicUsize,

    running: AtomicBool,

    /// Set while an `enter`/`exit` callback or a constructor runs.
    in_transition: AtomicBool,

    /// A terminate arrived while a spawn was pending.
    deferred_terminate: AtomicBool,

    generation: Mutex<Cell<u32>>,

    fatal: Option<fn(Fault) -> !>,
}

// SAFETY: the arena bytes and block headers are only written inside masked
// sections (spawn, terminate, transitions) or by the single loop thread while
// it owns the latched chain. Contexts are required to be `Send`, since they
// may be constructed in interrupt context and driven from the main loop.
unsafe impl<const N: usize> Sync for Scheduler<N> {}

impl<const N: usize> Scheduler<N> {
    /// Create an empty scheduler that panics on a fatal fault.
    pub const fn new() -> Self {
        Self::build(None)
    }

    /// Create an empty scheduler handing fatal faults to `handler`.
    pub const fn with_fatal_handler(handler: fn(Fault) -> !) -> Self {
        Self::build(Some(handler))
    }

    const fn build(fatal: Option<fn(Fault) -> !>) -> Self {
        Self {
            arena: Arena::new(),
            active: AtomicUsize::new(BlockId::NIL),
            latched: AtomicUsize::new(BlockId::NIL),
            running: AtomicBool::new(false),
            in_transition: AtomicBool::new(false),
            deferred_terminate: AtomicBool::new(false),
            generation: Mutex::new(Cell::new(0)),
            fatal,
        }
    }

    // -----------------------------------------------------------------------
    // Structural changes
    // -----------------------------------------------------------------------

    /// Spawn a context on top of the stack.
    ///
    /// `expected` is the context the caller believes is on top; `None`
    /// spawns unconditionally. Returns `None` if the request lost a race
    /// (see [`SpawnError`]). Running out of arena space is fatal.
    ///
    /// Interrupt safe. Must not be called from `enter`/`exit`.
    pub fn spawn<T, F>(&self, expected: Option<TaskRef>, init: F) -> Option<TaskRef>
    where
        T: Context + Send + 'static,
        F: FnOnce() -> T,
    {
        match self.try_spawn(expected, || Ok(init())) {
            Ok(task) => Some(task),
            Err(SpawnError::OutOfMemory(err)) => self.fail(Fault::Arena(err)),
            Err(err) => {
                log_debug!("spawn rejected: {}", err);
                None
            }
        }
    }

    /// Spawn a context whose constructor may fail.
    ///
    /// The constructor runs in place, inside the masked section, after the
    /// arena space has been carved. If it fails the carve is rolled back and
    /// the stack is left untouched.
    pub fn try_spawn<T, F>(&self, expected: Option<TaskRef>, init: F) -> Result<TaskRef, SpawnError>
    where
        T: Context + Send + 'static,
        F: FnOnce() -> Result<T, ErrorCode>,
    {
        #[allow(clippy::let_unit_value)]
        let () = AlignCheck::<T>::OK;

        let (task, depth, name) = masked(|cs| {
            if self.in_transition.load(Ordering::Relaxed) {
                log_warn!("spawn called from enter/exit or a constructor, refused");
                return Err(SpawnError::Reentrant);
            }

            let top = BlockId::decode(self.active.load(Ordering::Acquire));
            if self.running.load(Ordering::Relaxed)
                && BlockId::encode(top) != self.latched.load(Ordering::Relaxed)
            {
                return Err(SpawnError::Busy);
            }

            if let Some(expected) = expected {
                if self.handle(cs, top) != Some(expected) {
                    return Err(SpawnError::Stale);
                }
            }

            let carve = self
                .arena
                .carve(cs, HEADER + size_of::<T>(), align_of::<T>())
                .map_err(SpawnError::OutOfMemory)?;
            let id = BlockId::new(carve.offset);

            let constructed = {
                let _guard = Transition::begin(&self.in_transition, cs);
                init()
            };
            let context = match constructed {
                Ok(context) => context,
                Err(code) => {
                    self.arena.reclaim(cs, carve.offset);
                    return Err(SpawnError::Construct(code));
                }
            };
            let name = context.name();

            let counter = self.generation.borrow(cs);
            let generation = counter.get().wrapping_add(1);
            counter.set(generation);

            // SAFETY: `id.payload()` is the aligned payload area of a fresh
            // carve-out big enough for `T`, and nothing else refers to it.
            // The parent block, if any, is live.
            let depth = unsafe {
                let payload = self.arena.at(id.payload()).cast::<T>();
                payload.as_ptr().write(context);
                let slot: NonNull<dyn Context> = payload;

                let depth = match top {
                    Some(parent) => self.header(parent).depth + 1,
                    None => 1,
                };
                self.block_ptr(id).as_ptr().write(Block {
                    prev: top,
                    next: None,
                    depth,
                    generation,
                    slot,
                });
                if let Some(parent) = top {
                    self.link(parent, Some(id));
                }
                depth
            };

            self.active.store(id.offset(), Ordering::Release);
            Ok((TaskRef::new(id, generation), depth, name))
        })?;

        log_debug!("[{}] {} constructed", depth, name);
        Ok(task)
    }

    /// Request removal of the context currently driven by the loop.
    ///
    /// Never destroys anything itself; the loop exits and drops the context
    /// on its next iteration. Interrupt safe. Calling it when no context is
    /// running, or again before the loop processed the first request, does
    /// nothing.
    pub fn terminate(&self) {
        masked(|cs| {
            if self.in_transition.load(Ordering::Relaxed) {
                log_error!("terminate called from enter/exit, ignored");
                return;
            }
            if !self.running.load(Ordering::Relaxed) {
                log_warn!("terminate before the context loop started, ignored");
                return;
            }
            self.retreat(cs);
        });
    }

    /// Point `active` at the parent of the latched context.
    fn retreat(&self, _cs: CriticalSection<'_>) {
        let Some(latched) = BlockId::decode(self.latched.load(Ordering::Relaxed)) else {
            return;
        };
        let active = self.active.load(Ordering::Relaxed);
        // SAFETY: the latched block stays live until the loop destroys it,
        // which happens in a masked section.
        let parent = BlockId::encode(unsafe { self.header(latched) }.prev);

        if active == latched.offset() {
            self.active.store(parent, Ordering::Release);
        } else if active != parent {
            // A spawn is waiting to be entered; remove it afterwards.
            self.deferred_terminate.store(true, Ordering::Relaxed);
        }
    }

    // -----------------------------------------------------------------------
    // Context loop
    // -----------------------------------------------------------------------

    /// Run the context loop until the stack is empty, handing any fault to
    /// the fatal handler.
    ///
    /// Main context only, never from an interrupt.
    pub fn start(&self) {
        if let Err(fault) = self.run() {
            self.fail(fault);
        }
    }

    /// Run the context loop until the stack is empty.
    ///
    /// Returns immediately if nothing was spawned. After a clean return the
    /// scheduler can be started again. After a fault it stays latched and
    /// must not be resumed.
    pub fn run(&self) -> Result<(), Fault> {
        let first = masked(|_cs| {
            if self.running.load(Ordering::Relaxed) {
                return Err(Fault::Reentered);
            }
            let top = BlockId::decode(self.active.load(Ordering::Acquire));
            if let Some(id) = top {
                self.running.store(true, Ordering::Relaxed);
                self.latched.store(id.offset(), Ordering::Relaxed);
            }
            Ok(top)
        })?;

        let Some(first) = first else {
            log_info!("no contexts spawned, nothing to run");
            return Ok(());
        };

        log_info!("starting context loop");
        self.drive(first)?;

        masked(|_cs| {
            self.latched.store(BlockId::NIL, Ordering::Relaxed);
            self.deferred_terminate.store(false, Ordering::Relaxed);
            self.running.store(false, Ordering::Relaxed);
        });
        log_info!("context loop terminated");
        Ok(())
    }

    fn drive(&self, first: BlockId) -> Result<(), Fault> {
        // Only the top context is entered; the ones beneath it start idling.
        masked(|cs| {
            let _guard = Transition::begin(&self.in_transition, cs);
            self.invoke(first, Phase::Enter)
        })?;

        loop {
            let latched = BlockId::new(self.latched.load(Ordering::Relaxed));

            if self.active.load(Ordering::Acquire) != latched.offset() {
                if masked(|cs| self.switch(cs, latched))?.is_none() {
                    return Ok(());
                }
                masked(|cs| {
                    if self.deferred_terminate.load(Ordering::Relaxed) {
                        self.deferred_terminate.store(false, Ordering::Relaxed);
                        self.retreat(cs);
                    }
                });
                continue;
            }

            // Background contexts, oldest first.
            let mut cursor = BlockId::HEAD;
            while cursor != latched {
                // SAFETY: every block from the head up to the latched one is
                // live; only blocks above `latched` can change concurrently.
                let next = unsafe { self.header(cursor) }.next;
                self.invoke(cursor, Phase::Idle)?;
                cursor = next.ok_or(Fault::ChainDesync)?;
            }

            self.invoke(latched, Phase::Run)?;
        }
    }

    /// Process the single pending change between `latched` and `active`.
    ///
    /// Returns the new latched block, or `None` once the stack is empty.
    fn switch(&self, cs: CriticalSection<'_>, latched: BlockId) -> Result<Option<BlockId>, Fault> {
        let _guard = Transition::begin(&self.in_transition, cs);

        let active = BlockId::decode(self.active.load(Ordering::Acquire));
        // SAFETY: the latched block is live until destroyed below.
        let current = unsafe { self.header(latched) };

        match active {
            // SAFETY: `spawn` published `next` fully constructed.
            Some(next) if unsafe { self.header(next) }.prev == Some(latched) => {
                self.invoke(latched, Phase::Exit)?;
                self.invoke(next, Phase::Enter)?;
                self.latched.store(next.offset(), Ordering::Relaxed);
                Ok(Some(next))
            }
            parent if parent == current.prev => {
                self.invoke(latched, Phase::Exit)?;
                self.destroy(cs, latched, &current);
                self.latched.store(BlockId::encode(parent), Ordering::Relaxed);
                if let Some(parent) = parent {
                    self.invoke(parent, Phase::Enter)?;
                }
                Ok(parent)
            }
            _ => Err(Fault::ChainDesync),
        }
    }

    /// Drop the tail context, unlink its block and give its bytes back.
    fn destroy(&self, cs: CriticalSection<'_>, id: BlockId, block: &Block) {
        // SAFETY: `id` is the tail block; its context was exited and nothing
        // refers to it any more.
        let name = unsafe {
            let name = block.slot.as_ref().name();
            ptr::drop_in_place(block.slot.as_ptr());
            if let Some(parent) = block.prev {
                self.link(parent, None);
            }
            name
        };
        self.arena.reclaim(cs, id.offset());
        log_debug!("[{}] {} destroyed", block.depth, name);
    }

    /// Call one lifecycle callback of the context behind `id`.
    fn invoke(&self, id: BlockId, phase: Phase) -> Result<(), Fault> {
        // SAFETY: callers only pass live blocks. The header is copied masked
        // because an interrupt may link a child to it. The loop is the only
        // place contexts are borrowed, one at a time.
        let block = masked(|_cs| unsafe { self.header(id) });
        let context = unsafe { &mut *block.slot.as_ptr() };
        let cx = Cx::new(block.handle(id), block.depth);

        let status = match phase {
            Phase::Enter => {
                log_debug!("[{}] {}::enter()", block.depth, context.name());
                context.enter(&cx)
            }
            Phase::Run => {
                log_trace!("[{}] {}::run()", block.depth, context.name());
                context.run(&cx)
            }
            Phase::Idle => {
                log_trace!("[{}] {}::idle()", block.depth, context.name());
                context.idle(&cx)
            }
            Phase::Exit => {
                log_debug!("[{}] {}::exit()", block.depth, context.name());
                context.exit(&cx)
            }
        };

        status.map_err(|code| Fault::Callback {
            task: context.name(),
            phase,
            code,
        })
    }

    fn fail(&self, fault: Fault) -> ! {
        log_error!("fatal: {}", fault);
        match self.fatal {
            Some(handler) => handler(fault),
            None => panic!("{}", fault),
        }
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    /// Number of contexts on the stack as requested by `active`.
    pub fn height(&self) -> usize {
        masked(|_cs| match BlockId::decode(self.active.load(Ordering::Acquire)) {
            // SAFETY: the active block is live.
            Some(id) => unsafe { self.header(id) }.depth,
            None => 0,
        })
    }

    /// Handle of the context on top of the stack.
    pub fn current(&self) -> Option<TaskRef> {
        masked(|cs| self.handle(cs, BlockId::decode(self.active.load(Ordering::Acquire))))
    }

    /// Whether the context loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Arena bytes held by live contexts and their blocks.
    pub fn arena_used(&self) -> usize {
        masked(|cs| self.arena.used(cs))
    }

    /// Size of the arena in bytes.
    pub const fn arena_capacity(&self) -> usize {
        N
    }

    // -----------------------------------------------------------------------
    // Block access
    // -----------------------------------------------------------------------

    fn handle(&self, _cs: CriticalSection<'_>, id: Option<BlockId>) -> Option<TaskRef> {
        // SAFETY: inside a masked section the active block is live.
        id.map(|id| unsafe { self.header(id) }.handle(id))
    }

    /// # Safety
    /// `id` must name a live block.
    #[inline]
    unsafe fn block_ptr(&self, id: BlockId) -> NonNull<Block> {
        self.arena.at(id.offset()).cast::<Block>()
    }

    /// # Safety
    /// `id` must name a live block.
    #[inline]
    unsafe fn header(&self, id: BlockId) -> Block {
        self.block_ptr(id).as_ptr().read()
    }

    /// # Safety
    /// `id` must name a live block and the caller must be masked.
    #[inline]
    unsafe fn link(&self, id: BlockId, next: Option<BlockId>) {
        let block = self.block_ptr(id).as_ptr();
        ptr::addr_of_mut!((*block).next).write(next);
    }
}

impl<const N: usize> Default for Scheduler<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Drop for Scheduler<N> {
    fn drop(&mut self) {
        masked(|cs| {
            if self.arena.used(cs) == 0 {
                return;
            }

            // SAFETY: a non-empty arena always starts with a live block and
            // the `next` links reach every block carved after it.
            unsafe {
                let mut tail = BlockId::HEAD;
                while let Some(next) = self.header(tail).next {
                    tail = next;
                }
                let mut cursor = Some(tail);
                while let Some(id) = cursor {
                    let block = self.header(id);
                    ptr::drop_in_place(block.slot.as_ptr());
                    cursor = block.prev;
                }
            }
            self.arena.reclaim(cs, 0);
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
