//! # Context Arena
//!
//! A fixed-size, statically allocated byte buffer that backs every live
//! context and its control block. Storage grows linearly from the start of
//! the buffer and only ever shrinks from the tail, so there is no
//! fragmentation and no free list.
//!
//! ```text
//!  offset 0                                          cursor        N
//!  ┌────────┬───────────┬────────┬──────────────┬───┬──────────────┐
//!  │ Block0 │ context 0 │ Block1 │  context 1   │...│   (free)     │
//!  └────────┴───────────┴────────┴──────────────┴───┴──────────────┘
//! ```
//!
//! Every carve-out is rounded up to [`MAX_ALIGN`], so the cursor is always
//! aligned for the next block whatever the size of the context before it.
//!
//! The arena never hands out references to its bytes. Callers receive raw
//! pointers and are responsible for the objects they place there; the
//! scheduler is the only such caller.

use core::cell::{Cell, UnsafeCell};
use core::fmt;
use core::mem::align_of;
use core::ptr::{self, NonNull};

use critical_section::{CriticalSection, Mutex};

use crate::config::MAX_ALIGN;

/// Round `value` up to the next multiple of `multiple` (`multiple > 0`).
#[inline]
pub const fn round_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

/// Why a carve-out request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArenaError {
    /// The requested alignment is stricter than [`MAX_ALIGN`].
    OverAligned {
        /// Requested alignment in bytes.
        align: usize,
    },
    /// Not enough space left between the cursor and the end of the buffer.
    Exhausted {
        /// Bytes requested, after rounding.
        requested: usize,
        /// Bytes still free.
        remaining: usize,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverAligned { align } => {
                write!(f, "alignment {align} exceeds the arena maximum of {MAX_ALIGN}")
            }
            Self::Exhausted {
                requested,
                remaining,
            } => {
                write!(
                    f,
                    "arena exhausted: requested {requested} bytes, {remaining} bytes remaining"
                )
            }
        }
    }
}

/// A region handed out by [`Arena::carve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Carve {
    /// Byte offset of the region from the start of the arena.
    pub offset: usize,
    /// Length of the region, a multiple of [`MAX_ALIGN`].
    pub len: usize,
}

#[repr(C, align(8))]
struct Storage<const N: usize>([u8; N]);

const _: () = assert!(align_of::<Storage<0>>() == MAX_ALIGN);

/// Bump allocator over a static buffer of `N` bytes.
pub struct Arena<const N: usize> {
    storage: UnsafeCell<Storage<N>>,
    cursor: Mutex<Cell<usize>>,
}

impl<const N: usize> Arena<N> {
    /// Create an empty, zeroed arena. Usable in a `static`.
    pub const fn new() -> Self {
        Self {
            storage: UnsafeCell::new(Storage([0; N])),
            cursor: Mutex::new(Cell::new(0)),
        }
    }

    /// Bytes currently carved out.
    #[inline]
    pub fn used(&self, cs: CriticalSection<'_>) -> usize {
        self.cursor.borrow(cs).get()
    }

    /// Bytes still available.
    #[inline]
    pub fn remaining(&self, cs: CriticalSection<'_>) -> usize {
        N - self.used(cs)
    }

    /// Bump-allocate `size` bytes aligned to `align` from the tail.
    ///
    /// The size is rounded up to [`MAX_ALIGN`]. Nothing is changed on
    /// failure.
    pub fn carve(
        &self,
        cs: CriticalSection<'_>,
        size: usize,
        align: usize,
    ) -> Result<Carve, ArenaError> {
        if align > MAX_ALIGN {
            return Err(ArenaError::OverAligned { align });
        }

        let cursor = self.cursor.borrow(cs);
        let offset = cursor.get();
        let remaining = N - offset;
        let len = round_up(size, MAX_ALIGN);

        if len > remaining {
            return Err(ArenaError::Exhausted {
                requested: len,
                remaining,
            });
        }

        cursor.set(offset + len);
        Ok(Carve { offset, len })
    }

    /// Shrink the tail back to `offset`, zeroing everything released.
    ///
    /// Only the most recent carve-outs can be released; `offset` must be the
    /// start of one of them.
    pub fn reclaim(&self, cs: CriticalSection<'_>, offset: usize) {
        let cursor = self.cursor.borrow(cs);
        let end = cursor.get();
        debug_assert!(offset <= end, "reclaim past the tail");
        debug_assert_eq!(offset % MAX_ALIGN, 0, "reclaim of an unaligned offset");

        if offset >= end {
            return;
        }

        // SAFETY: `offset..end` lies inside the buffer and no live object
        // occupies it once the caller has released it.
        unsafe { ptr::write_bytes(self.base().as_ptr().add(offset), 0, end - offset) };
        cursor.set(offset);
    }

    /// Pointer to the byte at `offset`.
    ///
    /// # Safety
    /// `offset` must not exceed `N`.
    #[inline]
    pub unsafe fn at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= N);
        NonNull::new_unchecked(self.base().as_ptr().add(offset))
    }

    #[inline]
    fn base(&self) -> NonNull<u8> {
        // SAFETY: `UnsafeCell::get` never returns null.
        unsafe { NonNull::new_unchecked(self.storage.get().cast::<u8>()) }
    }
}

impl<const N: usize> Default for Arena<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::sync::masked;

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 8), 0);
        assert_eq!(round_up(1, 8), 8);
        assert_eq!(round_up(8, 8), 8);
        assert_eq!(round_up(9, 8), 16);
    }

    #[test]
    fn test_carve_rounds_to_max_align() {
        let arena = Arena::<64>::new();
        masked(|cs| {
            let a = arena.carve(cs, 3, 1).unwrap();
            assert_eq!(a, Carve { offset: 0, len: 8 });

            let b = arena.carve(cs, 12, 4).unwrap();
            assert_eq!(b, Carve { offset: 8, len: 16 });
            assert_eq!(arena.used(cs), 24);
            assert_eq!(arena.remaining(cs), 40);
        });
    }

    #[test]
    fn test_carve_zero_size() {
        let arena = Arena::<16>::new();
        masked(|cs| {
            let c = arena.carve(cs, 0, 1).unwrap();
            assert_eq!(c.len, 0);
            assert_eq!(arena.used(cs), 0);
        });
    }

    #[test]
    fn test_exhaustion_leaves_arena_untouched() {
        let arena = Arena::<32>::new();
        masked(|cs| {
            arena.carve(cs, 20, 8).unwrap();
            let err = arena.carve(cs, 9, 8).unwrap_err();
            assert_eq!(
                err,
                ArenaError::Exhausted {
                    requested: 16,
                    remaining: 8
                }
            );
            assert_eq!(arena.used(cs), 24);

            // The exact remainder still fits.
            assert!(arena.carve(cs, 8, 8).is_ok());
            assert_eq!(arena.remaining(cs), 0);
        });
    }

    #[test]
    fn test_over_aligned_request() {
        let arena = Arena::<64>::new();
        masked(|cs| {
            assert_eq!(
                arena.carve(cs, 8, 16),
                Err(ArenaError::OverAligned { align: 16 })
            );
            assert_eq!(arena.used(cs), 0);
        });
    }

    #[test]
    fn test_reclaim_zeroes_released_bytes() {
        let arena = Arena::<32>::new();
        masked(|cs| {
            let keep = arena.carve(cs, 8, 8).unwrap();
            let released = arena.carve(cs, 16, 8).unwrap();
            unsafe {
                ptr::write_bytes(arena.at(keep.offset).as_ptr(), 0xAA, keep.len);
                ptr::write_bytes(arena.at(released.offset).as_ptr(), 0x55, released.len);
            }

            arena.reclaim(cs, released.offset);
            assert_eq!(arena.used(cs), 8);

            for i in 0..32 {
                let byte = unsafe { *arena.at(i).as_ptr() };
                let expected = if i < 8 { 0xAA } else { 0 };
                assert_eq!(byte, expected, "byte {i}");
            }
        });
    }

    #[test]
    fn test_storage_is_max_aligned() {
        let arena = Arena::<8>::new();
        let addr = unsafe { arena.at(0) }.as_ptr() as usize;
        assert_eq!(addr % MAX_ALIGN, 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn carve_is_always_rounded(sizes in proptest::collection::vec(0usize..100, 1..10)) {
                let arena = Arena::<1024>::new();
                masked(|cs| {
                    for size in sizes {
                        let carve = arena.carve(cs, size, 1).unwrap();
                        assert_eq!(carve.offset % MAX_ALIGN, 0);
                        assert_eq!(carve.len % MAX_ALIGN, 0);
                        assert!(carve.len >= size && carve.len < size + MAX_ALIGN);
                    }
                });
            }

            #[test]
            fn reclaimed_arena_behaves_like_fresh(
                s1 in 0usize..200,
                extra in 1usize..200,
            ) {
                let s2 = s1 + extra;
                let reused = Arena::<1024>::new();
                let fresh = Arena::<1024>::new();

                let (again, first) = masked(|cs| {
                    reused.carve(cs, s1, 8).unwrap();
                    reused.carve(cs, s2, 8).unwrap();
                    reused.reclaim(cs, 0);
                    (reused.carve(cs, s2, 8), fresh.carve(cs, s2, 8))
                });

                prop_assert_eq!(again, first);
                prop_assert_eq!(masked(|cs| reused.used(cs)), masked(|cs| fresh.used(cs)));
            }
        }
    }
}
