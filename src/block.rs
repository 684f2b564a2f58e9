//! # Block Chain
//!
//! Control nodes describing one live context each. A block sits in the
//! arena directly in front of its context and records where it stands in
//! the stack:
//!
//! ```text
//!   head                                           tail
//!  ┌──────┐ next  ┌──────┐ next  ┌──────┐ next
//!  │  B0  │──────►│  B1  │──────►│  B2  │──────► None
//!  │      │◄──────│      │◄──────│      │
//!  └──────┘ prev  └──────┘ prev  └──────┘
//!   oldest                        most recently spawned
//! ```
//!
//! Blocks are address-ordered: `B(i+1)` always starts after the context of
//! `B(i)`. Only the tail block may be removed.
//!
//! Instead of recovering the context from the block by pointer arithmetic,
//! each block stores a slot descriptor (payload pointer plus vtable) that is
//! computed once when the context is placed.

use core::mem::size_of;
use core::ptr::NonNull;

use crate::arena::round_up;
use crate::config::MAX_ALIGN;
use crate::context::{Context, TaskRef};

/// Offset of a block from the start of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockId(usize);

impl BlockId {
    /// The first block always starts at the beginning of the arena.
    pub const HEAD: BlockId = BlockId(0);

    /// Encoding of "no block" in the atomic `active`/`latched` words.
    pub(crate) const NIL: usize = usize::MAX;

    #[inline]
    pub(crate) const fn new(offset: usize) -> Self {
        Self(offset)
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0
    }

    /// Payload offset of the context stored behind this block.
    #[inline]
    pub(crate) const fn payload(self) -> usize {
        self.0 + HEADER
    }

    #[inline]
    pub(crate) const fn encode(link: Option<BlockId>) -> usize {
        match link {
            Some(id) => id.0,
            None => Self::NIL,
        }
    }

    #[inline]
    pub(crate) const fn decode(raw: usize) -> Option<BlockId> {
        if raw == Self::NIL {
            None
        } else {
            Some(BlockId(raw))
        }
    }
}

/// Control node of one live context.
#[derive(Clone, Copy)]
pub(crate) struct Block {
    /// Block of the context directly beneath this one. Never changes.
    pub prev: Option<BlockId>,
    /// Block of the context spawned on top of this one, `None` at the tail.
    pub next: Option<BlockId>,
    /// Number of live blocks up to and including this one.
    pub depth: usize,
    /// Spawn counter value at creation, distinguishes reuses of an offset.
    pub generation: u32,
    /// Slot descriptor: the context living behind this block.
    pub slot: NonNull<dyn Context>,
}

/// Bytes reserved in front of every context for its block.
pub(crate) const HEADER: usize = round_up(size_of::<Block>(), MAX_ALIGN);

const _: () = assert!(core::mem::align_of::<Block>() <= MAX_ALIGN);

impl Block {
    #[inline]
    pub(crate) fn handle(&self, id: BlockId) -> TaskRef {
        TaskRef::new(id, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_encoding() {
        assert_eq!(BlockId::decode(BlockId::encode(None)), None);
        let id = BlockId::new(48);
        assert_eq!(BlockId::decode(BlockId::encode(Some(id))), Some(id));
        assert_eq!(BlockId::encode(Some(BlockId::HEAD)), 0);
    }

    #[test]
    fn test_header_keeps_payload_aligned() {
        assert_eq!(HEADER % MAX_ALIGN, 0);
        assert!(HEADER >= size_of::<Block>());
        assert_eq!(BlockId::new(HEADER).payload(), 2 * HEADER);
    }
}
