//! Document model boundary for the placement engine.
//!
//! This crate owns the pieces shared between the page runtime and anything that
//! mirrors it: stable node keys, the `DOMUpdate` mutation stream, the mirror
//! pattern used to follow that stream, an in-memory [`Document`] runtime and the
//! [`DomIndex`] lookup mirror used for marker discovery.

#![allow(
    clippy::missing_docs_in_private_items,
    reason = "Internal implementation details don't need public documentation"
)]
#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

/// The page runtime that applies update batches and rebroadcasts them.
pub mod document;
/// Lookup mirror for ids, classes and attributes.
pub mod index;
/// HTML to `DOMUpdate` conversion.
pub mod parser;
/// Update stream, subscriber trait and mirror wrapper.
pub mod updating;

pub use document::{DOMNode, Document, NodeKind};
pub use index::{DomIndex, DomIndexState};
pub use parser::{fragment_updates, parse_html};
pub use updating::{DOMMirror, DOMSubscriber, DOMUpdate};

/// A 64-bit stable key for DOM nodes used to correlate asynchronous updates.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, PartialOrd, Ord)]
pub struct NodeKey(pub u64);

impl NodeKey {
    /// The root node key (always present).
    pub const ROOT: Self = Self(0);

    /// Pack a producer shard and counter into a single key.
    #[inline]
    #[must_use]
    pub const fn pack(shard: u8, counter: u64) -> Self {
        let counter = counter & ((1_u64 << 40_u64) - 1);
        Self(((shard as u64) << 40_u64) | counter)
    }
}

/// Mints fresh keys for one producer (the parser, a script, a test).
///
/// Different producers must use different shards so their keys never collide
/// inside the same document.
#[derive(Clone, Debug)]
pub struct KeyAllocator {
    shard: u8,
    counter: u64,
}

impl KeyAllocator {
    /// Create an allocator for the given producer shard.
    #[must_use]
    pub const fn new(shard: u8) -> Self {
        Self { shard, counter: 1 }
    }

    /// Mint the next key.
    pub const fn next_key(&mut self) -> NodeKey {
        let key = NodeKey::pack(self.shard, self.counter);
        self.counter = self.counter.wrapping_add(1);
        key
    }
}

impl Default for KeyAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}
