//! A fixed-span heap allocator for machines without an MMU or an
//! sbrk-style call.
//!
//! The heap occupies one statically configured address span and grows
//! downward through it in block units; there is no way to ask the
//! environment for more. Inside a block, allocations are carved bump-style
//! and recycled through a per-block free-list, never moved and never given
//! back.
//!
//! ```text
//! bottom                                                  top
//!   + - - - - - - - - - - +--------------+--------------+
//!   :  headroom (growth)  |   block 2    |   block 1    |
//!   + - - - - - - - - - - +--------------+--------------+
//!        new blocks appear downward <---
//!                          ---> chunks are carved upward
//!                               within each block
//! ```
//!
//! An allocation request is satisfied in strict order:
//!
//! 1. **Recycle** — scan the free-lists for a freed chunk of total size
//!    within twice the request, first fit wins.
//! 2. **Bump** — carve from the first block with enough unbumped space.
//! 3. **Grow** — materialize a new block below the lowest one, or fail if
//!    that would breach the bottom boundary.
//!
//! The heap is an explicit owned value, so independent heaps can coexist:
//!
//! ```
//! use fixedheap::{Heap, HeapConfig};
//!
//! let mut heap = Heap::with_config(HeapConfig {
//!     top: 0x8000,
//!     bottom: 0x6000,
//!     min_block_size: 0x1000,
//! })
//! .expect("bad bounds");
//!
//! let ptr = heap.allocate(100).expect("out of memory");
//! unsafe { heap.free(ptr) };
//!
//! // The freed chunk is recycled for an equal request.
//! assert_eq!(heap.allocate(100), Some(ptr));
//! ```
//!
//! There is deliberately no locking and no `GlobalAlloc` implementation:
//! the target environment has a single execution context, and consumers
//! that need sharing must serialize calls themselves.

mod arena;
mod block;
mod chunk;
mod freelist;
mod heap;
mod list;
mod utils;

pub use heap::{Heap, HeapAvailability, HeapConfig, HeapError, HeapUsage};
