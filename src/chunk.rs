use std::{mem, ptr::NonNull};

use bitflags::bitflags;

use crate::{block::Block, freelist::FreedNode, list::Node};

/// Overhead in bytes that every chunk carries in front of its payload.
pub(crate) const CHUNK_HEADER_SIZE: usize = mem::size_of::<Chunk>();

/// Alignment of every header the heap writes into the arena. Chunk and
/// block sizes are kept a multiple of this so carving never produces a
/// misaligned header.
pub(crate) const CHUNK_ALIGN: usize = mem::align_of::<Chunk>();

/// Smallest total size a chunk can have.
///
/// When a chunk is freed, its payload has to hold the free-list node that
/// enqueues it for recycling (see [`crate::freelist::FreeList`]). Requests
/// smaller than this floor are rounded up, which also means a zero byte
/// request gets real memory instead of being rejected.
pub(crate) const MIN_CHUNK_SIZE: usize = CHUNK_HEADER_SIZE + mem::size_of::<FreedNode>();

bitflags! {
    /// Allocation state of a chunk. One bit today; a corruption canary is a
    /// candidate for another.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct ChunkFlags: u32 {
        const ALLOCATED = 1;
    }
}

/// Header of every allocation carved out of a block.
///
/// If the header lives at address `M`, the caller receives
/// `M + CHUNK_HEADER_SIZE`. The header persists for the chunk's entire
/// lifetime; only the [`ChunkFlags::ALLOCATED`] bit flips as the chunk
/// moves between the allocated state and the free-list.
///
/// ```text
/// +--------------------+ <---- chunk address
/// |  block (backref)   |
/// |  size              |  -> Header
/// |  flags             |
/// +--------------------+ <---- payload address handed to the caller
/// |      Payload       |
/// |        ...         |  -> while freed, the first bytes hold the
/// |        ...         |     free-list node instead of caller data
/// +--------------------+
/// ```
#[repr(C)]
pub(crate) struct Chunk {
    /// The block this chunk was carved from. Non-owning: chunks never
    /// outlive their block, and blocks live for the life of the heap.
    pub block: NonNull<Node<Block>>,
    /// Total size in bytes, inclusive of this header.
    pub size: usize,
    /// Allocation state.
    pub flags: ChunkFlags,
}

impl Chunk {
    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.flags.contains(ChunkFlags::ALLOCATED)
    }

    /// Re-establishes the header of the chunk whose payload starts at `ptr`.
    ///
    /// **SAFETY**: `ptr` must be a payload pointer previously produced by
    /// [`Chunk::payload`].
    #[inline]
    pub unsafe fn from_payload(ptr: NonNull<u8>) -> NonNull<Chunk> {
        unsafe { NonNull::new_unchecked(ptr.as_ptr().sub(CHUNK_HEADER_SIZE)).cast() }
    }

    /// Address of the payload region immediately following the header.
    ///
    /// **SAFETY**: `chunk` must point at a live chunk header inside the
    /// arena.
    #[inline]
    pub unsafe fn payload(chunk: NonNull<Chunk>) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(chunk.as_ptr().cast::<u8>().add(CHUNK_HEADER_SIZE)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_chunk_fits_a_freed_node() {
        assert!(MIN_CHUNK_SIZE >= CHUNK_HEADER_SIZE + mem::size_of::<FreedNode>());
        assert_eq!(MIN_CHUNK_SIZE % CHUNK_ALIGN, 0);
    }

    #[test]
    fn payload_round_trips_to_header() {
        let mut storage = [0u64; 8];
        let chunk = NonNull::new(storage.as_mut_ptr()).unwrap().cast::<Chunk>();

        unsafe {
            let payload = Chunk::payload(chunk);
            assert_eq!(Chunk::from_payload(payload), chunk);
        }
    }
}
