use std::ptr::NonNull;

use crate::{
    chunk::{Chunk, ChunkFlags},
    list::{List, Node},
};

/// The node that enqueues a freed chunk for recycling.
///
/// It is written into what was the chunk's payload, right after the header,
/// so keeping a chunk on the free-list costs no memory of its own. This is
/// also what bounds the minimum chunk size: every chunk must be able to
/// hold one of these once it is freed (see [`crate::chunk::MIN_CHUNK_SIZE`]).
pub(crate) type FreedNode = Node<NonNull<Chunk>>;

/// Per-block list of freed chunks.
///
/// ```text
///              Block
/// +--------------------------------------------------------------+
/// |  header  | chunk | chunk(freed) | chunk | chunk(freed) | ... |
/// |  free ---------------^   ^---------------------|             |
/// +--------------------------------------------------------------+
///                        node in payload    node in payload
/// ```
///
/// Freed chunks are pushed at the head, so the list carries no ordering
/// guarantee; recycling takes the first chunk whose size falls into the
/// requested window.
pub(crate) struct FreeList {
    items: List<NonNull<Chunk>>,
}

impl FreeList {
    pub const fn new() -> Self {
        Self { items: List::new() }
    }

    /// Pushes `chunk` onto the head of the list and marks it freed. The
    /// list node is written into the chunk's payload.
    ///
    /// **SAFETY**: `chunk` must point at a live chunk header of at least
    /// [`crate::chunk::MIN_CHUNK_SIZE`] total bytes, not already enqueued.
    pub unsafe fn push(&mut self, chunk: NonNull<Chunk>) {
        unsafe {
            (*chunk.as_ptr()).flags.remove(ChunkFlags::ALLOCATED);
            let slot = Chunk::payload(chunk);
            self.items.push_front(chunk, slot);
        }
    }

    /// First-fit search for a freed chunk whose total size lies in
    /// `[min, max]`, both inclusive. A match is unlinked from the list and
    /// returned still marked as freed; the caller flips its state.
    ///
    /// **SAFETY**: every enqueued chunk must still be a live freed chunk.
    pub unsafe fn take_in_window(&mut self, min: usize, max: usize) -> Option<NonNull<Chunk>> {
        let mut current = self.items.first();

        while let Some(node) = current {
            unsafe {
                let chunk = node.as_ref().data;
                let size = chunk.as_ref().size;

                if size >= min && size <= max {
                    self.items.remove(node);
                    return Some(chunk);
                }

                current = node.as_ref().next;
            }
        }

        None
    }

    /// Total bytes sitting in this list, chunk headers included.
    pub fn total_bytes(&self) -> usize {
        self.items
            .iter()
            .map(|chunk| unsafe { chunk.as_ref().size })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{CHUNK_HEADER_SIZE, MIN_CHUNK_SIZE};

    /// Writes a fake chunk header at `offset` into `storage` and returns it.
    /// The block back-reference is dangling; nothing in the free-list
    /// follows it.
    unsafe fn fake_chunk(storage: &mut [u64], offset: usize, size: usize) -> NonNull<Chunk> {
        assert!(size >= MIN_CHUNK_SIZE);
        let chunk = unsafe {
            NonNull::new_unchecked(storage.as_mut_ptr().cast::<u8>().add(offset)).cast::<Chunk>()
        };

        unsafe {
            chunk.as_ptr().write(Chunk {
                block: NonNull::dangling(),
                size,
                flags: ChunkFlags::ALLOCATED,
            });
        }

        chunk
    }

    #[test]
    fn push_clears_the_allocated_flag() {
        let mut storage = [0u64; 32];
        let mut list = FreeList::new();

        unsafe {
            let chunk = fake_chunk(&mut storage, 0, MIN_CHUNK_SIZE);
            list.push(chunk);

            assert!(!chunk.as_ref().is_allocated());
        }
        assert_eq!(list.total_bytes(), MIN_CHUNK_SIZE);
    }

    #[test]
    fn window_takes_first_fit_and_unlinks_it() {
        let mut storage = [0u64; 64];
        let mut list = FreeList::new();

        let small = MIN_CHUNK_SIZE;
        let large = MIN_CHUNK_SIZE + 4 * CHUNK_HEADER_SIZE;

        unsafe {
            let a = fake_chunk(&mut storage, 0, small);
            let b = fake_chunk(&mut storage, 128, large);
            let c = fake_chunk(&mut storage, 320, small);
            list.push(a);
            list.push(b);
            list.push(c);

            // Only `b` falls into this window.
            let taken = list.take_in_window(large, large * 2).unwrap();
            assert_eq!(taken, b);
            assert_eq!(list.total_bytes(), small * 2);

            // Head insertion means `c` is scanned before `a`.
            let taken = list.take_in_window(small, small).unwrap();
            assert_eq!(taken, c);

            // Nothing in an impossible window.
            assert!(list.take_in_window(large * 4, large * 8).is_none());
            assert_eq!(list.total_bytes(), small);
        }
    }
}
