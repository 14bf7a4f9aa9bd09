use std::{fmt, ptr::NonNull};

use log::{debug, trace};

use crate::{
    arena::Arena,
    block::{Block, BLOCK_HEADER_SIZE},
    chunk::{Chunk, ChunkFlags, CHUNK_ALIGN, CHUNK_HEADER_SIZE, MIN_CHUNK_SIZE},
    list::{List, Node},
    utils::align_down,
};

/// Heap boundaries and growth tuning.
///
/// The fields are named to make the parameter roles unmistakable: `top` is
/// the highest address of the span, `bottom` the lowest, and blocks are
/// carved downward from `top` toward `bottom` in units of at least
/// `min_block_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Highest address of the heap span. The first block ends here.
    pub top: usize,
    /// Lowest address of the heap span. Growth stops strictly above it.
    pub bottom: usize,
    /// Minimum size of a block. A single request larger than this gets a
    /// block of its own, sized to fit.
    pub min_block_size: usize,
}

impl Default for HeapConfig {
    /// The built-in boundaries used when no explicit configuration is
    /// given: a 192 KiB span with 8 KiB blocks.
    fn default() -> Self {
        Self {
            top: 0x7_FFFF,
            bottom: 0x5_0000,
            min_block_size: 8192,
        }
    }
}

/// Why a heap could not be configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// `bottom` exceeds `top`, or the span between them cannot hold even
    /// one block of `min_block_size` bytes.
    InvalidBounds,
    /// The platform refused to reserve the arena backing the span.
    ReserveFailed,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::InvalidBounds => write!(f, "heap bounds are inverted or too small"),
            HeapError::ReserveFailed => write!(f, "platform refused the arena reservation"),
        }
    }
}

impl std::error::Error for HeapError {}

/// Space taken by the heap's structures, utilized or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapUsage {
    /// Bytes spanned by all blocks: headers, carved chunks and unbumped
    /// tails.
    pub total_bytes: usize,
    /// Number of blocks created so far.
    pub blocks: usize,
    /// Bytes carved out of blocks, allocated or freed, block headers not
    /// included.
    pub carved_bytes: usize,
}

/// Memory the heap could still hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapAvailability {
    /// Unused span between the lowest block and the bottom boundary, i.e.
    /// room for growth.
    pub headroom: usize,
    /// Unbumped bytes summed over all blocks.
    pub unbumped: usize,
    /// Bytes sitting in free-lists summed over all blocks, headers
    /// included.
    pub freed: usize,
}

/// A fixed-span heap that grows downward in block units.
///
/// The heap owns one contiguous arena reserved at configuration time;
/// blocks are carved out of it from the top down, chunks are carved out of
/// blocks bottom-up, and freed chunks are recycled through per-block
/// free-lists. Nothing is ever returned to the platform until the heap
/// itself is dropped.
///
/// A `Heap` is a plain owned value: independent heaps can coexist, and all
/// operations take `&self`/`&mut self`. It is deliberately neither `Send`
/// nor `Sync` — the target environment has a single execution context, so
/// callers that need sharing must serialize access externally.
///
/// Dropping the heap releases the arena; every pointer it ever returned
/// becomes dangling at that point.
///
/// ```
/// use fixedheap::{Heap, HeapConfig};
///
/// let mut heap = Heap::with_config(HeapConfig {
///     top: 0x8000,
///     bottom: 0x6000,
///     min_block_size: 0x1000,
/// })
/// .unwrap();
///
/// let ptr = heap.allocate(100).expect("out of memory");
/// unsafe { heap.free(ptr) };
/// ```
pub struct Heap {
    /// All blocks in creation order; the tail is the lowest-addressed one.
    blocks: List<Block>,
    arena: Arena,
    /// Span usable for blocks, aligned down so every block start stays
    /// aligned for its header.
    usable: usize,
    min_block_size: usize,
    config: HeapConfig,
}

impl Heap {
    /// A heap over the built-in default boundaries.
    pub fn new() -> Result<Self, HeapError> {
        Self::with_config(HeapConfig::default())
    }

    /// Configures a heap over `config`'s boundaries.
    ///
    /// The span `top - bottom` is reserved whole; the block list starts
    /// empty. Rejects bounds where `bottom` exceeds `top` or where the span
    /// is smaller than one block.
    pub fn with_config(config: HeapConfig) -> Result<Self, HeapError> {
        if config.bottom > config.top || config.top - config.bottom < config.min_block_size {
            return Err(HeapError::InvalidBounds);
        }

        let span = config.top - config.bottom;
        let arena = Arena::reserve(span).ok_or(HeapError::ReserveFailed)?;

        debug!(
            "heap: configured span {span:#x}, min block {:#x}",
            config.min_block_size
        );

        Ok(Self {
            blocks: List::new(),
            arena,
            usable: align_down(span, CHUNK_ALIGN),
            min_block_size: config.min_block_size,
            config,
        })
    }

    /// The boundaries this heap was configured with.
    pub fn config(&self) -> HeapConfig {
        self.config
    }

    /// Allocates `size` bytes and returns the payload pointer, or `None`
    /// once growth would breach the bottom boundary. A zero `size` is
    /// coerced to the minimum chunk payload rather than rejected; the
    /// returned bytes are not zeroed.
    ///
    /// The request is satisfied in strict order: recycle a freed chunk,
    /// bump-allocate from an existing block, grow the heap by a new block.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let chunk_size = Self::chunk_size_for(size)?;

        // Previously freed memory first. A freed chunk is reusable for
        // requests down to half its size, so the waste per reuse stays
        // below the chunk's own size.
        if let Some(chunk) = self.recycle(chunk_size, chunk_size.saturating_mul(2)) {
            trace!("allocate({size}): recycled chunk at {:p}", chunk.as_ptr());
            return Some(unsafe { Chunk::payload(chunk) });
        }

        let node = self
            .block_with_capacity(chunk_size)
            .or_else(|| self.grow(chunk_size))?;

        let chunk = unsafe { Block::carve(node, chunk_size) };
        trace!("allocate({size}): carved chunk at {:p}", chunk.as_ptr());

        Some(unsafe { Chunk::payload(chunk) })
    }

    /// Releases the allocation at `ptr` back to its block's free-list.
    ///
    /// Freeing the same pointer twice is a no-op: a chunk whose allocated
    /// flag is already clear is left alone, so the free-list is never
    /// corrupted by a double enqueue. No coalescing takes place and no
    /// memory moves.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`Heap::allocate`] on this heap,
    /// and the caller must not use it again after this call. Passing any
    /// other pointer is undefined behavior — the heap has no way to detect
    /// a malformed pointer.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
        unsafe {
            let chunk = Chunk::from_payload(ptr);

            if !chunk.as_ref().is_allocated() {
                trace!("free({:p}): already freed, ignoring", ptr.as_ptr());
                return;
            }

            let mut block = chunk.as_ref().block;
            block.as_mut().data.free.push(chunk);

            trace!(
                "free({:p}): {} bytes back on the free-list",
                ptr.as_ptr(),
                chunk.as_ref().size
            );
        }
    }

    /// Space taken by the heap so far. Pure traversal, no side effects.
    pub fn usage(&self) -> HeapUsage {
        if self.blocks.is_empty() {
            return HeapUsage::default();
        }

        let mut total_bytes = 0;
        let mut carved_bytes = 0;

        for block in &self.blocks {
            total_bytes += block.size;
            carved_bytes += block.carved_bytes();
        }

        HeapUsage {
            total_bytes,
            blocks: self.blocks.len(),
            carved_bytes,
        }
    }

    /// Memory still available to this heap, split by where it sits. Pure
    /// traversal, no side effects.
    pub fn available(&self) -> HeapAvailability {
        let lowest = match self.blocks.last() {
            Some(node) => node.as_ptr() as usize,
            None => self.top_ptr().as_ptr() as usize,
        };

        let mut unbumped = 0;
        let mut freed = 0;

        for block in &self.blocks {
            unbumped += block.remaining;
            freed += block.free.total_bytes();
        }

        HeapAvailability {
            headroom: lowest - self.bottom_addr(),
            unbumped,
            freed,
        }
    }

    /// Total chunk size for a request of `n` payload bytes: header added,
    /// floored to the minimum chunk, rounded to header alignment. `None`
    /// if the size is not representable.
    fn chunk_size_for(n: usize) -> Option<usize> {
        let total = n.checked_add(CHUNK_HEADER_SIZE + CHUNK_ALIGN - 1)? & !(CHUNK_ALIGN - 1);
        Some(total.max(MIN_CHUNK_SIZE))
    }

    /// First-fit scan of every block's free-list, in block creation order,
    /// for a freed chunk whose total size lies in `[min, max]`.
    fn recycle(&mut self, min: usize, max: usize) -> Option<NonNull<Chunk>> {
        let mut current = self.blocks.first();

        while let Some(mut node) = current {
            unsafe {
                if let Some(chunk) = node.as_mut().data.free.take_in_window(min, max) {
                    (*chunk.as_ptr()).flags.insert(ChunkFlags::ALLOCATED);
                    return Some(chunk);
                }

                current = node.as_ref().next;
            }
        }

        None
    }

    /// First block in creation order with enough unbumped capacity.
    fn block_with_capacity(&self, chunk_size: usize) -> Option<NonNull<Node<Block>>> {
        let mut current = self.blocks.first();

        while let Some(node) = current {
            unsafe {
                if node.as_ref().data.fits(chunk_size) {
                    return Some(node);
                }

                current = node.as_ref().next;
            }
        }

        None
    }

    /// Materializes a new block below the lowest existing one, sized to at
    /// least the minimum block size and at least `chunk_size` plus the
    /// block header. Fails, touching nothing, if the block would start at
    /// or below the bottom boundary.
    fn grow(&mut self, chunk_size: usize) -> Option<NonNull<Node<Block>>> {
        let needed = chunk_size.checked_add(BLOCK_HEADER_SIZE + CHUNK_ALIGN - 1)? & !(CHUNK_ALIGN - 1);
        let size = needed.max(self.min_block_size);

        let start = match self.blocks.last() {
            Some(lowest) => lowest.cast::<u8>(),
            None => self.top_ptr(),
        };

        if size >= start.as_ptr() as usize - self.bottom_addr() {
            trace!("grow: {size:#x} byte block breaches the bottom boundary");
            return None;
        }

        let addr = unsafe { NonNull::new_unchecked(start.as_ptr().sub(size)) };
        let block = unsafe { Block::new(addr, size) };
        let node = unsafe { self.blocks.push_back(block, addr) };

        debug!("grow: new block at {:p}, {size:#x} bytes", addr.as_ptr());

        Some(node)
    }

    /// First byte past the usable span, backing the configured top
    /// boundary.
    fn top_ptr(&self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(self.arena.base().as_ptr().add(self.usable)) }
    }

    /// Real address backing the configured bottom boundary.
    fn bottom_addr(&self) -> usize {
        self.arena.base().as_ptr() as usize
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("config", &self.config)
            .field("usage", &self.usage())
            .field("available", &self.available())
            .finish()
    }
}
