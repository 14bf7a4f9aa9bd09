//! Exercises the heap the way a diagnostics consumer would: fill it with
//! odd-sized allocations, run a steady-state alloc/free loop, then poke at
//! the failure and double-free policies, printing usage and availability
//! after each phase.

use fixedheap::{Heap, HeapConfig};

fn report(heap: &Heap, phase: &str) {
    let usage = heap.usage();
    let available = heap.available();

    println!(
        "{phase}: used=[{} bytes in {} blocks, {} carved]  avail=[{} headroom, {} unbumped, {} freed]",
        usage.total_bytes,
        usage.blocks,
        usage.carved_bytes,
        available.headroom,
        available.unbumped,
        available.freed,
    );
}

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init()
        .unwrap();

    // 256 KiB span carved in 1 KiB blocks: plenty of block overhead to
    // make the usage numbers interesting.
    let span: usize = (1 << 16) * 4;
    let mut heap = Heap::with_config(HeapConfig {
        top: 0x10_0000,
        bottom: 0x10_0000 - span,
        min_block_size: 1 << 10,
    })
    .expect("heap configuration rejected");

    report(&heap, "configured");

    // Fill with growing odd sizes.
    let mut held = Vec::new();
    for i in 0..512usize {
        match heap.allocate(i + 13) {
            Some(ptr) => {
                unsafe { ptr.as_ptr().write(b'I') };
                held.push(ptr);
            }
            None => {
                println!("heap full after {i} allocations");
                break;
            }
        }
    }
    report(&heap, "filled");

    // Allocating and freeing the same size must not grow the heap.
    let warm = heap.allocate(128).expect("out of memory");
    unsafe { heap.free(warm) };
    let blocks_before = heap.usage().blocks;
    for _ in 0..1000 {
        let ptr = heap.allocate(128).expect("steady state ran out of memory");
        unsafe {
            ptr.as_ptr().write(b'J');
            heap.free(ptr);
        }
    }
    assert_eq!(heap.usage().blocks, blocks_before);
    report(&heap, "steady state");

    // Something too big for the whole span.
    let toobig = heap.allocate(span + 1);
    println!("too big -> {toobig:?}");

    // Double-free is absorbed; the chunk is recycled once.
    let smaller = heap.allocate(1025).expect("out of memory");
    unsafe {
        heap.free(smaller);
        heap.free(smaller); // gasp, double-free
    }
    let recycled = heap.allocate(1025).expect("out of memory");
    let fresh = heap.allocate(1025).expect("out of memory");
    println!(
        "recycled at {recycled:p} (same: {}), fresh at {fresh:p} (same: {})",
        recycled == smaller,
        fresh == smaller,
    );

    for ptr in held {
        unsafe { heap.free(ptr) };
    }
    report(&heap, "drained");
}
