//! Walks through the three allocation paths: bump, recycle, grow.

use fixedheap::{Heap, HeapConfig};

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Trace)
        .init()
        .unwrap();

    let mut heap = Heap::with_config(HeapConfig {
        top: 0x9000,
        bottom: 0x6000,
        min_block_size: 0x1000,
    })
    .expect("heap configuration rejected");

    // Three bump allocations out of the first block.
    let a = heap.allocate(8).expect("out of memory");
    let b = heap.allocate(64).expect("out of memory");
    let c = heap.allocate(64).expect("out of memory");
    println!("a = {a:p}  b = {b:p}  c = {c:p}");

    unsafe {
        a.as_ptr().cast::<u64>().write(0xDEAD_BEEF);
        println!("a holds {:#x}", a.as_ptr().cast::<u64>().read());
    }

    // Free the middle one and ask for the same size again: recycled.
    unsafe { heap.free(b) };
    let again = heap.allocate(64).expect("out of memory");
    println!("b = {b:p} reallocated at {again:p} (recycled: {})", again == b);

    // A request too big for the remaining block space grows the heap.
    let big = heap.allocate(0xF00).expect("out of memory");
    println!("big = {big:p} (below the first block)");

    unsafe {
        heap.free(a);
        heap.free(c);
        heap.free(again);
        heap.free(big);
    }

    println!("{heap:#?}");
}
