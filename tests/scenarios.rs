//! Integration tests for the six concrete scenarios the allocator is
//! expected to satisfy end to end, through the public `SlabMulti` facade
//! only.

use slab_multi::SlabMulti;
use std::ptr::NonNull;
use std::sync::mpsc;
use std::thread;

#[test]
fn single_thread_churn() {
    let alloc: SlabMulti<[u8; 64]> = SlabMulti::new();
    let mut ptrs: Vec<NonNull<[u8; 64]>> = (0..10_000).map(|_| alloc.allocate(1).unwrap()).collect();

    // A cheap shuffle: reverse in chunks so the free order doesn't match
    // the allocation order.
    for chunk in ptrs.chunks_mut(7) {
        chunk.reverse();
    }

    for ptr in ptrs {
        alloc.deallocate(ptr, 1);
    }

    // No crash, no double-free assertion failure; a final allocate/free
    // still works cleanly.
    let ptr = alloc.allocate(1).unwrap();
    alloc.deallocate(ptr, 1);
}

#[test]
fn cross_thread_free() {
    let alloc: SlabMulti<[u8; 128]> = SlabMulti::new();
    let ptrs: Vec<NonNull<[u8; 128]>> = (0..1_024).map(|_| alloc.allocate(1).unwrap()).collect();
    let addrs: Vec<usize> = ptrs.iter().map(|p| p.as_ptr() as usize).collect();

    let handle = thread::spawn(move || {
        let alloc: SlabMulti<[u8; 128]> = SlabMulti::new();
        for addr in addrs {
            let ptr = NonNull::new(addr as *mut [u8; 128]).unwrap();
            alloc.deallocate(ptr, 1);
        }
    });
    handle.join().unwrap();

    // The owning thread's next allocator call opportunistically drains
    // the registry backlog left by the foreign frees above.
    let ptr = alloc.allocate(1).unwrap();
    alloc.deallocate(ptr, 1);
}

#[test]
fn interleaved_contention() {
    const THREADS: usize = 4;
    const OPS: usize = 25_000;

    let alloc: SlabMulti<[u8; 256]> = SlabMulti::new();
    let (tx, rx) = mpsc::channel::<usize>();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let tx = tx.clone();
            let rx_alloc: SlabMulti<[u8; 256]> = alloc;
            thread::spawn(move || {
                for i in 0..OPS {
                    let ptr = rx_alloc.allocate(1).unwrap();
                    if i % 2 == 0 {
                        // Free locally.
                        rx_alloc.deallocate(ptr, 1);
                    } else {
                        // Hand off for a foreign free elsewhere.
                        tx.send(ptr.as_ptr() as usize).unwrap();
                    }
                }
            })
        })
        .collect();
    drop(tx);

    let drainer = thread::spawn(move || {
        let alloc: SlabMulti<[u8; 256]> = alloc;
        for addr in rx {
            let ptr = NonNull::new(addr as *mut [u8; 256]).unwrap();
            alloc.deallocate(ptr, 1);
        }
    });

    for h in handles {
        h.join().unwrap();
    }
    drainer.join().unwrap();

    // Final opportunistic drain on the original thread clears any
    // remaining backlog left by the handoff above.
    let ptr = alloc.allocate(1).unwrap();
    alloc.deallocate(ptr, 1);
}

#[test]
fn size_class_fallthrough() {
    let alloc: SlabMulti<u8> = SlabMulti::new();
    let big = slab_multi::config::SLAB_SIZE * 2;
    let ptr = alloc.allocate(big).unwrap();
    alloc.deallocate(ptr, big);
}

#[test]
fn shared_mutex_reader_fairness() {
    use slab_multi::sync::ContentionFreeRwLock;

    const READERS: usize = 16;
    const READER_ITERS: usize = 50_000;
    const WRITER_ITERS: usize = 1_000;

    let lock: std::sync::Arc<ContentionFreeRwLock<u64, 32>> =
        std::sync::Arc::new(ContentionFreeRwLock::new(0));

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let lock = std::sync::Arc::clone(&lock);
            thread::spawn(move || {
                for _ in 0..READER_ITERS {
                    let _g = lock.read();
                }
            })
        })
        .collect();

    let writer = {
        let lock = std::sync::Arc::clone(&lock);
        thread::spawn(move || {
            for i in 0..WRITER_ITERS {
                let mut g = lock.write();
                *g = i as u64;
            }
        })
    };

    for r in readers {
        r.join().unwrap();
    }
    writer.join().unwrap();
}

#[test]
fn dispatcher_growth() {
    let alloc: SlabMulti<[u8; 64]> = SlabMulti::new();
    let slabs_per_superblock = slab_multi::config::SUPERBLOCK_SIZE / slab_multi::config::SLAB_SIZE;
    let blocks_per_slab = slab_multi::config::SLAB_SIZE / 64;
    let total = slab_multi::config::INIT_SUPERBLOCKS * slabs_per_superblock * blocks_per_slab + 1;

    let mut ptrs = Vec::with_capacity(total);
    for _ in 0..total {
        ptrs.push(alloc.allocate(1).unwrap());
    }

    let mut addrs: Vec<usize> = ptrs.iter().map(|p| p.as_ptr() as usize).collect();
    addrs.sort_unstable();
    addrs.dedup();
    assert_eq!(addrs.len(), ptrs.len(), "every allocation must be distinct");

    for ptr in ptrs {
        alloc.deallocate(ptr, 1);
    }
}
