//! Global dispatcher: carves process-wide superblocks into slab-sized
//! regions and hands them out to [`crate::slab::Slab`] on demand.
//!
//! There is exactly one dispatcher per process (accessed through
//! [`dispatcher`]), guarded by a single [`SpinMutex`]. Contention here is
//! expected to be rare: most allocation traffic never touches the
//! dispatcher once a thread's caches are warm.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

use crate::config::{INIT_SUPERBLOCKS, SLAB_SIZE, SUPERBLOCK_SIZE};
use crate::stat_inc;
use crate::sync::SpinMutex;

struct Inner {
    /// Free slab-sized regions, carved out of superblocks, ready to hand
    /// to a [`crate::slab::Slab`].
    free_slabs: Vec<NonNull<u8>>,
    /// Every superblock this process has ever requested from the system
    /// allocator, retained so they can be released on drop.
    superblocks: Vec<NonNull<u8>>,
}

// `NonNull<u8>` pointers here always originate from `std::alloc::alloc`
// on this process and are never aliased mutably; the dispatcher is the
// sole owner until a slab claims one.
unsafe impl Send for Inner {}

/// Process-wide carve-and-hand-out allocator for slab-sized regions.
pub struct Dispatcher {
    inner: SpinMutex<Inner>,
}

fn superblock_layout() -> Layout {
    Layout::from_size_align(SUPERBLOCK_SIZE, SUPERBLOCK_SIZE)
        .expect("SUPERBLOCK_SIZE is a validated power of two")
}

impl Inner {
    /// Request `count` more superblocks from the system allocator and
    /// carve each into `SUPERBLOCK_SIZE / SLAB_SIZE` free slab regions.
    fn grow(&mut self, count: usize) {
        let layout = superblock_layout();
        for _ in 0..count {
            // SAFETY: `layout` has non-zero size.
            let raw = unsafe { alloc(layout) };
            let base = NonNull::new(raw).expect("system allocator exhausted");
            self.superblocks.push(base);

            let mut offset = 0;
            while offset < SUPERBLOCK_SIZE {
                // SAFETY: `offset` stays within the superblock's allocation.
                let slab_ptr = unsafe { base.as_ptr().add(offset) };
                self.free_slabs
                    .push(NonNull::new(slab_ptr).expect("non-null base plus offset"));
                offset += SLAB_SIZE;
            }
        }
        stat_inc!(dispatcher_growths);
    }
}

impl Dispatcher {
    pub const fn new() -> Self {
        Self {
            inner: SpinMutex::new(Inner {
                free_slabs: Vec::new(),
                superblocks: Vec::new(),
            }),
        }
    }

    /// Hand out one slab-sized memory region, growing the dispatcher from
    /// the system allocator if none are free.
    pub fn get_block(&self) -> NonNull<u8> {
        let mut inner = self.inner.lock();
        if inner.free_slabs.is_empty() {
            inner.grow(INIT_SUPERBLOCKS);
        }
        inner
            .free_slabs
            .pop()
            .expect("grow() always leaves at least one free slab")
    }

    /// Return a slab-sized region for reuse by a future [`Self::get_block`].
    pub fn return_block(&self, block: NonNull<u8>) {
        self.inner.lock().free_slabs.push(block);
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let inner = self.inner.lock();
        let layout = superblock_layout();
        for base in &inner.superblocks {
            // SAFETY: every superblock was allocated with the same layout
            // and is dropped exactly once, here.
            unsafe { dealloc(base.as_ptr(), layout) };
        }
    }
}

unsafe impl Sync for Dispatcher {}

/// The single process-wide dispatcher.
pub static DISPATCHER: Dispatcher = Dispatcher::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_return_block_round_trips() {
        let d = Dispatcher::new();
        let block = d.get_block();
        d.return_block(block);
        let block2 = d.get_block();
        assert_eq!(block, block2);
    }

    #[test]
    fn grows_when_exhausted() {
        let d = Dispatcher::new();
        let slabs_per_superblock = SUPERBLOCK_SIZE / SLAB_SIZE;
        let mut blocks = Vec::new();
        for _ in 0..(slabs_per_superblock * INIT_SUPERBLOCKS + 1) {
            blocks.push(d.get_block());
        }
        // No duplicate regions handed out.
        let mut sorted: Vec<_> = blocks.iter().map(|p| p.as_ptr() as usize).collect();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), blocks.len());
        for b in blocks {
            d.return_block(b);
        }
    }
}
