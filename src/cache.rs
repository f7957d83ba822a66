//! Per-thread, per-size-class collection of [`Slab`]s with an active
//! allocation cursor.
//!
//! An allocation always comes from the slab at `active`; when that slab
//! fills up a new one is pushed in front of it so the cursor keeps
//! pointing at a non-full slab. A deallocation scans outward from the
//! cursor (the slabs most likely to contain recently-allocated memory)
//! and, once it lands, may splice the freed-into slab closer to the
//! front or release it back to the dispatcher entirely.

use std::ptr::NonNull;

use crate::config::{FREE_THRESHOLD_PERCENT, MIN_SLABS};
use crate::slab::Slab;

/// One size class's worth of slabs for a single thread.
pub struct Cache {
    block_size: usize,
    count: usize,
    /// Slabs whose occupancy is at or below this are eligible to be
    /// spliced forward (closer to the cursor) on a deallocation that
    /// empties them further, or released once fully empty.
    threshold: usize,
    slabs: Vec<Slab>,
    /// Index into `slabs` of the slab currently serving allocations.
    active: usize,
    /// Live allocations across every slab in this cache.
    in_use: usize,
    /// Total block capacity across every slab in this cache (`slabs.len()
    /// * count`, tracked incrementally rather than recomputed).
    capacity: usize,
}

impl Cache {
    pub fn new(block_size: usize, count: usize) -> Self {
        let threshold = count * FREE_THRESHOLD_PERCENT / 100;
        let mut slabs = Vec::new();
        slabs.push(Slab::new(block_size, count));
        Self {
            block_size,
            count,
            threshold,
            slabs,
            active: 0,
            in_use: 0,
            capacity: count,
        }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Allocate one block from the active slab, growing the cache with a
    /// fresh slab if the active one is exhausted.
    pub fn allocate(&mut self) -> NonNull<u8> {
        let (ptr, became_full) = self.slabs[self.active].allocate();

        if became_full {
            if self.active > 0 {
                // `release_if_warranted` always splices a freed-into slab
                // to just left of the cursor, so the slab one before
                // `active` is guaranteed non-full; step back onto it.
                self.active -= 1;
            } else {
                // No room before the active slab: add a new one and swap
                // it into the active slot, pushing the now-full slab
                // behind it.
                let idx = self.active;
                self.slabs.push(Slab::new(self.block_size, self.count));
                self.capacity += self.count;
                let last = self.slabs.len() - 1;
                self.slabs.swap(idx, last);
            }
        }

        self.in_use += 1;
        ptr
    }

    /// Try to deallocate `ptr` into one of this cache's slabs. Returns
    /// `false` if `ptr` does not belong to any slab in this cache.
    pub fn deallocate(&mut self, ptr: NonNull<u8>) -> bool {
        let len = self.slabs.len();
        let mut i = self.active;
        loop {
            if self.slabs[i].contains(ptr) {
                // SAFETY: caller guarantees `ptr` was issued by this
                // cache and not already freed; `contains` narrowed the
                // slab that issued it.
                unsafe { self.slabs[i].deallocate(ptr) };
                self.release_if_warranted(i);
                self.in_use -= 1;
                return true;
            }
            i = (i + 1) % len;
            if i == self.active {
                return false;
            }
        }
    }

    /// After a deallocation into slab `i`, possibly move it closer to the
    /// cursor or release it back to the dispatcher.
    fn release_if_warranted(&mut self, i: usize) {
        let slab = &self.slabs[i];

        if slab.size() <= self.threshold && i > self.active {
            // Move the lightly-occupied slab into the cursor's current
            // position and advance the cursor past it, so it ends up just
            // to the left of the cursor -- the first place `allocate`
            // steps back onto once the cursor's own slab fills up.
            self.slabs[self.active..=i].rotate_right(1);
            self.active += 1;
            return;
        }

        if slab.empty() && self.slabs.len() > MIN_SLABS && self.in_use > self.capacity - self.count {
            self.capacity -= self.count;
            match i.cmp(&self.active) {
                std::cmp::Ordering::Less => {
                    // Order-preserving removal: everything between `i` and
                    // the cursor shifts down by one, so the cursor tracks
                    // the same slab it pointed at before, just at index - 1.
                    self.slabs.remove(i);
                    self.active -= 1;
                }
                std::cmp::Ordering::Equal => {
                    // The active slab itself emptied out. Order past the
                    // cursor doesn't matter, so swap with the back and pop;
                    // the cursor moves to whatever now occupies the back.
                    self.slabs.swap_remove(i);
                    self.active = self.slabs.len() - 1;
                }
                std::cmp::Ordering::Greater => {
                    // Unreachable: the threshold branch above always
                    // claims an empty slab past the cursor first, since
                    // empty implies size() <= threshold. Kept for
                    // defensiveness if that invariant ever changes; the
                    // cursor itself is untouched since it sits before `i`.
                    self.slabs.swap_remove(i);
                }
            }
        }
    }

    /// True if every slab in this cache holds zero live allocations.
    pub fn is_empty(&self) -> bool {
        self.slabs.iter().all(|s| s.empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SLAB_SIZE;

    fn blocks_per_slab(block_size: usize) -> usize {
        SLAB_SIZE / block_size
    }

    #[test]
    fn allocate_and_deallocate_round_trip() {
        let mut cache = Cache::new(64, blocks_per_slab(64));
        let ptr = cache.allocate();
        assert!(cache.deallocate(ptr));
        assert!(cache.is_empty());
    }

    #[test]
    fn grows_past_one_slab() {
        let count = blocks_per_slab(64);
        let mut cache = Cache::new(64, count);
        let mut ptrs = Vec::new();
        for _ in 0..(count + 1) {
            ptrs.push(cache.allocate());
        }
        assert_eq!(cache.slabs.len(), 2);
        for ptr in ptrs {
            assert!(cache.deallocate(ptr));
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn deallocate_of_foreign_pointer_fails() {
        let count = blocks_per_slab(64);
        let mut cache = Cache::new(64, count);
        let other = Cache::new(64, count);
        let foreign_ptr = {
            let mut other = other;
            other.allocate()
        };
        assert!(!cache.deallocate(foreign_ptr));
    }

    #[test]
    fn excess_empty_slabs_are_released() {
        let count = blocks_per_slab(128);
        let mut cache = Cache::new(128, count);
        let mut ptrs = Vec::new();
        for _ in 0..(count * 2) {
            ptrs.push(cache.allocate());
        }
        assert_eq!(cache.slabs.len(), 2);

        // Drain the second slab entirely; it should be released, leaving
        // at least MIN_SLABS behind.
        for ptr in ptrs.drain(count..) {
            cache.deallocate(ptr);
        }
        assert!(cache.slabs.len() <= 2);

        for ptr in ptrs {
            cache.deallocate(ptr);
        }
    }

    #[test]
    fn splice_never_leaves_a_full_slab_left_of_the_cursor() {
        let count = blocks_per_slab(64);
        let mut cache = Cache::new(64, count);
        let mut ptrs = Vec::new();
        for _ in 0..(count * 4) {
            ptrs.push(cache.allocate());
        }

        // Free out of allocation order so slabs empty independently of the
        // cursor's position, forcing splices and releases rather than a
        // simple LIFO drain.
        for chunk in ptrs.chunks_mut(5) {
            chunk.reverse();
        }
        let mut live = ptrs;
        for _ in 0..(count * 2) {
            let ptr = live.pop().unwrap();
            cache.deallocate(ptr);
        }

        // If a splice or release ever left a full slab at `active - 1`,
        // one of these allocations lands on it and `Slab::allocate` panics.
        for _ in 0..(count * 2) {
            live.push(cache.allocate());
        }

        for ptr in live {
            cache.deallocate(ptr);
        }
    }

    #[test]
    fn churn_never_panics() {
        let count = blocks_per_slab(256);
        let mut cache = Cache::new(256, count);
        let mut live = Vec::new();
        for round in 0..500 {
            if round % 3 == 0 && !live.is_empty() {
                let ptr = live.pop().unwrap();
                assert!(cache.deallocate(ptr));
            } else {
                live.push(cache.allocate());
            }
        }
        for ptr in live {
            cache.deallocate(ptr);
        }
    }
}
