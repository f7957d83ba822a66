//! Size class table and lookup functions.
//!
//! Requests are bucketed into one of [`config::NUM_CACHES`] fixed size
//! classes, doubling from [`config::SMALLEST_CACHE`] up to
//! [`config::LARGEST_CACHE`]. A request larger than the largest class
//! bypasses the caches entirely and falls through to the system allocator.

use crate::config::{LARGEST_CACHE, NUM_CACHES, SMALLEST_CACHE};

/// Sentinel returned by [`size_to_class`] for a request too large for any
/// cache; the caller must fall through to the system allocator.
pub const OVERFLOW: usize = usize::MAX;

/// The size (in bytes) served by each class, ascending.
pub static CLASS_SIZES: [usize; NUM_CACHES] = const {
    let mut sizes = [0usize; NUM_CACHES];
    let mut i = 0;
    while i < NUM_CACHES {
        sizes[i] = SMALLEST_CACHE << i;
        i += 1;
    }
    sizes
};

/// Lookup table covering every size up to [`LARGEST_CACHE`], indexed by
/// `(size - 1) / SMALLEST_CACHE` for sizes that fit inside the smallest
/// class's doubling range; built at compile time the same way the smaller
/// classes are indexed by a flat array rather than a scan.
const LOOKUP_LEN: usize = LARGEST_CACHE / SMALLEST_CACHE;

static LOOKUP: [u8; LOOKUP_LEN] = const {
    let mut table = [0u8; LOOKUP_LEN];
    let mut i = 0;
    while i < LOOKUP_LEN {
        let size = (i + 1) * SMALLEST_CACHE;
        let mut cls = 0u8;
        while (cls as usize) < NUM_CACHES {
            if CLASS_SIZES[cls as usize] >= size {
                break;
            }
            cls += 1;
        }
        table[i] = cls;
        i += 1;
    }
    table
};

/// Map a requested allocation size to a size-class index, or [`OVERFLOW`]
/// if no class is large enough.
#[inline]
pub fn size_to_class(size: usize) -> usize {
    let size = size.max(1);
    if size > LARGEST_CACHE {
        return OVERFLOW;
    }
    let idx = (size - 1) / SMALLEST_CACHE;
    LOOKUP[idx] as usize
}

/// Get the block size served by a size-class index.
#[inline]
pub fn class_to_size(cls: usize) -> usize {
    CLASS_SIZES[cls]
}
