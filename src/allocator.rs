//! The allocator facade: resolves the calling thread's [`Bucket`],
//! registering one on first use, and dispatches `allocate`/`deallocate`
//! with opportunistic registry drains.
//!
//! [`SlabMulti<T>`] is zero-sized; every mutable state lives in the
//! module-level statics [`BUCKETS`] and [`crate::registry::REGISTRY`].

use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::thread::ThreadId;

use crate::bucket::Bucket;
use crate::error::AllocError;
use crate::registry::REGISTRY;
use crate::size_class::{self, OVERFLOW};
use crate::smp::SmpVec;

struct BucketEntry {
    owner: ThreadId,
    bucket: std::cell::UnsafeCell<Bucket>,
}

// The owning thread is the only one that ever reaches into `bucket`
// (directly, via its cached pointer, or indirectly via its own registry
// drain). Other threads only ever read `owner` under the container's
// shared lock while searching for their own entry.
unsafe impl Send for BucketEntry {}
unsafe impl Sync for BucketEntry {}

/// Every thread's [`Bucket`], keyed by owning thread id. A dead thread's
/// entry is never removed -- see the dead-thread open question.
static BUCKETS: SmpVec<Box<BucketEntry>> = SmpVec::new();

thread_local! {
    /// Cached pointer into this thread's own `BucketEntry`, valid for as
    /// long as the process runs: `BUCKETS` only ever grows, and each
    /// entry is heap-allocated independently of the container's own
    /// backing storage.
    static MY_ENTRY: Cell<Option<NonNull<BucketEntry>>> = const { Cell::new(None) };
}

/// Resolve (registering on first use) the calling thread's bucket entry.
fn my_entry() -> NonNull<BucketEntry> {
    MY_ENTRY.with(|cell| {
        if let Some(ptr) = cell.get() {
            return ptr;
        }

        let owner = std::thread::current().id();
        let boxed = Box::new(BucketEntry {
            owner,
            bucket: std::cell::UnsafeCell::new(Bucket::new()),
        });
        // SAFETY: the boxed value's heap address does not move when the
        // `Box` itself is pushed into `BUCKETS`.
        let ptr = NonNull::from(&*boxed);
        BUCKETS.emplace(boxed);
        REGISTRY.register_thread(owner);

        cell.set(Some(ptr));
        ptr
    })
}

/// Run the registry's opportunistic drain against this thread's own
/// bucket, if it has any foreign deallocations pending.
fn drain_if_pending(entry: NonNull<BucketEntry>) {
    // SAFETY: `entry` always points at a `BucketEntry` owned by the
    // calling thread.
    let (owner, bucket) = unsafe { (&(*entry.as_ptr()).owner, &mut *(*entry.as_ptr()).bucket.get()) };
    if REGISTRY.has_pending(*owner) {
        REGISTRY.drain(*owner, |ptr, layout| bucket.deallocate(ptr, layout));
    }
}

/// A multi-threaded, size-class-indexed slab allocator for `T`.
///
/// Zero-sized: every `SlabMulti<T>` instance shares the same process-wide
/// buckets and registry, so all instances (of any element type) compare
/// equal and may be freely copied.
pub struct SlabMulti<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SlabMulti<T> {
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Allocate storage for `count` contiguous `T`s.
    pub fn allocate(&self, count: usize) -> Result<NonNull<T>, AllocError> {
        let layout = Layout::array::<T>(count).map_err(|_| AllocError)?;
        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }

        let entry = my_entry();
        drain_if_pending(entry);

        // SAFETY: `entry` points at this thread's own bucket.
        let bucket = unsafe { &mut *(*entry.as_ptr()).bucket.get() };
        let raw = bucket.allocate(layout).ok_or(AllocError)?;
        Ok(raw.cast())
    }

    /// Deallocate storage previously returned by [`Self::allocate`] with
    /// the same `count`.
    ///
    /// # Safety-adjacent contract
    /// `ptr` must have come from this allocator's `allocate(count)`; a
    /// mismatched `count` is undefined behavior, not a checked error.
    pub fn deallocate(&self, ptr: NonNull<T>, count: usize) {
        let Ok(layout) = Layout::array::<T>(count) else {
            return;
        };
        if layout.size() == 0 {
            return;
        }
        let raw = ptr.cast::<u8>();

        let entry = my_entry();
        // SAFETY: `entry` points at this thread's own bucket.
        let bucket = unsafe { &mut *(*entry.as_ptr()).bucket.get() };
        if bucket.deallocate(raw, layout) {
            return;
        }

        // Not ours: the size class was a valid (non-overflow) class --
        // `Bucket::deallocate` always claims overflow-sized requests
        // itself -- so hand it to the registry for the true owner, and
        // take the opportunity to drain any of our own backlog too.
        let class = size_class::size_to_class(layout.size());
        debug_assert_ne!(class, OVERFLOW);
        let owner = unsafe { (*entry.as_ptr()).owner };
        REGISTRY.add_and_drain(raw, layout, class, owner, |ptr, layout| {
            bucket.deallocate(ptr, layout)
        });
    }

    /// Rebind this allocator to a different element type. Both allocators
    /// still share the same process-wide buckets and registry.
    pub fn cast<U>(&self) -> SlabMulti<U> {
        SlabMulti::new()
    }
}

impl<T> Default for SlabMulti<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SlabMulti<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Copy for SlabMulti<T> {}

impl<T> PartialEq for SlabMulti<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T> Eq for SlabMulti<T> {}
