//! Foreign-deallocation registry: resolves the case where thread A frees
//! a pointer allocated by thread B.
//!
//! A must never touch B's [`crate::cache::Cache`] directly -- no locking
//! discipline covers that. Instead A records the pointer here and it is
//! picked up by one of the threads it might belong to, typically B
//! itself on its next allocator call.
//!
//! The registry's own state lives behind the write-contention-free
//! shared mutex (see [`crate::sync`]). `has_pending` -- called on nearly
//! every allocation and deallocation as an opportunistic check -- takes
//! only the contention-free reader path; the much rarer `add`/`drain`
//! operations take the exclusive path.

use std::alloc::Layout;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use crate::config::{NUM_CACHES, SHARED_MUTEX_SLOTS};
use crate::stat_inc;
use crate::sync::ContentionFreeRwLock;

/// A pointer some thread freed on behalf of a Bucket it does not own.
pub struct FPtr {
    pub ptr: NonNull<u8>,
    pub layout: Layout,
    /// Set once some owner has successfully freed this pointer into its
    /// own cache. Checked with `Relaxed` ordering: the registry's own
    /// exclusive lock around every mutation of this flag is what
    /// actually re-synchronizes readers, not the atomic itself.
    found: AtomicBool,
}

// `ptr` is never dereferenced by the registry itself -- only handed back
// to the owning thread's `Bucket::deallocate`, which does the real work.
unsafe impl Send for FPtr {}
unsafe impl Sync for FPtr {}

/// Per-owner scratch space: which pending [`FPtr`]s might belong to this
/// owner, bucketed by size class the same way a [`crate::bucket::Bucket`]
/// is.
struct FCache {
    levels: [Vec<Arc<FPtr>>; NUM_CACHES],
}

impl FCache {
    fn new() -> Self {
        Self {
            levels: std::array::from_fn(|_| Vec::new()),
        }
    }

    fn is_empty(&self) -> bool {
        self.levels.iter().all(Vec::is_empty)
    }
}

struct State {
    fptrs: Vec<Arc<FPtr>>,
    owners: HashMap<ThreadId, FCache, BuildHasherDefault<DefaultHasher>>,
}

/// Process-wide foreign-deallocation registry.
pub struct Registry {
    state: ContentionFreeRwLock<State, SHARED_MUTEX_SLOTS>,
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            state: ContentionFreeRwLock::new(State {
                fptrs: Vec::new(),
                owners: HashMap::with_hasher(BuildHasherDefault::new()),
            }),
        }
    }

    /// Register a thread as a potential owner of future foreign pointers.
    pub fn register_thread(&self, id: ThreadId) {
        self.state.write().owners.insert(id, FCache::new());
    }

    /// Record a pointer that the calling thread could not free into its
    /// own Bucket, making it visible to every registered owner's FCache.
    pub fn add(&self, ptr: NonNull<u8>, layout: Layout, class: usize) {
        stat_inc!(foreign_dealloc_count);
        let mut state = self.state.write();
        let fptr = Arc::new(FPtr {
            ptr,
            layout,
            found: AtomicBool::new(false),
        });
        state.fptrs.push(Arc::clone(&fptr));
        for fcache in state.owners.values_mut() {
            fcache.levels[class].push(Arc::clone(&fptr));
        }
    }

    /// `add` immediately followed by a drain attempt for `id`, performed
    /// under the same exclusive lock.
    pub fn add_and_drain<F>(&self, ptr: NonNull<u8>, layout: Layout, class: usize, id: ThreadId, dealloc: F)
    where
        F: FnMut(NonNull<u8>, Layout) -> bool,
    {
        stat_inc!(foreign_dealloc_count);
        let mut state = self.state.write();
        let fptr = Arc::new(FPtr {
            ptr,
            layout,
            found: AtomicBool::new(false),
        });
        state.fptrs.push(Arc::clone(&fptr));
        for fcache in state.owners.values_mut() {
            fcache.levels[class].push(Arc::clone(&fptr));
        }
        Self::drain_locked(&mut state, id, dealloc);
    }

    /// Walk every pending `FPtr` that might belong to `id`, attempting
    /// `dealloc` on each; entries that succeed are marked `found` and
    /// removed from the central list. Every entry `id`'s FCache held is
    /// drained regardless of outcome -- a level is emptied on each call,
    /// not retried piecemeal.
    pub fn drain<F>(&self, id: ThreadId, dealloc: F) -> usize
    where
        F: FnMut(NonNull<u8>, Layout) -> bool,
    {
        let mut state = self.state.write();
        Self::drain_locked(&mut state, id, dealloc)
    }

    fn drain_locked<F>(state: &mut State, id: ThreadId, mut dealloc: F) -> usize
    where
        F: FnMut(NonNull<u8>, Layout) -> bool,
    {
        let Some(fcache) = state.owners.get_mut(&id) else {
            return 0;
        };

        let mut claimed = Vec::new();
        for level in fcache.levels.iter_mut() {
            // Process in reverse (most recently queued first) and pop
            // every entry visited, whether or not it was claimed here.
            while let Some(entry) = level.pop() {
                if !entry.found.load(Ordering::Relaxed)
                    && dealloc(entry.ptr, entry.layout)
                {
                    entry.found.store(true, Ordering::Relaxed);
                    claimed.push(entry);
                }
            }
        }

        if !claimed.is_empty() {
            stat_inc!(foreign_drain_count);
            let claimed_ptrs: Vec<_> = claimed.iter().map(|a| Arc::as_ptr(a)).collect();
            state
                .fptrs
                .retain(|f| !claimed_ptrs.contains(&Arc::as_ptr(f)));
        }

        claimed.len()
    }

    /// Cheap check: does `id` have any pending foreign deallocations
    /// worth draining? Takes only the contention-free reader path.
    pub fn has_pending(&self, id: ThreadId) -> bool {
        let state = self.state.read();
        match state.owners.get(&id) {
            Some(fcache) => !fcache.is_empty(),
            None => false,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Sync for Registry {}

/// The single process-wide registry.
pub static REGISTRY: Registry = Registry::new();
