//! Synchronization primitives used by the allocator.
//!
//! [`SpinMutex`] is a plain test-and-set spinlock wrapper, used for the
//! dispatcher's single process-wide lock where critical sections are O(1)
//! and contention is expected to be brief.
//!
//! [`ContentionFreeRwLock`] is the write-contention-free shared mutex from
//! the design: a reader that has registered a slot acquires the shared
//! path by flipping only its own cache-line-padded flag, never touching a
//! location any other reader writes to. Writers and unregistered/overflow
//! readers fall back to a single shared "spill lock" atomic.

use std::cell::{RefCell, UnsafeCell};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// A simple test-and-set spinlock.
pub struct SpinLock {
    locked: AtomicBool,
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn lock(&self) {
        if self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }
        self.lock_slow();
    }

    #[cold]
    fn lock_slow(&self) {
        loop {
            while self.locked.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    #[inline]
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    #[inline]
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

unsafe impl Send for SpinLock {}
unsafe impl Sync for SpinLock {}

/// A mutex that uses a spinlock for synchronization. Does not allocate and
/// can be used in a `static`.
pub struct SpinMutex<T> {
    lock: SpinLock,
    data: UnsafeCell<T>,
}

impl<T> SpinMutex<T> {
    pub const fn new(val: T) -> Self {
        Self {
            lock: SpinLock::new(),
            data: UnsafeCell::new(val),
        }
    }

    #[inline]
    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        self.lock.lock();
        SpinMutexGuard { mutex: self }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SpinMutexGuard<'_, T>> {
        if self.lock.try_lock() {
            Some(SpinMutexGuard { mutex: self })
        } else {
            None
        }
    }
}

unsafe impl<T: Send> Send for SpinMutex<T> {}
unsafe impl<T: Send> Sync for SpinMutex<T> {}

/// RAII guard for [`SpinMutex`]. Unlocks on drop.
pub struct SpinMutexGuard<'a, T> {
    mutex: &'a SpinMutex<T>,
}

impl<T> Deref for SpinMutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for SpinMutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for SpinMutexGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.mutex.lock.unlock();
    }
}

// ---------------------------------------------------------------------
// Write-contention-free shared mutex
// ---------------------------------------------------------------------

/// Per-slot flag state.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Unregistered = 0,
    Registered = 1,
    SharedLock = 2,
}

/// A single reader's flag, padded to its own cache line so that one
/// reader flipping its flag never invalidates another reader's cache line.
/// 128 bytes covers both common 64-byte lines and Intel's adjacent-line
/// prefetch, matching the padding width crate authors reach for when
/// `core::sync::atomic::Ordering`-level false sharing matters and a
/// nightly-only `hardware_constructive_interference_size` isn't available.
#[repr(align(128))]
struct SlotFlag {
    state: AtomicU8,
}

impl SlotFlag {
    const fn new() -> Self {
        Self {
            state: AtomicU8::new(SlotState::Unregistered as u8),
        }
    }
}

/// Per-thread, per-mutex-instance slot registration, cached so that after
/// the first shared-lock attempt every subsequent one is O(1).
struct SlotRegistration {
    mutex_ptr: usize,
    /// `Some(index)` if this thread claimed a flag slot; `None` if it
    /// fell back to the spill lock permanently for this mutex instance.
    index: Option<usize>,
    /// Clears the claimed slot back to `Unregistered` on thread exit.
    /// No-op when `index` is `None`.
    clear: fn(usize, usize),
}

struct SlotCache(RefCell<Vec<SlotRegistration>>);

impl Drop for SlotCache {
    fn drop(&mut self) {
        for reg in self.0.borrow().iter() {
            if let Some(idx) = reg.index {
                (reg.clear)(reg.mutex_ptr, idx);
            }
        }
    }
}

thread_local! {
    static SLOT_CACHE: SlotCache = SlotCache(RefCell::new(Vec::new()));
}

fn clear_slot<const SLOTS: usize>(mutex_ptr: usize, idx: usize) {
    // SAFETY: `mutex_ptr` was captured from a `&ContentionFreeRwLock<_, SLOTS>`
    // that is 'static (a process-wide singleton); it outlives every thread
    // that could still be running this destructor.
    let mutex = unsafe { &*(mutex_ptr as *const RawSharedMutex<SLOTS>) };
    mutex.flags[idx]
        .state
        .store(SlotState::Unregistered as u8, Ordering::Release);
}

/// The write-contention-free shared mutex primitive (no payload).
///
/// `SLOTS` bounds how many distinct threads can register a private flag;
/// threads beyond that bound permanently use the spill-lock path for this
/// mutex instance, as do writers and threads taking the shared path for
/// the very first time before registration completes.
///
/// Meant for instances with a stable address for the life of every
/// thread that touches them (module-level statics). The per-thread slot
/// cache keys registrations by this mutex's address; a short-lived
/// instance whose memory is reused by an unrelated value after it drops
/// could see a stale clear-on-exit callback fire against that memory.
pub struct RawSharedMutex<const SLOTS: usize> {
    spill: AtomicBool,
    flags: [SlotFlag; SLOTS],
}

impl<const SLOTS: usize> Default for RawSharedMutex<SLOTS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SLOTS: usize> RawSharedMutex<SLOTS> {
    pub const fn new() -> Self {
        Self {
            spill: AtomicBool::new(false),
            flags: [const { SlotFlag::new() }; SLOTS],
        }
    }

    /// Find (or claim) this thread's slot index for this mutex instance.
    /// Returns `None` if this thread is permanently on the spill path.
    fn slot_index(&self) -> Option<usize> {
        let mutex_ptr = self as *const Self as usize;
        SLOT_CACHE.with(|cache| {
            if let Some(reg) = cache
                .0
                .borrow()
                .iter()
                .find(|reg| reg.mutex_ptr == mutex_ptr)
            {
                return reg.index;
            }

            let mut claimed = None;
            for (i, flag) in self.flags.iter().enumerate() {
                if flag
                    .state
                    .compare_exchange(
                        SlotState::Unregistered as u8,
                        SlotState::Registered as u8,
                        Ordering::Release,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    claimed = Some(i);
                    break;
                }
            }

            cache.0.borrow_mut().push(SlotRegistration {
                mutex_ptr,
                index: claimed,
                clear: clear_slot::<SLOTS>,
            });
            claimed
        })
    }

    pub fn lock_shared(&self) {
        match self.slot_index() {
            Some(idx) => {
                while self.spill.load(Ordering::Acquire) {
                    std::hint::spin_loop();
                }
                self.flags[idx]
                    .state
                    .store(SlotState::SharedLock as u8, Ordering::Release);
            }
            None => {
                crate::stat_inc!(shared_mutex_spills);
                while self
                    .spill
                    .compare_exchange_weak(false, true, Ordering::SeqCst, Ordering::Relaxed)
                    .is_err()
                {
                    std::hint::spin_loop();
                }
            }
        }
    }

    pub fn unlock_shared(&self) {
        match self.slot_index() {
            Some(idx) => self.flags[idx]
                .state
                .store(SlotState::Registered as u8, Ordering::Release),
            None => self.spill.store(false, Ordering::Release),
        }
    }

    pub fn try_lock_shared(&self) -> bool {
        match self.slot_index() {
            Some(idx) => {
                if self.spill.load(Ordering::Acquire) {
                    return false;
                }
                self.flags[idx]
                    .state
                    .store(SlotState::SharedLock as u8, Ordering::Release);
                true
            }
            None => self
                .spill
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok(),
        }
    }

    pub fn lock(&self) {
        while self
            .spill
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        for flag in &self.flags {
            while flag.state.load(Ordering::SeqCst) == SlotState::SharedLock as u8 {
                std::hint::spin_loop();
            }
        }
    }

    pub fn unlock(&self) {
        self.spill.store(false, Ordering::SeqCst);
    }
}

/// A [`std::sync::RwLock`]-shaped wrapper around [`RawSharedMutex`].
pub struct ContentionFreeRwLock<T, const SLOTS: usize> {
    raw: RawSharedMutex<SLOTS>,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send, const SLOTS: usize> Send for ContentionFreeRwLock<T, SLOTS> {}
unsafe impl<T: Send, const SLOTS: usize> Sync for ContentionFreeRwLock<T, SLOTS> {}

impl<T, const SLOTS: usize> ContentionFreeRwLock<T, SLOTS> {
    pub const fn new(val: T) -> Self {
        Self {
            raw: RawSharedMutex::new(),
            data: UnsafeCell::new(val),
        }
    }

    #[inline]
    pub fn read(&self) -> SharedGuard<'_, T, SLOTS> {
        self.raw.lock_shared();
        SharedGuard { lock: self }
    }

    #[inline]
    pub fn write(&self) -> ExclusiveGuard<'_, T, SLOTS> {
        self.raw.lock();
        ExclusiveGuard { lock: self }
    }

    /// Access to the raw primitive, for callers (e.g. [`crate::smp`]) that
    /// need to hold a shared lock across several operations without this
    /// wrapper's guard owning the borrow.
    pub fn raw(&self) -> &RawSharedMutex<SLOTS> {
        &self.raw
    }

    /// # Safety
    /// Caller must hold at least a shared lock on `self.raw()` for the
    /// duration of the returned reference's use.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn data_ref(&self) -> &T {
        unsafe { &*self.data.get() }
    }

    /// # Safety
    /// Caller must hold the exclusive lock on `self.raw()` for the
    /// duration of the returned reference's use.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn data_mut(&self) -> &mut T {
        unsafe { &mut *self.data.get() }
    }
}

pub struct SharedGuard<'a, T, const SLOTS: usize> {
    lock: &'a ContentionFreeRwLock<T, SLOTS>,
}

impl<T, const SLOTS: usize> Deref for SharedGuard<'_, T, SLOTS> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T, const SLOTS: usize> Drop for SharedGuard<'_, T, SLOTS> {
    #[inline]
    fn drop(&mut self) {
        self.lock.raw.unlock_shared();
    }
}

pub struct ExclusiveGuard<'a, T, const SLOTS: usize> {
    lock: &'a ContentionFreeRwLock<T, SLOTS>,
}

impl<T, const SLOTS: usize> Deref for ExclusiveGuard<'_, T, SLOTS> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T, const SLOTS: usize> DerefMut for ExclusiveGuard<'_, T, SLOTS> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T, const SLOTS: usize> Drop for ExclusiveGuard<'_, T, SLOTS> {
    #[inline]
    fn drop(&mut self) {
        self.lock.raw.unlock();
    }
}
