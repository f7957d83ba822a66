//! Cross-container shared-lock helper.
//!
//! Wraps a plain `Vec<T>` in a [`ContentionFreeRwLock`] so that one
//! thread's lookup into another thread's entry (e.g. the foreign-dealloc
//! registry draining into a remote thread's [`crate::bucket::Bucket`])
//! takes the reader-fast path, while registering a brand new entry takes
//! the writer path and excludes every reader until it completes.

use crate::config::SHARED_MUTEX_SLOTS;
use crate::sync::{ContentionFreeRwLock, SharedGuard};

/// A `Vec<T>` guarded by the write-contention-free shared mutex.
pub struct SmpVec<T> {
    inner: ContentionFreeRwLock<Vec<T>, SHARED_MUTEX_SLOTS>,
}

impl<T> SmpVec<T> {
    pub const fn new() -> Self {
        Self {
            inner: ContentionFreeRwLock::new(Vec::new()),
        }
    }

    /// Append `value` under the exclusive (writer) lock.
    pub fn emplace(&self, value: T) {
        self.inner.write().push(value);
    }

    /// Run `func` against the whole container under a shared lock.
    pub fn find_do<F, R>(&self, func: F) -> R
    where
        F: FnOnce(&[T]) -> R,
    {
        let guard = self.inner.read();
        func(&guard)
    }

    /// Start a shared lock and locate the first element matching
    /// `predicate`, returning both the still-held guard and the match's
    /// index so a caller can keep reading under the same lock.
    ///
    /// Mirrors acquiring a shared lock and searching in one step: the
    /// guard must be held for as long as the returned index is used.
    pub fn find_and_start_shared<P>(&self, predicate: P) -> (SharedGuard<'_, Vec<T>, SHARED_MUTEX_SLOTS>, Option<usize>)
    where
        P: Fn(&T) -> bool,
    {
        let guard = self.inner.read();
        let idx = guard.iter().position(predicate);
        (guard, idx)
    }
}

impl<T> Default for SmpVec<T> {
    fn default() -> Self {
        Self::new()
    }
}
