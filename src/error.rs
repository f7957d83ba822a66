//! The allocator's single fallible outcome: the system allocator refusing
//! to hand back a superblock or a large allocation.

use std::fmt;

/// Returned when the system allocator cannot satisfy a request.
///
/// This is the only error this crate ever surfaces -- internal invariant
/// violations (a mis-sized free, a pointer this process never issued) are
/// undefined behavior per the allocator's contract, not recoverable errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("system allocator failed to satisfy a request")
    }
}

impl std::error::Error for AllocError {}
