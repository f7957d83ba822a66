//! slab-multi: a multi-threaded, size-class-indexed slab allocator.
//!
//! Memory flows through a fixed hierarchy:
//!
//! - [`dispatcher`] carves process-wide *superblocks* (from the system
//!   allocator) into slab-sized regions and hands them out on demand.
//! - [`slab`] partitions one such region into equally sized blocks of a
//!   single size class, tracked by a free-index stack.
//! - [`cache`] is the per-thread, per-size-class collection of slabs with
//!   an active allocation cursor.
//! - [`bucket`] is the per-thread aggregate of one [`cache::Cache`] per
//!   size class, with a system-allocator fallthrough for oversized
//!   requests.
//! - [`registry`] reconciles deallocations made on a thread that does not
//!   own the pointer ("foreign" deallocations).
//! - [`sync`] provides the write-contention-free shared mutex that
//!   serializes the registry.
//! - [`allocator`] is the user-facing facade: [`allocator::SlabMulti`].
//!
//! # Usage
//!
//! ```
//! use slab_multi::allocator::SlabMulti;
//!
//! let alloc: SlabMulti<u64> = SlabMulti::new();
//! let ptr = alloc.allocate(4).unwrap();
//! alloc.deallocate(ptr, 4);
//! ```

pub mod allocator;
pub mod bucket;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod macros;
pub mod registry;
pub mod size_class;
pub mod slab;
pub mod smp;
pub mod stats;
pub mod sync;

pub use allocator::SlabMulti;
pub use error::AllocError;
