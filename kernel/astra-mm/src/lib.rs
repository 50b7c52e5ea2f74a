//! Physical memory management for the astra kernel: frame allocator, the
//! two-level x86 page directory, and the kernel heap.
//!
//! Everything here is pure logic over caller-supplied memory ranges and is
//! exercised with `cargo test` on the host; only the addresses it is pointed
//! at (from the boot info the platform layer parses) are target-specific.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod frame;
pub mod heap;
pub mod paging;

pub use frame::{FrameAllocator, FrameError};
pub use heap::{Heap, HeapError};
pub use paging::{PageDirectory, PagingError};
