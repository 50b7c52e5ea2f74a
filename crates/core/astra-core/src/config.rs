//! Compile-time configuration constants.
//!
//! Centralizes the sizing knobs that the original implementation scattered
//! across headers. There is no runtime configuration file — the VFS that
//! would serve one does not exist until these constants have already sized
//! the structures that bootstrap it.

/// Size of one physical page / frame, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Number of entries in a page directory or page table.
pub const PAGE_TABLE_ENTRIES: usize = 1024;

/// Highest valid pid. `0` is never assigned; `-1` is reserved for the idle
/// task and is represented out-of-band (see [`crate::task::TaskId`]).
pub const MAX_PID: u32 = 32_768;

/// Size of a task's open-file-descriptor table.
pub const MAX_OF: usize = 256;

/// Maximum length of a single path component.
pub const NAME_MAX: usize = 255;

/// Default sector size for block devices without a probed geometry.
pub const DEFAULT_SECTOR_SIZE: u32 = 512;

/// Start of the kernel heap's virtual window.
pub const KHEAP_START: u32 = 0xD000_0000;

/// Initial committed size of the kernel heap.
pub const KHEAP_INIT_SIZE: u32 = 4 * 1024 * 1024;

/// Maximum size the kernel heap may grow to.
pub const KHEAP_MAX: u32 = 0x2000_0000;

/// Lowest (most negative) niceness value.
pub const NICE_MIN: i32 = -20;

/// Highest niceness value.
pub const NICE_MAX: i32 = 19;

/// Base quantum multiplier, in timer ticks: `task_tick = TICK_BASE * (20 -
/// nice)`.
pub const TICK_BASE: u32 = 10;

/// Number of slots in the character/block device major-number registries.
pub const MAX_DEVICE_MAJORS: usize = 256;

/// Depth limit for symlink resolution during path walk.
pub const MAX_SYMLINK_DEPTH: u32 = 8;
