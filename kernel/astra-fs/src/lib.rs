//! Block I/O pipeline and virtual filesystem: request queues and MBR
//! partition discovery, a mount-table VFS with pluggable FS drivers, an
//! in-memory devfs, and a FAT32 driver interface contract.
//!
//! Grounded on the original `block.c`/`vfs.c`/`dev.c`, adapted to a single
//! owning mount-table map (rather than a mount tree plus a separate
//! superblock list) and to `Bio`s that own their bytes directly (rather than
//! referencing physical pages — this crate has no dependency on the memory
//! manager).

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod block;
pub mod devfs;
pub mod error;
pub mod fat32;
pub mod inode;
pub mod path;
pub mod vfs;

pub use block::{Bio, BlockDevice, BlockDriverRegistry, BlockRequest, Direction, Partition, RequestQueue};
pub use devfs::{BlockDeviceNode, CharDevice, CharDeviceNode, CharDriverRegistry, DevFs, DevNull, DevZero};
pub use error::FsError;
pub use fat32::{Fat32Driver, Fat32Volume};
pub use inode::{DeviceNumber, DirEntry, FileSystem, FsFuture, Inode, InodeType, Mode, Permissions};
pub use vfs::{FsDriver, MountFlags, NodeHandle, Vfs};
