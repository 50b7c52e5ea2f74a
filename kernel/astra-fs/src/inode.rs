//! The inode/filesystem trait contract every FS driver implements, plus the
//! permission- and type-bit types shared across them.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::future::Future;
use core::pin::Pin;

use bitflags::bitflags;

use crate::error::FsError;

/// A node's type, per §6's mode-bits layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// A character device node.
    CharDevice,
    /// A block device node.
    BlockDevice,
    /// A named pipe.
    Pipe,
    /// A symbolic link.
    Symlink,
    /// A mount point (an intermediate tree node whose superblock is still
    /// being attached, or whose child is itself a mount).
    Mount,
    /// A node of a type the VFS doesn't otherwise recognize.
    Unknown,
}

bitflags! {
    /// Permission bits: classic u/g/o × r/w/x plus setuid/setgid/sticky.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode: u32 {
        const OTHER_EXEC = 0o0001;
        const OTHER_WRITE = 0o0002;
        const OTHER_READ = 0o0004;
        const GROUP_EXEC = 0o0010;
        const GROUP_WRITE = 0o0020;
        const GROUP_READ = 0o0040;
        const USER_EXEC = 0o0100;
        const USER_WRITE = 0o0200;
        const USER_READ = 0o0400;
        const STICKY = 0o1000;
        const SETGID = 0o2000;
        const SETUID = 0o4000;
    }
}

/// A node's ownership and permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    /// Owning uid.
    pub uid: u32,
    /// Owning gid.
    pub gid: u32,
    /// Mode bits.
    pub mode: Mode,
}

impl Permissions {
    /// `0o644`, owned by root — the common case for read-only synthetic
    /// nodes (directories, `/dev/null`, ...).
    #[must_use]
    pub const fn read_only() -> Self {
        Self {
            uid: 0,
            gid: 0,
            mode: Mode::from_bits_truncate(
                Mode::USER_READ.bits() | Mode::GROUP_READ.bits() | Mode::OTHER_READ.bits(),
            ),
        }
    }

    /// `0o666`, owned by root — the common case for synthetic devices
    /// anyone may read and write (`/dev/null`, `/dev/zero`).
    #[must_use]
    pub const fn read_write() -> Self {
        Self {
            uid: 0,
            gid: 0,
            mode: Mode::from_bits_truncate(Self::read_only().mode.bits() | 0o222),
        }
    }

    /// Checks `(requested_read, requested_write)` against these permission
    /// bits for a caller with the given credentials, per §4.5's policy:
    /// root (`euid == 0`) passes unconditionally; otherwise the other-bits
    /// are checked, upgraded to user-bits if `euid` owns the node or to
    /// group-bits if `egid` matches.
    #[must_use]
    pub fn check(&self, euid: u32, egid: u32, want_read: bool, want_write: bool) -> bool {
        if euid == 0 {
            return true;
        }
        let bits = if euid == self.uid {
            (Mode::USER_READ, Mode::USER_WRITE)
        } else if egid == self.gid {
            (Mode::GROUP_READ, Mode::GROUP_WRITE)
        } else {
            (Mode::OTHER_READ, Mode::OTHER_WRITE)
        };
        (!want_read || self.mode.contains(bits.0)) && (!want_write || self.mode.contains(bits.1))
    }
}

/// A packed device number: major in the top 8 bits, minor in the low 24,
/// per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeviceNumber(u32);

impl DeviceNumber {
    /// Packs a `(major, minor)` pair.
    #[must_use]
    pub const fn new(major: u8, minor: u32) -> Self {
        Self(((major as u32) << 24) | (minor & 0x00FF_FFFF))
    }

    /// Returns the major number.
    #[must_use]
    pub const fn major(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the minor number.
    #[must_use]
    pub const fn minor(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }
}

/// One entry yielded by [`Inode::readdir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// The entry's name within its parent directory.
    pub name: String,
    /// The entry's type.
    pub inode_type: InodeType,
}

/// A boxed future, for the async trait methods below. Not `Send` — this
/// kernel never crosses a CPU boundary, so there's nothing to guard against.
pub type FsFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FsError>> + 'a>>;

/// A single filesystem node: file, directory, device, symlink, or mount
/// stub. Every FS driver (devfs, FAT32, or the VFS's own skeletal tree
/// nodes) implements this.
pub trait Inode {
    /// This node's type.
    fn inode_type(&self) -> InodeType;

    /// Size in bytes. `0` for directories and most device nodes.
    fn size(&self) -> usize;

    /// Ownership and mode bits.
    fn permissions(&self) -> Permissions;

    /// Device number, for [`InodeType::CharDevice`]/[`InodeType::BlockDevice`]
    /// nodes. `None` for every other type.
    fn device_number(&self) -> Option<DeviceNumber> {
        None
    }

    /// Reads up to `buf.len()` bytes starting at `offset`, returning the
    /// count actually read (short reads at EOF are not an error).
    fn read<'a>(&'a self, offset: usize, buf: &'a mut [u8]) -> FsFuture<'a, usize>;

    /// Writes `buf` starting at `offset`, returning the count actually
    /// written. A driver that can only accept a prefix returns that prefix's
    /// length rather than erroring, per §7's partial-write rule.
    fn write<'a>(&'a self, offset: usize, buf: &'a [u8]) -> FsFuture<'a, usize>;

    /// Looks up `name` as a direct child. Only meaningful on directories.
    fn lookup<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn Inode>>;

    /// Lists direct children. Only meaningful on directories.
    fn readdir(&self) -> Pin<Box<dyn Future<Output = Result<Vec<DirEntry>, FsError>> + '_>>;

    /// Creates `name` as a new child of the given type and permissions.
    /// `device` carries the `dev_t` for `CharDevice`/`BlockDevice` modes
    /// (as built by `mknod`); every other mode ignores it.
    fn create<'a>(
        &'a self,
        name: &'a str,
        itype: InodeType,
        perms: Permissions,
        device: Option<DeviceNumber>,
    ) -> FsFuture<'a, Arc<dyn Inode>>;

    /// Removes the child named `name`.
    fn unlink<'a>(&'a self, name: &'a str) -> Pin<Box<dyn Future<Output = Result<(), FsError>> + 'a>>;

    /// Reads a symlink's target. Only meaningful on [`InodeType::Symlink`].
    fn read_link(&self) -> Result<String, FsError> {
        Err(FsError::InvalidArgument)
    }

    /// Changes mode bits.
    fn chmod(&self, _mode: Mode) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// Changes ownership.
    fn chown(&self, _uid: u32, _gid: u32) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// Truncates a regular file's backing data to `len` bytes. Only
    /// meaningful for [`InodeType::File`]; callers should not invoke this
    /// on device, directory, or symlink nodes.
    fn truncate(&self, _len: usize) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }
}

/// A mounted filesystem instance: produces a root inode and accepts the
/// `umount` lifecycle call.
pub trait FileSystem {
    /// The driver name this instance was mounted under (`"devfs"`,
    /// `"fat32"`, ...).
    fn name(&self) -> &'static str;

    /// The filesystem's root inode.
    fn root(&self) -> Arc<dyn Inode>;

    /// Invoked by `umount`. `force` is set when `MNT_FORCE` was requested;
    /// a driver that would otherwise refuse (dirty buffers, open files) may
    /// still refuse by returning `Err`, in which case `umount` aborts.
    fn close_fs(&self, _force: bool) -> Result<(), FsError> {
        Ok(())
    }
}
