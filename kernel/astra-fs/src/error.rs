//! Filesystem and block-layer error type.

use astra_core::errno::Errno;

/// An error from a VFS, devfs, FAT32, or block-layer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No such file, directory, or mount point.
    NotFound,
    /// A path component expected to be a directory wasn't one.
    NotADirectory,
    /// An operation that requires a file was aimed at a directory.
    IsADirectory,
    /// The requested operation isn't implemented by this inode/driver.
    NotSupported,
    /// A path wasn't absolute, or a name exceeded `NAME_MAX`.
    InvalidArgument,
    /// Symlink resolution exceeded `MAX_SYMLINK_DEPTH`.
    SymlinkLoop,
    /// The caller lacks permission for the requested access.
    PermissionDenied,
    /// A mount point already carries a superblock, or a umount target has
    /// live descendants/refcounts and `MNT_DETACH` wasn't set.
    Busy,
    /// `create`/`mknod`/`mount` targeted a name that already exists.
    AlreadyExists,
    /// No block device is registered under the requested major number, or a
    /// driver required one and none was supplied.
    NoSuchDevice,
    /// The underlying block driver reported an I/O failure.
    IoError,
    /// The filesystem driver's on-disk structures don't parse (bad magic,
    /// inconsistent geometry).
    CorruptFilesystem,
    /// `lseek` was given a `whence` other than `SEEK_SET`/`SEEK_CUR`/`SEEK_END`.
    InvalidSeek,
    /// A write was attempted against a filesystem mounted read-only.
    ReadOnly,
}

impl FsError {
    /// Maps to the nearest POSIX errno, per §6's error table.
    #[must_use]
    pub const fn to_errno(self) -> Errno {
        match self {
            Self::NotFound => Errno::Enoent,
            Self::NotADirectory => Errno::Enotdir,
            Self::IsADirectory => Errno::Einval,
            Self::NotSupported => Errno::Enotty,
            Self::InvalidArgument | Self::InvalidSeek | Self::SymlinkLoop => Errno::Einval,
            Self::PermissionDenied => Errno::Eacces,
            Self::Busy => Errno::Ebusy,
            Self::AlreadyExists => Errno::Eexist,
            Self::NoSuchDevice => Errno::Enodev,
            Self::IoError => Errno::Eio,
            Self::CorruptFilesystem => Errno::Eio,
            Self::ReadOnly => Errno::Erofs,
        }
    }
}
