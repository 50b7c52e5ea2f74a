//! The kernel's errno table.
//!
//! Every fallible kernel-internal API returns `Result<T, Errno>`; the
//! syscall dispatch boundary is the only place that turns an `Errno` into a
//! negated `isize` return value, matching the convention in §6/§7 of the
//! design: "returned negated through the syscall and blkdev paths".

use core::fmt;

/// A POSIX-flavoured error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    /// Operation not permitted.
    Eperm = 1,
    /// No such file or directory.
    Enoent = 2,
    /// No such process.
    Esrch = 3,
    /// Interrupted system call.
    Eintr = 4,
    /// I/O error.
    Eio = 5,
    /// Bad file descriptor / node handle.
    Ebadf = 9,
    /// Try again.
    Eagain = 11,
    /// Out of memory.
    Enomem = 12,
    /// Permission denied.
    Eacces = 13,
    /// Bad address.
    Efault = 14,
    /// Device or resource busy.
    Ebusy = 16,
    /// File exists.
    Eexist = 17,
    /// Cross-device link.
    Exdev = 18,
    /// No such device.
    Enodev = 19,
    /// Not a directory.
    Enotdir = 20,
    /// Invalid argument.
    Einval = 22,
    /// File table overflow.
    Enfile = 23,
    /// Read-only filesystem.
    Erofs = 30,
    /// Not a typewriter (inappropriate ioctl).
    Enotty = 25,
    /// Block device required.
    Enotblk = 15,
}

impl Errno {
    /// Returns the positive numeric code, as stored in the classic errno
    /// table (i.e. *not* negated).
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Returns the syscall-boundary return value: the code, negated.
    #[must_use]
    pub const fn to_negated(self) -> isize {
        -(self.code() as isize)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Eperm => "EPERM",
            Self::Enoent => "ENOENT",
            Self::Esrch => "ESRCH",
            Self::Eintr => "EINTR",
            Self::Eio => "EIO",
            Self::Ebadf => "EBADF",
            Self::Eagain => "EAGAIN",
            Self::Enomem => "ENOMEM",
            Self::Eacces => "EACCES",
            Self::Efault => "EFAULT",
            Self::Ebusy => "EBUSY",
            Self::Eexist => "EEXIST",
            Self::Exdev => "EXDEV",
            Self::Enodev => "ENODEV",
            Self::Enotdir => "ENOTDIR",
            Self::Einval => "EINVAL",
            Self::Enfile => "ENFILE",
            Self::Erofs => "EROFS",
            Self::Enotty => "ENOTTY",
            Self::Enotblk => "ENOTBLK",
        };
        write!(f, "{name} ({})", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_matches_syscall_convention() {
        assert_eq!(Errno::Enoent.to_negated(), -2);
        assert_eq!(Errno::Eperm.to_negated(), -1);
    }

    #[test]
    fn display_includes_name_and_code() {
        let s = alloc::format!("{}", Errno::Ebusy);
        assert_eq!(s, "EBUSY (16)");
    }
}
