//! Syscall dispatch table.
//!
//! Numbered 0..31 per the fixed order: `fork, exit, getpid, setpgid,
//! getpgid, setsid, getsid, nice, setresuid, getresuid, setresgid,
//! getresgid, lseek, pread, read, pwrite, write, open, close, readdir,
//! stat, chmod, chown, ioctl, link, unlink, mknod, mount, umount, sbrk,
//! execve, chdir`. Register marshalling (reading/writing EBX..EBP) is an
//! arch-layer concern realized as the [`Registers`] trait; this module only
//! matches the syscall number and forwards typed arguments.

mod fs;
mod process;

use astra_core::task::TaskId;

use crate::state::{Kernel, KernelError};

/// The six general-purpose argument registers a syscall may read, per
/// `int 0x80`'s calling convention (EBX, ECX, EDX, ESI, EDI, EBP). An
/// arch-layer crate implements this over the trapped register frame; tests
/// use a plain struct.
pub trait Registers {
    /// EBX.
    fn arg0(&self) -> usize;
    /// ECX.
    fn arg1(&self) -> usize;
    /// EDX.
    fn arg2(&self) -> usize;
    /// ESI.
    fn arg3(&self) -> usize;
    /// EDI.
    fn arg4(&self) -> usize;
    /// EBP.
    fn arg5(&self) -> usize;
}

/// A plain in-memory [`Registers`] implementation, for tests and for
/// callers that already have the six values in hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallArgs {
    /// See [`Registers::arg0`].
    pub a0: usize,
    /// See [`Registers::arg1`].
    pub a1: usize,
    /// See [`Registers::arg2`].
    pub a2: usize,
    /// See [`Registers::arg3`].
    pub a3: usize,
    /// See [`Registers::arg4`].
    pub a4: usize,
    /// See [`Registers::arg5`].
    pub a5: usize,
}

impl Registers for SyscallArgs {
    fn arg0(&self) -> usize {
        self.a0
    }
    fn arg1(&self) -> usize {
        self.a1
    }
    fn arg2(&self) -> usize {
        self.a2
    }
    fn arg3(&self) -> usize {
        self.a3
    }
    fn arg4(&self) -> usize {
        self.a4
    }
    fn arg5(&self) -> usize {
        self.a5
    }
}

/// Syscall numbers, in the fixed order named in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SyscallNumber {
    Fork = 0,
    Exit = 1,
    GetPid = 2,
    SetPgid = 3,
    GetPgid = 4,
    SetSid = 5,
    GetSid = 6,
    Nice = 7,
    SetResUid = 8,
    GetResUid = 9,
    SetResGid = 10,
    GetResGid = 11,
    LSeek = 12,
    PRead = 13,
    Read = 14,
    PWrite = 15,
    Write = 16,
    Open = 17,
    Close = 18,
    ReadDir = 19,
    Stat = 20,
    Chmod = 21,
    Chown = 22,
    Ioctl = 23,
    Link = 24,
    Unlink = 25,
    Mknod = 26,
    Mount = 27,
    Umount = 28,
    Sbrk = 29,
    Execve = 30,
    Chdir = 31,
}

impl SyscallNumber {
    /// Decodes a raw syscall number, or `None` if it's out of range.
    #[must_use]
    pub fn from_raw(nr: usize) -> Option<Self> {
        Some(match nr {
            0 => Self::Fork,
            1 => Self::Exit,
            2 => Self::GetPid,
            3 => Self::SetPgid,
            4 => Self::GetPgid,
            5 => Self::SetSid,
            6 => Self::GetSid,
            7 => Self::Nice,
            8 => Self::SetResUid,
            9 => Self::GetResUid,
            10 => Self::SetResGid,
            11 => Self::GetResGid,
            12 => Self::LSeek,
            13 => Self::PRead,
            14 => Self::Read,
            15 => Self::PWrite,
            16 => Self::Write,
            17 => Self::Open,
            18 => Self::Close,
            19 => Self::ReadDir,
            20 => Self::Stat,
            21 => Self::Chmod,
            22 => Self::Chown,
            23 => Self::Ioctl,
            24 => Self::Link,
            25 => Self::Unlink,
            26 => Self::Mknod,
            27 => Self::Mount,
            28 => Self::Umount,
            29 => Self::Sbrk,
            30 => Self::Execve,
            31 => Self::Chdir,
            _ => return None,
        })
    }
}

/// Dispatches one syscall trap, on behalf of `caller`. Unknown syscall
/// numbers and not-yet-implemented ones alike return `-ENOSYS`
/// (`Errno::Enotty` has no ENOSYS in this errno set; `ioctl`/`execve`/
/// `sbrk`/`link` — which depend on out-of-scope external collaborators,
/// ELF parsing and a per-task heap/address-space switch chief among them
/// — report [`astra_core::errno::Errno::Enotty`] until a platform crate
/// supplies those pieces).
pub fn dispatch(kernel: &Kernel, caller: TaskId, nr: usize, regs: &impl Registers) -> isize {
    let Some(nr) = SyscallNumber::from_raw(nr) else {
        return astra_core::errno::Errno::Enotty.to_negated();
    };

    let result: Result<isize, KernelError> = match nr {
        SyscallNumber::Fork => process::sys_fork(kernel, caller),
        SyscallNumber::Exit => process::sys_exit(kernel, caller, regs.arg0() as i32),
        SyscallNumber::GetPid => Ok(caller.raw() as isize),
        SyscallNumber::SetPgid => process::sys_setpgid(kernel, caller, regs),
        SyscallNumber::GetPgid => process::sys_getpgid(kernel, regs),
        SyscallNumber::SetSid => process::sys_setsid(kernel, caller),
        SyscallNumber::GetSid => process::sys_getsid(kernel, regs),
        SyscallNumber::Nice => process::sys_nice(kernel, caller, regs),
        SyscallNumber::SetResUid => process::sys_setresuid(kernel, caller, regs),
        SyscallNumber::GetResUid => process::sys_getresuid(kernel, caller),
        SyscallNumber::SetResGid => process::sys_setresgid(kernel, caller, regs),
        SyscallNumber::GetResGid => process::sys_getresgid(kernel, caller),
        SyscallNumber::Chdir => process::sys_chdir(kernel, caller, regs),
        SyscallNumber::Open => fs::sys_open(kernel, caller, regs),
        SyscallNumber::Close => fs::sys_close(kernel, caller, regs),
        SyscallNumber::Read => fs::sys_read(kernel, caller, regs),
        SyscallNumber::Write => fs::sys_write(kernel, caller, regs),
        SyscallNumber::PRead => fs::sys_pread(kernel, caller, regs),
        SyscallNumber::PWrite => fs::sys_pwrite(kernel, caller, regs),
        SyscallNumber::LSeek => fs::sys_lseek(kernel, caller, regs),
        SyscallNumber::ReadDir => fs::sys_readdir(kernel, caller, regs),
        SyscallNumber::Stat => fs::sys_stat(kernel, regs),
        SyscallNumber::Chmod => fs::sys_chmod(kernel, regs),
        SyscallNumber::Chown => fs::sys_chown(kernel, regs),
        SyscallNumber::Unlink => fs::sys_unlink(kernel, caller, regs),
        SyscallNumber::Mount => fs::sys_mount(kernel, caller, regs),
        SyscallNumber::Umount => fs::sys_umount(kernel, caller, regs),
        SyscallNumber::Mknod => fs::sys_mknod(kernel, caller, regs),
        SyscallNumber::Ioctl | SyscallNumber::Link | SyscallNumber::Sbrk | SyscallNumber::Execve => {
            Err(KernelError::NotImplemented)
        }
    };

    match result {
        Ok(value) => value,
        Err(err) => err.to_errno().to_negated(),
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use astra_fs::vfs::FsDriver;
    use astra_fs::{BlockDevice, DevFs, FileSystem, FsError, MountFlags};

    use super::*;
    use crate::state::Kernel;

    struct DevFsDriver {
        fs: Arc<DevFs>,
    }
    impl FsDriver for DevFsDriver {
        fn requires_device(&self) -> bool {
            false
        }
        fn get_super(&self, _device: Option<Arc<dyn BlockDevice>>, _flags: MountFlags) -> Result<Arc<dyn FileSystem>, FsError> {
            Ok(self.fs.clone())
        }
    }

    fn booted_kernel() -> Kernel {
        let kernel = Kernel::new();
        kernel.vfs.register_driver("devfs", Arc::new(DevFsDriver { fs: Arc::new(DevFs::new()) }));
        kernel.vfs.mount("/", "/dev", "devfs", None, MountFlags::empty()).unwrap();
        kernel
    }

    /// Boots with a devfs whose block-driver registry is reachable, so a
    /// test can attach a fake disk under a major before `mknod`ing it.
    fn booted_kernel_with_devfs() -> (Kernel, Arc<DevFs>) {
        let kernel = Kernel::new();
        let fs = Arc::new(DevFs::new());
        kernel.vfs.register_driver("devfs", Arc::new(DevFsDriver { fs: fs.clone() }));
        kernel.vfs.mount("/", "/dev", "devfs", None, MountFlags::empty()).unwrap();
        (kernel, fs)
    }

    struct FakeDisk {
        sectors: astra_core::sync::SpinLock<alloc::vec::Vec<u8>>,
    }
    impl BlockDevice for FakeDisk {
        fn sector_size(&self) -> u32 {
            512
        }
        fn sector_count(&self) -> u64 {
            (self.sectors.lock().len() / 512) as u64
        }
        fn queue(&self) -> &astra_fs::block::RequestQueue {
            unimplemented!("not exercised by this test")
        }
        fn read_sector_sync(&self, sector: u64, buf: &mut [u8]) -> Result<(), FsError> {
            let start = sector as usize * 512;
            buf.copy_from_slice(&self.sectors.lock()[start..start + 512]);
            Ok(())
        }
        fn write_sector_sync(&self, sector: u64, buf: &[u8]) -> Result<(), FsError> {
            let start = sector as usize * 512;
            self.sectors.lock()[start..start + 512].copy_from_slice(buf);
            Ok(())
        }
    }

    fn path_args(path: &str) -> SyscallArgs {
        SyscallArgs { a0: path.as_ptr() as usize, a1: path.len(), ..Default::default() }
    }

    #[test]
    fn getpid_returns_caller_pid() {
        let kernel = booted_kernel();
        let result = dispatch(&kernel, TaskId::INIT, SyscallNumber::GetPid as usize, &SyscallArgs::default());
        assert_eq!(result, 1);
    }

    #[test]
    fn unknown_syscall_number_reports_enotty() {
        let kernel = booted_kernel();
        let result = dispatch(&kernel, TaskId::INIT, 99, &SyscallArgs::default());
        assert_eq!(result, astra_core::errno::Errno::Enotty.to_negated());
    }

    #[test]
    fn fork_then_getpid_in_child_differs_from_parent() {
        let kernel = booted_kernel();
        let child_pid = dispatch(&kernel, TaskId::INIT, SyscallNumber::Fork as usize, &SyscallArgs::default());
        assert!(child_pid > 1);
        let child = TaskId::new(child_pid as i32);
        let result = dispatch(&kernel, child, SyscallNumber::GetPid as usize, &SyscallArgs::default());
        assert_eq!(result, child_pid);
    }

    #[test]
    fn exit_then_getpid_on_same_pid_fails() {
        let kernel = booted_kernel();
        let child_pid = dispatch(&kernel, TaskId::INIT, SyscallNumber::Fork as usize, &SyscallArgs::default());
        let child = TaskId::new(child_pid as i32);
        let rc = dispatch(&kernel, child, SyscallNumber::Exit as usize, &SyscallArgs { a0: 0, ..Default::default() });
        assert_eq!(rc, 0);
        // The process table still carries the zombie; a second exit fails.
        let rc2 = dispatch(&kernel, child, SyscallNumber::Exit as usize, &SyscallArgs { a0: 0, ..Default::default() });
        assert_eq!(rc2, astra_core::errno::Errno::Esrch.to_negated());
    }

    #[test]
    fn open_read_close_devfs_null() {
        let kernel = booted_kernel();
        let path = "/dev/null";
        let fd = dispatch(&kernel, TaskId::INIT, SyscallNumber::Open as usize, &path_args(path));
        assert!(fd >= 0);

        let mut buf = [1u8; 8];
        let read_args = SyscallArgs { a0: fd as usize, a1: buf.as_mut_ptr() as usize, a2: buf.len(), ..Default::default() };
        let n = dispatch(&kernel, TaskId::INIT, SyscallNumber::Read as usize, &read_args);
        assert_eq!(n, 0, "reading /dev/null is always EOF");

        let close_args = SyscallArgs { a0: fd as usize, ..Default::default() };
        let rc = dispatch(&kernel, TaskId::INIT, SyscallNumber::Close as usize, &close_args);
        assert_eq!(rc, 0);
    }

    #[test]
    fn close_unknown_fd_reports_ebadf() {
        let kernel = booted_kernel();
        let rc = dispatch(&kernel, TaskId::INIT, SyscallNumber::Close as usize, &SyscallArgs { a0: 7, ..Default::default() });
        assert_eq!(rc, astra_core::errno::Errno::Ebadf.to_negated());
    }

    #[test]
    fn nice_without_privilege_cannot_raise_priority() {
        let kernel = booted_kernel();
        let child_pid = dispatch(&kernel, TaskId::INIT, SyscallNumber::Fork as usize, &SyscallArgs::default());
        let child = TaskId::new(child_pid as i32);
        kernel.processes.lock().setresuid(child, Some(1000), Some(1000), Some(1000)).unwrap();
        let rc = dispatch(&kernel, child, SyscallNumber::Nice as usize, &SyscallArgs { a0: (-5_i32) as usize, ..Default::default() });
        assert_eq!(rc, astra_core::errno::Errno::Eperm.to_negated());
    }

    #[test]
    fn chdir_updates_cwd_for_subsequent_relative_open() {
        let kernel = booted_kernel();
        let chdir_rc = dispatch(&kernel, TaskId::INIT, SyscallNumber::Chdir as usize, &path_args("/dev"));
        assert_eq!(chdir_rc, 0);
        let fd = dispatch(&kernel, TaskId::INIT, SyscallNumber::Open as usize, &path_args("null"));
        assert!(fd >= 0);
    }

    #[test]
    fn mknod_then_open_then_read_reaches_the_attached_block_device() {
        const S_IFBLK: usize = 0o060_000;
        const MKDEV_MAJOR_1_MINOR_0: usize = 1 << 8;

        let (kernel, fs) = booted_kernel_with_devfs();
        let disk = Arc::new(FakeDisk { sectors: astra_core::sync::SpinLock::new(alloc::vec![0u8; 512]) });
        fs.block_registry().attach_device(1, disk).unwrap();

        let path = "/dev/hda";
        let mknod_args = SyscallArgs {
            a0: path.as_ptr() as usize,
            a1: path.len(),
            a2: S_IFBLK | 0o600,
            a3: MKDEV_MAJOR_1_MINOR_0,
            ..Default::default()
        };
        let rc = dispatch(&kernel, TaskId::INIT, SyscallNumber::Mknod as usize, &mknod_args);
        assert_eq!(rc, 0);

        let fd = dispatch(&kernel, TaskId::INIT, SyscallNumber::Open as usize, &path_args(path));
        assert!(fd >= 0);

        let mut buf = [0xffu8; 512];
        let read_args = SyscallArgs { a0: fd as usize, a1: buf.as_mut_ptr() as usize, a2: buf.len(), ..Default::default() };
        let n = dispatch(&kernel, TaskId::INIT, SyscallNumber::Read as usize, &read_args);
        assert_eq!(n, 512);
    }

    #[test]
    fn not_yet_implemented_syscalls_report_enotty() {
        let kernel = booted_kernel();
        let rc = dispatch(&kernel, TaskId::INIT, SyscallNumber::Sbrk as usize, &SyscallArgs::default());
        assert_eq!(rc, astra_core::errno::Errno::Enotty.to_negated());
    }
}
