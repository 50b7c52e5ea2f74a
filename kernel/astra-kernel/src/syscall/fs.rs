//! VFS-backed syscall handlers: `open`/`close`/`read`/`write`/`pread`/
//! `pwrite`/`lseek`/`readdir`/`stat`/`chmod`/`chown`/`unlink`/`mount`/
//! `umount`.
//!
//! Every path argument is resolved relative to the caller's `cwd`, per
//! §6's path syntax; every blocking VFS call is driven to completion with
//! a tiny spin-poll loop rather than a real await point, since this crate
//! has no executor of its own to suspend into (the scheduler's executor
//! lives in `astra-sched` and drives *tasks*, not individual syscalls) —
//! documented in the workspace design notes as a stand-in for a proper
//! per-task continuation.

use alloc::string::ToString;
use alloc::vec;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use astra_core::task::TaskId;
use astra_fs::{FsError, MountFlags};

use super::process::user_path;
use super::Registers;
use crate::state::{Kernel, KernelError, OpenFile};

fn block_on<F: Future>(mut fut: F) -> F::Output {
    fn clone(_: *const ()) -> RawWaker {
        RawWaker::new(core::ptr::null(), &VTABLE)
    }
    fn noop(_: *const ()) {}
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
    let waker = unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) };
    let mut cx = Context::from_waker(&waker);
    // SAFETY: `fut` is a local that outlives every poll below and is never
    // moved after being pinned.
    let mut fut = unsafe { Pin::new_unchecked(&mut fut) };
    loop {
        if let Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
            return v;
        }
    }
}

fn resolve_path(kernel: &Kernel, caller: TaskId, ptr: usize, len: usize) -> Result<alloc::string::String, KernelError> {
    let relpath = user_path(ptr, len)?;
    let cwd = kernel
        .processes
        .lock()
        .get(caller)
        .ok_or(KernelError::NoSuchProcess)?
        .cwd
        .clone();
    Ok(astra_fs::path::canonicalize(&cwd, &relpath))
}

/// Open-flag bits, per the original kernel's encoding: `O_RDONLY`/`O_WRONLY`
/// are independent bits rather than a 2-bit access-mode field, so `O_RDWR`
/// is literally `O_RDONLY | O_WRONLY`.
const O_RDONLY: usize = 0x01;
const O_WRONLY: usize = 0x02;
const O_APPEND: usize = 0x04;
const O_CREAT: usize = 0x08;
const O_EXCL: usize = 0x10;
const O_TRUNC: usize = 0x20;

pub(super) fn sys_open(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let path = resolve_path(kernel, caller, regs.arg0(), regs.arg1())?;
    let flags = regs.arg2();
    let mode = astra_fs::Mode::from_bits_truncate(regs.arg3() as u32);

    let (_, euid, _) = kernel.processes.lock().getresuid(caller)?;
    let (_, egid, _) = kernel.processes.lock().getresgid(caller)?;

    if flags & O_CREAT != 0 {
        let (parent_path, name) = split_parent(&path)?;
        let parent = block_on(kernel.vfs.resolve(&parent_path))?;
        if !parent.permissions().check(euid, egid, false, true) {
            return Err(KernelError::Fs(FsError::PermissionDenied));
        }
        let perms = astra_fs::Permissions { uid: euid, gid: egid, mode };
        match block_on(parent.create(name, astra_fs::InodeType::File, perms, None)) {
            Ok(_) => {}
            Err(FsError::AlreadyExists) if flags & O_EXCL != 0 => return Err(KernelError::Fs(FsError::AlreadyExists)),
            Err(FsError::AlreadyExists) => {}
            Err(err) => return Err(KernelError::Fs(err)),
        }
    }

    let handle = block_on(kernel.vfs.kopen("/", &path))?;
    let inode_perms = handle.inode.permissions();
    if !inode_perms.check(euid, egid, flags & O_RDONLY != 0, flags & O_WRONLY != 0) {
        kernel.vfs.close_vfs(handle);
        return Err(KernelError::Fs(FsError::PermissionDenied));
    }

    if flags & O_TRUNC != 0 && handle.inode.inode_type() == astra_fs::InodeType::File {
        if let Err(err) = handle.inode.truncate(0) {
            kernel.vfs.close_vfs(handle);
            return Err(KernelError::Fs(err));
        }
    }

    let offset = if flags & O_APPEND != 0 { handle.inode.size() } else { 0 };
    let fd = kernel.with_files(caller, |files| files.install(OpenFile { handle, offset }))??;
    Ok(fd as isize)
}

pub(super) fn sys_close(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let fd = regs.arg0();
    let file = kernel.with_files(caller, |files| files.take(fd))?.ok_or(KernelError::BadFileDescriptor)?;
    kernel.vfs.close_vfs(file.handle);
    Ok(0)
}

pub(super) fn sys_read(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let fd = regs.arg0();
    let buf_ptr = regs.arg1();
    let buf_len = regs.arg2();
    let mut buf = vec![0u8; buf_len];

    let offset = kernel.with_files(caller, |files| files.get(fd).map(|f| f.offset))?.ok_or(KernelError::BadFileDescriptor)?;
    let n = read_at(kernel, caller, fd, offset, &mut buf)?;
    kernel.with_files(caller, |files| {
        if let Some(file) = files.get_mut(fd) {
            file.offset += n;
        }
    })?;
    copy_to_user(buf_ptr, &buf[..n]);
    Ok(n as isize)
}

pub(super) fn sys_pread(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let fd = regs.arg0();
    let buf_ptr = regs.arg1();
    let buf_len = regs.arg2();
    let offset = regs.arg3();
    let mut buf = vec![0u8; buf_len];
    let n = read_at(kernel, caller, fd, offset, &mut buf)?;
    copy_to_user(buf_ptr, &buf[..n]);
    Ok(n as isize)
}

fn read_at(kernel: &Kernel, caller: TaskId, fd: usize, offset: usize, buf: &mut [u8]) -> Result<usize, KernelError> {
    kernel.with_files(caller, |files| {
        let file = files.get(fd).ok_or(KernelError::BadFileDescriptor)?;
        let inode = file.handle.inode.clone();
        Ok(block_on(inode.read(offset, buf)).map_err(KernelError::Fs)?)
    })?
}

pub(super) fn sys_write(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let fd = regs.arg0();
    let buf_ptr = regs.arg1();
    let buf_len = regs.arg2();
    let buf = copy_from_user(buf_ptr, buf_len);

    let offset = kernel.with_files(caller, |files| files.get(fd).map(|f| f.offset))?.ok_or(KernelError::BadFileDescriptor)?;
    let n = write_at(kernel, caller, fd, offset, &buf)?;
    kernel.with_files(caller, |files| {
        if let Some(file) = files.get_mut(fd) {
            file.offset += n;
        }
    })?;
    Ok(n as isize)
}

pub(super) fn sys_pwrite(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let fd = regs.arg0();
    let buf_ptr = regs.arg1();
    let buf_len = regs.arg2();
    let offset = regs.arg3();
    let buf = copy_from_user(buf_ptr, buf_len);
    let n = write_at(kernel, caller, fd, offset, &buf)?;
    Ok(n as isize)
}

fn write_at(kernel: &Kernel, caller: TaskId, fd: usize, offset: usize, buf: &[u8]) -> Result<usize, KernelError> {
    kernel.with_files(caller, |files| {
        let file = files.get(fd).ok_or(KernelError::BadFileDescriptor)?;
        let inode = file.handle.inode.clone();
        Ok(block_on(inode.write(offset, buf)).map_err(KernelError::Fs)?)
    })?
}

/// `whence` values for `lseek`, per the classic POSIX trio.
const SEEK_SET: usize = 0;
const SEEK_CUR: usize = 1;
const SEEK_END: usize = 2;

pub(super) fn sys_lseek(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let fd = regs.arg0();
    let offset = regs.arg1() as isize;
    let whence = regs.arg2();

    kernel.with_files(caller, |files| {
        let file = files.get_mut(fd).ok_or(KernelError::BadFileDescriptor)?;
        let base = match whence {
            SEEK_SET => 0,
            SEEK_CUR => file.offset as isize,
            SEEK_END => file.handle.inode.size() as isize,
            _ => return Err(KernelError::Fs(FsError::InvalidSeek)),
        };
        let new_offset = base.checked_add(offset).ok_or(KernelError::Fs(FsError::InvalidSeek))?;
        if new_offset < 0 {
            return Err(KernelError::Fs(FsError::InvalidSeek));
        }
        file.offset = new_offset as usize;
        Ok(new_offset as isize)
    })?
}

pub(super) fn sys_readdir(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let fd = regs.arg0();
    let entries = kernel.with_files(caller, |files| {
        let file = files.get(fd).ok_or(KernelError::BadFileDescriptor)?;
        let inode = file.handle.inode.clone();
        Ok::<_, KernelError>(block_on(inode.readdir()).map_err(KernelError::Fs)?)
    })??;
    Ok(entries.len() as isize)
}

pub(super) fn sys_stat(kernel: &Kernel, regs: &impl Registers) -> Result<isize, KernelError> {
    let path = user_path(regs.arg0(), regs.arg1())?;
    let inode = block_on(kernel.vfs.resolve(&path))?;
    // A real `stat` writes a `struct stat` through the user pointer in
    // `arg2`/`arg3`; reporting the size directly in the return value is a
    // stand-in until that marshalling exists.
    Ok(inode.size() as isize)
}

pub(super) fn sys_chmod(kernel: &Kernel, regs: &impl Registers) -> Result<isize, KernelError> {
    let path = user_path(regs.arg0(), regs.arg1())?;
    let mode = astra_fs::Mode::from_bits_truncate(regs.arg2() as u32);
    let inode = block_on(kernel.vfs.resolve(&path))?;
    inode.chmod(mode)?;
    Ok(0)
}

pub(super) fn sys_chown(kernel: &Kernel, regs: &impl Registers) -> Result<isize, KernelError> {
    let path = user_path(regs.arg0(), regs.arg1())?;
    let uid = regs.arg2() as u32;
    let gid = regs.arg3() as u32;
    let inode = block_on(kernel.vfs.resolve(&path))?;
    inode.chown(uid, gid)?;
    Ok(0)
}

pub(super) fn sys_unlink(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let path = resolve_path(kernel, caller, regs.arg0(), regs.arg1())?;
    let (parent_path, name) = split_parent(&path)?;
    let parent = block_on(kernel.vfs.resolve(&parent_path))?;
    block_on(parent.unlink(name))?;
    Ok(0)
}

fn split_parent(path: &str) -> Result<(alloc::string::String, &str), KernelError> {
    let trimmed = path.trim_end_matches('/');
    let pos = trimmed.rfind('/').ok_or(KernelError::Fs(FsError::InvalidArgument))?;
    let (parent, rest) = trimmed.split_at(pos);
    let name = &rest[1..];
    if name.is_empty() {
        return Err(KernelError::Fs(FsError::InvalidArgument));
    }
    Ok((if parent.is_empty() { "/".to_string() } else { parent.to_string() }, name))
}

/// `mode`'s type bits, per the classic `mknod(2)` ABI: the low 12 bits are
/// permission bits, the rest names the node type.
const S_IFMT: u32 = 0o170_000;
const S_IFCHR: u32 = 0o020_000;
const S_IFBLK: u32 = 0o060_000;

pub(super) fn sys_mknod(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let path = resolve_path(kernel, caller, regs.arg0(), regs.arg1())?;
    let mode_raw = regs.arg2() as u32;
    let itype = match mode_raw & S_IFMT {
        S_IFCHR => astra_fs::InodeType::CharDevice,
        S_IFBLK => astra_fs::InodeType::BlockDevice,
        _ => return Err(KernelError::Fs(FsError::InvalidArgument)),
    };
    // `MKDEV(major, minor)` packs `(major << 8) | minor`, per §8's scenario.
    let dev_raw = regs.arg3() as u32;
    let major = ((dev_raw >> 8) & 0xFF) as u8;
    let minor = dev_raw & 0xFF;

    let (_, euid, _) = kernel.processes.lock().getresuid(caller)?;
    let (_, egid, _) = kernel.processes.lock().getresgid(caller)?;
    let perms = astra_fs::Permissions { uid: euid, gid: egid, mode: astra_fs::Mode::from_bits_truncate(mode_raw & 0o7777) };

    let (parent_path, name) = split_parent(&path)?;
    let parent = block_on(kernel.vfs.resolve(&parent_path))?;
    block_on(parent.create(name, itype, perms, Some(astra_fs::DeviceNumber::new(major, minor))))?;
    Ok(0)
}

pub(super) fn sys_mount(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let target = resolve_path(kernel, caller, regs.arg0(), regs.arg1())?;
    let fs_name = user_path(regs.arg2(), regs.arg3())?;
    kernel.vfs.mount("/", &target, &fs_name, None, MountFlags::empty())?;
    Ok(0)
}

pub(super) fn sys_umount(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let target = resolve_path(kernel, caller, regs.arg0(), regs.arg1())?;
    kernel.vfs.umount("/", &target, MountFlags::empty())?;
    Ok(0)
}

/// Copies into user memory. See [`super::process::user_path`]'s caveat:
/// this crate has no real user/kernel address-space boundary to enforce.
fn copy_to_user(ptr: usize, data: &[u8]) {
    if ptr == 0 {
        return;
    }
    // SAFETY: see module doc comment — stand-in pending arch-layer support.
    unsafe {
        core::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len());
    }
}

fn copy_from_user(ptr: usize, len: usize) -> alloc::vec::Vec<u8> {
    if ptr == 0 {
        return alloc::vec::Vec::new();
    }
    // SAFETY: see module doc comment — stand-in pending arch-layer support.
    let slice = unsafe { core::slice::from_raw_parts(ptr as *const u8, len) };
    slice.to_vec()
}

