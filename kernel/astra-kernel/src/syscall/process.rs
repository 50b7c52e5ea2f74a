//! Process, session, and credential syscall handlers. Each function
//! unpacks its typed arguments from the trapped registers, calls into
//! [`astra_sched::ProcessTable`], and maps the result back onto the
//! syscall-return convention (a non-negative value, or an errno mapped by
//! the caller in [`super::dispatch`]).

use astra_core::task::TaskId;

use super::Registers;
use crate::state::{Kernel, KernelError};

pub(super) fn sys_fork(kernel: &Kernel, caller: TaskId) -> Result<isize, KernelError> {
    let child = kernel.fork(caller)?;
    kernel.processes.lock().enqueue_ready(child)?;
    Ok(child.raw() as isize)
}

pub(super) fn sys_exit(kernel: &Kernel, caller: TaskId, status: i32) -> Result<isize, KernelError> {
    kernel.processes.lock().exit(caller, status)?;
    kernel.drop_file_table(caller);
    Ok(0)
}

pub(super) fn sys_setpgid(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let target = pid_arg(regs.arg0(), caller);
    let pgid = pid_arg(regs.arg1(), caller);
    kernel.processes.lock().setpgid(caller, target, pgid)?;
    Ok(0)
}

pub(super) fn sys_getpgid(kernel: &Kernel, regs: &impl Registers) -> Result<isize, KernelError> {
    let pid = TaskId::new(regs.arg0() as i32);
    let pgid = kernel.processes.lock().getpgid(pid)?;
    Ok(pgid.raw() as isize)
}

pub(super) fn sys_setsid(kernel: &Kernel, caller: TaskId) -> Result<isize, KernelError> {
    let sid = kernel.processes.lock().setsid(caller)?;
    Ok(sid.raw() as isize)
}

pub(super) fn sys_getsid(kernel: &Kernel, regs: &impl Registers) -> Result<isize, KernelError> {
    let pid = TaskId::new(regs.arg0() as i32);
    let sid = kernel.processes.lock().getsid(pid)?;
    Ok(sid.raw() as isize)
}

pub(super) fn sys_nice(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let inc = regs.arg0() as i32;
    let privileged = kernel.processes.lock().getresuid(caller)?.1 == 0;
    let new_nice = kernel.processes.lock().nice(caller, inc, privileged)?;
    Ok(new_nice as isize)
}

/// `-1` (all bits set) means "leave this field unchanged", per POSIX
/// `setresuid`/`setresgid`'s convention.
fn optional_id(raw: usize) -> Option<u32> {
    let value = raw as u32;
    if value == u32::MAX { None } else { Some(value) }
}

pub(super) fn sys_setresuid(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let ruid = optional_id(regs.arg0());
    let euid = optional_id(regs.arg1());
    let suid = optional_id(regs.arg2());
    kernel.processes.lock().setresuid(caller, ruid, euid, suid)?;
    Ok(0)
}

pub(super) fn sys_getresuid(kernel: &Kernel, caller: TaskId) -> Result<isize, KernelError> {
    // Triple can't be packed into one return register; a real binding would
    // write it through a user pointer (out of scope per §6's `EFAULT`
    // note). Here we report only the effective uid, matching `getuid`-style
    // degraded behavior until that plumbing exists.
    let (_, euid, _) = kernel.processes.lock().getresuid(caller)?;
    Ok(euid as isize)
}

pub(super) fn sys_setresgid(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let rgid = optional_id(regs.arg0());
    let egid = optional_id(regs.arg1());
    let sgid = optional_id(regs.arg2());
    kernel.processes.lock().setresgid(caller, rgid, egid, sgid)?;
    Ok(0)
}

pub(super) fn sys_getresgid(kernel: &Kernel, caller: TaskId) -> Result<isize, KernelError> {
    let (_, egid, _) = kernel.processes.lock().getresgid(caller)?;
    Ok(egid as isize)
}

pub(super) fn sys_chdir(kernel: &Kernel, caller: TaskId, regs: &impl Registers) -> Result<isize, KernelError> {
    let path = user_path(regs.arg0(), regs.arg1())?;
    let mut processes = kernel.processes.lock();
    let cwd = processes.get(caller).ok_or(KernelError::NoSuchProcess)?.cwd.clone();
    let canonical = astra_fs::path::canonicalize(&cwd, &path);
    processes.set_cwd(caller, canonical)?;
    Ok(0)
}

fn pid_arg(raw: usize, caller: TaskId) -> TaskId {
    if raw == 0 { caller } else { TaskId::new(raw as i32) }
}

/// Reads a user-supplied path argument. Copying bytes out of user memory is
/// an arch-layer concern (the `EFAULT` case in §7); this stand-in treats
/// the pointer as already validated and resident, which is sound only for
/// the in-kernel test harness driving this dispatcher directly.
pub(super) fn user_path(ptr: usize, len: usize) -> Result<alloc::string::String, KernelError> {
    if ptr == 0 {
        return Err(KernelError::Fs(astra_fs::FsError::InvalidArgument));
    }
    // SAFETY: see doc comment above — no real user-memory validation here.
    let bytes = unsafe { core::slice::from_raw_parts(ptr as *const u8, len) };
    core::str::from_utf8(bytes)
        .map(alloc::string::ToString::to_string)
        .map_err(|_| KernelError::Fs(astra_fs::FsError::InvalidArgument))
}
