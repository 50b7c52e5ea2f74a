//! Kernel-wide state: the process table, VFS, and per-process open-file
//! tables, all under one lock-per-subsystem struct the syscall layer closes
//! over.
//!
//! The open-file table is kept here rather than on `astra_sched::Task`
//! itself, since the scheduler crate has no dependency on `astra-fs` and
//! shouldn't acquire one just to carry a `[Option<NodeHandle>; MAX_OF]`
//! array — a deliberate layering choice, not an oversight.

use alloc::collections::BTreeMap;

use astra_core::config::MAX_OF;
use astra_core::errno::Errno;
use astra_core::sync::SpinLock;
use astra_core::task::TaskId;
use astra_fs::{FsError, NodeHandle, Vfs};
use astra_sched::{ProcessTable, SchedError};

/// One process's open-file table: up to [`MAX_OF`] slots, indexed by file
/// descriptor number.
pub struct FileTable {
    slots: [Option<OpenFile>; MAX_OF],
}

/// A single open file: the underlying VFS handle plus the cursor `read`/
/// `write` advance and the flags it was opened with.
pub struct OpenFile {
    /// The open VFS node.
    pub handle: NodeHandle,
    /// Current seek offset.
    pub offset: usize,
}

impl FileTable {
    fn new() -> Self {
        Self { slots: core::array::from_fn(|_| None) }
    }

    /// Installs `file` in the lowest-numbered free slot, returning its
    /// descriptor number.
    pub(crate) fn install(&mut self, file: OpenFile) -> Result<usize, FsError> {
        let slot = self.slots.iter().position(Option::is_none).ok_or(FsError::Busy)?;
        self.slots[slot] = Some(file);
        Ok(slot)
    }

    /// Borrows the open file at `fd`.
    pub fn get(&self, fd: usize) -> Option<&OpenFile> {
        self.slots.get(fd).and_then(|slot| slot.as_ref())
    }

    /// Mutably borrows the open file at `fd`.
    pub fn get_mut(&mut self, fd: usize) -> Option<&mut OpenFile> {
        self.slots.get_mut(fd).and_then(|slot| slot.as_mut())
    }

    /// Removes and returns the open file at `fd`, freeing its slot.
    pub fn take(&mut self, fd: usize) -> Option<OpenFile> {
        self.slots.get_mut(fd).and_then(Option::take)
    }
}

/// An error from the syscall layer, unifying the scheduler's and
/// filesystem's error types so dispatch functions can use `?` across both.
#[derive(Debug, Clone, Copy)]
pub enum KernelError {
    /// A process-table operation failed.
    Sched(SchedError),
    /// A filesystem operation failed.
    Fs(FsError),
    /// The calling pid has no open-file table (it was never registered, or
    /// has already exited).
    NoSuchProcess,
    /// `fd` did not name an open file in the caller's table.
    BadFileDescriptor,
    /// The syscall depends on an out-of-scope external collaborator (ELF
    /// loading, a per-task address space switch) not yet wired up.
    NotImplemented,
}

impl KernelError {
    /// Maps to the errno returned (negated) to user code.
    #[must_use]
    pub fn to_errno(self) -> Errno {
        match self {
            Self::Sched(e) => e.to_errno(),
            Self::Fs(e) => e.to_errno(),
            Self::NoSuchProcess => Errno::Esrch,
            Self::BadFileDescriptor => Errno::Ebadf,
            Self::NotImplemented => Errno::Enotty,
        }
    }
}

impl From<SchedError> for KernelError {
    fn from(e: SchedError) -> Self {
        Self::Sched(e)
    }
}

impl From<FsError> for KernelError {
    fn from(e: FsError) -> Self {
        Self::Fs(e)
    }
}

/// The assembled kernel: process table, VFS, and per-pid file tables,
/// behind independent locks so a filesystem operation on one process never
/// blocks a scheduling decision on another.
pub struct Kernel {
    /// The process table.
    pub processes: SpinLock<ProcessTable>,
    /// The virtual filesystem (mount table and driver registry).
    pub vfs: Vfs,
    files: SpinLock<BTreeMap<TaskId, FileTable>>,
}

impl Kernel {
    /// Assembles a fresh kernel with only the init task present and an
    /// empty (unmounted) VFS.
    #[must_use]
    pub fn new() -> Self {
        let mut files = BTreeMap::new();
        files.insert(TaskId::INIT, FileTable::new());
        Self {
            processes: SpinLock::new(ProcessTable::new()),
            vfs: Vfs::new(),
            files: SpinLock::new(files),
        }
    }

    /// Forks `parent`, creating both a process-table entry and an empty
    /// file table for the child (mirroring `fork`'s fd-table duplication
    /// would additionally copy `parent`'s open descriptors; left as a
    /// follow-up since the underlying VFS handles aren't `Clone`).
    pub fn fork(&self, parent: TaskId) -> Result<TaskId, KernelError> {
        let child = self.processes.lock().fork(parent)?;
        self.files.lock().insert(child, FileTable::new());
        Ok(child)
    }

    /// Removes `pid`'s file table, closing every still-open descriptor
    /// through the VFS refcount. Called by `exit`.
    pub fn drop_file_table(&self, pid: TaskId) {
        if let Some(mut table) = self.files.lock().remove(&pid) {
            for fd in 0..MAX_OF {
                if let Some(file) = table.take(fd) {
                    self.vfs.close_vfs(file.handle);
                }
            }
        }
    }

    /// Runs `f` with mutable access to `pid`'s file table.
    pub fn with_files<R>(&self, pid: TaskId, f: impl FnOnce(&mut FileTable) -> R) -> Result<R, KernelError> {
        let mut files = self.files.lock();
        let table = files.get_mut(&pid).ok_or(KernelError::NoSuchProcess)?;
        Ok(f(table))
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}
