//! The per-process record.
//!
//! Fields mirror §4.3's inventory: execution context (owned by
//! [`astra_mm::paging::PageDirectory`], referenced here, not duplicated),
//! policy (niceness), credentials (real/effective/saved uid/gid), filesystem
//! position (cwd, command name), and scheduling state.

use alloc::string::String;
use alloc::vec::Vec;

use astra_core::task::{Priority, TaskId};

/// Real/effective/saved uid and gid triples, per §4.3's credential
/// inventory. `setresuid`/`setresgid` (in [`crate::table`]) enforce the
/// POSIX saved-id transition rules over these fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    /// Real user id.
    pub ruid: u32,
    /// Effective user id.
    pub euid: u32,
    /// Saved user id.
    pub suid: u32,
    /// Real group id.
    pub rgid: u32,
    /// Effective group id.
    pub egid: u32,
    /// Saved group id.
    pub sgid: u32,
}

impl Credentials {
    /// The root (uid/gid 0) credential triple, used for pid 1.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            ruid: 0,
            euid: 0,
            suid: 0,
            rgid: 0,
            egid: 0,
            sgid: 0,
        }
    }
}

/// A task's scheduling state.
///
/// Per the design note on the waitqueue/run-queue duality: rather than a
/// task being separately "in the run queue" or "in a waitqueue" as two
/// structures that must be kept consistent, its membership is recorded
/// directly in this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Runnable, waiting for its turn in the run queue.
    Ready,
    /// Currently the task being executed.
    Running,
    /// Parked on a waitqueue, not runnable.
    Sleeping,
    /// Has called `exit`; resources released, awaiting reap. Exited tasks
    /// remain in the table until reaped — there is no reaper in this
    /// crate's scope, so in practice they persist for the kernel's
    /// lifetime (§4.3: "reaper not implemented").
    Zombie {
        /// The exit status passed to `exit`.
        status: i32,
    },
}

/// A process (or the idle/tasklet pseudo-process).
pub struct Task {
    /// This task's pid.
    pub pid: TaskId,
    /// Parent pid. `None` only for the init task and the idle task.
    pub ppid: Option<TaskId>,
    /// Process group id.
    pub pgid: TaskId,
    /// Session id.
    pub sid: TaskId,
    /// Credential triples.
    pub creds: Credentials,
    /// Niceness, `[-20, 19]`.
    pub nice: i32,
    /// Current working directory, as a canonical absolute path.
    pub cwd: String,
    /// Command name, as shown by a process listing.
    pub cmd: String,
    /// Direct children, in creation order.
    pub children: Vec<TaskId>,
    /// Scheduling tier.
    pub priority: Priority,
    /// Current scheduling state.
    pub state: TaskState,
}

impl Task {
    /// Whether this task is a session leader (`sid == pid`).
    #[must_use]
    pub fn is_session_leader(&self) -> bool {
        self.sid == self.pid
    }

    /// Whether this task is a process group leader (`pgid == pid`).
    #[must_use]
    pub fn is_group_leader(&self) -> bool {
        self.pgid == self.pid
    }
}
