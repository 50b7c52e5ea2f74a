//! The process table: pid allocation, the run queue, and the POSIX
//! process-group/session/credential operations.
//!
//! Grounded on `task.c`'s `fork`, `exit_task`, `setpgid`/`getpgid`,
//! `setsid`/`getsid`, `setresuid`/`getresuid`, `setresgid`/`getresgid`, and
//! `nice`. The two-structure "process list sorted by pid" + "process tree"
//! design is collapsed into one `BTreeMap<TaskId, Task>` per the REDESIGN
//! FLAGS note — parent/child edges are pid values inside that single store.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::vec::Vec;

use astra_core::config::MAX_PID;
use astra_core::errno::Errno;
use astra_core::task::{Priority, TaskId};

use crate::process::{Credentials, Task, TaskState};

/// Errors from process-table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// No pid in `[1, MAX_PID]` is currently free.
    PidSpaceExhausted,
    /// The named pid has no live task.
    NoSuchProcess,
    /// The operation isn't permitted for the caller (e.g. the target isn't
    /// a descendant in the caller's session, or a credential change failed
    /// the saved-id rule).
    NotPermitted,
    /// `setpgid` was asked to join a group with no existing leader and a
    /// `pgid` that isn't `0` or the target's own pid.
    InvalidArgument,
}

impl SchedError {
    /// Maps to the nearest POSIX errno.
    #[must_use]
    pub const fn to_errno(self) -> Errno {
        match self {
            Self::PidSpaceExhausted => Errno::Eagain,
            Self::NoSuchProcess => Errno::Esrch,
            Self::NotPermitted => Errno::Eperm,
            Self::InvalidArgument => Errno::Einval,
        }
    }
}

type Result<T> = core::result::Result<T, SchedError>;

/// The process table: every live task, the run queue, and pid allocation
/// state.
pub struct ProcessTable {
    tasks: BTreeMap<TaskId, Task>,
    run_queue: [VecDeque<TaskId>; Priority::COUNT],
    next_pid_hint: i32,
}

impl ProcessTable {
    /// Creates a table containing only the init task (pid 1), its own
    /// process-group and session leader, with root credentials and `cwd =
    /// "/"`. Mirrors `init_tasking`'s construction of the first task.
    #[must_use]
    pub fn new() -> Self {
        let mut tasks = BTreeMap::new();
        tasks.insert(
            TaskId::INIT,
            Task {
                pid: TaskId::INIT,
                ppid: None,
                pgid: TaskId::INIT,
                sid: TaskId::INIT,
                creds: Credentials::root(),
                nice: 0,
                cwd: String::from("/"),
                cmd: String::from("[init]"),
                children: Vec::new(),
                priority: Priority::Normal,
                state: TaskState::Running,
            },
        );
        Self {
            tasks,
            run_queue: core::array::from_fn(|_| VecDeque::new()),
            next_pid_hint: TaskId::INIT.raw() + 1,
        }
    }

    /// Finds the first pid in `[1, MAX_PID]` with no live task, starting
    /// from a rolling hint so repeated calls after churn don't always
    /// rescan from 1. Mirrors `nextpid`.
    fn nextpid(&mut self) -> Result<TaskId> {
        let max = MAX_PID as i32;
        for offset in 0..max {
            let candidate = 1 + (self.next_pid_hint - 1 + offset).rem_euclid(max);
            if !self.tasks.contains_key(&TaskId::new(candidate)) {
                self.next_pid_hint = candidate + 1;
                return Ok(TaskId::new(candidate));
            }
        }
        Err(SchedError::PidSpaceExhausted)
    }

    /// Looks up a task by pid.
    #[must_use]
    pub fn get(&self, pid: TaskId) -> Option<&Task> {
        self.tasks.get(&pid)
    }

    fn get_mut(&mut self, pid: TaskId) -> Result<&mut Task> {
        self.tasks.get_mut(&pid).ok_or(SchedError::NoSuchProcess)
    }

    /// Enqueues `pid` onto the tail of its priority's run queue and marks it
    /// [`TaskState::Ready`].
    pub fn enqueue_ready(&mut self, pid: TaskId) -> Result<()> {
        let priority = self.get_mut(pid)?.priority;
        self.get_mut(pid)?.state = TaskState::Ready;
        self.run_queue[priority.index()].push_back(pid);
        Ok(())
    }

    /// Dequeues the next task to run, highest-priority tier first, FIFO
    /// within a tier — a round-robin run queue, per §4.3's ordering
    /// guarantee.
    pub fn dequeue_ready(&mut self) -> Option<TaskId> {
        for tier in &mut self.run_queue {
            if let Some(pid) = tier.pop_front() {
                return Some(pid);
            }
        }
        None
    }

    /// Creates a child of `parent`, cloning its credentials, niceness, cwd,
    /// and command name; the child's page directory and open files are the
    /// caller's responsibility (owned by `astra-mm`/`astra-fs`, not this
    /// table). Mirrors `fork`'s session/group inheritance rule: a session
    /// leader's child gets a fresh `pgid = sid = <new pid>`; otherwise the
    /// child inherits the parent's `pgid`/`sid` unchanged.
    pub fn fork(&mut self, parent: TaskId) -> Result<TaskId> {
        let parent_task_is_leader;
        let (creds, nice, cwd, cmd, pgid, sid, priority) = {
            let parent_task = self.get(parent).ok_or(SchedError::NoSuchProcess)?;
            parent_task_is_leader = parent_task.is_session_leader();
            (
                parent_task.creds,
                parent_task.nice,
                parent_task.cwd.clone(),
                parent_task.cmd.clone(),
                parent_task.pgid,
                parent_task.sid,
                parent_task.priority,
            )
        };

        let child_pid = self.nextpid()?;
        let (child_pgid, child_sid) = if parent_task_is_leader {
            (child_pid, child_pid)
        } else {
            (pgid, sid)
        };

        self.tasks.insert(
            child_pid,
            Task {
                pid: child_pid,
                ppid: Some(parent),
                pgid: child_pgid,
                sid: child_sid,
                creds,
                nice,
                cwd,
                cmd,
                children: Vec::new(),
                priority,
                state: TaskState::Ready,
            },
        );
        self.get_mut(parent)?.children.push(child_pid);
        self.enqueue_ready(child_pid)?;
        Ok(child_pid)
    }

    /// Terminates `pid`, reparenting its children to init and marking it a
    /// zombie. `pid` must not be the init task. Mirrors `exit_task`: the
    /// task is not removed from the table (no reaper), only from the run
    /// queue it may have been sitting in.
    pub fn exit(&mut self, pid: TaskId, status: i32) -> Result<()> {
        if pid == TaskId::INIT {
            return Err(SchedError::NotPermitted);
        }
        let children = core::mem::take(&mut self.get_mut(pid)?.children);
        for &child in &children {
            if let Some(child_task) = self.tasks.get_mut(&child) {
                child_task.ppid = Some(TaskId::INIT);
            }
        }
        self.get_mut(TaskId::INIT)
            .expect("init task always present")
            .children
            .extend(children);

        for tier in &mut self.run_queue {
            tier.retain(|&queued| queued != pid);
        }
        self.get_mut(pid)?.state = TaskState::Zombie { status };
        Ok(())
    }

    /// Whether `descendant` is `ancestor` itself or reachable from it by
    /// following child edges — used by `setpgid`'s "descendant of the
    /// caller" rule.
    #[must_use]
    pub fn is_self_or_descendant(&self, ancestor: TaskId, descendant: TaskId) -> bool {
        if ancestor == descendant {
            return true;
        }
        let mut stack: Vec<TaskId> = match self.tasks.get(&ancestor) {
            Some(t) => t.children.clone(),
            None => return false,
        };
        while let Some(pid) = stack.pop() {
            if pid == descendant {
                return true;
            }
            if let Some(t) = self.tasks.get(&pid) {
                stack.extend(t.children.iter().copied());
            }
        }
        false
    }

    /// Reassigns `target`'s process group, per POSIX rules reproduced from
    /// `setpgid`: `target` must be the caller itself or a descendant of the
    /// caller within the caller's session, and must not itself be a session
    /// leader. `pgid == 0` or `pgid == target` makes `target` a new group
    /// leader of its own pgid; otherwise `pgid` must name an existing group
    /// leader in the same session.
    pub fn setpgid(&mut self, caller: TaskId, target: TaskId, pgid: TaskId) -> Result<()> {
        if !self.is_self_or_descendant(caller, target) {
            return Err(SchedError::NotPermitted);
        }
        let caller_sid = self.get(caller).ok_or(SchedError::NoSuchProcess)?.sid;
        let target_task = self.get(target).ok_or(SchedError::NoSuchProcess)?;
        if target_task.sid != caller_sid {
            return Err(SchedError::NotPermitted);
        }
        if target_task.is_session_leader() {
            return Err(SchedError::NotPermitted);
        }

        let new_pgid = if pgid == TaskId::new(0) || pgid == target {
            target
        } else {
            let leader = self.get(pgid).ok_or(SchedError::InvalidArgument)?;
            if !leader.is_group_leader() || leader.sid != caller_sid {
                return Err(SchedError::InvalidArgument);
            }
            pgid
        };

        self.get_mut(target)?.pgid = new_pgid;
        Ok(())
    }

    /// Returns `pid`'s process group id.
    pub fn getpgid(&self, pid: TaskId) -> Result<TaskId> {
        Ok(self.get(pid).ok_or(SchedError::NoSuchProcess)?.pgid)
    }

    /// Makes `pid` a new session and process-group leader of itself.
    /// Mirrors `setsid`: fails if `pid` is already a process-group leader.
    pub fn setsid(&mut self, pid: TaskId) -> Result<TaskId> {
        let task = self.get(pid).ok_or(SchedError::NoSuchProcess)?;
        if task.is_group_leader() {
            return Err(SchedError::NotPermitted);
        }
        let t = self.get_mut(pid)?;
        t.sid = pid;
        t.pgid = pid;
        Ok(pid)
    }

    /// Returns `pid`'s session id.
    pub fn getsid(&self, pid: TaskId) -> Result<TaskId> {
        Ok(self.get(pid).ok_or(SchedError::NoSuchProcess)?.sid)
    }

    /// Sets real/effective/saved uid, per POSIX saved-id rules reproduced
    /// from `setresuid`: if the caller's current effective uid is `0`, any
    /// triple is accepted (pass `-1`-equivalent via `None` to leave a field
    /// unchanged); otherwise each field being changed must equal one of the
    /// caller's current ruid/euid/suid.
    pub fn setresuid(
        &mut self,
        pid: TaskId,
        ruid: Option<u32>,
        euid: Option<u32>,
        suid: Option<u32>,
    ) -> Result<()> {
        let task = self.get(pid).ok_or(SchedError::NoSuchProcess)?;
        let current = (task.creds.ruid, task.creds.euid, task.creds.suid);
        let privileged = task.creds.euid == 0;
        for requested in [ruid, euid, suid].into_iter().flatten() {
            if !privileged && requested != current.0 && requested != current.1 && requested != current.2 {
                return Err(SchedError::NotPermitted);
            }
        }
        let creds = &mut self.get_mut(pid)?.creds;
        if let Some(r) = ruid {
            creds.ruid = r;
        }
        if let Some(e) = euid {
            creds.euid = e;
        }
        if let Some(s) = suid {
            creds.suid = s;
        }
        Ok(())
    }

    /// Returns `pid`'s `(ruid, euid, suid)` triple.
    pub fn getresuid(&self, pid: TaskId) -> Result<(u32, u32, u32)> {
        let c = self.get(pid).ok_or(SchedError::NoSuchProcess)?.creds;
        Ok((c.ruid, c.euid, c.suid))
    }

    /// Sets real/effective/saved gid, mirroring [`Self::setresuid`]'s rule
    /// chain but against the gid triple.
    pub fn setresgid(
        &mut self,
        pid: TaskId,
        rgid: Option<u32>,
        egid: Option<u32>,
        sgid: Option<u32>,
    ) -> Result<()> {
        let task = self.get(pid).ok_or(SchedError::NoSuchProcess)?;
        let current = (task.creds.rgid, task.creds.egid, task.creds.sgid);
        let privileged = task.creds.euid == 0;
        for requested in [rgid, egid, sgid].into_iter().flatten() {
            if !privileged && requested != current.0 && requested != current.1 && requested != current.2 {
                return Err(SchedError::NotPermitted);
            }
        }
        let creds = &mut self.get_mut(pid)?.creds;
        if let Some(r) = rgid {
            creds.rgid = r;
        }
        if let Some(e) = egid {
            creds.egid = e;
        }
        if let Some(s) = sgid {
            creds.sgid = s;
        }
        Ok(())
    }

    /// Returns `pid`'s `(rgid, egid, sgid)` triple.
    pub fn getresgid(&self, pid: TaskId) -> Result<(u32, u32, u32)> {
        let c = self.get(pid).ok_or(SchedError::NoSuchProcess)?.creds;
        Ok((c.rgid, c.egid, c.sgid))
    }

    /// Adjusts `pid`'s niceness by `inc`, clamped to `[-20, 19]`. A negative
    /// `inc` (raising priority) requires the caller to be privileged
    /// (`euid == 0`), mirroring `nice`.
    pub fn nice(&mut self, pid: TaskId, inc: i32, caller_is_privileged: bool) -> Result<i32> {
        if inc < 0 && !caller_is_privileged {
            return Err(SchedError::NotPermitted);
        }
        let task = self.get_mut(pid)?;
        task.nice = (task.nice + inc).clamp(
            astra_core::config::NICE_MIN,
            astra_core::config::NICE_MAX,
        );
        Ok(task.nice)
    }

    /// Sets `pid`'s current working directory to the given canonical
    /// absolute path, per `chdir`.
    pub fn set_cwd(&mut self, pid: TaskId, canonical_path: String) -> Result<()> {
        self.get_mut(pid)?.cwd = canonical_path;
        Ok(())
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_task_is_its_own_group_and_session() {
        let table = ProcessTable::new();
        let init = table.get(TaskId::INIT).unwrap();
        assert_eq!(init.pgid, TaskId::INIT);
        assert_eq!(init.sid, TaskId::INIT);
    }

    #[test]
    fn fork_assigns_fresh_pid_and_inherits_group() {
        let mut table = ProcessTable::new();
        let child = table.fork(TaskId::INIT).unwrap();
        assert_ne!(child, TaskId::INIT);
        let child_task = table.get(child).unwrap();
        // init is a session leader, so its child becomes a new group/session.
        assert_eq!(child_task.pgid, child);
        assert_eq!(child_task.sid, child);
        assert_eq!(child_task.ppid, Some(TaskId::INIT));
    }

    #[test]
    fn fork_non_leader_inherits_pgid_and_sid() {
        let mut table = ProcessTable::new();
        let child = table.fork(TaskId::INIT).unwrap();
        let grandchild = table.fork(child).unwrap();
        let gc = table.get(grandchild).unwrap();
        assert_eq!(gc.pgid, table.get(child).unwrap().pgid);
        assert_eq!(gc.sid, table.get(child).unwrap().sid);
    }

    #[test]
    fn exit_reparents_children_to_init() {
        let mut table = ProcessTable::new();
        let child = table.fork(TaskId::INIT).unwrap();
        let grandchild = table.fork(child).unwrap();
        table.exit(child, 0).unwrap();
        assert_eq!(table.get(grandchild).unwrap().ppid, Some(TaskId::INIT));
        assert!(table.get(TaskId::INIT).unwrap().children.contains(&grandchild));
        assert!(matches!(
            table.get(child).unwrap().state,
            TaskState::Zombie { status: 0 }
        ));
    }

    #[test]
    fn exit_rejects_init() {
        let mut table = ProcessTable::new();
        assert_eq!(table.exit(TaskId::INIT, 0), Err(SchedError::NotPermitted));
    }

    #[test]
    fn setpgid_rejects_non_descendant() {
        let mut table = ProcessTable::new();
        let a = table.fork(TaskId::INIT).unwrap();
        let b = table.fork(TaskId::INIT).unwrap();
        assert_eq!(table.setpgid(a, b, b), Err(SchedError::NotPermitted));
    }

    #[test]
    fn setpgid_self_becomes_own_leader() {
        let mut table = ProcessTable::new();
        let child = table.fork(TaskId::INIT).unwrap();
        let grandchild = table.fork(child).unwrap();
        // grandchild inherited child's pgid; make it its own group.
        table.setpgid(child, grandchild, TaskId::new(0)).unwrap();
        assert_eq!(table.get(grandchild).unwrap().pgid, grandchild);
    }

    #[test]
    fn setpgid_rejects_session_leader_target() {
        let mut table = ProcessTable::new();
        let child = table.fork(TaskId::INIT).unwrap();
        // child is its own session leader (its parent, init, is a leader).
        assert_eq!(
            table.setpgid(child, child, TaskId::new(0)),
            Err(SchedError::NotPermitted)
        );
    }

    #[test]
    fn setsid_then_getsid() {
        let mut table = ProcessTable::new();
        let child = table.fork(TaskId::INIT).unwrap();
        let grandchild = table.fork(child).unwrap();
        table.setsid(grandchild).unwrap();
        assert_eq!(table.getsid(grandchild).unwrap(), grandchild);
        assert_eq!(table.getpgid(grandchild).unwrap(), grandchild);
    }

    #[test]
    fn setsid_rejects_existing_group_leader() {
        let mut table = ProcessTable::new();
        let child = table.fork(TaskId::INIT).unwrap();
        // child is already its own group leader (session leader's child).
        assert_eq!(table.setsid(child), Err(SchedError::NotPermitted));
    }

    #[test]
    fn setresuid_privileged_accepts_any_triple() {
        let mut table = ProcessTable::new();
        table
            .setresuid(TaskId::INIT, Some(1000), Some(1000), Some(1000))
            .unwrap();
        assert_eq!(table.getresuid(TaskId::INIT).unwrap(), (1000, 1000, 1000));
    }

    #[test]
    fn setresuid_unprivileged_rejects_unrelated_id() {
        let mut table = ProcessTable::new();
        table
            .setresuid(TaskId::INIT, Some(1000), Some(1000), Some(1000))
            .unwrap();
        assert_eq!(
            table.setresuid(TaskId::INIT, Some(0), None, None),
            Err(SchedError::NotPermitted)
        );
    }

    #[test]
    fn setresuid_unprivileged_accepts_saved_id() {
        let mut table = ProcessTable::new();
        table
            .setresuid(TaskId::INIT, Some(1000), Some(1000), Some(0))
            .unwrap();
        // euid is 1000 now (unprivileged), but suid=0 is one of the current
        // triple, so setting euid back to 0 is allowed.
        table.setresuid(TaskId::INIT, None, Some(0), None).unwrap();
        assert_eq!(table.getresuid(TaskId::INIT).unwrap(), (1000, 0, 0));
    }

    #[test]
    fn nice_requires_privilege_to_raise_priority() {
        let mut table = ProcessTable::new();
        let child = table.fork(TaskId::INIT).unwrap();
        assert_eq!(table.nice(child, -5, false), Err(SchedError::NotPermitted));
        assert_eq!(table.nice(child, -5, true), Ok(-5));
    }

    #[test]
    fn nice_clamps_to_range() {
        let mut table = ProcessTable::new();
        assert_eq!(table.nice(TaskId::INIT, 100, true), Ok(astra_core::config::NICE_MAX));
    }

    #[test]
    fn run_queue_is_fifo_within_tier() {
        let mut table = ProcessTable::new();
        let a = table.fork(TaskId::INIT).unwrap();
        let b = table.fork(TaskId::INIT).unwrap();
        assert_eq!(table.dequeue_ready(), Some(a));
        assert_eq!(table.dequeue_ready(), Some(b));
        assert_eq!(table.dequeue_ready(), None);
    }
}
