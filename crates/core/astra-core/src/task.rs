//! Process/tasklet identity and scheduling-queue types.
//!
//! The full `Task` record (saved context, page directory, credentials,
//! open-file table, ...) lives in `astra-sched`, which depends on `astra-mm`
//! for the page directory type. This module carries only the pieces that
//! have no such dependency: pid/priority newtypes, the sleep-flags bitset,
//! and the niceness-to-quantum conversion from §4.3.

use bitflags::bitflags;

use crate::config::{NICE_MAX, NICE_MIN, TICK_BASE};

/// A process id. `0` is never assigned to a live task; the idle task uses
/// the reserved id [`TaskId::IDLE`] rather than a value in `1..=MAX_PID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(i32);

impl TaskId {
    /// The distinguished idle task id (`pid == -1`).
    pub const IDLE: TaskId = TaskId(-1);

    /// The init task id. Process group/session leader of the whole tree.
    pub const INIT: TaskId = TaskId(1);

    /// Wraps a raw pid. Does not validate range — callers that allocate
    /// fresh pids are expected to stay within `[1, MAX_PID]`.
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the raw pid value.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Returns whether this is the distinguished idle task.
    #[must_use]
    pub const fn is_idle(self) -> bool {
        self.0 == Self::IDLE.0
    }
}

/// Scheduling tier a runnable unit of work belongs to.
///
/// User tasks created by `fork` always run at [`Priority::Normal`]. Tasklets
/// (§4.3) may be spawned at [`Priority::Critical`] (driver completion work
/// that must not be starved) or [`Priority::Background`] (best-effort
/// housekeeping); this lets the run queue service urgent kernel work ahead
/// of ordinary tasks without inventing a second scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    /// Serviced before anything else in the run queue.
    Critical = 0,
    /// The default tier for forked user tasks.
    Normal = 1,
    /// Serviced only once no Critical/Normal work is ready.
    Background = 2,
}

impl Priority {
    /// Number of priority tiers; also the number of per-tier sub-queues a
    /// run queue needs.
    pub const COUNT: usize = 3;

    /// Index into a `[T; Priority::COUNT]` array of per-tier queues.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

bitflags! {
    /// Per-task sleep state, recorded alongside waitqueue membership.
    ///
    /// Mirrors the `SLEEP_ASLEEP` / interruptible / `SLEEP_INTERRUPTED`
    /// trio from §4.3/§4.4: a task sleeping with [`SleepFlags::INTERRUPTIBLE`]
    /// set may be woken early by an external wake (e.g. a pre-armed timeout)
    /// rather than the condition it was actually waiting for, in which case
    /// [`SleepFlags::INTERRUPTED`] is also set when it resumes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SleepFlags: u32 {
        /// The task is currently asleep on a waitqueue.
        const ASLEEP = 0b001;
        /// The sleep may be ended by something other than the awaited event.
        const INTERRUPTIBLE = 0b010;
        /// Set on resume if the wake was not the awaited event.
        const INTERRUPTED = 0b100;
    }
}

/// Computes the timer-tick quantum for a task at the given niceness,
/// per §4.3: `task_tick = 10 * (20 - nice)`. Higher nice (politer) tasks get
/// shorter slices. `nice` is clamped to `[NICE_MIN, NICE_MAX]` first.
#[must_use]
pub fn quantum_ticks(nice: i32) -> u32 {
    let nice = nice.clamp(NICE_MIN, NICE_MAX);
    TICK_BASE * (20 - nice) as u32
}
