//! Single-CPU async task executor.
//!
//! Polls `Future<Output = ()>` tasks cooperatively, organized into the same
//! three strict priority tiers as [`crate::table::ProcessTable`]'s run queue
//! (Critical, Normal, Background), with the same background-starvation
//! prevention. Grounded on the workspace's multi-CPU executor, minus its
//! per-CPU storage, work stealing, and cross-CPU wake IPIs — this machine
//! has exactly one CPU, so none of that applies.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use astra_core::sync::SpinLock;
use astra_core::task::{Priority, TaskId};

/// A pinned, heap-allocated, dynamically dispatched task future.
type TaskFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Priority-aware ready queues, identical in structure and starvation
/// handling to [`crate::table::ProcessTable`]'s run queue.
struct ReadyQueues {
    queues: [VecDeque<TaskId>; Priority::COUNT],
    normal_streak: u64,
}

/// Consecutive Normal polls allowed before a waiting Background task is
/// forced in ahead of it.
const BACKGROUND_STARVATION_LIMIT: u64 = 100;

impl ReadyQueues {
    fn new() -> Self {
        Self {
            queues: core::array::from_fn(|_| VecDeque::new()),
            normal_streak: 0,
        }
    }

    fn push(&mut self, priority: Priority, id: TaskId) {
        self.queues[priority.index()].push_back(id);
    }

    fn pop(&mut self) -> Option<(Priority, TaskId)> {
        if let Some(id) = self.queues[Priority::Critical.index()].pop_front() {
            self.normal_streak = 0;
            return Some((Priority::Critical, id));
        }

        let has_background = !self.queues[Priority::Background.index()].is_empty();
        let has_normal = !self.queues[Priority::Normal.index()].is_empty();

        if has_normal && has_background && self.normal_streak >= BACKGROUND_STARVATION_LIMIT {
            self.normal_streak = 0;
            if let Some(id) = self.queues[Priority::Background.index()].pop_front() {
                return Some((Priority::Background, id));
            }
        }

        if let Some(id) = self.queues[Priority::Normal.index()].pop_front() {
            self.normal_streak = if has_background { self.normal_streak + 1 } else { 0 };
            return Some((Priority::Normal, id));
        }

        self.normal_streak = 0;
        self.queues[Priority::Background.index()]
            .pop_front()
            .map(|id| (Priority::Background, id))
    }
}

/// Wraps a [`TaskId`]/[`Priority`] pair into a `Waker` that re-queues the
/// task on the given executor when woken. The priority is packed into the
/// data pointer's top bits alongside the pid, so no allocation is needed per
/// wake — mirroring the workspace executor's packed-waker trick, minus the
/// CPU-id field a single-CPU machine has no use for.
fn task_waker(executor: &'static Executor, id: TaskId, priority: Priority) -> Waker {
    const PRIORITY_SHIFT: u32 = 62;
    let packed = ((priority.index() as u64) << PRIORITY_SHIFT) | (id.raw() as u32 as u64);
    let data = TaskWakerData { executor, packed };
    // SAFETY: `raw_waker` below packs `data` into a vtable whose clone/wake
    // functions only ever read it back through `TaskWakerData::from_raw`.
    unsafe { Waker::from_raw(raw_waker(data)) }
}

/// Data carried by a task waker: the executor to requeue into, plus the
/// packed priority/pid pair. Boxed so it fits in a `RawWaker`'s single data
/// pointer.
struct TaskWakerData {
    executor: &'static Executor,
    packed: u64,
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop_data);

fn raw_waker(data: TaskWakerData) -> RawWaker {
    RawWaker::new(Box::into_raw(Box::new(data)).cast(), &VTABLE)
}

fn clone(ptr: *const ()) -> RawWaker {
    // SAFETY: `ptr` always originates from `raw_waker`'s `Box::into_raw`.
    let data = unsafe { &*ptr.cast::<TaskWakerData>() };
    raw_waker(TaskWakerData { executor: data.executor, packed: data.packed })
}

fn wake(ptr: *const ()) {
    wake_by_ref(ptr);
    drop_data(ptr);
}

fn wake_by_ref(ptr: *const ()) {
    // SAFETY: see `clone`.
    let data = unsafe { &*ptr.cast::<TaskWakerData>() };
    const PRIORITY_SHIFT: u32 = 62;
    let priority = match data.packed >> PRIORITY_SHIFT {
        0 => Priority::Critical,
        1 => Priority::Normal,
        _ => Priority::Background,
    };
    let id = TaskId::new((data.packed as u32) as i32);
    data.executor.ready.lock().push(priority, id);
}

fn drop_data(ptr: *const ()) {
    // SAFETY: see `clone`; this is the one place the box is reclaimed.
    unsafe {
        drop(Box::from_raw(ptr.cast_mut().cast::<TaskWakerData>()));
    }
}

/// A single-CPU cooperative executor over `Future<Output = ()>` tasks.
pub struct Executor {
    tasks: SpinLock<BTreeMap<TaskId, TaskFuture>>,
    ready: SpinLock<ReadyQueues>,
}

impl Executor {
    /// Creates an executor with no tasks.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tasks: SpinLock::new(BTreeMap::new()),
            ready: SpinLock::new(ReadyQueues { queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()], normal_streak: 0 }),
        }
    }

    /// Registers `future` under `id` at `priority` and marks it ready.
    /// `id` is the caller's responsibility to keep unique and in sync with
    /// [`crate::table::ProcessTable`] — the executor itself has no opinion
    /// on pid allocation.
    pub fn spawn(&self, id: TaskId, priority: Priority, future: impl Future<Output = ()> + 'static) {
        self.tasks.lock().insert(id, Box::pin(future));
        self.ready.lock().push(priority, id);
    }

    /// Whether `id` is still registered (not yet returned `Poll::Ready`).
    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.lock().contains_key(&id)
    }

    /// Polls every currently-ready task once, highest priority first.
    /// Returns the number of tasks that completed (and were removed) this
    /// pass. A task that reports `Poll::Pending` is put back in storage;
    /// a waker fired during its poll re-enqueues it for the next pass.
    pub fn run_once(&'static self) -> usize {
        let mut completed = 0;
        loop {
            let (priority, id) = match self.ready.lock().pop() {
                Some(pair) => pair,
                None => break,
            };

            let future = self.tasks.lock().remove(&id);
            let Some(mut future) = future else {
                // Already polled and completed this pass; its id was
                // re-enqueued by a stray wake before removal — drop it.
                continue;
            };

            let waker = task_waker(self, id, priority);
            let mut cx = Context::from_waker(&waker);
            match future.as_mut().poll(&mut cx) {
                Poll::Ready(()) => completed += 1,
                Poll::Pending => {
                    self.tasks.lock().insert(id, future);
                }
            }
        }
        completed
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static EXECUTOR: Executor = Executor::new();

    struct YieldOnce(bool);
    impl Future for YieldOnce {
        type Output = ();
        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    #[test]
    fn spawned_task_runs_to_completion() {
        let done = Arc::new(AtomicUsize::new(0));
        let done2 = done.clone();
        EXECUTOR.spawn(TaskId::new(100), Priority::Normal, async move {
            done2.fetch_add(1, Ordering::SeqCst);
        });
        EXECUTOR.run_once();
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert!(!EXECUTOR.contains(TaskId::new(100)));
    }

    #[test]
    fn pending_task_is_requeued_by_its_own_wake() {
        EXECUTOR.spawn(TaskId::new(101), Priority::Normal, YieldOnce(false));
        // First pass: polls once, gets Pending, self-wakes into the queue.
        EXECUTOR.run_once();
        assert!(EXECUTOR.contains(TaskId::new(101)));
        // Second pass: polls again, now Ready.
        EXECUTOR.run_once();
        assert!(!EXECUTOR.contains(TaskId::new(101)));
    }

    #[test]
    fn critical_tasks_drain_before_normal() {
        let order = Arc::new(SpinLock::new(alloc::vec::Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        EXECUTOR.spawn(TaskId::new(200), Priority::Normal, async move {
            o1.lock().push(Priority::Normal);
        });
        EXECUTOR.spawn(TaskId::new(201), Priority::Critical, async move {
            o2.lock().push(Priority::Critical);
        });
        EXECUTOR.run_once();
        assert_eq!(*order.lock(), alloc::vec![Priority::Critical, Priority::Normal]);
    }
}
