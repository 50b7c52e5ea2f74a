//! Blocking and spinning synchronization primitives.
//!
//! Realizes §4.4: a [`WaitQueue`] is the one true suspension primitive
//! (insert-on-sleep, bulk-wake, FIFO), and [`Mutex`], [`Semaphore`] and
//! [`RwSemaphore`] are all built on top of it rather than duplicating sleep
//! logic. [`SpinLock`] is the non-suspending alternative for windows that
//! never cross a blocking call.
//!
//! Suspension is realized with `Future`/`Waker` (see §9/§10) rather than the
//! original's inline-assembly `sleep_thread`/`switch_task` pair: a waiter
//! registers its `Waker` with the queue and returns `Poll::Pending`; the
//! executor polls it again only after a matching wake call has run.

mod mutex;
mod rwsem;
mod semaphore;
mod spinlock;
mod waitqueue;

pub use mutex::{Mutex, MutexGuard};
pub use rwsem::{RwSemaphore, RwSemaphoreReadGuard, RwSemaphoreWriteGuard};
pub use semaphore::{Semaphore, SemaphorePermit};
pub use spinlock::{SpinLock, SpinLockGuard};
pub use waitqueue::WaitQueue;
