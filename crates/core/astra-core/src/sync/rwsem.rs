//! Read/write semaphore.
//!
//! Composed of a write-mutex and a counting semaphore with `N` slots, per
//! §4.4: readers acquire one semaphore slot; a writer takes the mutex first,
//! then drains all `N` slots before proceeding, which blocks new readers
//! (they queue on the semaphore) while letting already-admitted readers
//! finish. Releasing a write reverses the steps: slots are returned before
//! the mutex.

use super::{Mutex, MutexGuard, Semaphore, SemaphorePermit};

/// A read/write semaphore with up to `N` concurrent readers.
pub struct RwSemaphore<const N: u32> {
    write_mutex: Mutex<()>,
    read_slots: Semaphore,
}

impl<const N: u32> RwSemaphore<N> {
    /// Creates a new `RwSemaphore` with all `N` read slots free.
    pub const fn new() -> Self {
        Self {
            write_mutex: Mutex::new(()),
            read_slots: Semaphore::new(N),
        }
    }

    /// Acquires a read slot, yielding while none is available.
    ///
    /// Blocked behind a pending or active writer, since a writer first
    /// drains every slot before making progress.
    pub async fn read(&self) -> RwSemaphoreReadGuard<'_, N> {
        RwSemaphoreReadGuard {
            _permit: self.read_slots.acquire().await,
        }
    }

    /// Acquires exclusive write access.
    ///
    /// Takes the write mutex — excluding any other writer — then acquires
    /// every read slot one at a time, which blocks until all current readers
    /// have released theirs.
    pub async fn write(&self) -> RwSemaphoreWriteGuard<'_, N> {
        let _mutex_guard = self.write_mutex.lock().await;
        let mut permits = alloc::vec::Vec::with_capacity(N as usize);
        for _ in 0..N {
            permits.push(self.read_slots.acquire().await);
        }
        RwSemaphoreWriteGuard {
            _mutex_guard,
            _permits: permits,
        }
    }

    /// Number of read slots currently free.
    #[must_use]
    pub fn available_read_slots(&self) -> u32 {
        self.read_slots.available_permits()
    }
}

impl<const N: u32> Default for RwSemaphore<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard held by a reader. Releases its slot on drop.
pub struct RwSemaphoreReadGuard<'a, const N: u32> {
    _permit: SemaphorePermit<'a>,
}

/// Guard held by the writer. Releases all slots, then the write mutex, on
/// drop (field order matters: slots must go first so a parked writer behind
/// this one sees them become available before it can re-acquire the mutex).
pub struct RwSemaphoreWriteGuard<'a, const N: u32> {
    _permits: alloc::vec::Vec<SemaphorePermit<'a>>,
    _mutex_guard: MutexGuard<'a, ()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_waker::noop_waker;
    use core::future::Future;
    use core::pin::Pin;
    use core::task::{Context, Poll};

    fn poll_once<F: Future>(fut: &mut F) -> Poll<F::Output> {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        // SAFETY: fut is never moved after being pinned here.
        unsafe { Pin::new_unchecked(fut) }.poll(&mut cx)
    }

    #[test]
    fn multiple_readers_admitted_concurrently() {
        let sem = RwSemaphore::<4>::new();
        let mut r1 = sem.read();
        let mut r2 = sem.read();
        assert!(matches!(poll_once(&mut r1), Poll::Ready(_)));
        assert!(matches!(poll_once(&mut r2), Poll::Ready(_)));
        assert_eq!(sem.available_read_slots(), 2);
    }

    #[test]
    fn writer_drains_all_slots() {
        let sem = RwSemaphore::<4>::new();
        let mut w = sem.write();
        assert!(matches!(poll_once(&mut w), Poll::Ready(_)));
        assert_eq!(sem.available_read_slots(), 0);
    }

    #[test]
    fn reader_blocked_while_writer_active() {
        let sem = RwSemaphore::<4>::new();
        let mut w = sem.write();
        let guard = match poll_once(&mut w) {
            Poll::Ready(g) => g,
            Poll::Pending => unreachable!(),
        };

        let mut r = sem.read();
        assert!(matches!(poll_once(&mut r), Poll::Pending));

        drop(guard);
        assert_eq!(sem.available_read_slots(), 4);
    }

    #[test]
    fn slots_restored_after_reader_drop() {
        let sem = RwSemaphore::<2>::new();
        let mut r1 = sem.read();
        let guard = match poll_once(&mut r1) {
            Poll::Ready(g) => g,
            Poll::Pending => unreachable!(),
        };
        assert_eq!(sem.available_read_slots(), 1);
        drop(guard);
        assert_eq!(sem.available_read_slots(), 2);
    }
}
