//! Async-aware mutual exclusion lock.
//!
//! Unlike [`SpinLock`](super::SpinLock), `Mutex` yields the current task via
//! [`WaitQueue`] when contended rather than spinning, so the executor can run
//! other work while the lock is held elsewhere. Const-constructable for use
//! in `static` items.

use core::cell::UnsafeCell;
use core::future::Future;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll};

use super::WaitQueue;

/// An async-aware mutual exclusion lock.
pub struct Mutex<T> {
    locked: AtomicBool,
    waiters: WaitQueue,
    data: UnsafeCell<T>,
}

// SAFETY: the Mutex ensures exclusive access to `T` via atomic operations.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new unlocked `Mutex` wrapping `value`.
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            waiters: WaitQueue::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Asynchronously acquires the lock.
    ///
    /// Returns a future that resolves to a [`MutexGuard`] once acquired. If
    /// the lock is already held, the current task yields and is woken when
    /// it becomes available.
    pub fn lock(&self) -> MutexLockFuture<'_, T> {
        MutexLockFuture { mutex: self }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|()| MutexGuard { mutex: self })
    }

    /// Acquires the lock by spinning, for use before the executor is
    /// running or in other contexts where polling a future isn't possible.
    /// Prefer [`Mutex::lock`] once the scheduler is up.
    pub fn lock_sync(&self) -> MutexGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            core::hint::spin_loop();
        }
    }
}

/// Future returned by [`Mutex::lock`].
pub struct MutexLockFuture<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> Future for MutexLockFuture<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self
            .mutex
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return Poll::Ready(MutexGuard { mutex: self.mutex });
        }

        // Register before retrying, to avoid a lost wakeup if the lock is
        // released between our failed CAS above and the registration below.
        let registered = self.mutex.waiters.register_waker(cx.waker());

        if self
            .mutex
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return Poll::Ready(MutexGuard { mutex: self.mutex });
        }

        // Queue was full: self-wake so the executor re-polls us, degrading
        // to a busy poll rather than stalling forever unregistered.
        if !registered {
            cx.waker().wake_by_ref();
        }

        Poll::Pending
    }
}

/// RAII guard that releases the [`Mutex`] when dropped.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard guarantees exclusive access while it exists.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard guarantees exclusive access while it exists.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
        self.mutex.waiters.wake_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_waker::{counting_waker, noop_waker};
    use core::sync::atomic::Ordering as AtomicOrdering;
    use core::task::Context;

    #[test]
    fn try_lock_succeeds_when_free() {
        let mutex = Mutex::new(42);
        let guard = mutex.try_lock();
        assert!(guard.is_some());
        assert_eq!(*guard.unwrap(), 42);
    }

    #[test]
    fn try_lock_fails_when_held() {
        let mutex = Mutex::new(42);
        let _guard = mutex.try_lock().unwrap();
        assert!(mutex.try_lock().is_none());
    }

    #[test]
    fn lock_sync_acquires() {
        let mutex = Mutex::new(0);
        let guard = mutex.lock_sync();
        assert_eq!(*guard, 0);
    }

    #[test]
    fn guard_mutate_and_release() {
        let mutex = Mutex::new(0);
        {
            let mut guard = mutex.lock_sync();
            *guard = 99;
        }
        let guard = mutex.lock_sync();
        assert_eq!(*guard, 99);
    }

    #[test]
    fn lock_future_ready_when_free() {
        let mutex = Mutex::new(42);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = mutex.lock();
        let result = Pin::new(&mut fut).poll(&mut cx);
        assert!(matches!(result, Poll::Ready(_)));
    }

    #[test]
    fn lock_future_pending_when_held() {
        let mutex = Mutex::new(42);
        let _guard = mutex.try_lock().unwrap();

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = mutex.lock();
        let result = Pin::new(&mut fut).poll(&mut cx);
        assert!(matches!(result, Poll::Pending));
    }

    #[test]
    fn drop_guard_wakes_waiter() {
        let mutex = Mutex::new(42);
        let guard = mutex.try_lock().unwrap();

        let (waker, count) = counting_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = mutex.lock();
        let result = Pin::new(&mut fut).poll(&mut cx);
        assert!(matches!(result, Poll::Pending));

        drop(guard);
        assert!(
            count.load(AtomicOrdering::SeqCst) > 0,
            "waker should have been called"
        );
    }
}
