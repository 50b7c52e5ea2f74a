//! Wait queue: the one true suspension primitive.
//!
//! Every other blocking primitive in [`super`] — [`super::Mutex`],
//! [`super::Semaphore`], [`super::RwSemaphore`] — is built on top of a
//! `WaitQueue` rather than re-implementing sleep/wake. A waiter registers its
//! [`Waker`] and returns `Poll::Pending`; some other task calls
//! [`WaitQueue::wake_one`] or [`WaitQueue::wake_all`] to resume it, mirroring
//! the original's FIFO insert-on-sleep / bulk-wake `wake_queue` semantics
//! without the inline-assembly context switch.
//!
//! The waiter list is a small fixed-capacity ring, the same head/tail modular
//! arithmetic as `planck_noalloc::ringbuf::RingBuf`, reimplemented here
//! because `RingBuf` requires `T: Copy` and `Waker` is `Clone`-only.

use core::future::Future;
use core::mem::MaybeUninit;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use crate::sync::SpinLock;

/// Maximum number of tasks that may be parked on one queue at a time.
const MAX_WAITERS: usize = 32;

/// Fixed-capacity FIFO of `Waker`s. Usable capacity is `N - 1`, matching
/// `RingBuf`'s head/tail scheme (full is indistinguishable from empty
/// otherwise).
struct WakerRing<const N: usize> {
    slots: [MaybeUninit<Waker>; N],
    head: usize,
    tail: usize,
}

impl<const N: usize> WakerRing<N> {
    const fn new() -> Self {
        Self {
            slots: [const { MaybeUninit::uninit() }; N],
            head: 0,
            tail: 0,
        }
    }

    const fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    const fn is_full(&self) -> bool {
        (self.head + 1) % N == self.tail
    }

    const fn len(&self) -> usize {
        (self.head + N - self.tail) % N
    }

    /// Appends a waker. Returns it back if the queue is full.
    fn push(&mut self, waker: Waker) -> Result<(), Waker> {
        if self.is_full() {
            return Err(waker);
        }
        self.slots[self.head].write(waker);
        self.head = (self.head + 1) % N;
        Ok(())
    }

    /// Removes and returns the oldest waker.
    fn pop(&mut self) -> Option<Waker> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: `tail` is within the initialized range because the queue
        // is non-empty.
        let waker = unsafe { self.slots[self.tail].assume_init_read() };
        self.tail = (self.tail + 1) % N;
        Some(waker)
    }
}

impl<const N: usize> Drop for WakerRing<N> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

/// A queue of parked tasks waiting for some condition to become true.
pub struct WaitQueue {
    waiters: SpinLock<WakerRing<MAX_WAITERS>>,
}

impl WaitQueue {
    /// Creates an empty wait queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            waiters: SpinLock::new(WakerRing::new()),
        }
    }

    /// Returns a future that completes once this queue wakes it.
    ///
    /// The caller is responsible for re-checking whatever condition it was
    /// waiting for after the future resolves — a wake is a hint that the
    /// condition may now hold, not a guarantee (spurious wakes are possible
    /// whenever another waiter raced it to the resource).
    #[must_use]
    pub fn wait(&self) -> WaitFuture<'_> {
        WaitFuture {
            queue: self,
            registered: false,
        }
    }

    /// Registers a waker without constructing a [`WaitFuture`].
    ///
    /// Used by primitives that need to register interest and then retry a
    /// non-blocking operation in a single poll, rather than driving a
    /// sub-future. Returns `false` if the queue is at capacity.
    pub fn register_waker(&self, waker: &Waker) -> bool {
        self.waiters.lock().push(waker.clone()).is_ok()
    }

    /// Number of tasks currently parked on this queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Whether any task is currently parked on this queue.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }

    /// Wakes the longest-waiting task, if any.
    pub fn wake_one(&self) {
        let woken = self.waiters.lock().pop();
        if let Some(waker) = woken {
            waker.wake();
        }
    }

    /// Wakes every task currently parked on this queue.
    pub fn wake_all(&self) {
        loop {
            let woken = self.waiters.lock().pop();
            match woken {
                Some(waker) => waker.wake(),
                None => break,
            }
        }
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`WaitQueue::wait`].
pub struct WaitFuture<'a> {
    queue: &'a WaitQueue,
    registered: bool,
}

impl Future for WaitFuture<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.registered {
            Poll::Ready(())
        } else {
            self.registered = true;
            // Ignore a full queue rather than panicking or erroring: the
            // caller simply won't be woken promptly, which is the same
            // degraded behavior a fixed-size run queue has under overload.
            let _ = self.queue.register_waker(cx.waker());
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_waker::{counting_waker, noop_waker};
    use core::sync::atomic::Ordering;

    #[test]
    fn register_waker_succeeds() {
        let wq = WaitQueue::new();
        assert!(wq.register_waker(&noop_waker()));
        assert_eq!(wq.len(), 1);
    }

    #[test]
    fn register_waker_full() {
        let wq = WaitQueue::new();
        for _ in 0..MAX_WAITERS - 1 {
            assert!(wq.register_waker(&noop_waker()));
        }
        assert!(!wq.register_waker(&noop_waker()));
    }

    #[test]
    fn wake_one_fifo() {
        let wq = WaitQueue::new();
        let (w1, c1) = counting_waker();
        let (w2, c2) = counting_waker();
        wq.register_waker(&w1);
        wq.register_waker(&w2);

        wq.wake_one();
        assert!(c1.load(Ordering::SeqCst) > 0, "first waker should be woken");
        assert_eq!(c2.load(Ordering::SeqCst), 0, "second waker untouched");
        assert_eq!(wq.len(), 1);
    }

    #[test]
    fn wake_all_wakes_everyone() {
        let wq = WaitQueue::new();
        let (w1, c1) = counting_waker();
        let (w2, c2) = counting_waker();
        let (w3, c3) = counting_waker();
        wq.register_waker(&w1);
        wq.register_waker(&w2);
        wq.register_waker(&w3);

        wq.wake_all();
        assert!(c1.load(Ordering::SeqCst) > 0);
        assert!(c2.load(Ordering::SeqCst) > 0);
        assert!(c3.load(Ordering::SeqCst) > 0);
        assert!(wq.is_empty());
    }

    #[test]
    fn wake_one_empty_no_panic() {
        WaitQueue::new().wake_one();
    }

    #[test]
    fn wake_all_empty_no_panic() {
        WaitQueue::new().wake_all();
    }

    #[test]
    fn wait_future_pending_then_ready() {
        let wq = WaitQueue::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = wq.wait();

        let first = Pin::new(&mut fut).poll(&mut cx);
        assert!(matches!(first, Poll::Pending));

        let second = Pin::new(&mut fut).poll(&mut cx);
        assert!(matches!(second, Poll::Ready(())));
    }
}
