//! Test-only `Waker` constructors for polling futures without a real executor.

#![cfg(test)]

extern crate std;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// A `Waker` that does nothing when woken.
pub fn noop_waker() -> Waker {
    fn noop(_: *const ()) {}
    fn clone(p: *const ()) -> RawWaker {
        RawWaker::new(p, &VTABLE)
    }
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
    // SAFETY: the vtable's functions are all no-ops; the data pointer is
    // never dereferenced.
    unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) }
}

/// A `Waker` paired with a counter that records how many times it was woken.
pub fn counting_waker() -> (Waker, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let data = Arc::into_raw(counter.clone()).cast::<()>();

    unsafe fn clone(data: *const ()) -> RawWaker {
        // SAFETY: `data` was produced by `Arc::into_raw` below.
        let arc = unsafe { Arc::from_raw(data.cast::<AtomicUsize>()) };
        let cloned = arc.clone();
        core::mem::forget(arc);
        RawWaker::new(Arc::into_raw(cloned).cast::<()>(), &VTABLE)
    }

    unsafe fn wake(data: *const ()) {
        // SAFETY: `data` was produced by `Arc::into_raw` below.
        let arc = unsafe { Arc::from_raw(data.cast::<AtomicUsize>()) };
        arc.fetch_add(1, Ordering::SeqCst);
    }

    unsafe fn wake_by_ref(data: *const ()) {
        // SAFETY: `data` was produced by `Arc::into_raw` below.
        let arc = unsafe { Arc::from_raw(data.cast::<AtomicUsize>()) };
        arc.fetch_add(1, Ordering::SeqCst);
        core::mem::forget(arc);
    }

    unsafe fn drop_waker(data: *const ()) {
        // SAFETY: `data` was produced by `Arc::into_raw` below.
        drop(unsafe { Arc::from_raw(data.cast::<AtomicUsize>()) });
    }

    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop_waker);
    let waker = unsafe { Waker::from_raw(RawWaker::new(data, &VTABLE)) };
    (waker, counter)
}
