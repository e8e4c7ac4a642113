//! Condition variable built on the thread layer's park/unpark tokens

use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use minos_api::core::types::Tid;
use spin::{Mutex, MutexGuard};

use crate::process::subsystems;

/// Condition variable for thread synchronization
///
/// Waiters register themselves while still holding the monitor lock, so a
/// wakeup issued between the lock release and the park is never lost: the
/// unpark token is banked and the park returns immediately.
pub struct CondVar {
    /// Wait queue for threads waiting on this condition
    wait_queue: Mutex<Vec<Tid>>,
    /// Number of waiting threads
    waiters: AtomicUsize,
}

impl CondVar {
    /// Create a new condition variable
    pub const fn new() -> Self {
        Self {
            wait_queue: Mutex::new(Vec::new()),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Atomically release `guard` and block until signaled, then re-acquire
    ///
    /// May also return before the condition holds (a stale token or a
    /// spurious park return); callers re-check their predicate in a loop.
    pub fn wait<'a, T>(&self, lock: &'a Mutex<T>, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let threads = subsystems().threads;
        let tid = threads.current();

        // Register while the monitor lock is still held; wakers take the
        // queue lock, so they cannot miss this entry.
        {
            let mut queue = self.wait_queue.lock();
            queue.push(tid);
        }
        self.waiters.fetch_add(1, Ordering::SeqCst);

        drop(guard);
        threads.park();

        lock.lock()
    }

    /// Signal one waiting thread
    pub fn signal(&self) {
        let mut queue = self.wait_queue.lock();

        if let Some(waiter_tid) = queue.pop() {
            self.waiters.fetch_sub(1, Ordering::SeqCst);
            subsystems().threads.unpark(waiter_tid);
        }
    }

    /// Signal all waiting threads
    pub fn broadcast(&self) {
        if self.waiters.load(Ordering::SeqCst) == 0 {
            return;
        }

        let mut queue = self.wait_queue.lock();
        let threads = subsystems().threads;

        for waiter_tid in queue.drain(..) {
            threads.unpark(waiter_tid);
        }

        self.waiters.store(0, Ordering::SeqCst);
    }

    /// Get number of waiting threads
    pub fn waiter_count(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }
}
