//! Blocking wait and wake on addresses.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

use crate::clock;
use crate::error::fatal;

use super::event::thread_wake_event;
use super::timeout::resolve_deadline;
use super::wait_list::WaitListRegistry;

/// Wake count meaning "every waiter".
pub const WAKE_ALL: u32 = u32::MAX;

/// Result of [`WaitListRegistry::wait_on_address`], encoded as the guest sees it.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Woken by a call to `wake_address`.
    Woken = 0,
    /// The value did not match the expected value; the caller never blocked.
    NotEqual = 1,
    /// The deadline passed without a wake.
    TimedOut = 2,
}

impl WaitOutcome {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// An atomic memory cell that can be waited on.
pub trait AtomicCell: Sync {
    type Value: Copy + Eq + std::fmt::Debug;

    /// Sequentially consistent load.
    fn load_seq_cst(&self) -> Self::Value;

    /// The address used as the wait list key.
    fn address(&self) -> usize {
        self as *const Self as *const () as usize
    }
}

impl AtomicCell for AtomicI32 {
    type Value = i32;

    fn load_seq_cst(&self) -> i32 {
        self.load(Ordering::SeqCst)
    }
}

impl AtomicCell for AtomicI64 {
    type Value = i64;

    fn load_seq_cst(&self) -> i64 {
        self.load(Ordering::SeqCst)
    }
}

impl WaitListRegistry {
    /// Block the calling thread on `cell` while it holds `expected`.
    ///
    /// The value check and joining the queue happen under the wait list lock,
    /// the same lock [`wake_address`](Self::wake_address) takes, so a wake
    /// cannot fall between them.
    pub fn wait_on_address<C: AtomicCell + ?Sized>(
        &self,
        cell: &C,
        expected: C::Value,
        timeout_ms: f64,
    ) -> WaitOutcome {
        let deadline = resolve_deadline(clock::monotonic_micros(), timeout_ms);
        let list = self.open(cell.address());

        let event = {
            let mut waiters = list.lock();
            if cell.load_seq_cst() != expected {
                return WaitOutcome::NotEqual;
            }
            let event = thread_wake_event();
            waiters.push_back(Arc::clone(&event));
            event
        };

        if event.wait_until(deadline) {
            return WaitOutcome::Woken;
        }

        let mut waiters = list.lock();
        let queued = waiters.iter().position(|e| Arc::ptr_eq(e, &event));
        match queued {
            Some(index) => {
                waiters.remove(index);
                thread_trace!(address = list.address(), "wait timed out");
                WaitOutcome::TimedOut
            }
            None => {
                // A waker dequeued this event between the timeout and taking
                // the lock. It signals while holding the lock, so the signal
                // is already pending; consume it to leave the event clean.
                if !event.wait_until(clock::monotonic_micros()) {
                    fatal("wake event dequeued without a pending signal");
                }
                WaitOutcome::Woken
            }
        }
    }

    /// Wake up to `count` threads waiting on `address`, oldest first, and
    /// return how many were woken. [`WAKE_ALL`] wakes every waiter.
    pub fn wake_address(&self, address: usize, count: u32) -> usize {
        if count == 0 {
            return 0;
        }

        let list = self.open(address);
        let mut waiters = list.lock();
        let woken = if count == WAKE_ALL {
            waiters.len()
        } else {
            (count as usize).min(waiters.len())
        };
        for event in waiters.drain(..woken) {
            event.signal();
        }
        drop(waiters);

        thread_trace!(address, woken, "woke waiters");
        woken
    }
}
