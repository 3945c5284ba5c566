//! Per-thread wake events.

use std::cell::RefCell;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

use crate::clock;

use super::timeout::WAIT_FOREVER;

thread_local! {
    /// The event this thread queues when it waits on an address.
    static THREAD_WAKE_EVENT: RefCell<Option<Arc<Event>>> = const { RefCell::new(None) };
}

/// A one-shot, auto-resetting event.
///
/// `signal` sets the event; a successful `wait_until` consumes the signal, so
/// the event is clean for the next wait.
#[derive(Debug, Default)]
pub struct Event {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the event, waking the thread blocked on it.
    pub fn signal(&self) {
        *self.lock() = true;
        self.cond.notify_one();
    }

    /// Block until the event is signaled or `deadline` (monotonic
    /// microseconds) passes. Returns whether a signal was consumed.
    ///
    /// A deadline at or before the current time only checks for a pending
    /// signal.
    pub fn wait_until(&self, deadline: u64) -> bool {
        let deadline = if deadline == WAIT_FOREVER {
            None
        } else {
            clock::instant_at(deadline)
        };

        let mut signaled = self.lock();
        while !*signaled {
            signaled = match deadline {
                None => self.cond.wait(signaled).unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.cond
                        .wait_timeout(signaled, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
            };
        }
        *signaled = false;
        true
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.signaled.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The calling thread's wake event, created on first use.
pub fn thread_wake_event() -> Arc<Event> {
    THREAD_WAKE_EVENT.with(|event| {
        Arc::clone(
            event
                .borrow_mut()
                .get_or_insert_with(|| Arc::new(Event::new())),
        )
    })
}

/// Destroy the calling thread's wake event, if it has one.
///
/// Returns whether an event existed.
pub fn release_thread_wake_event() -> bool {
    THREAD_WAKE_EVENT.with(|event| event.borrow_mut().take().is_some())
}
