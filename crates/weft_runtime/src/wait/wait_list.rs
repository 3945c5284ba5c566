//! Per-address wait lists and the registry that owns them.

use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::fatal;

use super::event::Event;

// ---------------------------------------------------------------------------
// WaitList
// ---------------------------------------------------------------------------

/// The threads waiting on one address, oldest first.
#[derive(Debug)]
pub struct WaitList {
    waiters: Mutex<VecDeque<Arc<Event>>>,
    num_references: AtomicUsize,
}

impl WaitList {
    fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
            num_references: AtomicUsize::new(1),
        }
    }

    /// Lock the waiter queue.
    pub fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<Event>>> {
        // The queue is only mutated by single push/remove/drain calls, so a
        // panic while it was locked cannot have left it half-updated.
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of references held by in-flight operations.
    pub fn num_references(&self) -> usize {
        self.num_references.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// OpenWaitList: RAII reference to a registered wait list
// ---------------------------------------------------------------------------

/// A counted reference to the wait list of an address.
///
/// Dropping it releases the reference, and the last release removes the list
/// from the registry.
pub struct OpenWaitList<'r> {
    registry: &'r WaitListRegistry,
    address: usize,
    list: Arc<WaitList>,
}

impl OpenWaitList<'_> {
    pub fn address(&self) -> usize {
        self.address
    }
}

impl Deref for OpenWaitList<'_> {
    type Target = WaitList;

    fn deref(&self) -> &WaitList {
        &self.list
    }
}

impl Drop for OpenWaitList<'_> {
    fn drop(&mut self) {
        self.registry.close(self.address, &self.list);
    }
}

// ---------------------------------------------------------------------------
// WaitListRegistry
// ---------------------------------------------------------------------------

/// Map from address to the wait list of that address.
///
/// Lists are created when an address is first contended and removed as soon
/// as no operation references them, so the map only ever holds addresses with
/// a wait or wake in flight.
#[derive(Debug, Default)]
pub struct WaitListRegistry {
    lists: Mutex<HashMap<usize, Arc<WaitList>>>,
}

impl WaitListRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the wait list for `address`, creating it if needed, and take a
    /// reference to it. The list's queue is not locked.
    pub fn open(&self, address: usize) -> OpenWaitList<'_> {
        let mut lists = self.lock_map();
        let list = match lists.get(&address) {
            Some(list) => {
                list.num_references.fetch_add(1, Ordering::SeqCst);
                Arc::clone(list)
            }
            None => {
                let list = Arc::new(WaitList::new());
                lists.insert(address, Arc::clone(&list));
                thread_trace!(address, "created wait list");
                list
            }
        };
        OpenWaitList {
            registry: self,
            address,
            list,
        }
    }

    /// Release a reference taken by [`open`](Self::open).
    ///
    /// The decrement happens without the map lock; reaching zero re-checks the
    /// count under the lock, since a concurrent `open` may have revived the
    /// list in between.
    fn close(&self, address: usize, list: &Arc<WaitList>) {
        if list.num_references.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }

        let mut lists = self.lock_map();
        if list.num_references.load(Ordering::SeqCst) != 0 {
            return;
        }
        // A racing close may already have removed this list and a new one
        // been registered for the same address.
        if !lists.get(&address).is_some_and(|current| Arc::ptr_eq(current, list)) {
            return;
        }
        if !list.lock().is_empty() {
            fatal("wait list destroyed with threads still waiting");
        }
        lists.remove(&address);
        thread_trace!(address, "destroyed wait list");
    }

    /// Number of addresses that currently have a wait list.
    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<usize, Arc<WaitList>>> {
        self.lists.lock().unwrap_or_else(|e| e.into_inner())
    }
}
