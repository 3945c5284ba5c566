//! The live-thread list, exposed to the garbage collector as a root provider.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{Fault, FaultResult};
use crate::roots::{RootProvider, Tracer};

use super::handle::ThreadRecord;

// ---------------------------------------------------------------------------
// ThreadRegistry
// ---------------------------------------------------------------------------

/// Every guest-spawned thread that may still be running guest code.
///
/// A record is registered before its OS thread starts and unregistered by
/// that thread once its entry and error handling are done, so the collector
/// always sees the context and functions of every thread that can touch them.
#[derive(Debug)]
pub struct ThreadRegistry {
    threads: Mutex<Vec<Arc<ThreadRecord>>>,
    /// Notified whenever the list becomes empty.
    idle: Condvar,
    next_id: AtomicU64,
    spawned: AtomicU64,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(Vec::new()),
            idle: Condvar::new(),
            next_id: AtomicU64::new(1),
            spawned: AtomicU64::new(0),
        }
    }

    /// Allocate a thread id.
    pub(crate) fn next_id(&self) -> FaultResult<u64> {
        self.next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_add(1)
            })
            .map_err(|_| {
                tracing::error!("thread ID overflow, maximum thread count reached");
                Fault::ThreadSpawn("thread id space exhausted".to_string())
            })
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    pub(crate) fn register(&self, record: Arc<ThreadRecord>) {
        let id = record.id();
        self.lock().push(record);
        self.spawned.fetch_add(1, Ordering::Relaxed);
        thread_trace!(thread_id = id, "registered thread");
    }

    /// Undo [`register`](Self::register) for a thread whose OS thread never
    /// started, so it is not counted as spawned.
    pub(crate) fn discard(&self, id: u64) {
        if self.unregister(id).is_some() {
            self.spawned.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn unregister(&self, id: u64) -> Option<Arc<ThreadRecord>> {
        let mut threads = self.lock();
        let position = threads.iter().position(|t| t.id() == id);
        let record = position.map(|pos| threads.swap_remove(pos));
        if threads.is_empty() {
            self.idle.notify_all();
        }
        drop(threads);

        if record.is_none() {
            tracing::warn!(thread_id = id, "attempted to unregister unknown thread");
        } else {
            thread_trace!(thread_id = id, "unregistered thread");
        }
        record
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Number of threads currently registered.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    /// Number of threads ever registered.
    pub fn total_spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// A copy of the current list.
    pub fn snapshot(&self) -> Vec<Arc<ThreadRecord>> {
        self.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Join all
    // -----------------------------------------------------------------------

    /// Block until every registered thread has finished. Typically called at
    /// teardown.
    pub fn join_all(&self) {
        let mut threads = self.lock();
        if !threads.is_empty() {
            tracing::debug!(count = threads.len(), "waiting for guest threads");
        }
        while !threads.is_empty() {
            threads = self.idle.wait(threads).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like [`join_all`](Self::join_all), giving up after `timeout`. Returns
    /// whether every thread finished.
    ///
    /// A timeout past what [`Instant`] can represent waits without a bound.
    pub fn join_all_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.join_all();
            return true;
        };
        let mut threads = self.lock();
        while !threads.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(remaining = threads.len(), "timed out waiting for guest threads");
                return false;
            }
            threads = self
                .idle
                .wait_timeout(threads, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<ThreadRecord>>> {
        self.threads.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RootProvider for ThreadRegistry {
    fn trace_roots(&self, tracer: &mut dyn Tracer) {
        for record in self.lock().iter() {
            tracer.trace_context(record.context());
            tracer.trace_function(record.entry());
            tracer.trace_function(record.error());
        }
    }
}
