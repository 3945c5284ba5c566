//! Guest thread records, spawning, and the thread body.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;

use crate::context::Context;
use crate::error::{Fault, FaultResult, fatal};
use crate::func::{Function, Value};
use crate::guard::guarded;
use crate::wait::release_thread_wake_event;

// ---------------------------------------------------------------------------
// ThreadPhase
// ---------------------------------------------------------------------------

/// Where a guest thread is in its lifecycle.
///
/// `Registered → RunningEntry → (RunningError)? → Unregistered`; the error
/// phase is entered only after the entry function faults.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPhase {
    Registered = 0,
    RunningEntry = 1,
    RunningError = 2,
    Unregistered = 3,
}

impl ThreadPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ThreadPhase::Registered,
            1 => ThreadPhase::RunningEntry,
            2 => ThreadPhase::RunningError,
            _ => ThreadPhase::Unregistered,
        }
    }
}

// ---------------------------------------------------------------------------
// ThreadRecord
// ---------------------------------------------------------------------------

/// A guest-spawned thread, as seen by the garbage collector.
///
/// Holds the thread's context and its entry and error functions so they stay
/// reachable while the thread may still run them.
#[derive(Debug)]
pub struct ThreadRecord {
    id: u64,
    context: Arc<Context>,
    entry: Arc<Function>,
    error: Arc<Function>,
    phase: AtomicU8,
}

impl ThreadRecord {
    pub(crate) fn new(
        id: u64,
        context: Arc<Context>,
        entry: Arc<Function>,
        error: Arc<Function>,
    ) -> Self {
        Self {
            id,
            context,
            entry,
            error,
            phase: AtomicU8::new(ThreadPhase::Registered as u8),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn entry(&self) -> &Arc<Function> {
        &self.entry
    }

    pub fn error(&self) -> &Arc<Function> {
        &self.error
    }

    pub fn phase(&self) -> ThreadPhase {
        ThreadPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: ThreadPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Start a detached OS thread running `entry(argument)` in a context forked
/// from `ctx`, with `error(argument)` as its fault handler. Returns the new
/// thread's id.
///
/// The thread is registered with the runtime's [`ThreadRegistry`] before it
/// starts, so it is visible as a GC root for its whole run.
///
/// [`ThreadRegistry`]: super::ThreadRegistry
pub fn spawn_thread(
    ctx: &Context,
    entry: Arc<Function>,
    error: Arc<Function>,
    argument: i32,
) -> FaultResult<u64> {
    let runtime = ctx.runtime();
    let threads = runtime.threads();
    let id = threads.next_id()?;

    let record = Arc::new(ThreadRecord::new(id, Arc::new(ctx.fork()), entry, error));
    threads.register(Arc::clone(&record));

    let config = runtime.config();
    let mut builder = thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
    if let Some(size) = config.thread_stack_size {
        builder = builder.stack_size(size);
    }

    thread_trace!(thread_id = id, "spawning guest thread");

    match builder.spawn(move || run_thread(record, argument)) {
        // Dropping the join handle detaches the thread.
        Ok(_) => Ok(id),
        Err(err) => {
            tracing::error!(thread_id = id, %err, "failed to start guest thread");
            threads.discard(id);
            Err(Fault::ThreadSpawn(err.to_string()))
        }
    }
}

/// Body of a guest thread.
fn run_thread(record: Arc<ThreadRecord>, argument: i32) {
    let id = record.id;
    let args = [Value::I32(argument)];

    record.set_phase(ThreadPhase::RunningEntry);
    let entry_result = guarded(|| record.entry.invoke(&record.context, &args));

    if let Err(fault) = entry_result {
        tracing::error!(thread_id = id, %fault, "runtime fault in thread");
        tracing::error!(thread_id = id, "passing fault on to thread error handler");

        record.set_phase(ThreadPhase::RunningError);
        let error_result = guarded(|| record.error.invoke(&record.context, &args));

        if let Err(second) = error_result {
            tracing::error!(thread_id = id, fault = %second, "runtime fault in thread error handler");
            fatal("double fault");
        }
    }

    release_thread_wake_event();

    record.set_phase(ThreadPhase::Unregistered);
    record.context.runtime().threads().unregister(id);
    thread_trace!(thread_id = id, "guest thread finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Instance, Runtime};
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    #[test]
    fn test_phase_round_trip() {
        for phase in [
            ThreadPhase::Registered,
            ThreadPhase::RunningEntry,
            ThreadPhase::RunningError,
            ThreadPhase::Unregistered,
        ] {
            assert_eq!(ThreadPhase::from_u8(phase as u8), phase);
        }
    }

    #[test]
    fn test_spawn_runs_entry_in_forked_context() {
        let runtime = Runtime::new();
        let ctx = Context::new(Arc::clone(&runtime), Instance::new());
        let parent_id = ctx.id();
        let seen = Arc::new(AtomicI32::new(0));

        let seen_in_thread = Arc::clone(&seen);
        let entry = Function::thread_entry("entry", move |ctx, arg| {
            assert_ne!(ctx.id(), parent_id);
            seen_in_thread.store(arg, Ordering::SeqCst);
            Ok(())
        });
        let error = Function::thread_entry("error", |_, _| Ok(()));

        let id = spawn_thread(&ctx, entry, error, 42).unwrap();
        assert_eq!(id, 1);
        assert!(runtime.threads().join_all_timeout(Duration::from_secs(10)));
        assert_eq!(seen.load(Ordering::SeqCst), 42);
        assert_eq!(runtime.threads().total_spawned(), 1);
    }

    #[test]
    fn test_error_handler_runs_after_fault() {
        let runtime = Runtime::new();
        let ctx = Context::new(Arc::clone(&runtime), Instance::new());
        let handled = Arc::new(AtomicI32::new(0));

        let entry = Function::thread_entry("entry", |_, _| Err(Fault::trap("entry failed")));
        let handled_in_thread = Arc::clone(&handled);
        let error = Function::thread_entry("error", move |_, arg| {
            handled_in_thread.store(arg, Ordering::SeqCst);
            Ok(())
        });

        spawn_thread(&ctx, entry, error, 9).unwrap();
        assert!(runtime.threads().join_all_timeout(Duration::from_secs(10)));
        assert_eq!(handled.load(Ordering::SeqCst), 9);
        assert_eq!(runtime.threads().live_count(), 0);
    }

    #[test]
    fn test_panicking_entry_is_a_fault() {
        let runtime = Runtime::new();
        let ctx = Context::new(Arc::clone(&runtime), Instance::new());
        let handled = Arc::new(AtomicI32::new(0));

        let entry = Function::thread_entry("entry", |_, _| panic!("guest bug"));
        let handled_in_thread = Arc::clone(&handled);
        let error = Function::thread_entry("error", move |_, _| {
            handled_in_thread.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        spawn_thread(&ctx, entry, error, 0).unwrap();
        assert!(runtime.threads().join_all_timeout(Duration::from_secs(10)));
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_record_is_a_root_while_running() {
        let runtime = Runtime::new();
        let ctx = Context::new(Arc::clone(&runtime), Instance::new());
        let release = Arc::new(AtomicI32::new(0));

        let gate = Arc::clone(&release);
        let entry = Function::thread_entry("entry", move |_, _| {
            while gate.load(Ordering::SeqCst) == 0 {
                thread::yield_now();
            }
            Ok(())
        });
        let error = Function::thread_entry("error", |_, _| Ok(()));

        let id = spawn_thread(&ctx, entry, error, 0).unwrap();
        let snapshot = runtime.threads().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), id);
        assert_eq!(snapshot[0].entry().name(), "entry");
        assert_ne!(snapshot[0].phase(), ThreadPhase::RunningError);

        release.store(1, Ordering::SeqCst);
        assert!(runtime.threads().join_all_timeout(Duration::from_secs(10)));
        assert_eq!(snapshot[0].phase(), ThreadPhase::Unregistered);
    }
}
