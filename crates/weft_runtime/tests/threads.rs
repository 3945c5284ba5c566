//! Guest thread lifecycle: spawning, fault handling and root enumeration.

use std::env;
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use weft_runtime::intrinsics::{atomic_wait_i32, atomic_wake, spawn_thread};
use weft_runtime::{
    CountingTracer, Context, Fault, Function, Instance, RootProvider, Runtime, RuntimeConfig,
    Table, WAKE_ALL,
};

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Set in the child process that is expected to abort.
const DOUBLE_FAULT_CHILD: &str = "WEFT_DOUBLE_FAULT_CHILD";

struct Guest {
    runtime: Arc<Runtime>,
    ctx: Context,
    table: Arc<Table>,
    table_id: u32,
    memory: u32,
}

impl Guest {
    fn new(config: RuntimeConfig) -> Self {
        let runtime = Runtime::with_config(config);
        let mut instance = Instance::new();
        let memory = instance.add_memory(runtime.new_memory());
        let table = Arc::new(Table::new(0));
        let table_id = instance.add_table(Arc::clone(&table));
        let ctx = Context::new(Arc::clone(&runtime), instance);
        Self {
            runtime,
            ctx,
            table,
            table_id,
            memory,
        }
    }
}

#[test]
fn test_threads_count_up_and_wake_the_main_thread() {
    const THREADS: i32 = 16;
    let guest = Guest::new(RuntimeConfig::default().with_thread_stack_size(256 * 1024));
    let memory = guest.memory;

    let entry = guest.table.push(Function::thread_entry("count", move |ctx, _| {
        let cell = ctx.memory(memory)?.atomic_i32(0)?;
        cell.fetch_add(1, Ordering::SeqCst);
        atomic_wake(ctx, memory, 0, WAKE_ALL).map(|_| ())
    }));
    let error = guest.table.push(Function::thread_entry("unreachable", |_, _| {
        Err(Fault::trap("error handler should not run"))
    }));

    for argument in 0..THREADS {
        spawn_thread(&guest.ctx, entry, argument, error, guest.table_id).unwrap();
    }

    let cell = guest.ctx.memory(memory).unwrap().atomic_i32(0).unwrap();
    loop {
        let seen = cell.load(Ordering::SeqCst);
        if seen == THREADS {
            break;
        }
        atomic_wait_i32(&guest.ctx, memory, 0, seen, 1_000.0).unwrap();
    }

    assert!(guest.runtime.threads().join_all_timeout(JOIN_TIMEOUT));
    assert_eq!(guest.runtime.threads().total_spawned(), THREADS as u64);
    assert_eq!(guest.runtime.threads().live_count(), 0);
    assert!(guest.runtime.wait_lists().is_empty());
}

#[test]
fn test_handled_fault_removes_thread_cleanly() {
    let guest = Guest::new(RuntimeConfig::default());
    let memory = guest.memory;

    let entry = guest.table.push(Function::thread_entry("fail", |_, _| {
        Err(Fault::trap("guest fault"))
    }));
    let error = guest.table.push(Function::thread_entry("recover", move |ctx, arg| {
        ctx.memory(memory)?.store_i32(8, arg)
    }));

    spawn_thread(&guest.ctx, entry, 5, error, guest.table_id).unwrap();
    assert!(guest.runtime.threads().join_all_timeout(JOIN_TIMEOUT));

    assert_eq!(guest.ctx.memory(memory).unwrap().load_i32(8), Ok(5));
    assert!(guest.runtime.threads().snapshot().is_empty());
}

#[test]
fn test_live_threads_are_roots() {
    let guest = Guest::new(RuntimeConfig::default().with_thread_name_prefix("rooted"));
    let memory = guest.memory;
    let release = Arc::new(AtomicBool::new(false));

    let gate = Arc::clone(&release);
    let entry = guest.table.push(Function::thread_entry("park", move |ctx, _| {
        assert_eq!(std::thread::current().name().map(|n| n.starts_with("rooted-")), Some(true));
        while !gate.load(Ordering::SeqCst) {
            atomic_wait_i32(ctx, memory, 0, 0, 5.0)?;
        }
        Ok(())
    }));
    let faulted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&faulted);
    let error = guest.table.push(Function::thread_entry("record", move |_, _| {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    }));

    spawn_thread(&guest.ctx, entry, 0, error, guest.table_id).unwrap();
    spawn_thread(&guest.ctx, entry, 1, error, guest.table_id).unwrap();

    let mut tracer = CountingTracer::new();
    guest.runtime.threads().trace_roots(&mut tracer);
    assert_eq!(tracer.contexts, 2);
    assert_eq!(tracer.functions, 4);

    release.store(true, Ordering::SeqCst);
    assert!(guest.runtime.threads().join_all_timeout(JOIN_TIMEOUT));
    assert!(!faulted.load(Ordering::SeqCst));

    let mut tracer = CountingTracer::new();
    guest.runtime.threads().trace_roots(&mut tracer);
    assert_eq!(tracer.total(), 0);
}

#[test]
fn test_double_fault_aborts_process() {
    if env::var_os(DOUBLE_FAULT_CHILD).is_some() {
        let guest = Guest::new(RuntimeConfig::default());
        let entry = guest.table.push(Function::thread_entry("fail", |_, _| {
            Err(Fault::trap("first fault"))
        }));
        let error = guest.table.push(Function::thread_entry("fail_again", |_, _| {
            Err(Fault::trap("second fault"))
        }));
        spawn_thread(&guest.ctx, entry, 0, error, guest.table_id).unwrap();
        guest.runtime.threads().join_all();
        // Only reached if the double fault did not abort.
        return;
    }

    let exe = env::current_exe().unwrap();
    let output = Command::new(exe)
        .args(["--exact", "test_double_fault_aborts_process", "--nocapture", "--test-threads=1"])
        .env(DOUBLE_FAULT_CHILD, "1")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("double fault"), "stderr: {stderr}");
}
