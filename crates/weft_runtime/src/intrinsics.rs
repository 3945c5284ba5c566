//! Entry points called by compiled guest code.
//!
//! Each intrinsic validates the guest's memory offset before anything reaches
//! the wait/wake engine: out-of-bounds offsets fault first, then offsets not
//! aligned to the access width. Only a validated offset is translated to the
//! host address that keys the wait list.

use std::convert::Infallible;

use crate::context::Context;
use crate::error::{Fault, FaultResult};
use crate::func::FuncType;
use crate::thread;

// ===========================================================================
// Atomic wait / wake
// ===========================================================================

/// `memory.atomic.wait32`: block while the `i32` at `offset` equals
/// `expected`. Returns 0 (woken), 1 (not equal) or 2 (timed out).
pub fn atomic_wait_i32(
    ctx: &Context,
    memory: u32,
    offset: u32,
    expected: i32,
    timeout_ms: f64,
) -> FaultResult<i32> {
    let cell = ctx.memory(memory)?.atomic_i32(offset)?;
    let outcome = ctx
        .runtime()
        .wait_lists()
        .wait_on_address(cell, expected, timeout_ms);
    Ok(outcome.code())
}

/// `memory.atomic.wait64`: as [`atomic_wait_i32`] for an 8-byte aligned `i64`.
pub fn atomic_wait_i64(
    ctx: &Context,
    memory: u32,
    offset: u32,
    expected: i64,
    timeout_ms: f64,
) -> FaultResult<i32> {
    let cell = ctx.memory(memory)?.atomic_i64(offset)?;
    let outcome = ctx
        .runtime()
        .wait_lists()
        .wait_on_address(cell, expected, timeout_ms);
    Ok(outcome.code())
}

/// `memory.atomic.notify`: wake up to `count` waiters on `offset` (all of them
/// for `u32::MAX`) and return how many were woken.
pub fn atomic_wake(ctx: &Context, memory: u32, offset: u32, count: u32) -> FaultResult<i32> {
    let address = ctx.memory(memory)?.checked_address(offset, 4)?;
    let woken = ctx.runtime().wait_lists().wake_address(address, count);
    let woken = u32::try_from(woken).map_err(|_| Fault::IntegerOverflow)?;
    Ok(woken as i32)
}

/// Called by code the compiler emits for an atomic access it knows to be
/// misaligned. Always faults.
pub fn misaligned_atomic_trap(_address: u32) -> FaultResult<Infallible> {
    Err(Fault::MisalignedAtomic)
}

// ===========================================================================
// Thread management
// ===========================================================================

/// Spawn a guest thread running the `(i32) -> ()` function at `entry_index`
/// of `table`, with the function at `error_index` as its fault handler.
///
/// Both indices are resolved before anything else happens; a bad index or a
/// function of the wrong type faults and no thread is started.
pub fn spawn_thread(
    ctx: &Context,
    entry_index: u32,
    argument: i32,
    error_index: u32,
    table: u32,
) -> FaultResult<()> {
    let table = ctx.table(table)?;
    let ty = FuncType::thread_entry();
    let entry = table.get_function(entry_index, &ty)?;
    let error = table.get_function(error_index, &ty)?;

    thread::spawn_thread(ctx, entry, error, argument).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Function, Instance, Runtime, Table, Value, ValueType};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_misaligned_trap_always_faults() {
        for address in [0, 1, 4, u32::MAX] {
            assert_eq!(misaligned_atomic_trap(address), Err(Fault::MisalignedAtomic));
        }
    }

    #[test]
    fn test_wait_validates_offset() {
        let runtime = Runtime::new();
        let mut instance = Instance::new();
        let memory = instance.add_memory(runtime.new_memory());
        let ctx = Context::new(runtime, instance);
        let len = ctx.memory(memory).unwrap().byte_len() as u32;

        assert_eq!(
            atomic_wait_i32(&ctx, memory, len, 0, 0.0),
            Err(Fault::AccessViolation)
        );
        assert_eq!(
            atomic_wait_i32(&ctx, memory, 6, 0, 0.0),
            Err(Fault::MisalignedAtomic)
        );
        assert_eq!(
            atomic_wait_i64(&ctx, memory, 4, 0, 0.0),
            Err(Fault::MisalignedAtomic)
        );
        assert_eq!(
            atomic_wait_i32(&ctx, memory + 1, 0, 0, 0.0),
            Err(Fault::UnknownMemory(memory + 1))
        );
        assert_eq!(atomic_wait_i64(&ctx, memory, 8, 0, 0.0), Ok(2));
        assert_eq!(atomic_wait_i64(&ctx, memory, 8, 1, 0.0), Ok(1));
    }

    #[test]
    fn test_wake_validates_offset() {
        let runtime = Runtime::new();
        let mut instance = Instance::new();
        let memory = instance.add_memory(runtime.new_memory());
        let ctx = Context::new(runtime, instance);

        assert_eq!(atomic_wake(&ctx, memory, u32::MAX, 1), Err(Fault::AccessViolation));
        assert_eq!(atomic_wake(&ctx, memory, 2, 1), Err(Fault::MisalignedAtomic));
        assert_eq!(atomic_wake(&ctx, memory, 4, 1), Ok(0));
        assert_eq!(atomic_wake(&ctx, memory, 4, 0), Ok(0));
        assert!(ctx.runtime().wait_lists().is_empty());
    }

    #[test]
    fn test_spawn_resolves_table_entries() {
        let runtime = Runtime::new();
        let mut instance = Instance::new();
        let memory = instance.add_memory(runtime.new_memory());
        let table = Arc::new(Table::new(0));
        let table_id = instance.add_table(Arc::clone(&table));

        let entry = table.push(Function::thread_entry("store", move |ctx, arg| {
            ctx.memory(memory)?.store_i32(0, arg)
        }));
        let error = table.push(Function::thread_entry("ignore", |_, _| Ok(())));
        let wrong = table.push(Function::new(
            "no_args",
            FuncType::new(Vec::<ValueType>::new(), [ValueType::I32]),
            |_, _| Ok(vec![Value::I32(0)]),
        ));

        let ctx = Context::new(Arc::clone(&runtime), instance);

        assert_eq!(
            spawn_thread(&ctx, 99, 0, error, table_id),
            Err(Fault::UndefinedTableElement)
        );
        assert_eq!(
            spawn_thread(&ctx, entry, 0, wrong, table_id),
            Err(Fault::IndirectCallSignatureMismatch)
        );
        assert_eq!(
            spawn_thread(&ctx, entry, 0, error, table_id + 1),
            Err(Fault::UnknownTable(table_id + 1))
        );
        assert_eq!(runtime.threads().total_spawned(), 0);

        spawn_thread(&ctx, entry, 17, error, table_id).unwrap();
        assert!(runtime.threads().join_all_timeout(Duration::from_secs(10)));
        assert_eq!(ctx.memory(memory).unwrap().load_i32(0), Ok(17));
    }
}
