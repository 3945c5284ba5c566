//! Shared-memory threading core for the weft virtual machine.
//!
//! This crate provides:
//! - Address-keyed atomic wait and wake for guest memory
//! - Guest-spawned threads registered as garbage collector roots
//! - The intrinsics compiled guest code calls into
//!
//! All shared state hangs off a [`Runtime`]; independent runtimes can coexist
//! in one process.

// ---------------------------------------------------------------------------
// Conditional trace logging
// ---------------------------------------------------------------------------

macro_rules! thread_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "thread-debug")]
        tracing::trace!($($arg)*);
    };
}

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod func;
pub mod guard;
pub mod intrinsics;
pub mod memory;
pub mod roots;
pub mod runtime;
pub mod table;
pub mod thread;
pub mod wait;

pub use config::{PAGE_SIZE, RuntimeConfig};
pub use context::{Context, Instance};
pub use error::{Fault, FaultResult, fatal};
pub use func::{FuncType, Function, Value, ValueType};
pub use guard::guarded;
pub use memory::LinearMemory;
pub use roots::{CountingTracer, RootProvider, Tracer};
pub use runtime::Runtime;
pub use table::Table;
pub use thread::{ThreadPhase, ThreadRecord, ThreadRegistry};
pub use wait::{WAKE_ALL, WaitListRegistry, WaitOutcome};
