//! Guest-spawned threads.
//!
//! Guest code starts detached OS threads that run a table function with one
//! `i32` argument. Each thread is registered as a GC root holder for as long
//! as it may run guest code.
//!
//! ## Modules
//!
//! - [`handle`]: thread records, spawning, and the thread body with its
//!   error-handler and double-fault handling
//! - [`gc`]: the live-thread list, root enumeration, and join-all at teardown

pub mod gc;
pub mod handle;

pub use gc::ThreadRegistry;
pub use handle::{ThreadPhase, ThreadRecord, spawn_thread};
