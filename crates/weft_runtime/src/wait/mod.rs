//! Address-keyed wait and wake.
//!
//! Guest threads block on a memory cell until another thread wakes that
//! address or a timeout expires.
//!
//! ## Modules
//!
//! - [`timeout`]: relative timeouts to monotonic deadlines
//! - [`event`]: the per-thread wake event a waiter blocks on
//! - [`wait_list`]: reference-counted per-address wait lists and their registry
//! - [`engine`]: the wait and wake operations

pub mod engine;
pub mod event;
pub mod timeout;
pub mod wait_list;

pub use engine::{AtomicCell, WAKE_ALL, WaitOutcome};
pub use event::{Event, release_thread_wake_event, thread_wake_event};
pub use timeout::{WAIT_FOREVER, resolve_deadline};
pub use wait_list::{OpenWaitList, WaitList, WaitListRegistry};
