//! Guarded execution of guest code.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{Fault, FaultResult};

/// Run `f`, converting a host panic inside it into [`Fault::Panicked`].
///
/// Guest faults already travel as `Err` values; this closes the remaining
/// path by which a failure could unwind out of a guest call.
pub fn guarded<T>(f: impl FnOnce() -> FaultResult<T>) -> FaultResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(Fault::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
