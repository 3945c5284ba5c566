//! Fault types raised by guest-facing operations, and the fatal path for
//! broken runtime invariants.

use thiserror::Error;

/// A guest-level fault.
///
/// Faults are recoverable at the guest-call boundary: they are returned to the
/// caller as values and never terminate the host process on their own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("out of bounds memory access")]
    AccessViolation,

    #[error("misaligned atomic memory access")]
    MisalignedAtomic,

    #[error("undefined table element")]
    UndefinedTableElement,

    #[error("indirect call signature mismatch")]
    IndirectCallSignatureMismatch,

    #[error("integer divide by zero or integer overflow")]
    IntegerOverflow,

    #[error("unknown memory: {0}")]
    UnknownMemory(u32),

    #[error("unknown table: {0}")]
    UnknownTable(u32),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("trap: {0}")]
    Trap(String),

    #[error("host panic: {0}")]
    Panicked(String),

    #[error("failed to spawn thread: {0}")]
    ThreadSpawn(String),
}

impl Fault {
    /// Create a guest trap with the given message.
    pub fn trap(message: impl Into<String>) -> Self {
        Fault::Trap(message.into())
    }
}

/// Result type for guest-facing operations.
pub type FaultResult<T> = Result<T, Fault>;

/// Log a broken runtime invariant and abort the process.
///
/// Used for conditions guest code cannot cause and from which there is no
/// defined recovery: a double fault in a thread error handler, a wait list
/// destroyed with waiters still queued, or deadline arithmetic overflow.
#[cold]
pub fn fatal(message: &str) -> ! {
    tracing::error!(message, "fatal runtime error");
    eprintln!("weft: fatal error: {message}");
    std::process::abort()
}
