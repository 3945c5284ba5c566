//! Garbage collector root discovery.
//!
//! The collector does not reach into runtime data structures. Anything that
//! keeps guest references alive outside the heap implements [`RootProvider`]
//! and reports those references to the collector's [`Tracer`].

use std::sync::Arc;

use crate::context::Context;
use crate::func::Function;

/// Visitor through which a [`RootProvider`] reports its roots.
pub trait Tracer {
    /// Report a live execution context.
    fn trace_context(&mut self, context: &Arc<Context>);

    /// Report a live function reference.
    fn trace_function(&mut self, function: &Arc<Function>);
}

/// Trait for types that hold GC roots.
pub trait RootProvider {
    /// Trace all roots held by this provider.
    fn trace_roots(&self, tracer: &mut dyn Tracer);
}

/// A tracer that counts what it is shown.
#[derive(Debug, Default)]
pub struct CountingTracer {
    /// Number of contexts traced.
    pub contexts: usize,
    /// Number of functions traced.
    pub functions: usize,
}

impl CountingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> usize {
        self.contexts + self.functions
    }
}

impl Tracer for CountingTracer {
    fn trace_context(&mut self, _context: &Arc<Context>) {
        self.contexts += 1;
    }

    fn trace_function(&mut self, _function: &Arc<Function>) {
        self.functions += 1;
    }
}
