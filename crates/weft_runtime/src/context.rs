//! Module instances and guest execution contexts.

use std::sync::Arc;

use crate::error::{Fault, FaultResult};
use crate::memory::LinearMemory;
use crate::runtime::Runtime;
use crate::table::Table;

/// The memories and tables of an instantiated guest module.
#[derive(Debug, Default)]
pub struct Instance {
    memories: Vec<Arc<LinearMemory>>,
    tables: Vec<Arc<Table>>,
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a memory and return its id.
    pub fn add_memory(&mut self, memory: Arc<LinearMemory>) -> u32 {
        self.memories.push(memory);
        (self.memories.len() - 1) as u32
    }

    /// Add a table and return its id.
    pub fn add_table(&mut self, table: Arc<Table>) -> u32 {
        self.tables.push(table);
        (self.tables.len() - 1) as u32
    }

    pub fn memory(&self, id: u32) -> FaultResult<&Arc<LinearMemory>> {
        self.memories.get(id as usize).ok_or(Fault::UnknownMemory(id))
    }

    pub fn table(&self, id: u32) -> FaultResult<&Arc<Table>> {
        self.tables.get(id as usize).ok_or(Fault::UnknownTable(id))
    }
}

/// The execution context a guest function runs in.
///
/// Each guest thread has its own context; contexts forked from one another
/// share the runtime and the instance.
#[derive(Debug)]
pub struct Context {
    id: u64,
    runtime: Arc<Runtime>,
    instance: Arc<Instance>,
}

impl Context {
    pub fn new(runtime: Arc<Runtime>, instance: impl Into<Arc<Instance>>) -> Self {
        Self {
            id: runtime.next_context_id(),
            runtime,
            instance: instance.into(),
        }
    }

    /// Create an independent context for a new thread, sharing this
    /// context's runtime and instance.
    pub fn fork(&self) -> Self {
        Self::new(Arc::clone(&self.runtime), Arc::clone(&self.instance))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn memory(&self, id: u32) -> FaultResult<&Arc<LinearMemory>> {
        self.instance.memory(id)
    }

    pub fn table(&self, id: u32) -> FaultResult<&Arc<Table>> {
        self.instance.table(id)
    }
}
