//! Function tables for indirect calls.

use std::sync::{Arc, RwLock};

use crate::error::{Fault, FaultResult};
use crate::func::{FuncType, Function};

/// A table of guest functions addressed by index.
#[derive(Debug, Default)]
pub struct Table {
    elements: RwLock<Vec<Option<Arc<Function>>>>,
}

impl Table {
    /// Create a table with `size` empty slots.
    pub fn new(size: usize) -> Self {
        Self {
            elements: RwLock::new(vec![None; size]),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a function and return its index.
    pub fn push(&self, function: Arc<Function>) -> u32 {
        let mut elements = self.write();
        elements.push(Some(function));
        (elements.len() - 1) as u32
    }

    /// Replace the slot at `index`.
    pub fn set(&self, index: u32, function: Option<Arc<Function>>) -> FaultResult<()> {
        let mut elements = self.write();
        let slot = elements
            .get_mut(index as usize)
            .ok_or(Fault::UndefinedTableElement)?;
        *slot = function;
        Ok(())
    }

    /// Resolve `index` for an indirect call expecting `expected`.
    ///
    /// An index past the end or an empty slot is an undefined element; a
    /// function of any other type is a signature mismatch.
    pub fn get_function(&self, index: u32, expected: &FuncType) -> FaultResult<Arc<Function>> {
        let elements = self.read();
        let function = elements
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(Fault::UndefinedTableElement)?;
        if function.ty() != expected {
            return Err(Fault::IndirectCallSignatureMismatch);
        }
        Ok(Arc::clone(function))
    }

    // Poisoning only means a writer panicked mid-update of a `Vec<Option<_>>`,
    // which cannot leave it inconsistent.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Option<Arc<Function>>>> {
        self.elements.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Option<Arc<Function>>>> {
        self.elements.write().unwrap_or_else(|e| e.into_inner())
    }
}
