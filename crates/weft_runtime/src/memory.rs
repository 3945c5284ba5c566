//! Shared linear memory.
//!
//! Guest memory is backed by 8-byte atomic words, so every naturally aligned
//! 4- or 8-byte cell can be viewed as a host atomic. Only that view is exposed;
//! the wait/wake engine keys its wait lists by the cell's real address.
//!
//! ## Mixed-width access
//!
//! An `i32` view and the `i64` view of the same word alias each other. Rust
//! does not define concurrent atomic accesses of different sizes to
//! overlapping memory, so callers must not race a 4-byte access against an
//! 8-byte access to the same 8-byte word; accesses of different widths have to
//! be ordered by some other synchronization. Same-width races are fine.

use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU64, Ordering};

use crate::config::PAGE_SIZE;
use crate::error::{Fault, FaultResult};

const WORD: usize = std::mem::size_of::<AtomicU64>();

/// A fixed-size linear memory shared between guest threads.
pub struct LinearMemory {
    words: Box<[AtomicU64]>,
}

impl LinearMemory {
    /// Create a zeroed memory of `pages` 64 KiB pages.
    pub fn new(pages: u32) -> Self {
        let len = pages as usize * PAGE_SIZE / WORD;
        Self {
            words: (0..len).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Current size in bytes. Offsets at or beyond this are out of bounds.
    pub fn byte_len(&self) -> usize {
        self.words.len() * WORD
    }

    /// Host address of byte offset zero.
    pub fn base_address(&self) -> usize {
        self.words.as_ptr() as usize
    }

    /// Validate `offset` for an access of `width` bytes and return the host
    /// address of the cell.
    ///
    /// The bound is checked before alignment, so an offset that is both out
    /// of bounds and misaligned reports an access violation.
    pub fn checked_address(&self, offset: u32, width: usize) -> FaultResult<usize> {
        let offset = offset as usize;
        if offset >= self.byte_len() {
            return Err(Fault::AccessViolation);
        }
        if offset % width != 0 {
            return Err(Fault::MisalignedAtomic);
        }
        Ok(self.base_address() + offset)
    }

    /// The 32-bit cell at `offset`.
    ///
    /// Must not race with an [`atomic_i64`](Self::atomic_i64) access to the
    /// enclosing word (see the module docs).
    pub fn atomic_i32(&self, offset: u32) -> FaultResult<&AtomicI32> {
        let address = self.checked_address(offset, 4)?;
        // SAFETY: the address is in bounds, 4-byte aligned, and the backing
        // storage is atomic words that live as long as `self`.
        Ok(unsafe { &*(address as *const AtomicI32) })
    }

    /// The 64-bit cell at `offset`.
    ///
    /// Must not race with an [`atomic_i32`](Self::atomic_i32) access to either
    /// half of the word.
    pub fn atomic_i64(&self, offset: u32) -> FaultResult<&AtomicI64> {
        let address = self.checked_address(offset, 8)?;
        // SAFETY: as in `atomic_i32`, with 8-byte alignment.
        Ok(unsafe { &*(address as *const AtomicI64) })
    }

    pub fn load_i32(&self, offset: u32) -> FaultResult<i32> {
        Ok(self.atomic_i32(offset)?.load(Ordering::SeqCst))
    }

    pub fn store_i32(&self, offset: u32, value: i32) -> FaultResult<()> {
        self.atomic_i32(offset)?.store(value, Ordering::SeqCst);
        Ok(())
    }

    pub fn load_i64(&self, offset: u32) -> FaultResult<i64> {
        Ok(self.atomic_i64(offset)?.load(Ordering::SeqCst))
    }

    pub fn store_i64(&self, offset: u32, value: i64) -> FaultResult<()> {
        self.atomic_i64(offset)?.store(value, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for LinearMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearMemory")
            .field("base", &format_args!("{:#x}", self.base_address()))
            .field("byte_len", &self.byte_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size() {
        let memory = LinearMemory::new(2);
        assert_eq!(memory.byte_len(), 2 * PAGE_SIZE);
        assert_eq!(memory.base_address() % 8, 0);
    }

    #[test]
    fn test_bounds_checked_before_alignment() {
        let memory = LinearMemory::new(1);
        let len = memory.byte_len() as u32;

        assert_eq!(memory.checked_address(len, 4), Err(Fault::AccessViolation));
        assert_eq!(memory.checked_address(len + 1, 4), Err(Fault::AccessViolation));
        assert_eq!(memory.checked_address(2, 4), Err(Fault::MisalignedAtomic));
        assert_eq!(memory.checked_address(4, 8), Err(Fault::MisalignedAtomic));
        assert_eq!(
            memory.checked_address(len - 8, 8),
            Ok(memory.base_address() + len as usize - 8)
        );
    }

    #[test]
    fn test_load_store() {
        let memory = LinearMemory::new(1);
        memory.store_i32(8, -7).unwrap();
        memory.store_i64(16, i64::MIN).unwrap();

        assert_eq!(memory.load_i32(8), Ok(-7));
        assert_eq!(memory.load_i32(12), Ok(0));
        assert_eq!(memory.load_i64(16), Ok(i64::MIN));
        assert_eq!(memory.load_i32(3), Err(Fault::MisalignedAtomic));
    }

    #[test]
    fn test_narrow_and_wide_views_share_a_word() {
        let memory = LinearMemory::new(1);
        let narrow = memory.atomic_i32(8).unwrap() as *const AtomicI32 as usize;
        let wide = memory.atomic_i64(8).unwrap() as *const AtomicI64 as usize;
        let upper = memory.atomic_i32(12).unwrap() as *const AtomicI32 as usize;
        assert_eq!(narrow, wide);
        assert_eq!(upper, wide + 4);

        // Ordered on one thread, mixed widths see each other's stores.
        memory.store_i64(8, -1).unwrap();
        memory.store_i32(8, 0).unwrap();
        memory.store_i32(12, 0).unwrap();
        assert_eq!(memory.load_i64(8), Ok(0));
    }
}
