//! Insertion-ordered allocation ledger.
//!
//! Records are never removed: a freed allocation stays in the ledger so that a
//! later free of the same address can be classified as a double free and so
//! the final report can still show corruption found at free time.
//!
//! The system allocator reuses addresses, so one address may map to several
//! records over the life of the process. [`RecordStore::find`] resolves an
//! address to the most recently appended record that is still live, falling
//! back to the most recent record overall. That is a heuristic: without a
//! generation tag carried by the pointer itself, two lifetimes at the same
//! address cannot be told apart perfectly.

use std::collections::HashMap;

use crate::origin::Origin;
use crate::record::{AllocKind, AllocationRecord};

/// Ordered collection of every successful allocation.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<AllocationRecord>,
    /// Address to record indices, ascending (append order).
    by_address: HashMap<usize, Vec<usize>>,
}

impl RecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record for a new allocation and return its index.
    ///
    /// The record gets the next sequence number and a clear status.
    pub fn append(
        &mut self,
        address: usize,
        size: usize,
        origin: Origin,
        kind: AllocKind,
        guarded: bool,
    ) -> usize {
        let idx = self.records.len();
        let seq = idx as u64 + 1;
        self.records
            .push(AllocationRecord::new(seq, address, size, origin, kind, guarded));
        self.by_address.entry(address).or_default().push(idx);
        idx
    }

    /// Resolve an address to a record index.
    #[must_use]
    pub fn find(&self, address: usize) -> Option<usize> {
        let candidates = self.by_address.get(&address)?;
        candidates
            .iter()
            .rev()
            .copied()
            .find(|&idx| !self.records[idx].is_freed())
            .or_else(|| candidates.last().copied())
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&AllocationRecord> {
        self.records.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut AllocationRecord> {
        self.records.get_mut(idx)
    }

    /// Records in allocation order.
    pub fn iter(&self) -> std::slice::Iter<'_, AllocationRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, AllocationRecord> {
        self.records.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of requested sizes over the whole ledger, freed records included.
    #[must_use]
    pub fn total_requested(&self) -> u64 {
        self.records.iter().map(|r| r.size as u64).sum()
    }
}

impl<'a> IntoIterator for &'a RecordStore {
    type Item = &'a AllocationRecord;
    type IntoIter = std::slice::Iter<'a, AllocationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
