use std::collections::VecDeque;

use crate::types::Transaction;

/// Default journal capacity, matching the persisted table contract.
pub const JOURNAL_CAPACITY: usize = 1000;

/// Append-only, size-bounded log of ledger events.
///
/// Pure observability sink: recovery uses table snapshots, never journal
/// replay. Once at capacity, appending drops the oldest entries.
#[derive(Debug, Clone)]
pub struct TransactionJournal {
    entries: VecDeque<Transaction>,
    capacity: usize,
}

impl Default for TransactionJournal {
    fn default() -> Self {
        Self::new(JOURNAL_CAPACITY)
    }
}

impl TransactionJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Rebuild from a persisted document, keeping only the newest entries
    /// if the snapshot somehow exceeds the cap.
    pub fn from_snapshot(capacity: usize, mut entries: Vec<Transaction>) -> Self {
        if entries.len() > capacity {
            entries.drain(..entries.len() - capacity);
        }
        Self {
            entries: entries.into(),
            capacity,
        }
    }

    pub fn record(&mut self, tx: Transaction) {
        self.entries.push_back(tx);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Transaction> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Drop every entry referencing `entity_id` (entity deletion).
    pub fn prune_entity(&mut self, entity_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|tx| !tx.references(entity_id));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Snapshot document: full log, oldest first, newest appended last.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.entries.iter().cloned().collect()
    }
}
