//! PendingQueue - records parked while a transport connects

use std::collections::VecDeque;
use std::sync::Arc;

use contracts::LogRecord;

use crate::completion::Completion;

/// One parked record and its completion, if the caller asked for one
pub struct PendingEntry {
    pub record: Arc<LogRecord>,
    pub completion: Option<Arc<Completion>>,
}

impl PendingEntry {
    pub fn new(record: Arc<LogRecord>, completion: Option<Arc<Completion>>) -> Self {
        Self { record, completion }
    }
}

/// FIFO of pending entries
///
/// Not size-bounded; the lane stops enqueueing once its grace window closes.
#[derive(Default)]
pub struct PendingQueue {
    entries: VecDeque<PendingEntry>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail
    pub fn enqueue(&mut self, entry: PendingEntry) {
        self.entries.push_back(entry);
    }

    /// Hand every entry to `forward` in arrival order, leaving the queue empty
    pub fn drain_all<F>(&mut self, mut forward: F) -> usize
    where
        F: FnMut(PendingEntry),
    {
        let count = self.entries.len();
        while let Some(entry) = self.entries.pop_front() {
            forward(entry);
        }
        count
    }

    /// Drop every entry without sending
    pub fn purge(&mut self) -> usize {
        self.drain_all(|entry| {
            if let Some(completion) = entry.completion {
                completion.abandon();
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
