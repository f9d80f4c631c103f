//! Bounded history of recent transcripts, for diagnostics.

use crate::pipeline::messages::TranscriptEvent;
use std::collections::VecDeque;

/// Default number of transcripts kept.
pub const HISTORY_CAPACITY: usize = 10;

/// Ring buffer of the most recent transcripts, oldest first.
#[derive(Debug, Clone)]
pub struct ContextHistory {
    entries: VecDeque<TranscriptEvent>,
    capacity: usize,
}

impl ContextHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append, evicting the oldest entry when full.
    pub fn push(&mut self, event: TranscriptEvent) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the entries, oldest first.
    pub fn snapshot(&self) -> Vec<TranscriptEvent> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for ContextHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}
