use std::collections::VecDeque;

use crate::types::Sample;

/// Bounded FIFO of the most recent samples across all modes. Feeds replay
/// for late subscribers; statistics never read from here.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    capacity: usize,
    buf: VecDeque<Sample>,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends one sample, evicting the oldest at capacity. A ring of
    /// capacity zero keeps nothing.
    pub fn append(&mut self, sample: Sample) {
        if self.capacity == 0 {
            return;
        }
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    /// Buffered samples, oldest first.
    pub fn to_vec(&self) -> Vec<Sample> {
        self.buf.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
