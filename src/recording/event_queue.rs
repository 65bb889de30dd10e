// src/recording/event_queue.rs
//! FIFO queue of events awaiting delivery
//!
//! Records are appended at the back and only ever removed from the front;
//! the front record is the only one that can be in flight.

use crate::recording::event::EventRecord;
use serde::Serialize;
use std::collections::VecDeque;

/// In-memory pending event queue
#[derive(Debug, Default, Clone)]
pub struct EventQueue {
    /// Pending records, oldest first
    records: VecDeque<EventRecord>,

    /// Records appended over the queue's lifetime
    push_count: u64,

    /// Records removed from the front
    pop_count: u64,

    /// Records discarded by truncation
    drop_count: u64,
}

impl EventQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record at the back
    pub fn enqueue(&mut self, record: EventRecord) {
        self.records.push_back(record);
        self.push_count += 1;
    }

    /// Oldest pending record
    pub fn peek_front(&self) -> Option<&EventRecord> {
        self.records.front()
    }

    /// Remove the oldest pending record
    pub fn pop_front(&mut self) -> Option<EventRecord> {
        let record = self.records.pop_front();
        if record.is_some() {
            self.pop_count += 1;
        }
        record
    }

    /// Keep only the `n` most recent records, returning how many were dropped
    pub fn truncate_to_most_recent(&mut self, n: usize) -> usize {
        let excess = self.records.len().saturating_sub(n);
        if excess > 0 {
            self.records.drain(..excess);
            self.drop_count += excess as u64;
        }
        excess
    }

    /// Remove every pending record
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    /// Current queue length
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            push_count: self.push_count,
            pop_count: self.pop_count,
            drop_count: self.drop_count,
            current_size: self.records.len(),
        }
    }
}

impl Extend<EventRecord> for EventQueue {
    fn extend<I: IntoIterator<Item = EventRecord>>(&mut self, iter: I) {
        for record in iter {
            self.enqueue(record);
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Total records appended
    pub push_count: u64,

    /// Total records popped from the front
    pub pop_count: u64,

    /// Total records discarded by truncation
    pub drop_count: u64,

    /// Current queue size
    pub current_size: usize,
}
