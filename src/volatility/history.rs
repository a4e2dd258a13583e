//! Per-symbol volatility history.
//!
//! A fixed-capacity ring buffer of recent short-horizon volatility
//! readings per symbol. Memory stays bounded regardless of uptime: once a
//! buffer is full, the oldest sample is overwritten.

use std::collections::HashMap;

/// Default capacity: 24 hours of 5-minute samples.
pub const DEFAULT_HISTORY_CAPACITY: usize = 288;

// ---------------------------------------------------------------------------
// Ring buffer
// ---------------------------------------------------------------------------

/// Fixed-capacity ordered sequence of past volatility readings.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    slots: Vec<f64>,
    capacity: usize,
    /// Index of the oldest sample once the buffer has wrapped.
    head: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, value: f64) {
        let value = if value.is_finite() { value } else { 0.0 };
        if self.slots.len() < self.capacity {
            self.slots.push(value);
        } else {
            self.slots[self.head] = value;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter()).copied()
    }

    /// The most recently pushed sample.
    pub fn latest(&self) -> Option<f64> {
        if self.slots.is_empty() {
            None
        } else if self.slots.len() < self.capacity || self.head == 0 {
            self.slots.last().copied()
        } else {
            Some(self.slots[self.head - 1])
        }
    }

    /// Arithmetic mean of all samples (0 when empty).
    pub fn mean(&self) -> f64 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.slots.iter().sum::<f64>() / self.slots.len() as f64
    }

    /// Percentage (0–100) of samples strictly below `value`.
    /// Returns `None` when the buffer is empty.
    pub fn percentile_rank(&self, value: f64) -> Option<f64> {
        if self.slots.is_empty() {
            return None;
        }
        let below = self.slots.iter().filter(|&&v| v < value).count();
        Some(below as f64 / self.slots.len() as f64 * 100.0)
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Owned map of symbol → history buffer.
///
/// Each symbol's slot is written once per cycle by the orchestrator's
/// fold step; readers get a shared reference to a single buffer.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    buffers: HashMap<String, HistoryBuffer>,
    capacity: usize,
    empty: HistoryBuffer,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            capacity,
            empty: HistoryBuffer::new(capacity),
        }
    }

    /// The buffer for a symbol, or an empty buffer if none exists yet.
    pub fn get(&self, symbol: &str) -> &HistoryBuffer {
        self.buffers.get(symbol).unwrap_or(&self.empty)
    }

    /// Record a new sample for a symbol.
    pub fn record(&mut self, symbol: &str, value: f64) {
        let capacity = self.capacity;
        self.buffers
            .entry(symbol.to_string())
            .or_insert_with(|| HistoryBuffer::new(capacity))
            .push(value);
    }

    /// Number of symbols with at least one sample.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
