//! Bounded FIFO window of recent readings and their timestamps.

use std::collections::VecDeque;

pub struct RollingWindow {
    values: VecDeque<f64>,
    timestamps: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            timestamps: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, evicting the oldest when at capacity.
    pub fn push(&mut self, value: f64, timestamp: f64) {
        self.values.push_back(value);
        self.timestamps.push_back(timestamp);
        while self.values.len() > self.capacity {
            self.values.pop_front();
            self.timestamps.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn values(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.timestamps.iter().copied().collect()
    }

    /// Resize in place, keeping the most recent readings that still fit.
    pub fn set_capacity(&mut self, capacity: usize) {
        if capacity == 0 {
            return;
        }
        self.capacity = capacity;
        while self.values.len() > capacity {
            self.values.pop_front();
            self.timestamps.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.timestamps.clear();
    }
}
