use std::collections::VecDeque;

pub const DEFAULT_WINDOW_CAPACITY: usize = 20;

/// Fixed-capacity rolling buffer of recent readings.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WINDOW_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `value`, evicting the oldest reading once the window is full.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Population standard deviation of the current contents, `0.0` when empty.
    pub fn volatility(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }

        let n = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let variance = self
            .values
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / n;
        variance.sqrt()
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

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new()
    }
}
