use rand::Rng;

use crate::errors::{ConfigError, StatsError};

/// Reservoir-backed quantile accumulator.
///
/// Holds raw observations up to an optional cap; beyond the cap, reservoir
/// sampling replaces a uniformly random retained slot so the window stays
/// approximately representative in bounded memory. Reads sort lazily (only
/// when stale) and interpolate linearly between order statistics. Cheap
/// writes, O(n log n) reads; prefer [`super::P2QuantileAccumulator`] when
/// reads dominate.
#[derive(Debug, Clone)]
pub struct QuantileAccumulator {
    cap: Option<usize>,
    data: Vec<f64>,
    seen: u64,
    sorted: bool,
}

impl QuantileAccumulator {
    /// Unbounded: every observation is retained.
    pub fn new() -> Self {
        Self {
            cap: None,
            data: Vec::new(),
            seen: 0,
            sorted: true,
        }
    }

    pub fn with_cap(cap: usize) -> Result<Self, ConfigError> {
        if cap == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            cap: Some(cap),
            data: Vec::with_capacity(cap),
            seen: 0,
            sorted: true,
        })
    }

    pub fn add(&mut self, value: f64) {
        self.seen += 1;
        match self.cap {
            Some(cap) if self.data.len() >= cap => {
                let slot = rand::thread_rng().gen_range(0..self.seen);
                if (slot as usize) < cap {
                    self.data[slot as usize] = value;
                    self.sorted = false;
                }
            }
            _ => {
                self.data.push(value);
                self.sorted = false;
            }
        }
    }

    /// Total observations offered, including any sampled away.
    pub fn count(&self) -> u64 {
        self.seen
    }

    /// Observations currently retained.
    pub fn retained(&self) -> usize {
        self.data.len()
    }

    /// The `q`th percentile, `q` in [0, 100], by linear interpolation
    /// between order statistics.
    pub fn quantile(&mut self, q: f64) -> Result<f64, StatsError> {
        if q.is_nan() || !(0.0..=100.0).contains(&q) {
            return Err(StatsError::QuantileOutOfRange(q));
        }
        if self.data.is_empty() {
            return Err(StatsError::InsufficientData { have: 0, need: 1 });
        }
        if !self.sorted {
            self.data.sort_by(f64::total_cmp);
            self.sorted = true;
        }
        let position = q / 100.0 * (self.data.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = position.ceil() as usize;
        let fraction = position - lower as f64;
        Ok(self.data[lower] + (self.data[upper] - self.data[lower]) * fraction)
    }

    pub fn median(&mut self) -> Result<f64, StatsError> {
        self.quantile(50.0)
    }

    pub fn quartiles(&mut self) -> Result<(f64, f64, f64), StatsError> {
        Ok((
            self.quantile(25.0)?,
            self.quantile(50.0)?,
            self.quantile(75.0)?,
        ))
    }
}

impl Default for QuantileAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
