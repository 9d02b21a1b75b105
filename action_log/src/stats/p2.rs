use crate::errors::StatsError;

/// Streaming quantile estimation with the P² (piecewise-parabolic)
/// algorithm, O(1) memory per tracked quantile.
///
/// One marker is kept per tracked quantile, plus the running min and max.
/// Until `tracked.len() + 2` seed observations arrive, values accumulate in
/// a warm-up buffer; the buffer is sorted once to initialize the markers
/// and the online estimator takes over. Each later observation nudges
/// marker positions by one and re-estimates displaced marker heights with
/// the parabolic formula, falling back to linear interpolation whenever the
/// parabolic estimate would break height monotonicity.
#[derive(Debug, Clone)]
pub struct P2QuantileAccumulator {
    tracked: Vec<f64>,
    /// Marker probabilities, including the 0.0 and 1.0 endpoints.
    probabilities: Vec<f64>,
    heights: Vec<f64>,
    positions: Vec<f64>,
    seed: Vec<f64>,
    count: u64,
}

impl P2QuantileAccumulator {
    /// `quantiles` are percentiles strictly inside (0, 100); the min/max
    /// markers are implicit.
    pub fn new(quantiles: &[f64]) -> Result<Self, StatsError> {
        if quantiles.is_empty() {
            return Err(StatsError::EmptyQuantiles);
        }
        let mut tracked = Vec::with_capacity(quantiles.len());
        for &q in quantiles {
            if q.is_nan() || q <= 0.0 || q >= 100.0 {
                return Err(StatsError::QuantileOutOfRange(q));
            }
            tracked.push(q);
        }
        tracked.sort_by(f64::total_cmp);
        tracked.dedup();

        let mut probabilities = Vec::with_capacity(tracked.len() + 2);
        probabilities.push(0.0);
        probabilities.extend(tracked.iter().map(|q| q / 100.0));
        probabilities.push(1.0);

        let markers = probabilities.len();
        Ok(Self {
            tracked,
            probabilities,
            heights: Vec::with_capacity(markers),
            positions: Vec::with_capacity(markers),
            seed: Vec::with_capacity(markers),
            count: 0,
        })
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn markers(&self) -> usize {
        self.probabilities.len()
    }

    /// Whether enough seed observations have arrived to engage the online
    /// estimator.
    pub fn is_warm(&self) -> bool {
        self.count >= self.markers() as u64
    }

    pub fn add(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count += 1;

        if !self.heights.is_empty() {
            self.step(value);
            return;
        }

        self.seed.push(value);
        if self.seed.len() == self.markers() {
            self.seed.sort_by(f64::total_cmp);
            self.heights = std::mem::take(&mut self.seed);
            self.positions = (1..=self.heights.len()).map(|i| i as f64).collect();
        }
    }

    /// One online update: locate the cell, shift positions, re-estimate
    /// displaced interior markers.
    fn step(&mut self, value: f64) {
        let last = self.markers() - 1;

        let cell = if value < self.heights[0] {
            self.heights[0] = value;
            0
        } else if value >= self.heights[last] {
            self.heights[last] = value;
            last - 1
        } else {
            // Markers are few; a linear scan beats binary search overhead.
            let mut cell = 0;
            for i in 0..last {
                if self.heights[i] <= value && value < self.heights[i + 1] {
                    cell = i;
                    break;
                }
            }
            cell
        };

        for position in self.positions.iter_mut().skip(cell + 1) {
            *position += 1.0;
        }

        for i in 1..last {
            let desired = 1.0 + (self.count - 1) as f64 * self.probabilities[i];
            let offset = desired - self.positions[i];
            let step_up = offset >= 1.0 && self.positions[i + 1] - self.positions[i] > 1.0;
            let step_down = offset <= -1.0 && self.positions[i - 1] - self.positions[i] < -1.0;
            if !(step_up || step_down) {
                continue;
            }
            let direction = offset.signum();
            let parabolic = self.parabolic(i, direction);
            let height = if self.heights[i - 1] < parabolic && parabolic < self.heights[i + 1] {
                parabolic
            } else {
                self.linear(i, direction)
            };
            self.heights[i] = height;
            self.positions[i] += direction;
        }
    }

    fn parabolic(&self, i: usize, d: f64) -> f64 {
        let h = &self.heights;
        let n = &self.positions;
        h[i] + d / (n[i + 1] - n[i - 1])
            * ((n[i] - n[i - 1] + d) * (h[i + 1] - h[i]) / (n[i + 1] - n[i])
                + (n[i + 1] - n[i] - d) * (h[i] - h[i - 1]) / (n[i] - n[i - 1]))
    }

    fn linear(&self, i: usize, d: f64) -> f64 {
        let j = (i as f64 + d) as usize;
        self.heights[i]
            + d * (self.heights[j] - self.heights[i]) / (self.positions[j] - self.positions[i])
    }

    /// The current estimate for a tracked percentile.
    pub fn quantile(&self, q: f64) -> Result<f64, StatsError> {
        if q.is_nan() || !(0.0..=100.0).contains(&q) {
            return Err(StatsError::QuantileOutOfRange(q));
        }
        let index = self
            .tracked
            .iter()
            .position(|&tracked| (tracked - q).abs() < 1e-9)
            .ok_or(StatsError::UntrackedQuantile(q))?;
        if !self.is_warm() {
            return Err(StatsError::InsufficientData {
                have: self.count as usize,
                need: self.markers(),
            });
        }
        Ok(self.heights[index + 1])
    }

    pub fn min(&self) -> Result<f64, StatsError> {
        self.extreme(0)
    }

    pub fn max(&self) -> Result<f64, StatsError> {
        self.extreme(self.markers() - 1)
    }

    fn extreme(&self, marker: usize) -> Result<f64, StatsError> {
        if !self.is_warm() {
            return Err(StatsError::InsufficientData {
                have: self.count as usize,
                need: self.markers(),
            });
        }
        Ok(self.heights[marker])
    }
}
