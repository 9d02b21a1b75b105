use std::time::Instant;

use crate::errors::ConfigError;

/// Seconds between decay updates unless a read forces one sooner.
pub const DEFAULT_UPDATE_INTERVAL: f64 = 5.0;

/// The Unix load-average trio.
pub const DEFAULT_PERIODS: [f64; 3] = [60.0, 300.0, 900.0];

/// Exponentially-decayed event rates, one per configured period.
///
/// `add` only accumulates into an uncounted bucket; the decay update is
/// deferred until a rate is read and the update interval has elapsed since
/// the last decay (the first read always forces one). Rates are events per
/// second.
#[derive(Debug, Clone)]
pub struct EwmaRates {
    periods: Vec<f64>,
    rates: Vec<Option<f64>>,
    uncounted: f64,
    update_interval: f64,
    origin: Instant,
    last_tick: f64,
}

impl EwmaRates {
    pub fn new(periods: &[f64], update_interval: f64) -> Result<Self, ConfigError> {
        if periods.is_empty() {
            return Err(ConfigError::EmptyPeriods);
        }
        for &period in periods {
            if !(period > 0.0) {
                return Err(ConfigError::NonPositivePeriod(period));
            }
        }
        if !(update_interval > 0.0) {
            return Err(ConfigError::NonPositiveInterval(update_interval));
        }
        Ok(Self {
            periods: periods.to_vec(),
            rates: vec![None; periods.len()],
            uncounted: 0.0,
            update_interval,
            origin: Instant::now(),
            last_tick: 0.0,
        })
    }

    pub fn with_defaults() -> Self {
        Self::new(&DEFAULT_PERIODS, DEFAULT_UPDATE_INTERVAL)
            .expect("default periods are valid")
    }

    pub fn add(&mut self, count: f64) {
        self.uncounted += count;
    }

    /// The decayed rate for `period`, or `None` if the period is not
    /// configured or no update has happened yet.
    pub fn rate(&mut self, period: f64) -> Option<f64> {
        let now = self.now();
        self.rate_at(period, now)
    }

    /// All (period, rate) pairs with at least one update behind them.
    pub fn rates(&mut self) -> Vec<(f64, f64)> {
        let now = self.now();
        self.maybe_tick(now);
        self.periods
            .iter()
            .zip(self.rates.iter())
            .filter_map(|(&period, rate)| rate.map(|r| (period, r)))
            .collect()
    }

    pub fn periods(&self) -> &[f64] {
        &self.periods
    }

    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn rate_at(&mut self, period: f64, now: f64) -> Option<f64> {
        self.maybe_tick(now);
        let index = self.periods.iter().position(|&p| p == period)?;
        self.rates[index]
    }

    fn maybe_tick(&mut self, now: f64) {
        let elapsed = now - self.last_tick;
        let first = self.rates.iter().all(Option::is_none);
        if elapsed <= 0.0 || (!first && elapsed < self.update_interval) {
            return;
        }
        let instant_rate = self.uncounted / elapsed;
        for (rate, &period) in self.rates.iter_mut().zip(self.periods.iter()) {
            match rate {
                // No prior estimate to blend with: seed directly.
                None => *rate = Some(instant_rate),
                Some(prior) => {
                    *prior += (1.0 - (-elapsed / period).exp()) * (instant_rate - *prior);
                }
            }
        }
        self.uncounted = 0.0;
        self.last_tick = now;
    }
}
