use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::{ConfigError, StatsError};
use crate::event::{Event, EventKind, ExceptionInfo};
use crate::stats::{EwmaRates, P2QuantileAccumulator, QuantileAccumulator};

/// A pluggable consumer of lifecycle events.
///
/// Every hook defaults to a no-op, so a sink implements only the event
/// kinds it cares about and simply never hears about the rest. Hooks run
/// on whichever thread publishes or flushes, so implementations guard
/// their own state.
pub trait Sink: Send + Sync {
    fn on_begin(&self, _event: &Event) {}
    fn on_warn(&self, _event: &Event) {}
    fn on_end(&self, _event: &Event) {}
    fn on_exception(&self, _event: &Event, _exception: &ExceptionInfo) {}
    fn on_comment(&self, _event: &Event) {}
}

/// Where rendered entries go: stdio, a file, syslog. The mechanics live
/// behind this seam; the core only ever hands over finished text.
pub trait Emitter: Send + Sync {
    fn emit(&self, text: &str);
}

/// Renders one line per event and pushes it to an [`Emitter`].
pub struct EmitterSink<E: Emitter> {
    emitter: E,
}

impl<E: Emitter> EmitterSink<E> {
    pub fn new(emitter: E) -> Self {
        Self { emitter }
    }

    fn emit_line(&self, event: &Event) {
        self.emitter.emit(&format!(
            "{} {:.6} {} {}/{} {}",
            event.status_char(),
            event.epoch_secs(),
            event.level,
            event.logger_name,
            event.action_name,
            event.message()
        ));
    }
}

impl<E: Emitter> Sink for EmitterSink<E> {
    fn on_begin(&self, event: &Event) {
        self.emit_line(event);
    }
    fn on_warn(&self, event: &Event) {
        self.emit_line(event);
    }
    fn on_end(&self, event: &Event) {
        self.emit_line(event);
    }
    fn on_exception(&self, event: &Event, _exception: &ExceptionInfo) {
        self.emit_line(event);
    }
    fn on_comment(&self, event: &Event) {
        self.emit_line(event);
    }
}

/// Counts events per kind.
#[derive(Default)]
pub struct CounterSink {
    counts: Mutex<HashMap<EventKind, u64>>,
}

impl CounterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts
            .lock()
            .expect("counter lock should not be poisoned")
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts
            .lock()
            .expect("counter lock should not be poisoned")
            .values()
            .sum()
    }

    fn bump(&self, kind: EventKind) {
        *self
            .counts
            .lock()
            .expect("counter lock should not be poisoned")
            .entry(kind)
            .or_insert(0) += 1;
    }
}

impl Sink for CounterSink {
    fn on_begin(&self, event: &Event) {
        self.bump(event.kind);
    }
    fn on_warn(&self, event: &Event) {
        self.bump(event.kind);
    }
    fn on_end(&self, event: &Event) {
        self.bump(event.kind);
    }
    fn on_exception(&self, event: &Event, _exception: &ExceptionInfo) {
        self.bump(event.kind);
    }
    fn on_comment(&self, event: &Event) {
        self.bump(event.kind);
    }
}

enum DurationEstimator {
    Reservoir(QuantileAccumulator),
    P2(P2QuantileAccumulator),
}

enum EstimatorTemplate {
    Reservoir(Option<usize>),
    P2(Vec<f64>),
}

/// Summarizes completed-action durations (seconds) per action name.
///
/// Backed by either the reservoir accumulator (cheap writes) or the P²
/// estimator (no stored observations) depending on the constructor.
pub struct QuantileSink {
    template: EstimatorTemplate,
    estimators: Mutex<HashMap<String, DurationEstimator>>,
}

impl QuantileSink {
    pub fn reservoir(cap: Option<usize>) -> Result<Self, ConfigError> {
        if let Some(cap) = cap {
            // Validate eagerly; per-name accumulators are built lazily.
            QuantileAccumulator::with_cap(cap)?;
        }
        Ok(Self {
            template: EstimatorTemplate::Reservoir(cap),
            estimators: Mutex::new(HashMap::new()),
        })
    }

    pub fn p2(quantiles: &[f64]) -> Result<Self, StatsError> {
        P2QuantileAccumulator::new(quantiles)?;
        Ok(Self {
            template: EstimatorTemplate::P2(quantiles.to_vec()),
            estimators: Mutex::new(HashMap::new()),
        })
    }

    /// The `q`th duration percentile for `name`, if it is answerable yet.
    pub fn duration_quantile(&self, name: &str, q: f64) -> Option<f64> {
        let mut estimators = self
            .estimators
            .lock()
            .expect("estimator lock should not be poisoned");
        match estimators.get_mut(name)? {
            DurationEstimator::Reservoir(acc) => acc.quantile(q).ok(),
            DurationEstimator::P2(acc) => acc.quantile(q).ok(),
        }
    }

    pub fn observed(&self, name: &str) -> u64 {
        let estimators = self
            .estimators
            .lock()
            .expect("estimator lock should not be poisoned");
        match estimators.get(name) {
            Some(DurationEstimator::Reservoir(acc)) => acc.count(),
            Some(DurationEstimator::P2(acc)) => acc.count(),
            None => 0,
        }
    }

    fn record(&self, event: &Event) {
        let Some(duration) = event.duration else {
            return;
        };
        let mut estimators = self
            .estimators
            .lock()
            .expect("estimator lock should not be poisoned");
        let estimator = estimators
            .entry(event.action_name.to_string())
            .or_insert_with(|| match &self.template {
                EstimatorTemplate::Reservoir(cap) => DurationEstimator::Reservoir(match cap {
                    Some(cap) => QuantileAccumulator::with_cap(*cap)
                        .expect("cap was validated at construction"),
                    None => QuantileAccumulator::new(),
                }),
                EstimatorTemplate::P2(quantiles) => DurationEstimator::P2(
                    P2QuantileAccumulator::new(quantiles)
                        .expect("quantiles were validated at construction"),
                ),
            });
        match estimator {
            DurationEstimator::Reservoir(acc) => acc.add(duration.as_secs_f64()),
            DurationEstimator::P2(acc) => acc.add(duration.as_secs_f64()),
        }
    }
}

impl Sink for QuantileSink {
    fn on_end(&self, event: &Event) {
        self.record(event);
    }
    fn on_exception(&self, event: &Event, _exception: &ExceptionInfo) {
        self.record(event);
    }
}

/// Tracks a decayed event rate per event kind.
pub struct RateSink {
    template: EwmaRates,
    rates: Mutex<HashMap<EventKind, EwmaRates>>,
}

impl RateSink {
    pub fn new(periods: &[f64], update_interval: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            template: EwmaRates::new(periods, update_interval)?,
            rates: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_defaults() -> Self {
        Self {
            template: EwmaRates::with_defaults(),
            rates: Mutex::new(HashMap::new()),
        }
    }

    /// The decayed rate for `kind` over `period`, if established.
    pub fn rate(&self, kind: EventKind, period: f64) -> Option<f64> {
        self.rates
            .lock()
            .expect("rate lock should not be poisoned")
            .get_mut(&kind)?
            .rate(period)
    }

    fn record(&self, kind: EventKind) {
        self.rates
            .lock()
            .expect("rate lock should not be poisoned")
            .entry(kind)
            .or_insert_with(|| self.template.clone())
            .add(1.0);
    }
}

impl Sink for RateSink {
    fn on_begin(&self, event: &Event) {
        self.record(event.kind);
    }
    fn on_warn(&self, event: &Event) {
        self.record(event.kind);
    }
    fn on_end(&self, event: &Event) {
        self.record(event.kind);
    }
    fn on_exception(&self, event: &Event, _exception: &ExceptionInfo) {
        self.record(event.kind);
    }
    fn on_comment(&self, event: &Event) {
        self.record(event.kind);
    }
}
