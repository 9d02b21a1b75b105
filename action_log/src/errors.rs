use std::time::Duration;

use thiserror::Error;

/// Construction and usage-protocol violations. These fail fast: a bad
/// configuration is a programming error, not an operational condition.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("at least one rate period is required")]
    EmptyPeriods,

    #[error("period must be a positive number of seconds, got {0}")]
    NonPositivePeriod(f64),

    #[error("interval must be a positive number of seconds, got {0}")]
    NonPositiveInterval(f64),

    #[error("minimum interval {min:?} must not exceed maximum interval {max:?}")]
    IntervalOrder { min: Duration, max: Duration },

    #[error("extrema window capacity must be at least 1")]
    ZeroWindow,

    #[error("capacity must be at least 1")]
    ZeroCapacity,

    #[error("unknown level name: {0}")]
    UnknownLevel(String),

    #[error("actor is still stopping; join() it before calling start() again")]
    ActorRestartRace,

    #[error("actor was never started")]
    ActorNeverStarted,
}

/// Accumulator faults. These indicate caller error (a query the estimator
/// cannot answer), never an internal failure of the accumulator itself.
#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("quantile {0} is outside [0, 100]")]
    QuantileOutOfRange(f64),

    #[error("quantile {0} is not tracked by this estimator")]
    UntrackedQuantile(f64),

    #[error("not enough observations yet ({have} of {need})")]
    InsufficientData { have: usize, need: usize },

    #[error("histogram bound {0} is not a finite number")]
    InvalidBound(f64),

    #[error("at least one finite histogram bound is required")]
    NoBounds,

    #[error("at least one tracked quantile is required")]
    EmptyQuantiles,
}
