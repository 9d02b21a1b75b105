//! Online statistical accumulators.
//!
//! Each accumulator holds fixed-size summary state and never the raw
//! observation history (aside from the bounded reservoir in
//! [`QuantileAccumulator`] and the warm-up buffer in
//! [`P2QuantileAccumulator`]). `add` is the only mutator; every derived
//! statistic is a pure function of the current state.
//!
//! Accumulators are not thread-safe. A caller sharing one across threads
//! must serialize access itself; the bundled sinks do so with their own
//! mutex.

mod ewma;
mod extrema;
mod histogram;
mod moment;
mod p2;
mod quantile;

pub use ewma::EwmaRates;
pub use extrema::{MaxAccumulator, MinAccumulator};
pub use histogram::HistogramCounter;
pub use moment::MomentAccumulator;
pub use p2::P2QuantileAccumulator;
pub use quantile::QuantileAccumulator;
