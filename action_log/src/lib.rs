//! A measured, convenient approach to instrumenting application work.
//!
//! [`action-log`] wraps units of work (requests, tasks, steps) in named,
//! hierarchical actions. An action begins, may warn along the way, and
//! closes with exactly one outcome: success, failure, or exception. Each
//! transition is published as an immutable event to whatever sinks you
//! register: line emitters, counters, or the online statistical
//! accumulators in [`stats`] that summarize durations and rates without
//! storing raw observations.
//!
//! Delivery is synchronous by default. Flip a [`Logger`] (or a whole
//! [`Context`] of them) into async mode and events park in a bounded
//! queue instead, flushed in creation order by a background
//! [`IntervalActor`].
//!
//! # Examples
//!
//! ## Counting outcomes
//! ```rust
//! use std::sync::Arc;
//!
//! use action_log::{CounterSink, EventKind, Level, Logger};
//!
//! // First, we set up a logger with a sink.
//! let logger = Logger::new("worker");
//! let counter = Arc::new(CounterSink::new());
//! logger.add_sink(counter.clone());
//!
//! // Next, we wrap some work in an action.
//! let mut action = logger.action(Level::INFO, "fetch");
//! action.set("rows", 42u64);
//! action.run(|action| {
//!     action.warn("cache miss");
//!     // ... the actual fetch ...
//! });
//!
//! // The sink heard the whole lifecycle.
//! assert_eq!(1, counter.count(EventKind::Begin));
//! assert_eq!(1, counter.count(EventKind::Warn));
//! assert_eq!(1, counter.count(EventKind::Success));
//! ```
//!
//! ## Scoped nesting
//! ```rust
//! use action_log::{Level, Logger};
//!
//! let logger = Logger::new("worker");
//! let outer = logger.action(Level::INFO, "request").enter();
//! // Actions created inside the scope attach to it automatically.
//! let inner = logger.action(Level::DEBUG, "lookup");
//! assert_eq!(Some(outer.id()), inner.parent_id());
//! ```
//!

mod action;
mod context;
mod diagnostics;
mod errors;
mod event;
mod level;
mod logger;
mod periodic;
mod sink;

pub mod stats;

pub use action::Action;
pub use action::ActionScope;
pub use action::ActionStatus;
pub use action::Callpoint;
pub use context::default_context;
pub use context::Context;
pub use context::DEFAULT_FLUSH_INTERVAL;
pub use diagnostics::note;
pub use errors::ConfigError;
pub use errors::StatsError;
pub use event::Event;
pub use event::EventKind;
pub use event::ExceptionInfo;
pub use event::Value;
pub use level::Level;
pub use logger::Logger;
pub use logger::DEFAULT_QUEUE_LIMIT;
pub use periodic::IntervalActor;
pub use periodic::TaskResult;
pub use sink::CounterSink;
pub use sink::Emitter;
pub use sink::EmitterSink;
pub use sink::QuantileSink;
pub use sink::RateSink;
pub use sink::Sink;
