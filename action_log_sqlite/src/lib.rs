//! A ring-buffered SQLite store for action-log events.
//!
//! [`action-log-sqlite`] is an [`action-log`] sink that persists warn,
//! terminal, and exception events into a bounded SQLite table: once the
//! row count passes the configured capacity, the oldest rows are evicted.
//! You get a local flight recorder of recent activity without unbounded
//! growth.
//!
//! Records are batched up on your heap and written in one transaction.
//! There's not a background timer in here to flush your pipeline. If you
//! need to make sure records are not sitting in a batch for too long you
//! can call drain_batch, typically from a periodic actor:
//! ```rust
//! fn periodic_job(ring: &action_log_sqlite::RingSink) {
//!     ring.drain_batch();
//! }
//! ```
//!
//! # Examples
//!
//! ## A flight recorder
//! ```rust
//! use std::sync::Arc;
//!
//! use action_log::{Level, Logger};
//! use action_log_sqlite::RingSink;
//!
//! // First, we set up the ring store.
//! let ring = Arc::new(
//!     RingSink::in_memory(1024, 64).expect("an in-memory store should open"),
//! );
//!
//! // Next, we register it like any other sink.
//! let logger = Logger::new("svc");
//! logger.add_sink(ring.clone());
//!
//! // Now completed actions land in the store.
//! let mut action = logger.action(Level::INFO, "fetch");
//! action.success();
//! ring.drain_batch();
//! assert_eq!(1, ring.stored().expect("the row count should be readable"));
//! ```
//!

mod ring_sink;

pub use ring_sink::RingRecord;
pub use ring_sink::RingSink;
pub use ring_sink::RingStoreError;
