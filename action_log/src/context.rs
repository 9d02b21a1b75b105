use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::logger::Logger;
use crate::periodic::IntervalActor;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// How long teardown waits for the flush actor to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Registry of live loggers and coordinator of asynchronous flushing.
///
/// A `Context` is an explicitly constructed object: build one, register
/// loggers with it, and drop it when done. While async mode is enabled,
/// one shared [`IntervalActor`] flushes every registered logger on an
/// adaptive interval. Dropping the context disables async mode and flushes
/// whatever is still buffered, so no event is lost to teardown ordering.
pub struct Context {
    loggers: Arc<Mutex<Vec<Logger>>>,
    actor: Mutex<Option<IntervalActor>>,
    async_enabled: AtomicBool,
    flush_interval: Duration,
}

impl Context {
    pub fn new() -> Self {
        Self::with_flush_interval(DEFAULT_FLUSH_INTERVAL)
            .expect("the default flush interval is valid")
    }

    pub fn with_flush_interval(flush_interval: Duration) -> Result<Self, ConfigError> {
        if flush_interval.is_zero() {
            return Err(ConfigError::NonPositiveInterval(0.0));
        }
        Ok(Self {
            loggers: Arc::new(Mutex::new(Vec::new())),
            actor: Mutex::new(None),
            async_enabled: AtomicBool::new(false),
            flush_interval,
        })
    }

    /// Register a logger. Idempotent by logger identity. A logger joining
    /// while async mode is on starts queueing immediately.
    pub fn add_logger(&self, logger: &Logger) {
        let mut loggers = self
            .loggers
            .lock()
            .expect("logger registry lock should not be poisoned");
        if loggers.iter().any(|known| known.id() == logger.id()) {
            return;
        }
        if self.async_enabled.load(Ordering::SeqCst) {
            logger.set_async(true);
        }
        loggers.push(logger.clone());
    }

    /// Unregister a logger, returning it to synchronous delivery with its
    /// queue drained.
    pub fn remove_logger(&self, logger: &Logger) {
        let mut loggers = self
            .loggers
            .lock()
            .expect("logger registry lock should not be poisoned");
        if let Some(position) = loggers.iter().position(|known| known.id() == logger.id()) {
            let removed = loggers.remove(position);
            drop(loggers);
            removed.set_async(false);
            removed.flush();
        }
    }

    pub fn logger_count(&self) -> usize {
        self.loggers
            .lock()
            .expect("logger registry lock should not be poisoned")
            .len()
    }

    pub fn is_async(&self) -> bool {
        self.async_enabled.load(Ordering::SeqCst)
    }

    /// Switch every registered logger to queued delivery and start the
    /// shared flush actor. A no-op when already enabled.
    pub fn enable_async(&self) -> Result<(), ConfigError> {
        if self.async_enabled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for logger in self
            .loggers
            .lock()
            .expect("logger registry lock should not be poisoned")
            .iter()
        {
            logger.set_async(true);
        }
        let loggers = self.loggers.clone();
        let mut actor = IntervalActor::with_bounds(
            move || {
                let snapshot = loggers
                    .lock()
                    .expect("logger registry lock should not be poisoned")
                    .clone();
                for logger in snapshot {
                    logger.flush();
                }
                Ok(())
            },
            self.flush_interval,
            self.flush_interval,
            self.flush_interval.saturating_mul(64),
        )?;
        actor.start()?;
        *self
            .actor
            .lock()
            .expect("actor slot lock should not be poisoned") = Some(actor);
        Ok(())
    }

    /// Stop the shared actor, return loggers to synchronous delivery, and
    /// drain what is still queued. Idempotent.
    pub fn disable_async(&self) {
        if !self.async_enabled.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(mut actor) = self
            .actor
            .lock()
            .expect("actor slot lock should not be poisoned")
            .take()
        {
            actor.stop();
            let _ = actor.join(SHUTDOWN_GRACE);
        }
        let snapshot = self
            .loggers
            .lock()
            .expect("logger registry lock should not be poisoned")
            .clone();
        for logger in snapshot {
            logger.set_async(false);
            logger.flush();
        }
    }

    /// Drain every registered logger's queue now, on the calling thread.
    pub fn flush(&self) {
        let snapshot = self
            .loggers
            .lock()
            .expect("logger registry lock should not be poisoned")
            .clone();
        for logger in snapshot {
            logger.flush();
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.disable_async();
        self.flush();
    }
}

/// A lazily initialized process-wide context, for callers that want the
/// ergonomics of a shared registry without threading one through
/// themselves. Prefer constructing and injecting your own [`Context`].
pub fn default_context() -> &'static Context {
    static INSTANCE: OnceLock<Context> = OnceLock::new();
    INSTANCE.get_or_init(Context::new)
}
