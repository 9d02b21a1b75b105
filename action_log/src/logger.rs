use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use thread_local::ThreadLocal;

use crate::action::{Action, Callpoint, ParentFrame};
use crate::diagnostics::{note, panic_text};
use crate::errors::ConfigError;
use crate::event::{Event, EventKind, ExceptionInfo};
use crate::level::Level;
use crate::sink::Sink;

/// Actions are identified process-uniquely, whichever logger makes them.
static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LOGGER_ID: AtomicU64 = AtomicU64::new(1);

pub const DEFAULT_QUEUE_LIMIT: usize = 10_000;

/// Fan-out hub: creates actions and delivers their events to every
/// registered sink.
///
/// A `Logger` is a cheap clone handle over shared state, so it can be
/// handed to as many threads as needed. In synchronous mode events are
/// dispatched to sink hooks at the call site; in asynchronous mode they are
/// parked in a bounded FIFO and delivered, still in creation order, when
/// [`Logger::flush`] runs, typically from a periodic actor.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<LoggerShared>,
}

struct LoggerShared {
    id: u64,
    name: Arc<str>,
    sinks: Mutex<Vec<Arc<dyn Sink>>>,
    async_mode: AtomicBool,
    queue: Mutex<VecDeque<Arc<Event>>>,
    queue_limit: usize,
    sequence: AtomicU64,
    flush_gate: Mutex<()>,
    last_flush: Mutex<Option<SystemTime>>,
    // Because the active-action marker is per-thread contextual:
    // concurrent producers each get an independent nesting chain.
    active: ThreadLocal<Mutex<Vec<Arc<ParentFrame>>>>,
}

impl Logger {
    pub fn new(name: &str) -> Self {
        Self::with_queue_limit(name, DEFAULT_QUEUE_LIMIT)
            .expect("the default queue limit is valid")
    }

    /// `queue_limit` bounds the async FIFO; at capacity the oldest entry
    /// is dropped silently. Backpressure by dropping, never by blocking.
    pub fn with_queue_limit(name: &str, queue_limit: usize) -> Result<Self, ConfigError> {
        if queue_limit == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            shared: Arc::new(LoggerShared {
                id: NEXT_LOGGER_ID.fetch_add(1, Ordering::Relaxed),
                name: Arc::from(name),
                sinks: Mutex::new(Vec::new()),
                async_mode: AtomicBool::new(false),
                queue: Mutex::new(VecDeque::new()),
                queue_limit,
                sequence: AtomicU64::new(1),
                flush_gate: Mutex::new(()),
                last_flush: Mutex::new(None),
                active: ThreadLocal::new(),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.shared.name.clone()
    }

    /// Create an action at `level` named `name`, capturing the caller's
    /// source location. The action attaches to whatever scope is active on
    /// this logger from the calling thread.
    #[track_caller]
    pub fn action(&self, level: Level, name: &str) -> Action {
        let callpoint = Callpoint::here();
        Action::create(
            NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed),
            self.clone(),
            level,
            name,
            callpoint,
        )
    }

    /// Publish a freestanding comment event, outside any action lifecycle.
    pub fn comment(&self, level: Level, message: &str) {
        let event = Arc::new(Event::record(
            NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed),
            Arc::from("comment"),
            self.name_arc(),
            level,
            EventKind::Comment,
            SystemTime::now(),
            message.to_string(),
            Vec::new(),
            BTreeMap::new(),
            None,
            None,
        ));
        self.publish(&event);
    }

    /// Register a sink. Adding a sink that is already registered is a
    /// no-op.
    pub fn add_sink(&self, sink: Arc<dyn Sink>) {
        let mut sinks = self
            .shared
            .sinks
            .lock()
            .expect("sink registry lock should not be poisoned");
        if !sinks.iter().any(|existing| Arc::ptr_eq(existing, &sink)) {
            sinks.push(sink);
        }
    }

    /// Replace the whole sink list atomically.
    pub fn set_sinks(&self, sinks: Vec<Arc<dyn Sink>>) {
        *self
            .shared
            .sinks
            .lock()
            .expect("sink registry lock should not be poisoned") = sinks;
    }

    pub fn sink_count(&self) -> usize {
        self.shared
            .sinks
            .lock()
            .expect("sink registry lock should not be poisoned")
            .len()
    }

    pub fn set_async(&self, enabled: bool) {
        self.shared.async_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn is_async(&self) -> bool {
        self.shared.async_mode.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.shared
            .queue
            .lock()
            .expect("event queue lock should not be poisoned")
            .len()
    }

    pub fn last_flush(&self) -> Option<SystemTime> {
        *self
            .shared
            .last_flush
            .lock()
            .expect("flush timestamp lock should not be poisoned")
    }

    /// Drain the async queue in creation order, delivering each event to
    /// the sink hooks.
    ///
    /// Only one flush executes at a time per logger, so a periodic actor
    /// and a manual call can race without reordering or double-delivering
    /// anything. A sink hook that panics during flush is contained and
    /// reported; remaining events still flow.
    pub fn flush(&self) {
        let _exclusive = self
            .shared
            .flush_gate
            .lock()
            .expect("flush gate lock should not be poisoned");
        loop {
            let event = self
                .shared
                .queue
                .lock()
                .expect("event queue lock should not be poisoned")
                .pop_front();
            let Some(event) = event else {
                break;
            };
            self.dispatch_contained(&event);
        }
        *self
            .shared
            .last_flush
            .lock()
            .expect("flush timestamp lock should not be poisoned") = Some(SystemTime::now());
    }

    pub(crate) fn publish(&self, event: &Arc<Event>) {
        if self.is_async() {
            let mut queue = self
                .shared
                .queue
                .lock()
                .expect("event queue lock should not be poisoned");
            // Sequencing under the queue lock keeps id order and queue
            // order identical even with many producer threads.
            let sequence = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
            let _ = event.sequence.set(sequence);
            if queue.len() == self.shared.queue_limit {
                queue.pop_front();
            }
            queue.push_back(event.clone());
        } else {
            let sequence = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
            let _ = event.sequence.set(sequence);
            self.dispatch(event);
        }
    }

    /// Synchronous fan-out: every matching hook, registration order. Hook
    /// panics propagate to the caller here, but the sink list itself is
    /// snapshotted first, so a hook mutating the registry cannot corrupt
    /// an in-flight dispatch.
    fn dispatch(&self, event: &Event) {
        for sink in self.sink_snapshot() {
            deliver(&sink, event);
        }
    }

    fn dispatch_contained(&self, event: &Event) {
        for sink in self.sink_snapshot() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| deliver(&sink, event))) {
                note(
                    "action_log::flush",
                    &format!(
                        "sink hook panicked during flush: {}",
                        panic_text(payload.as_ref())
                    ),
                );
            }
        }
    }

    fn sink_snapshot(&self) -> Vec<Arc<dyn Sink>> {
        self.shared
            .sinks
            .lock()
            .expect("sink registry lock should not be poisoned")
            .clone()
    }

    pub(crate) fn push_active(&self, frame: Arc<ParentFrame>) {
        self.shared
            .active
            .get_or_default()
            .lock()
            .expect("active stack lock should not be poisoned")
            .push(frame);
    }

    pub(crate) fn pop_active(&self, frame: &Arc<ParentFrame>) {
        let mut stack = self
            .shared
            .active
            .get_or_default()
            .lock()
            .expect("active stack lock should not be poisoned");
        if stack
            .last()
            .map(|top| Arc::ptr_eq(top, frame))
            .unwrap_or(false)
        {
            stack.pop();
        } else {
            log::trace!(
                "tried to exit non-active action scope {} on logger {}",
                frame.id,
                self.shared.name
            );
        }
    }

    pub(crate) fn current_parent(&self) -> Option<Arc<ParentFrame>> {
        self.shared
            .active
            .get_or_default()
            .lock()
            .expect("active stack lock should not be poisoned")
            .last()
            .cloned()
    }
}

fn deliver(sink: &Arc<dyn Sink>, event: &Event) {
    match event.kind {
        EventKind::Begin => sink.on_begin(event),
        EventKind::Warn => sink.on_warn(event),
        EventKind::Success | EventKind::Failure => sink.on_end(event),
        EventKind::Exception => {
            let fallback;
            let info = match &event.exception {
                Some(info) => info,
                None => {
                    fallback = ExceptionInfo::placeholder();
                    &fallback
                }
            };
            sink.on_exception(event, info);
        }
        EventKind::Comment => sink.on_comment(event),
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct TaggedSink {
        tag: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Sink for TaggedSink {
        fn on_begin(&self, event: &Event) {
            self.push("begin", event);
        }
        fn on_warn(&self, event: &Event) {
            self.push("warn", event);
        }
        fn on_end(&self, event: &Event) {
            self.push("end", event);
        }
        fn on_exception(&self, event: &Event, _exception: &ExceptionInfo) {
            self.push("exception", event);
        }
        fn on_comment(&self, event: &Event) {
            self.push("comment", event);
        }
    }

    impl TaggedSink {
        fn push(&self, hook: &str, event: &Event) {
            self.seen
                .lock()
                .expect("capture lock should not be poisoned")
                .push(format!("{}:{}:{}", self.tag, hook, event.kind.status_char()));
        }
    }

    /// Records only terminal events, with their publication sequence.
    #[derive(Default)]
    struct EndOnlySink {
        sequences: Arc<Mutex<Vec<u64>>>,
    }

    impl Sink for EndOnlySink {
        fn on_end(&self, event: &Event) {
            self.sequences
                .lock()
                .expect("capture lock should not be poisoned")
                .push(event.sequence().expect("published events are sequenced"));
        }
    }

    struct PanickingSink;
    impl Sink for PanickingSink {
        fn on_end(&self, _event: &Event) {
            panic!("misbehaving sink");
        }
    }

    #[test]
    fn hooks_fire_in_registration_order() {
        let logger = Logger::new("test");
        let seen: Arc<Mutex<Vec<String>>> = Default::default();
        logger.add_sink(Arc::new(TaggedSink {
            tag: "first",
            seen: seen.clone(),
        }));
        logger.add_sink(Arc::new(TaggedSink {
            tag: "second",
            seen: seen.clone(),
        }));
        let mut action = logger.action(Level::INFO, "work");
        action.success();
        let seen = seen.lock().expect("capture lock should not be poisoned");
        assert_eq!(
            vec![
                "first:begin:b",
                "second:begin:b",
                "first:end:S",
                "second:end:S"
            ],
            seen.iter().map(String::as_str).collect::<Vec<_>>()
        );
    }

    #[test]
    fn sinks_without_a_hook_skip_that_event_kind() {
        let logger = Logger::new("test");
        let sink = Arc::new(EndOnlySink::default());
        logger.add_sink(sink.clone());
        let mut action = logger.action(Level::INFO, "work");
        action.warn("ignored by this sink");
        action.success();
        logger.comment(Level::DEBUG, "also ignored");
        assert_eq!(
            1,
            sink.sequences
                .lock()
                .expect("capture lock should not be poisoned")
                .len()
        );
    }

    #[test]
    fn adding_the_same_sink_twice_is_a_no_op() {
        let logger = Logger::new("test");
        let sink: Arc<dyn Sink> = Arc::new(EndOnlySink::default());
        logger.add_sink(sink.clone());
        logger.add_sink(sink);
        assert_eq!(1, logger.sink_count());
    }

    #[test]
    fn set_sinks_replaces_the_registry() {
        let logger = Logger::new("test");
        logger.add_sink(Arc::new(EndOnlySink::default()));
        let replacement = Arc::new(EndOnlySink::default());
        logger.set_sinks(vec![replacement.clone()]);
        assert_eq!(1, logger.sink_count());
        let mut action = logger.action(Level::INFO, "work");
        action.success();
        assert_eq!(
            1,
            replacement
                .sequences
                .lock()
                .expect("capture lock should not be poisoned")
                .len()
        );
    }

    #[test]
    fn async_mode_parks_events_until_flush() {
        let logger = Logger::new("test");
        let sink = Arc::new(EndOnlySink::default());
        logger.add_sink(sink.clone());
        logger.set_async(true);
        let mut action = logger.action(Level::INFO, "work");
        action.success();
        assert_eq!(2, logger.queued());
        assert_eq!(
            0,
            sink.sequences
                .lock()
                .expect("capture lock should not be poisoned")
                .len()
        );
        logger.flush();
        assert_eq!(0, logger.queued());
        assert_eq!(
            1,
            sink.sequences
                .lock()
                .expect("capture lock should not be poisoned")
                .len()
        );
        assert!(logger.last_flush().is_some());
    }

    #[test]
    fn concurrent_producers_flush_in_creation_order() {
        let logger = Logger::new("test");
        let sink = Arc::new(EndOnlySink::default());
        logger.add_sink(sink.clone());
        logger.set_async(true);

        let threads = 4usize;
        let per_thread = 50usize;
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                let logger = logger.clone();
                std::thread::spawn(move || {
                    for _ in 0..per_thread {
                        let mut action = logger.action(Level::INFO, "work");
                        action.success();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("producer threads should not panic");
        }

        logger.flush();
        let sequences = sink
            .sequences
            .lock()
            .expect("capture lock should not be poisoned")
            .clone();
        assert_eq!(threads * per_thread, sequences.len());
        let mut sorted = sequences.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, sequences, "terminal events arrived out of order");
    }

    #[test]
    fn queue_overflow_drops_the_oldest_entries() {
        let logger = Logger::with_queue_limit("test", 3).expect("3 is a valid limit");
        let seen: Arc<Mutex<Vec<String>>> = Default::default();
        logger.add_sink(Arc::new(TaggedSink {
            tag: "only",
            seen: seen.clone(),
        }));
        logger.set_async(true);
        for _ in 0..5 {
            logger.comment(Level::INFO, "tick");
        }
        assert_eq!(3, logger.queued());
        logger.flush();
        assert_eq!(
            3,
            seen.lock()
                .expect("capture lock should not be poisoned")
                .len()
        );
    }

    #[test]
    fn a_panicking_hook_does_not_break_the_flush() {
        let logger = Logger::new("test");
        let sink = Arc::new(EndOnlySink::default());
        logger.add_sink(Arc::new(PanickingSink));
        logger.add_sink(sink.clone());
        logger.set_async(true);
        let mut action = logger.action(Level::INFO, "work");
        action.success();
        logger.flush();
        // The well-behaved sink still received the terminal event.
        assert_eq!(
            1,
            sink.sequences
                .lock()
                .expect("capture lock should not be poisoned")
                .len()
        );
        assert_eq!(0, logger.queued());
    }

    #[test]
    fn comments_reach_the_comment_hook() {
        let logger = Logger::new("test");
        let seen: Arc<Mutex<Vec<String>>> = Default::default();
        logger.add_sink(Arc::new(TaggedSink {
            tag: "c",
            seen: seen.clone(),
        }));
        logger.comment(Level::INFO, "deployment finished");
        let seen = seen.lock().expect("capture lock should not be poisoned");
        assert_eq!(vec!["c:comment:#"], seen.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn logger_ids_are_unique() {
        assert_ne!(Logger::new("a").id(), Logger::new("b").id());
    }
}
