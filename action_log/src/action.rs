use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::diagnostics::{note, panic_text};
use crate::event::{Event, EventKind, ExceptionInfo, Value};
use crate::level::Level;
use crate::logger::Logger;

/// Traversal cap for parent chains.
const MAX_PARENT_DEPTH: usize = 500;

/// Lightweight identity of a scoped action, linked upward to the scope that
/// enclosed it. Children hold their ancestry through these frames rather
/// than through the actions themselves.
#[derive(Debug)]
pub(crate) struct ParentFrame {
    pub id: u64,
    pub name: Arc<str>,
    pub parent: Option<Arc<ParentFrame>>,
}

/// Where an action currently stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Begin,
    Success,
    Failure,
    Exception,
}

/// Source location captured when the action was created. Opaque attached
/// data, not a control-flow mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Callpoint {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl Callpoint {
    #[track_caller]
    pub(crate) fn here() -> Self {
        let location = std::panic::Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

/// A tracked unit of application work.
///
/// An action is created by a [`Logger`], optionally annotated through
/// [`Action::set`], begun, warned on, and closed by exactly one terminal
/// outcome: success, failure, or exception. Each transition publishes an
/// immutable [`Event`] through the logger's sinks.
///
/// Re-terminating an already-terminal action is permitted: the terminal
/// event is overwritten, last write wins. Callers relying on this should
/// know it is deliberate, not an accident of implementation.
pub struct Action {
    id: u64,
    logger: Logger,
    level: Level,
    name: Arc<str>,
    data: BTreeMap<String, Value>,
    parent: Option<Arc<ParentFrame>>,
    begin_event: Option<Arc<Event>>,
    terminal_event: Option<Arc<Event>>,
    warn_events: Vec<Arc<Event>>,
    exception_events: Vec<Arc<Event>>,
    reraise: bool,
    deferred: bool,
    terminal_dispatched: bool,
    callpoint: Callpoint,
}

impl Action {
    pub(crate) fn create(
        id: u64,
        logger: Logger,
        level: Level,
        name: &str,
        callpoint: Callpoint,
    ) -> Self {
        let parent = logger.current_parent();
        Self {
            id,
            logger,
            level,
            name: Arc::from(name),
            data: BTreeMap::new(),
            parent,
            begin_event: None,
            terminal_event: None,
            warn_events: Vec::new(),
            exception_events: Vec::new(),
            reraise: true,
            deferred: false,
            terminal_dispatched: false,
            callpoint,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn callpoint(&self) -> Callpoint {
        self.callpoint
    }

    /// Attach this action under an explicit parent instead of whatever
    /// scope is active on the logger.
    pub fn with_parent(mut self, parent: &Action) -> Self {
        self.parent = Some(Arc::new(ParentFrame {
            id: parent.id,
            name: parent.name.clone(),
            parent: parent.parent.clone(),
        }));
        self
    }

    /// Whether panics captured by [`Action::run`] resume after being
    /// recorded. Defaults to true.
    pub fn reraise(mut self, reraise: bool) -> Self {
        self.reraise = reraise;
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    pub fn status(&self) -> ActionStatus {
        match self.terminal_event.as_ref().map(|event| event.kind) {
            Some(EventKind::Success) => ActionStatus::Success,
            Some(EventKind::Failure) => ActionStatus::Failure,
            Some(EventKind::Exception) => ActionStatus::Exception,
            _ => ActionStatus::Begin,
        }
    }

    /// Terminal time minus begin time, both captured at call time. Zero
    /// when either end of the lifecycle is missing.
    pub fn duration(&self) -> Duration {
        match (&self.begin_event, &self.terminal_event) {
            (Some(begin), Some(terminal)) => terminal
                .time
                .duration_since(begin.time)
                .unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    /// Hops to the root of the parent chain, capped at 500.
    pub fn parent_depth(&self) -> usize {
        let mut depth = 0;
        let mut frame = self.parent.clone();
        while let Some(current) = frame {
            depth += 1;
            if depth >= MAX_PARENT_DEPTH {
                break;
            }
            frame = current.parent.clone();
        }
        depth
    }

    pub fn parent_id(&self) -> Option<u64> {
        self.parent.as_ref().map(|frame| frame.id)
    }

    pub fn begin_event(&self) -> Option<&Arc<Event>> {
        self.begin_event.as_ref()
    }

    pub fn terminal_event(&self) -> Option<&Arc<Event>> {
        self.terminal_event.as_ref()
    }

    pub fn warn_events(&self) -> &[Arc<Event>] {
        &self.warn_events
    }

    pub fn exception_events(&self) -> &[Arc<Event>] {
        &self.exception_events
    }

    pub fn begin(&mut self) {
        self.begin_at(SystemTime::now(), None);
    }

    pub fn begin_with(&mut self, message: impl Into<String>) {
        self.begin_at(SystemTime::now(), Some(message.into()));
    }

    /// Appends and publishes a warn event. Warnings are never deferred,
    /// even while the action itself defers terminal publication.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warn_fmt(message, Vec::new());
    }

    pub fn warn_fmt(&mut self, message: impl Into<String>, args: Vec<Value>) {
        let event = self.event(
            EventKind::Warn,
            SystemTime::now(),
            message.into(),
            args,
            None,
        );
        self.warn_events.push(event.clone());
        self.logger.publish(&event);
    }

    pub fn success(&mut self) {
        self.terminate(EventKind::Success, None, None);
    }

    pub fn success_with(&mut self, message: impl Into<String>) {
        self.terminate(EventKind::Success, Some(message.into()), None);
    }

    pub fn failure(&mut self) {
        self.terminate(EventKind::Failure, None, None);
    }

    pub fn failure_with(&mut self, message: impl Into<String>) {
        self.terminate(EventKind::Failure, Some(message.into()), None);
    }

    pub fn exception(&mut self) {
        let info = ExceptionInfo {
            kind: "error".to_string(),
            message: format!("{} raised", self.name),
            frames: Vec::new(),
        };
        self.exception_info(info);
    }

    pub fn exception_with(&mut self, message: impl Into<String>) {
        let message = message.into();
        let info = ExceptionInfo {
            kind: "error".to_string(),
            message: message.clone(),
            frames: Vec::new(),
        };
        self.terminate(EventKind::Exception, Some(message), Some(info));
    }

    /// Capture an error value: its type, message, and source chain.
    pub fn exception_from<E>(&mut self, error: &E)
    where
        E: std::error::Error + ?Sized,
    {
        let mut frames = Vec::new();
        let mut source = error.source();
        let mut hops = 0;
        while let Some(cause) = source {
            frames.push(cause.to_string());
            source = cause.source();
            hops += 1;
            if hops >= MAX_PARENT_DEPTH {
                note(
                    "action_log::capture",
                    "error source chain exceeded the traversal cap; truncating",
                );
                break;
            }
        }
        let info = ExceptionInfo {
            kind: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
            frames,
        };
        self.exception_info(info);
    }

    /// Record a pre-built exception payload and transition to terminal.
    pub fn exception_info(&mut self, info: ExceptionInfo) {
        let message = format!("{} exception: {}", self.name, info.message);
        self.terminate(EventKind::Exception, Some(message), Some(info));
    }

    /// Enter this action as a scope: begin immediately, defer terminal
    /// publication until the scope exits, and mark this action as the
    /// active parent on its logger so descendants auto-attach.
    pub fn enter(mut self) -> ActionScope {
        self.deferred = true;
        self.begin();
        let frame = Arc::new(ParentFrame {
            id: self.id,
            name: self.name.clone(),
            parent: self.parent.clone(),
        });
        self.logger.push_active(frame.clone());
        ActionScope {
            action: Some(self),
            frame,
        }
    }

    /// Run `f` inside this action's scope, capturing any panic as an
    /// exception event.
    ///
    /// Returns `Some(value)` on normal completion. A captured panic
    /// resumes unwinding after the exception event is recorded, unless the
    /// action was built with `reraise(false)`, in which case the panic is
    /// swallowed and `None` is returned.
    pub fn run<T, F>(self, f: F) -> Option<T>
    where
        F: FnOnce(&mut Action) -> T,
    {
        let reraise = self.reraise;
        let mut scope = self.enter();
        match catch_unwind(AssertUnwindSafe(|| f(&mut scope))) {
            Ok(value) => {
                drop(scope);
                Some(value)
            }
            Err(payload) => {
                let message = panic_text(payload.as_ref());
                scope.exception_info(ExceptionInfo {
                    kind: "panic".to_string(),
                    message,
                    frames: Vec::new(),
                });
                drop(scope);
                if reraise {
                    resume_unwind(payload)
                } else {
                    None
                }
            }
        }
    }

    /// Run `f` inside this action's scope, recording an `Err` as an
    /// exception event. The result flows back to the caller unchanged:
    /// errors are values here, and the action never swallows them.
    pub fn run_result<T, E, F>(self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Action) -> Result<T, E>,
        E: std::error::Error,
    {
        let mut scope = self.enter();
        let result = f(&mut scope);
        if let Err(error) = &result {
            scope.exception_from(error);
        }
        result
    }

    fn event(
        &self,
        kind: EventKind,
        time: SystemTime,
        raw_message: String,
        args: Vec<Value>,
        exception: Option<ExceptionInfo>,
    ) -> Arc<Event> {
        let duration = if kind.is_terminal() {
            Some(
                self.begin_event
                    .as_ref()
                    .map(|begin| time.duration_since(begin.time).unwrap_or_default())
                    .unwrap_or_default(),
            )
        } else {
            None
        };
        Arc::new(Event::record(
            self.id,
            self.name.clone(),
            self.logger.name_arc(),
            self.level,
            kind,
            time,
            raw_message,
            args,
            self.data.clone(),
            duration,
            exception,
        ))
    }

    fn begin_at(&mut self, time: SystemTime, message: Option<String>) {
        if self.begin_event.is_some() || self.terminal_event.is_some() {
            return;
        }
        let raw = message.unwrap_or_else(|| format!("{} begin", self.name));
        let event = self.event(EventKind::Begin, time, raw, Vec::new(), None);
        self.begin_event = Some(event.clone());
        self.logger.publish(&event);
    }

    fn terminate(
        &mut self,
        kind: EventKind,
        message: Option<String>,
        exception: Option<ExceptionInfo>,
    ) {
        let now = SystemTime::now();
        // An implicit begin shares this call's timestamp: a zero-duration
        // action rather than one that never began.
        self.begin_at(now, None);
        let raw = message.unwrap_or_else(|| {
            let outcome = match kind {
                EventKind::Success => "success",
                EventKind::Failure => "failure",
                _ => "exception",
            };
            format!("{} {}", self.name, outcome)
        });
        let event = self.event(kind, now, raw, Vec::new(), exception);
        if kind == EventKind::Exception {
            self.exception_events.push(event.clone());
        }
        self.terminal_event = Some(event.clone());
        if self.deferred {
            self.terminal_dispatched = false;
        } else {
            self.terminal_dispatched = true;
            self.logger.publish(&event);
        }
    }

    fn capture_unwind(&mut self) {
        // The payload is unreachable from a Drop running during unwind;
        // record a placeholder rather than losing the transition.
        self.exception_info(ExceptionInfo {
            kind: "panic".to_string(),
            message: format!("panic unwound through {}", self.name),
            frames: Vec::new(),
        });
    }
}

/// Guard for an action used as a scoped resource.
///
/// Guarantees the paired exit runs on every path out of the scope: normal
/// completion (implicit success), an early terminal set by the caller, or
/// unwind (captured as an exception). Dropping the scope publishes the
/// deferred terminal event and restores the logger's previous active
/// action, whatever that was.
pub struct ActionScope {
    action: Option<Action>,
    frame: Arc<ParentFrame>,
}

impl Deref for ActionScope {
    type Target = Action;

    fn deref(&self) -> &Action {
        self.action
            .as_ref()
            .expect("action scope holds its action until drop")
    }
}

impl DerefMut for ActionScope {
    fn deref_mut(&mut self) -> &mut Action {
        self.action
            .as_mut()
            .expect("action scope holds its action until drop")
    }
}

impl Drop for ActionScope {
    fn drop(&mut self) {
        let Some(mut action) = self.action.take() else {
            return;
        };
        let unwinding = std::thread::panicking();
        if unwinding && action.status() != ActionStatus::Exception {
            action.capture_unwind();
        } else if action.terminal_event.is_none() {
            action.success();
        }
        action.deferred = false;
        if !action.terminal_dispatched {
            if let Some(event) = action.terminal_event.clone() {
                if unwinding {
                    // Publishing must not double-panic past the original
                    // unwind; contain and report instead.
                    let logger = action.logger.clone();
                    if catch_unwind(AssertUnwindSafe(|| logger.publish(&event))).is_err() {
                        note(
                            "action_log::scope",
                            "sink hook panicked while publishing during unwind",
                        );
                    }
                } else {
                    action.logger.publish(&event);
                }
                action.terminal_dispatched = true;
            }
        }
        action.logger.pop_active(&self.frame);
    }
}

#[cfg(test)]
mod test {
    use std::fmt;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::sink::Sink;

    #[derive(Default)]
    struct CaptureSink {
        seen: Arc<Mutex<Vec<(EventKind, String)>>>,
    }

    impl Sink for CaptureSink {
        fn on_begin(&self, event: &Event) {
            self.push(event);
        }
        fn on_warn(&self, event: &Event) {
            self.push(event);
        }
        fn on_end(&self, event: &Event) {
            self.push(event);
        }
        fn on_exception(&self, event: &Event, _exception: &ExceptionInfo) {
            self.push(event);
        }
    }

    impl CaptureSink {
        fn push(&self, event: &Event) {
            self.seen
                .lock()
                .expect("capture lock should not be poisoned")
                .push((event.kind, event.message().to_string()));
        }
    }

    fn capturing_logger() -> (Logger, Arc<Mutex<Vec<(EventKind, String)>>>) {
        static INITIALIZE_LOGGER_ONCE: std::sync::Once = std::sync::Once::new();
        INITIALIZE_LOGGER_ONCE.call_once(|| {
            env_logger::builder().is_test(true).init();
        });
        let logger = Logger::new("test");
        let seen: Arc<Mutex<Vec<(EventKind, String)>>> = Default::default();
        logger.add_sink(Arc::new(CaptureSink { seen: seen.clone() }));
        (logger, seen)
    }

    fn kinds(seen: &Arc<Mutex<Vec<(EventKind, String)>>>) -> Vec<EventKind> {
        seen.lock()
            .expect("capture lock should not be poisoned")
            .iter()
            .map(|(kind, _)| *kind)
            .collect()
    }

    #[test]
    fn status_follows_the_lifecycle() {
        let (logger, _seen) = capturing_logger();
        let mut action = logger.action(Level::INFO, "work");
        assert_eq!(ActionStatus::Begin, action.status());
        action.begin();
        assert_eq!(ActionStatus::Begin, action.status());
        action.warn("still going");
        assert_eq!(ActionStatus::Begin, action.status());
        action.success();
        assert_eq!(ActionStatus::Success, action.status());
    }

    #[test]
    fn begin_is_idempotent() {
        let (logger, seen) = capturing_logger();
        let mut action = logger.action(Level::INFO, "work");
        action.begin();
        action.begin();
        action.begin_with("custom");
        assert_eq!(vec![EventKind::Begin], kinds(&seen));
    }

    #[test]
    fn terminal_without_begin_is_a_zero_duration_action() {
        let (logger, seen) = capturing_logger();
        let mut action = logger.action(Level::INFO, "work");
        action.success();
        // The implicit begin shares the terminal timestamp.
        assert_eq!(vec![EventKind::Begin, EventKind::Success], kinds(&seen));
        assert_eq!(Duration::ZERO, action.duration());
        let begin = action.begin_event().expect("begin was implied");
        let terminal = action.terminal_event().expect("terminal was set");
        assert_eq!(begin.time, terminal.time);
    }

    #[test]
    fn duration_is_zero_without_a_lifecycle() {
        let (logger, _seen) = capturing_logger();
        let action = logger.action(Level::INFO, "work");
        assert_eq!(Duration::ZERO, action.duration());
    }

    #[test]
    fn overwriting_terminal_event_is_permitted() {
        let (logger, seen) = capturing_logger();
        let mut action = logger.action(Level::INFO, "work");
        action.success();
        assert_eq!(ActionStatus::Success, action.status());
        // Last write wins; the second terminal replaces the first.
        action.failure();
        assert_eq!(ActionStatus::Failure, action.status());
        assert_eq!(
            vec![EventKind::Begin, EventKind::Success, EventKind::Failure],
            kinds(&seen)
        );
    }

    #[test]
    fn warnings_accumulate_in_order() {
        let (logger, _seen) = capturing_logger();
        let mut action = logger.action(Level::INFO, "work");
        action.warn("one");
        action.warn("two");
        action.success();
        let warnings: Vec<&str> = action
            .warn_events()
            .iter()
            .map(|event| event.message())
            .collect();
        assert_eq!(vec!["one", "two"], warnings);
    }

    #[test]
    fn data_set_before_an_event_lands_in_its_snapshot() {
        let (logger, seen) = capturing_logger();
        let mut action = logger.action(Level::INFO, "work");
        action.set("rows", 42u64);
        action.success_with("read {rows} rows");
        let seen = seen.lock().expect("capture lock should not be poisoned");
        let (_, message) = seen.last().expect("terminal event was published");
        assert_eq!("read 42 rows", message);
    }

    #[test]
    fn scope_exit_implies_success() {
        let (logger, seen) = capturing_logger();
        {
            let _scope = logger.action(Level::INFO, "work").enter();
        }
        assert_eq!(vec![EventKind::Begin, EventKind::Success], kinds(&seen));
    }

    #[test]
    fn scope_defers_terminal_publication_but_not_warnings() {
        let (logger, seen) = capturing_logger();
        {
            let mut scope = logger.action(Level::INFO, "work").enter();
            scope.warn("early");
            scope.success();
            // Warn and begin are out; the terminal is held for scope exit.
            assert_eq!(vec![EventKind::Begin, EventKind::Warn], kinds(&seen));
        }
        assert_eq!(
            vec![EventKind::Begin, EventKind::Warn, EventKind::Success],
            kinds(&seen)
        );
    }

    #[test]
    fn nested_scopes_attach_and_restore_parents() {
        let (logger, _seen) = capturing_logger();
        {
            let outer = logger.action(Level::INFO, "outer").enter();
            assert_eq!(0, outer.parent_depth());
            {
                let inner = logger.action(Level::INFO, "inner").enter();
                assert_eq!(Some(outer.id()), inner.parent_id());
                assert_eq!(1, inner.parent_depth());
                {
                    let innermost = logger.action(Level::INFO, "innermost").enter();
                    assert_eq!(Some(inner.id()), innermost.parent_id());
                    assert_eq!(2, innermost.parent_depth());
                }
            }
            // Back at the outer scope: new children attach to it again.
            let sibling = logger.action(Level::INFO, "sibling");
            assert_eq!(Some(outer.id()), sibling.parent_id());
        }
        let orphan = logger.action(Level::INFO, "orphan");
        assert_eq!(None, orphan.parent_id());
    }

    #[test]
    fn active_marker_restores_after_unwind() {
        let (logger, seen) = capturing_logger();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _outer = logger.action(Level::INFO, "outer").enter();
            let _inner = logger.action(Level::INFO, "inner").enter();
            panic!("boom");
        }));
        assert!(result.is_err());
        // Both scopes unwound: the marker is back to null.
        let orphan = logger.action(Level::INFO, "orphan");
        assert_eq!(None, orphan.parent_id());
        // Both actions closed as exceptions.
        let kinds = kinds(&seen);
        assert_eq!(2, kinds.iter().filter(|k| **k == EventKind::Exception).count());
    }

    #[test]
    fn run_returns_the_closure_value() {
        let (logger, seen) = capturing_logger();
        let value = logger
            .action(Level::INFO, "work")
            .run(|action| {
                action.set("rows", 7u64);
                7
            })
            .expect("no panic to suppress");
        assert_eq!(7, value);
        assert_eq!(vec![EventKind::Begin, EventKind::Success], kinds(&seen));
    }

    #[test]
    fn run_reraises_captured_panics_by_default() {
        let (logger, seen) = capturing_logger();
        let result = catch_unwind(AssertUnwindSafe(|| {
            logger.action(Level::INFO, "work").run(|_action| {
                panic!("kaboom");
            })
        }));
        assert!(result.is_err());
        assert_eq!(vec![EventKind::Begin, EventKind::Exception], kinds(&seen));
        let seen = seen.lock().expect("capture lock should not be poisoned");
        assert!(seen[1].1.contains("kaboom"));
    }

    #[test]
    fn run_swallows_panics_when_reraise_is_off() {
        let (logger, seen) = capturing_logger();
        let outcome = logger
            .action(Level::INFO, "work")
            .reraise(false)
            .run(|_action| panic!("contained"));
        assert_eq!(None::<()>, outcome);
        assert_eq!(vec![EventKind::Begin, EventKind::Exception], kinds(&seen));
    }

    #[derive(Debug)]
    struct Inner;
    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("root cause")
        }
    }
    impl std::error::Error for Inner {}

    #[derive(Debug)]
    struct Outer(Inner);
    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("outer failure")
        }
    }
    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn run_result_records_error_values_and_returns_them() {
        let (logger, seen) = capturing_logger();
        let result: Result<(), Outer> = logger
            .action(Level::INFO, "work")
            .run_result(|_action| Err(Outer(Inner)));
        assert!(result.is_err());
        assert_eq!(vec![EventKind::Begin, EventKind::Exception], kinds(&seen));
    }

    #[test]
    fn exception_from_captures_the_source_chain() {
        let (logger, _seen) = capturing_logger();
        let mut action = logger.action(Level::ERROR, "work");
        action.exception_from(&Outer(Inner));
        assert_eq!(ActionStatus::Exception, action.status());
        let event = action
            .exception_events()
            .first()
            .expect("exception event was recorded");
        let info = event.exception.as_ref().expect("exception info attached");
        assert_eq!("outer failure", info.message);
        assert_eq!(vec!["root cause".to_string()], info.frames);
        assert!(info.kind.contains("Outer"));
    }

    #[test]
    fn explicit_parent_overrides_the_active_scope() {
        let (logger, _seen) = capturing_logger();
        let mut root = logger.action(Level::INFO, "root");
        root.begin();
        let _unrelated = logger.action(Level::INFO, "unrelated").enter();
        let child = logger.action(Level::INFO, "child").with_parent(&root);
        assert_eq!(Some(root.id()), child.parent_id());
    }

    #[test]
    fn callpoint_is_captured_at_the_factory() {
        let (logger, _seen) = capturing_logger();
        let action = logger.action(Level::INFO, "work");
        assert!(action.callpoint().file.ends_with("action.rs"));
        assert!(action.callpoint().line > 0);
    }
}
