use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

use crate::level::Level;

/// The lifecycle transition an [`Event`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Begin,
    Warn,
    Success,
    Failure,
    Exception,
    Comment,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Begin,
        EventKind::Warn,
        EventKind::Success,
        EventKind::Failure,
        EventKind::Exception,
        EventKind::Comment,
    ];

    /// Single-character status marker used by line-oriented emitters.
    pub fn status_char(&self) -> char {
        match self {
            EventKind::Begin => 'b',
            EventKind::Warn => 'W',
            EventKind::Success => 'S',
            EventKind::Failure => 'F',
            EventKind::Exception => 'E',
            EventKind::Comment => '#',
        }
    }

    /// Whether this kind closes an action's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::Success | EventKind::Failure | EventKind::Exception
        )
    }
}

/// A structured attribute value attached to an action or event.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    F64(f64),
    I64(i64),
    U64(u64),
    Bool(bool),
    Error(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::F64(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Error(e) => f.write_str(e),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}
impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::U64(value)
    }
}
impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Captured fault details attached to an exception event.
///
/// `frames` carries the error's source chain, outermost first. Capture is
/// best-effort: when no structured payload is available a generic
/// placeholder stands in, never a failure of the logging path itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionInfo {
    pub kind: String,
    pub message: String,
    pub frames: Vec<String>,
}

impl ExceptionInfo {
    pub(crate) fn placeholder() -> Self {
        Self {
            kind: "panic".to_string(),
            message: "opaque panic payload".to_string(),
            frames: Vec::new(),
        }
    }
}

/// An immutable record of one lifecycle transition on an action.
///
/// The timestamp is captured at construction, before any sink can run, so
/// sink latency never skews duration measurements. The rendered message is
/// computed lazily on first access and cached.
#[derive(Debug)]
pub struct Event {
    pub action_id: u64,
    pub action_name: Arc<str>,
    pub logger_name: Arc<str>,
    pub level: Level,
    pub kind: EventKind,
    pub time: SystemTime,
    pub raw_message: String,
    pub args: Vec<Value>,
    /// Snapshot of the action's data mapping at the moment this event fired.
    pub data: BTreeMap<String, Value>,
    /// Duration from the action's begin to this event; terminal events only.
    pub duration: Option<Duration>,
    pub exception: Option<ExceptionInfo>,
    pub(crate) sequence: OnceLock<u64>,
    rendered: OnceLock<String>,
}

impl Event {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn record(
        action_id: u64,
        action_name: Arc<str>,
        logger_name: Arc<str>,
        level: Level,
        kind: EventKind,
        time: SystemTime,
        raw_message: String,
        args: Vec<Value>,
        data: BTreeMap<String, Value>,
        duration: Option<Duration>,
        exception: Option<ExceptionInfo>,
    ) -> Self {
        Self {
            action_id,
            action_name,
            logger_name,
            level,
            kind,
            time,
            raw_message,
            args,
            data,
            duration,
            exception,
            sequence: OnceLock::new(),
            rendered: OnceLock::new(),
        }
    }

    /// The rendered message, computed on first access and cached.
    ///
    /// Rendering is deterministic and never fails: unknown `{key}` markers
    /// and exhausted `{}` positionals render as the marker text itself.
    pub fn message(&self) -> &str {
        self.rendered
            .get_or_init(|| render(&self.raw_message, &self.data, &self.args))
    }

    pub fn status_char(&self) -> char {
        self.kind.status_char()
    }

    /// Per-logger publication sequence number; `None` until published.
    pub fn sequence(&self) -> Option<u64> {
        self.sequence.get().copied()
    }

    /// Wall-clock timestamp as float seconds since the Unix epoch.
    pub fn epoch_secs(&self) -> f64 {
        self.time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// Substitute `{key}` markers from `data` and `{}` markers from `args`.
///
/// Templates without any `{` are returned as-is. `{{` and `}}` escape
/// literal braces. Unresolvable markers are kept verbatim so a bad template
/// degrades to a readable string instead of an error.
fn render(template: &str, data: &BTreeMap<String, Value>, args: &[Value]) -> String {
    if !template.contains('{') {
        return template.to_string();
    }

    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();
    let mut next_arg = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for k in chars.by_ref() {
                    if k == '}' {
                        closed = true;
                        break;
                    }
                    key.push(k);
                }
                if !closed {
                    // Unterminated marker; keep the tail verbatim.
                    out.push('{');
                    out.push_str(&key);
                } else if key.is_empty() {
                    match args.get(next_arg) {
                        Some(value) => {
                            out.push_str(&value.to_string());
                            next_arg += 1;
                        }
                        None => out.push_str("{}"),
                    }
                } else {
                    match data.get(&key) {
                        Some(value) => out.push_str(&value.to_string()),
                        None => {
                            out.push('{');
                            out.push_str(&key);
                            out.push('}');
                        }
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}
