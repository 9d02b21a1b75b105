use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

/// Ordered severity classification for actions and events.
///
/// Levels compare by numeric value only; two levels with the same value are
/// the same level. The canonical ladder runs from [`Level::DEBUG`] up to
/// [`Level::CRITICAL`], bounded by [`Level::MIN_LEVEL`] and
/// [`Level::MAX_LEVEL`].
#[derive(Debug, Clone, Copy)]
pub struct Level {
    name: &'static str,
    value: u8,
}

impl Level {
    pub const DEBUG: Level = Level {
        name: "debug",
        value: 10,
    };
    pub const INFO: Level = Level {
        name: "info",
        value: 20,
    };
    pub const WARNING: Level = Level {
        name: "warning",
        value: 30,
    };
    pub const ERROR: Level = Level {
        name: "error",
        value: 40,
    };
    pub const CRITICAL: Level = Level {
        name: "critical",
        value: 50,
    };

    pub const MIN_LEVEL: Level = Level::DEBUG;
    pub const MAX_LEVEL: Level = Level::CRITICAL;

    const REGISTRY: [Level; 5] = [
        Level::DEBUG,
        Level::INFO,
        Level::WARNING,
        Level::ERROR,
        Level::CRITICAL,
    ];

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Resolve a name or alias to its canonical level, case-insensitively.
    pub fn from_name(name: &str) -> Option<Level> {
        let lowered = name.to_ascii_lowercase();
        let canonical = match lowered.as_str() {
            "warn" => "warning",
            "err" => "error",
            "fatal" => "critical",
            other => other,
        };
        Level::REGISTRY
            .iter()
            .find(|level| level.name == canonical)
            .copied()
    }

    /// Like [`Level::from_name`], falling back to `default` for unknown keys.
    pub fn from_name_or(name: &str, default: Level) -> Level {
        Level::from_name(name).unwrap_or(default)
    }

    pub fn from_value(value: u8) -> Option<Level> {
        Level::REGISTRY
            .iter()
            .find(|level| level.value == value)
            .copied()
    }

    pub fn from_value_or(value: u8, default: Level) -> Level {
        Level::from_value(value).unwrap_or(default)
    }
}

impl PartialEq for Level {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}
impl Eq for Level {}

impl PartialOrd for Level {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Level {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl FromStr for Level {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::from_name(s).ok_or_else(|| ConfigError::UnknownLevel(s.to_string()))
    }
}
