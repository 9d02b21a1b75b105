use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::diagnostics::{note, panic_text};
use crate::errors::ConfigError;

const TOPIC: &str = "action_log::periodic";

pub type TaskResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type Task = Box<dyn FnMut() -> TaskResult + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActorState {
    Stopped,
    Running,
    Stopping,
}

/// Background task runner with an adaptive interval.
///
/// One worker thread invokes the bound task repeatedly. Success decays the
/// polling interval geometrically toward the configured minimum; a failure
/// (an `Err` return or a caught panic) doubles it up to the configured
/// maximum and reports the fault. Task failures never stop the loop. The
/// inter-iteration wait watches the stop signal, so [`IntervalActor::stop`]
/// is observed mid-wait rather than at the next interval boundary.
///
/// Restartable after a full stop/join cycle; calling `start` while the
/// worker is still stopping is a usage error.
pub struct IntervalActor {
    shared: Arc<ActorShared>,
    task: Arc<Mutex<Task>>,
    handle: Option<JoinHandle<()>>,
    started: bool,
}

struct ActorShared {
    state: Mutex<ActorState>,
    signal: Condvar,
    interval: Mutex<Duration>,
    min_interval: Duration,
    max_interval: Duration,
}

impl IntervalActor {
    pub fn new(
        task: impl FnMut() -> TaskResult + Send + 'static,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        Self::with_bounds(task, interval, interval, interval.saturating_mul(64))
    }

    pub fn with_bounds(
        task: impl FnMut() -> TaskResult + Send + 'static,
        interval: Duration,
        min_interval: Duration,
        max_interval: Duration,
    ) -> Result<Self, ConfigError> {
        for candidate in [interval, min_interval, max_interval] {
            if candidate.is_zero() {
                return Err(ConfigError::NonPositiveInterval(candidate.as_secs_f64()));
            }
        }
        if min_interval > max_interval {
            return Err(ConfigError::IntervalOrder {
                min: min_interval,
                max: max_interval,
            });
        }
        let interval = interval.clamp(min_interval, max_interval);
        Ok(Self {
            shared: Arc::new(ActorShared {
                state: Mutex::new(ActorState::Stopped),
                signal: Condvar::new(),
                interval: Mutex::new(interval),
                min_interval,
                max_interval,
            }),
            task: Arc::new(Mutex::new(Box::new(task))),
            handle: None,
            started: false,
        })
    }

    pub fn current_interval(&self) -> Duration {
        *self
            .shared
            .interval
            .lock()
            .expect("interval lock should not be poisoned")
    }

    pub fn is_running(&self) -> bool {
        *self
            .shared
            .state
            .lock()
            .expect("actor state lock should not be poisoned")
            == ActorState::Running
    }

    /// Spawn the worker. A no-op when already running; an error while the
    /// previous worker is still stopping and has not been joined.
    pub fn start(&mut self) -> Result<(), ConfigError> {
        {
            let mut state = self
                .shared
                .state
                .lock()
                .expect("actor state lock should not be poisoned");
            match *state {
                ActorState::Running => return Ok(()),
                ActorState::Stopping => return Err(ConfigError::ActorRestartRace),
                ActorState::Stopped => *state = ActorState::Running,
            }
        }
        // Reap a worker left over from a previous run; it has already
        // observed Stopped and is at most instants from exiting.
        if let Some(stale) = self.handle.take() {
            let _ = stale.join();
        }
        let shared = self.shared.clone();
        let task = self.task.clone();
        self.handle = Some(
            std::thread::Builder::new()
                .name("action-log-interval".to_string())
                .spawn(move || worker(shared, task))
                .expect("spawning the interval worker should succeed"),
        );
        self.started = true;
        Ok(())
    }

    /// Request cessation. Idempotent; the worker winds down on its own.
    pub fn stop(&self) {
        let mut state = self
            .shared
            .state
            .lock()
            .expect("actor state lock should not be poisoned");
        if *state == ActorState::Running {
            *state = ActorState::Stopping;
            self.shared.signal.notify_all();
        }
    }

    /// Wait up to `timeout` for the worker to end. Returns whether it is
    /// still alive afterwards.
    pub fn join(&mut self, timeout: Duration) -> Result<bool, ConfigError> {
        if !self.started {
            return Err(ConfigError::ActorNeverStarted);
        }
        let state = self
            .shared
            .state
            .lock()
            .expect("actor state lock should not be poisoned");
        let (state, _timed_out) = self
            .shared
            .signal
            .wait_timeout_while(state, timeout, |state| *state != ActorState::Stopped)
            .expect("actor state lock should not be poisoned");
        if *state == ActorState::Stopped {
            drop(state);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
            Ok(false)
        } else {
            Ok(true)
        }
    }
}

fn worker(shared: Arc<ActorShared>, task: Arc<Mutex<Task>>) {
    loop {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            // A panicking task poisons its own mutex; recover rather than
            // losing the loop.
            let mut task = task.lock().unwrap_or_else(PoisonError::into_inner);
            (*task)()
        }));
        let failed = match outcome {
            Ok(Ok(())) => false,
            Ok(Err(error)) => {
                note(TOPIC, &format!("periodic task failed: {error}"));
                true
            }
            Err(payload) => {
                note(
                    TOPIC,
                    &format!("periodic task panicked: {}", panic_text(payload.as_ref())),
                );
                true
            }
        };

        let wait = {
            let mut interval = shared
                .interval
                .lock()
                .expect("interval lock should not be poisoned");
            *interval = if failed {
                interval.saturating_mul(2).min(shared.max_interval)
            } else {
                (*interval / 2).max(shared.min_interval)
            };
            *interval
        };

        let state = shared
            .state
            .lock()
            .expect("actor state lock should not be poisoned");
        let (mut state, _timed_out) = shared
            .signal
            .wait_timeout_while(state, wait, |state| *state == ActorState::Running)
            .expect("actor state lock should not be poisoned");
        if *state == ActorState::Stopping {
            *state = ActorState::Stopped;
            shared.signal.notify_all();
            return;
        }
    }
}
