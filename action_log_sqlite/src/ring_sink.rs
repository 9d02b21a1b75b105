use std::mem;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use action_log::{note, Event, ExceptionInfo, Sink};
use rusqlite::{params, Connection};
use thiserror::Error;

const TOPIC: &str = "action_log_sqlite::ring";

#[derive(Debug, Error)]
pub enum RingStoreError {
    #[error("sqlite failure: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("ring capacity must be at least 1")]
    ZeroCapacity,

    #[error("batch size must be at least 1")]
    ZeroBatch,
}

/// One persisted row: the interesting fields of an event, flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct RingRecord {
    pub action_id: u64,
    pub logger: String,
    pub action: String,
    pub status: String,
    pub level: String,
    pub time_secs: f64,
    pub message: String,
}

impl From<&Event> for RingRecord {
    fn from(event: &Event) -> Self {
        Self {
            action_id: event.action_id,
            logger: event.logger_name.to_string(),
            action: event.action_name.to_string(),
            status: event.status_char().to_string(),
            level: event.level.to_string(),
            time_secs: event.epoch_secs(),
            message: event.message().to_string(),
        }
    }
}

/// A bridge from action lifecycles to a bounded SQLite table.
///
/// Records warn, terminal, and exception events. Rows queue FIFO within a
/// batch, batches insert in one transaction, and rows beyond `capacity`
/// are evicted oldest-first after each write.
pub struct RingSink {
    conn: Mutex<Connection>,
    batch: Mutex<Vec<RingRecord>>,
    batch_size: usize,
    capacity: u64,
}

impl RingSink {
    pub fn open(
        path: impl AsRef<Path>,
        capacity: u64,
        batch_size: usize,
    ) -> Result<Self, RingStoreError> {
        Self::with_connection(Connection::open(path)?, capacity, batch_size)
    }

    pub fn in_memory(capacity: u64, batch_size: usize) -> Result<Self, RingStoreError> {
        Self::with_connection(Connection::open_in_memory()?, capacity, batch_size)
    }

    pub fn with_connection(
        conn: Connection,
        capacity: u64,
        batch_size: usize,
    ) -> Result<Self, RingStoreError> {
        if capacity == 0 {
            return Err(RingStoreError::ZeroCapacity);
        }
        if batch_size == 0 {
            return Err(RingStoreError::ZeroBatch);
        }
        conn.execute(
            "CREATE TABLE IF NOT EXISTS action_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action_id INTEGER NOT NULL,
                logger TEXT NOT NULL,
                action TEXT NOT NULL,
                status TEXT NOT NULL,
                level TEXT NOT NULL,
                time_secs REAL NOT NULL,
                message TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            batch: Mutex::new(Vec::with_capacity(batch_size)),
            batch_size,
            capacity,
        })
    }

    /// Write out whatever is batched, reporting rather than raising on
    /// failure. Safe to drive from a periodic actor.
    pub fn drain_batch(&self) {
        let records = self.batch.lock().expect("batch lock should not be poisoned");
        if records.is_empty() {
            return;
        }
        self.write_batch(records);
    }

    /// Like [`RingSink::drain_batch`], but surfacing the write error to
    /// callers that want to handle it.
    pub fn flush(&self) -> Result<(), RingStoreError> {
        let records = {
            let mut batch = self.batch.lock().expect("batch lock should not be poisoned");
            mem::replace(&mut *batch, Vec::with_capacity(self.batch_size))
        };
        if records.is_empty() {
            return Ok(());
        }
        self.insert(&records)
    }

    /// Rows currently persisted.
    pub fn stored(&self) -> Result<u64, RingStoreError> {
        let conn = self.conn.lock().expect("connection lock should not be poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM action_events", [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }

    /// The newest `limit` rows, newest first.
    pub fn recent(&self, limit: u64) -> Result<Vec<RingRecord>, RingStoreError> {
        let conn = self.conn.lock().expect("connection lock should not be poisoned");
        let mut statement = conn.prepare(
            "SELECT action_id, logger, action, status, level, time_secs, message
             FROM action_events ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = statement.query_map(params![limit as i64], |row| {
            Ok(RingRecord {
                action_id: row.get::<_, i64>(0)? as u64,
                logger: row.get(1)?,
                action: row.get(2)?,
                status: row.get(3)?,
                level: row.get(4)?,
                time_secs: row.get(5)?,
                message: row.get(6)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn store(&self, event: &Event) {
        let mut batch = self.batch.lock().expect("batch lock should not be poisoned");
        batch.push(RingRecord::from(event));
        if self.batch_size <= batch.len() {
            self.write_batch(batch);
        }
    }

    fn write_batch(&self, mut current_batch: MutexGuard<Vec<RingRecord>>) {
        let new_buffer = Vec::with_capacity(self.batch_size);
        let records = mem::replace(&mut *current_batch, new_buffer);
        drop(current_batch);

        if let Err(error) = self.insert(&records) {
            // Sink hooks must never raise into the logging path.
            note(TOPIC, &format!("failed to persist {} records: {error}", records.len()));
        }
    }

    fn insert(&self, records: &[RingRecord]) -> Result<(), RingStoreError> {
        let mut conn = self.conn.lock().expect("connection lock should not be poisoned");
        let tx = conn.transaction()?;
        {
            let mut statement = tx.prepare_cached(
                "INSERT INTO action_events
                 (action_id, logger, action, status, level, time_secs, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in records {
                statement.execute(params![
                    record.action_id as i64,
                    record.logger,
                    record.action,
                    record.status,
                    record.level,
                    record.time_secs,
                    record.message,
                ])?;
            }
        }
        // Ring semantics: everything older than the newest `capacity`
        // rows goes.
        tx.execute(
            "DELETE FROM action_events
             WHERE id <= (SELECT MAX(id) FROM action_events) - ?1",
            params![self.capacity as i64],
        )?;
        tx.commit()?;
        log::debug!("persisted {} records", records.len());
        Ok(())
    }
}

impl Sink for RingSink {
    fn on_warn(&self, event: &Event) {
        self.store(event);
    }

    fn on_end(&self, event: &Event) {
        self.store(event);
    }

    fn on_exception(&self, event: &Event, _exception: &ExceptionInfo) {
        self.store(event);
    }
}
