//! The durable event store and its NEW / PENDING / purged state machine.
//!
//! Writes go through one of two paths:
//!
//! - [`EventStore::add`] is a single `INSERT` in its own transaction,
//!   durable once it returns because every connection runs with
//!   `synchronous = FULL`.
//! - Every state transition runs inside a `BEGIN IMMEDIATE` transaction.
//!   The reserved lock is taken before the first read, so two takers (in
//!   this process or another one sharing the file) serialise on it and can
//!   never select the same NEW rows.

use std::time::Duration;

use eventbuf_db::{create_pool, run_migrations, DbConnection, DbPool, MEMORY_PATH};
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use serde::Serialize;

use crate::error::StoreError;
use crate::event::{EventId, EventState, ReadyBatch, StoreStats, StoredEvent};
use crate::options::{RecoveryPolicy, StoreOptions};

/// Handle to a durable event buffer.
///
/// Cloning is cheap; clones share one connection pool. Each operation
/// checks a connection out for its own duration and returns it on exit,
/// so a handle can be passed freely to producer and consumer threads.
#[derive(Clone)]
pub struct EventStore {
    pool: DbPool,
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("pool_max_size", &self.pool.max_size())
            .finish()
    }
}

impl EventStore {
    /// Opens (creating if needed) the store at `path`.
    ///
    /// Runs schema migrations, then applies `options.recovery` to events
    /// left PENDING by a previous run.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Open`, `StoreError::Migration` or
    /// `StoreError::Connection` if the database cannot be prepared, and
    /// `StoreError::WriteFailed` if recovery cannot commit.
    pub fn open(path: &str, options: StoreOptions) -> Result<Self, StoreError> {
        let pool = create_pool(path, options.db)?;
        Self::from_pool(pool, options.recovery)
    }

    /// Opens a private in-memory store. Nothing survives the handle.
    ///
    /// # Errors
    ///
    /// See [`EventStore::open`].
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(MEMORY_PATH, StoreOptions::default())
    }

    /// Builds a store on an existing pool, migrating and recovering it.
    ///
    /// # Errors
    ///
    /// See [`EventStore::open`].
    pub fn from_pool(pool: DbPool, recovery: RecoveryPolicy) -> Result<Self, StoreError> {
        {
            let conn = pool.get()?;
            let applied = run_migrations(&conn)?;
            if applied > 0 {
                tracing::info!(count = applied, "applied event store migrations");
            }
        }

        let store = Self { pool };
        store.recover(recovery)?;
        Ok(store)
    }

    fn recover(&self, policy: RecoveryPolicy) -> Result<usize, StoreError> {
        let reset = match policy {
            RecoveryPolicy::ResetOnOpen => self.reset_pending()?,
            RecoveryPolicy::ResetStale(max_age) => self.reset_stale(max_age)?,
            RecoveryPolicy::Manual => 0,
        };

        if reset > 0 {
            tracing::info!(
                reset,
                policy = ?policy,
                "returned events left pending by a previous run to the ready queue"
            );
        }

        Ok(reset)
    }

    /// Appends an event. The row is committed before this returns.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::WriteFailed` if the insert cannot commit. The
    /// store does not retry; the caller decides whether to drop the event.
    pub fn add(&self, payload: impl AsRef<[u8]>) -> Result<EventId, StoreError> {
        let payload = payload.as_ref();

        // Inside an explicit transaction so a failed COMMIT is reported
        // instead of being lost when the autocommit statement resets.
        let id: i64 = self.write_tx(|tx| {
            tx.query_row(
                "INSERT INTO events (payload) VALUES (?1) RETURNING id",
                params![payload],
                |row| row.get(0),
            )
        })?;

        tracing::debug!(id, bytes = payload.len(), "added event");
        Ok(EventId::new(id))
    }

    /// Serialises `value` as JSON and appends it as an event.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if `value` cannot be encoded,
    /// otherwise as [`EventStore::add`].
    pub fn add_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<EventId, StoreError> {
        let payload = serde_json::to_vec(value)?;
        self.add(payload)
    }

    /// Claims up to `max_count` of the oldest NEW events and marks them
    /// PENDING in the same transaction.
    ///
    /// The returned batch is ordered by id. An empty batch means no NEW
    /// events exist. A second call before the batch is purged returns a
    /// disjoint set.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidArgument` if `max_count` is zero and
    /// `StoreError::WriteFailed` if the transaction cannot commit, in which
    /// case no event has been marked PENDING.
    pub fn take_ready_batch(&self, max_count: usize) -> Result<ReadyBatch, StoreError> {
        if max_count == 0 {
            return Err(StoreError::InvalidArgument(
                "max_count must be greater than zero".to_string(),
            ));
        }
        let limit = i64::try_from(max_count).map_err(|_| {
            StoreError::InvalidArgument(format!("max_count {max_count} is out of range"))
        })?;

        let events = self.write_tx(|tx| {
            let mut stmt = tx.prepare(
                "UPDATE events
                 SET pending = 1, attempts = attempts + 1, taken_at = datetime('now')
                 WHERE id IN (
                     SELECT id FROM events WHERE pending = 0 ORDER BY id ASC LIMIT ?1
                 )
                 RETURNING id, payload, attempts, created_at",
            )?;
            let rows = stmt.query_map(params![limit], row_to_event)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        let batch = ReadyBatch::new(events);
        tracing::debug!(max_count, taken = batch.len(), "took ready batch");
        Ok(batch)
    }

    /// Permanently deletes delivered events.
    ///
    /// Only ids that are currently PENDING are deleted; anything else
    /// (already purged, still NEW, never issued) is ignored, so repeating
    /// a purge is harmless. Returns the number of events deleted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::WriteFailed` if the transaction cannot commit.
    /// In that case nothing was deleted and the events stay PENDING, so the
    /// purge can simply be retried.
    pub fn purge_taken_batch(&self, ids: &[EventId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let purged = self.write_tx(|tx| {
            let mut stmt = tx.prepare("DELETE FROM events WHERE id = ?1 AND pending = 1")?;
            let mut purged = 0;
            for id in ids {
                purged += stmt.execute(params![id.get()])?;
            }
            Ok(purged)
        })?;

        tracing::debug!(
            requested = ids.len(),
            purged,
            "purged delivered events, ignoring ids that were not pending"
        );
        Ok(purged)
    }

    /// Returns PENDING events to NEW without deleting them, for a batch
    /// whose upload failed or was given up. Ids that are not PENDING are
    /// ignored. Returns the number of events reset.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::WriteFailed` if the transaction cannot commit.
    pub fn abandon(&self, ids: &[EventId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let reset = self.write_tx(|tx| {
            let mut stmt = tx.prepare(
                "UPDATE events SET pending = 0, taken_at = NULL WHERE id = ?1 AND pending = 1",
            )?;
            let mut reset = 0;
            for id in ids {
                reset += stmt.execute(params![id.get()])?;
            }
            Ok(reset)
        })?;

        tracing::debug!(requested = ids.len(), reset, "abandoned pending events");
        Ok(reset)
    }

    /// Returns every PENDING event to NEW.
    ///
    /// This is the startup recovery rule. Calling it while another handle
    /// has a batch in flight makes that batch eligible again, so the events
    /// may be delivered twice.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::WriteFailed` if the transaction cannot commit.
    pub fn reset_pending(&self) -> Result<usize, StoreError> {
        let reset = self.write_tx(|tx| {
            tx.execute(
                "UPDATE events SET pending = 0, taken_at = NULL WHERE pending = 1",
                [],
            )
        })?;

        tracing::debug!(reset, "reset all pending events");
        Ok(reset)
    }

    /// Returns events that have been PENDING for at least `max_age` to NEW.
    ///
    /// Timestamps have one-second resolution.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::WriteFailed` if the transaction cannot commit.
    pub fn reset_stale(&self, max_age: Duration) -> Result<usize, StoreError> {
        let modifier = format!("-{:.3} seconds", max_age.as_secs_f64());

        let reset = self.write_tx(|tx| {
            tx.execute(
                "UPDATE events SET pending = 0, taken_at = NULL
                 WHERE pending = 1 AND taken_at <= datetime('now', ?1)",
                params![modifier],
            )
        })?;

        tracing::debug!(reset, max_age_secs = max_age.as_secs(), "reset stale pending events");
        Ok(reset)
    }

    /// Counts stored events per state.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ReadFailed` on SQL failure.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn()?;
        let (total, pending): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(pending), 0) FROM events",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(StoreError::ReadFailed)?;

        let total = total.max(0) as u64;
        let pending = pending.max(0) as u64;
        Ok(StoreStats {
            total,
            new: total - pending,
            pending,
        })
    }

    /// Returns `true` if any batch is outstanding.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ReadFailed` on SQL failure.
    pub fn has_pending(&self) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM events WHERE pending = 1)",
            [],
            |row| row.get(0),
        )
        .map_err(StoreError::ReadFailed)
    }

    /// Returns the state of one event, or `None` if it was purged or
    /// never existed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ReadFailed` on SQL failure.
    pub fn state_of(&self, id: EventId) -> Result<Option<EventState>, StoreError> {
        let conn = self.conn()?;
        let pending: Option<bool> = conn
            .query_row(
                "SELECT pending FROM events WHERE id = ?1",
                params![id.get()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::ReadFailed)?;

        Ok(pending.map(EventState::from_pending_flag))
    }

    fn conn(&self) -> Result<DbConnection, StoreError> {
        Ok(self.pool.get()?)
    }

    /// Runs `f` in a `BEGIN IMMEDIATE` transaction and commits it.
    ///
    /// If `f` or the commit fails the transaction is rolled back when it
    /// drops, leaving no partial effect.
    fn write_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::WriteFailed)?;
        let value = f(&tx).map_err(StoreError::WriteFailed)?;
        tx.commit().map_err(StoreError::WriteFailed)?;
        Ok(value)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredEvent> {
    Ok(StoredEvent {
        id: EventId::new(row.get(0)?),
        payload: row.get(1)?,
        attempts: row.get(2)?,
        created_at: row.get(3)?,
    })
}
