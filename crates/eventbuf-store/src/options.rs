//! Options controlling how an [`EventStore`](crate::EventStore) is opened.

use std::time::Duration;

use eventbuf_db::DbRuntimeSettings;

/// What happens to events left PENDING by a previous run when the store
/// is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryPolicy {
    /// Reset every PENDING event to NEW. Safe when only one process uses
    /// the database file, since any batch still pending at open time was
    /// abandoned by a crash.
    #[default]
    ResetOnOpen,

    /// Reset only events that have been PENDING for longer than the given
    /// duration. Use this when several processes share one file, so a
    /// process that opens late does not reclaim a batch another process
    /// is still uploading.
    ResetStale(Duration),

    /// Leave PENDING events untouched; the owner calls
    /// [`EventStore::reset_pending`](crate::EventStore::reset_pending) or
    /// [`EventStore::reset_stale`](crate::EventStore::reset_stale) itself.
    Manual,
}

/// Settings for [`EventStore::open`](crate::EventStore::open).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// SQLite connection and pool tunables.
    pub db: DbRuntimeSettings,
    /// Startup handling of events left PENDING by a previous run.
    pub recovery: RecoveryPolicy,
}

impl StoreOptions {
    /// Returns these options with a different recovery policy.
    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }
}
