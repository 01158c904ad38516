//! The boundary between the store and whatever ships events upstream.
//!
//! An [`Uploader`] receives the events of one batch and reports whether the
//! remote service acknowledged them. [`flush_once`] runs one
//! take / upload / purge cycle and puts the batch back on failure. Retry
//! timing, backoff and request encoding are left to the caller.

use crate::error::StoreError;
use crate::event::StoredEvent;
use crate::store::EventStore;

/// Delivers one batch of events upstream.
///
/// Return `Ok(())` only after the remote service has positively
/// acknowledged every event in `events`; the batch is purged right after.
pub trait Uploader {
    /// Failure reported by the transport.
    type Error: std::error::Error + 'static;

    /// Uploads `events`, ordered oldest first.
    fn upload(&mut self, events: &[StoredEvent]) -> Result<(), Self::Error>;
}

impl<F, E> Uploader for F
where
    F: FnMut(&[StoredEvent]) -> Result<(), E>,
    E: std::error::Error + 'static,
{
    type Error = E;

    fn upload(&mut self, events: &[StoredEvent]) -> Result<(), E> {
        self(events)
    }
}

/// Result of a flush cycle that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No NEW events were waiting; the uploader was not called.
    Idle,
    /// A batch was uploaded and purged.
    Delivered {
        /// Events handed to the uploader.
        events: usize,
        /// Events deleted by the purge.
        purged: usize,
    },
}

/// Errors from [`flush_once`].
#[derive(Debug, thiserror::Error)]
pub enum FlushError<E: std::error::Error + 'static> {
    /// The store failed while taking, purging, or abandoning the batch.
    /// If the failure happened after the upload succeeded the batch is
    /// still PENDING and the purge should be retried, not the upload.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The uploader failed; the batch was returned to NEW.
    #[error("upload failed, {abandoned} events returned to the queue: {source}")]
    Upload {
        /// Events reset from PENDING to NEW.
        abandoned: usize,
        /// The transport error.
        source: E,
    },
}

/// Runs one delivery cycle: take up to `max_count` ready events, upload
/// them, then purge them on success or abandon them on failure.
///
/// # Errors
///
/// Returns `FlushError::Upload` if the uploader fails and
/// `FlushError::Store` if any store operation fails.
pub fn flush_once<U: Uploader>(
    store: &EventStore,
    max_count: usize,
    uploader: &mut U,
) -> Result<FlushOutcome, FlushError<U::Error>> {
    let batch = store.take_ready_batch(max_count)?;
    if batch.is_empty() {
        return Ok(FlushOutcome::Idle);
    }

    let ids = batch.ids();
    match uploader.upload(batch.events()) {
        Ok(()) => {
            let purged = store.purge_taken_batch(&ids)?;
            tracing::debug!(events = ids.len(), purged, "delivered batch");
            Ok(FlushOutcome::Delivered {
                events: ids.len(),
                purged,
            })
        }
        Err(source) => {
            tracing::warn!(
                events = ids.len(),
                error = %source,
                "upload failed, returning batch to the queue"
            );
            let abandoned = store.abandon(&ids)?;
            Err(FlushError::Upload { abandoned, source })
        }
    }
}
