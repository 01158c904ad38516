//! Event identifier, state, and record types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Storage-assigned identifier of a buffered event.
///
/// Ids increase strictly with insertion order and are never reused, even
/// after the event that held one has been purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(i64);

impl EventId {
    /// Wraps a raw row id.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw row id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for EventId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EventId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Lifecycle state of a stored event.
///
/// A purged event has no state: its row is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventState {
    /// Eligible for the next batch.
    #[serde(rename = "NEW")]
    New,
    /// Handed out by a batch that has been neither purged nor reset.
    #[serde(rename = "PENDING")]
    Pending,
}

impl EventState {
    /// Returns the canonical string label for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Pending => "PENDING",
        }
    }

    pub(crate) fn from_pending_flag(pending: bool) -> Self {
        if pending {
            Self::Pending
        } else {
            Self::New
        }
    }
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event as handed out by [`EventStore::take_ready_batch`].
///
/// [`EventStore::take_ready_batch`]: crate::EventStore::take_ready_batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    /// Storage-assigned identifier; pass it back to purge or abandon.
    pub id: EventId,
    /// The opaque payload exactly as it was added.
    pub payload: Vec<u8>,
    /// How many batches (including the current one) have handed out
    /// this event.
    pub attempts: u32,
    /// When the event was added (UTC, SQLite `datetime` text).
    pub created_at: String,
}

impl StoredEvent {
    /// Returns the payload as UTF-8 text, or `None` if it is not valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Decodes a payload that was stored as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the payload is not valid JSON for `T`.
    pub fn payload_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// The events claimed by one `take_ready_batch` call, oldest first.
///
/// Every event in the batch is PENDING until its id is purged or reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadyBatch {
    events: Vec<StoredEvent>,
}

impl ReadyBatch {
    pub(crate) fn new(mut events: Vec<StoredEvent>) -> Self {
        events.sort_by_key(|e| e.id);
        Self { events }
    }

    /// The ids in this batch, ascending. This is exactly the set to hand
    /// to `purge_taken_batch` once the upload is acknowledged.
    pub fn ids(&self) -> Vec<EventId> {
        self.events.iter().map(|e| e.id).collect()
    }

    /// The events in this batch, oldest first.
    pub fn events(&self) -> &[StoredEvent] {
        &self.events
    }

    /// Consumes the batch, returning its events oldest first.
    pub fn into_events(self) -> Vec<StoredEvent> {
        self.events
    }

    /// Number of events in the batch.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if no NEW events were available.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterates the events oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, StoredEvent> {
        self.events.iter()
    }
}

impl IntoIterator for ReadyBatch {
    type Item = StoredEvent;
    type IntoIter = std::vec::IntoIter<StoredEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a ReadyBatch {
    type Item = &'a StoredEvent;
    type IntoIter = std::slice::Iter<'a, StoredEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Row counts per lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// All stored (not yet purged) events.
    pub total: u64,
    /// Events eligible for the next batch.
    pub new: u64,
    /// Events claimed by an outstanding batch.
    pub pending: u64,
}
