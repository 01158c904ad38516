//! Durable client-side event buffer.
//!
//! Producers [`add`](EventStore::add) opaque events; an uploader
//! [takes](EventStore::take_ready_batch) batches of the oldest ready
//! events, ships them, and [purges](EventStore::purge_taken_batch) them once
//! the remote side acknowledges delivery. The store is backed by SQLite
//! through `eventbuf-db`.
//!
//! # Lifecycle
//!
//! | State | Entered by | Exited by |
//! |-------|-----------|-----------|
//! | NEW | `add`, `abandon`, recovery | `take_ready_batch` → PENDING |
//! | PENDING | `take_ready_batch` | `purge_taken_batch` → deleted, `abandon` / recovery → NEW |
//!
//! An event is handed to at most one outstanding batch at a time. Events
//! still PENDING when the process dies are reset to NEW the next time the
//! store is opened (see [`RecoveryPolicy`]), which makes delivery
//! at-least-once: an event uploaded just before a crash, but not yet
//! purged, is sent again.
//!
//! # Usage
//!
//! ```rust,ignore
//! use eventbuf_store::{EventStore, StoreOptions};
//!
//! let store = EventStore::open("events.db", StoreOptions::default())?;
//! store.add(br#"{"type":"click"}"#)?;
//!
//! let batch = store.take_ready_batch(50)?;
//! upload(batch.events())?;
//! store.purge_taken_batch(&batch.ids())?;
//! ```

mod error;
mod event;
mod options;
mod store;
mod upload;

pub use error::StoreError;
pub use event::{EventId, EventState, ReadyBatch, StoreStats, StoredEvent};
pub use options::{RecoveryPolicy, StoreOptions};
pub use store::EventStore;
pub use upload::{flush_once, FlushError, FlushOutcome, Uploader};

pub use eventbuf_db::DbRuntimeSettings;
