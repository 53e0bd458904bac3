//! Storage seams of the aggregator.
//!
//! The aggregator owns exactly one store object implementing both traits, so
//! a backend can run the event-log append and the aggregate read-modify-write
//! for one event on the same transaction.

use std::future::Future;

use crate::model::{EventId, EventRecord, MemeId, MemeUpvoteCount};

/// Errors raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("corrupt stored row: {0}")]
    Corrupt(String),
}

/// Result of looking up an aggregate row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(MemeUpvoteCount),
    NotFound,
}

/// Append-only audit log of event records.
pub trait EventLog {
    fn contains(&mut self, id: &EventId) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Append a record. Returns `false` without writing when a record with
    /// the same id already exists.
    fn append(
        &mut self,
        record: &EventRecord,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// Keyed table of [`MemeUpvoteCount`] rows.
pub trait UpvoteCounts {
    fn lookup(
        &mut self,
        meme_id: MemeId,
    ) -> impl Future<Output = Result<Lookup, StoreError>> + Send;

    /// Insert or overwrite the row keyed by `row.meme_id`.
    fn save(
        &mut self,
        row: &MemeUpvoteCount,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
