//! Postgres backend for the aggregator.
//!
//! [`PgStore`] borrows an open transaction, so every write the aggregator
//! makes for an event commits or rolls back together with the rest of the
//! batch.

use memefist_aggregator::{
    EventId, EventLog, EventRecord, Lookup, MemeId, MemeUpvoteCount, StoreError, UpvoteCounts,
};
use sqlx::PgConnection;

use crate::models::{NewEvent, NewUpvoteCount};
use crate::repos;

#[derive(Debug)]
pub struct PgStore<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PgStore<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl EventLog for PgStore<'_> {
    async fn contains(&mut self, id: &EventId) -> Result<bool, StoreError> {
        repos::event_exists(&mut *self.conn, id)
            .await
            .map_err(backend)
    }

    async fn append(&mut self, record: &EventRecord) -> Result<bool, StoreError> {
        let row = NewEvent::try_from(record)?;
        let inserted = repos::insert_event(&mut *self.conn, &row)
            .await
            .map_err(backend)?;
        if !inserted {
            tracing::debug!(id = %record.id, "Event already logged");
        }
        Ok(inserted)
    }
}

impl UpvoteCounts for PgStore<'_> {
    async fn lookup(&mut self, meme_id: MemeId) -> Result<Lookup, StoreError> {
        let row = repos::get_upvote_count_for_update(&mut *self.conn, meme_id)
            .await
            .map_err(backend)?;
        match row {
            Some(row) => Ok(Lookup::Found(MemeUpvoteCount::try_from(row)?)),
            None => Ok(Lookup::NotFound),
        }
    }

    async fn save(&mut self, row: &MemeUpvoteCount) -> Result<(), StoreError> {
        let row = NewUpvoteCount::try_from(row)?;
        repos::upsert_upvote_count(&mut *self.conn, &row)
            .await
            .map_err(backend)
    }
}
