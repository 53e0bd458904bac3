//! The event fold: one audit record per event, plus the per-meme aggregates.
//!
//! Handler contract per event kind:
//!
//! | Event                | Log | Aggregate effect                              |
//! |----------------------|-----|-----------------------------------------------|
//! | BattleStarted        | yes | none                                          |
//! | MemeSubmitted        | yes | none (does not create a row)                  |
//! | MemeUpvoted          | yes | load-or-create row, `upvote_amount += 1`      |
//! | BattleCompleted      | yes | if the winning meme has a row, set winner,    |
//! |                      |     | category and completion reference; else no-op |
//! | MemeInfoRequested    | yes | none                                          |
//! | OwnershipTransferred | yes | none                                          |
//!
//! A record whose id is already in the log is a replay: nothing is written
//! and no aggregate is touched.

use tracing::{debug, warn};

use crate::model::{
    ChainEvent, EventId, EventKind, EventPayload, EventRecord, MemeId, MemeUpvoteCount, Position,
};
use crate::ordering::{OrderingGuard, OutOfOrder};
use crate::store::{EventLog, Lookup, StoreError, UpvoteCounts};

/// Failure to ingest one event. Surfaced to the event source, which decides
/// whether to halt or retry.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    OutOfOrder(#[from] OutOfOrder),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// New event: logged and aggregates updated.
    Recorded(EventKind),
    /// Identifier already present in the log; nothing changed.
    Duplicate,
}

/// Folds an ordered event stream into an event log and upvote aggregates.
#[derive(Debug)]
pub struct Aggregator<S> {
    store: S,
    guard: OrderingGuard,
}

impl<S> Aggregator<S>
where
    S: EventLog + UpvoteCounts,
{
    pub const fn new(store: S) -> Self {
        Self {
            store,
            guard: OrderingGuard::new(),
        }
    }

    /// Continue a fold whose last applied event sits at `last`.
    pub const fn resume_from(store: S, last: Option<Position>) -> Self {
        Self {
            store,
            guard: OrderingGuard::resume_from(last),
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn last_position(&self) -> Option<Position> {
        self.guard.last()
    }

    /// Apply one event.
    ///
    /// Events must arrive in non-decreasing (block, log index) order. An
    /// earlier position is rejected before anything is written, unless its id
    /// is already logged, in which case it is a replay and reported as
    /// [`Applied::Duplicate`].
    ///
    /// The aggregate update is computed before the record is appended, so a
    /// failing event leaves the store untouched.
    pub async fn apply(&mut self, event: ChainEvent) -> Result<Applied, IngestError> {
        let position = event.position();
        let record: EventRecord = event.into();

        if let Err(out_of_order) = self.guard.check(position) {
            if self.store.contains(&record.id).await? {
                debug!(id = %record.id, %position, "Replayed event ignored");
                return Ok(Applied::Duplicate);
            }
            return Err(out_of_order.into());
        }

        if self.store.contains(&record.id).await? {
            debug!(id = %record.id, %position, "Duplicate event ignored");
            self.guard.advance(position);
            return Ok(Applied::Duplicate);
        }

        let update = match &record.payload {
            EventPayload::MemeUpvoted { meme_id, .. } => Some(self.on_meme_upvoted(*meme_id).await?),
            EventPayload::BattleCompleted {
                category,
                winner,
                winning_meme_id,
            } => {
                let resolution = Resolution {
                    category,
                    winner: *winner,
                    completed_by: record.id,
                };
                self.on_battle_completed(*winning_meme_id, resolution).await?
            }
            // Log only.
            EventPayload::BattleStarted { .. }
            | EventPayload::MemeSubmitted { .. }
            | EventPayload::MemeInfoRequested { .. }
            | EventPayload::OwnershipTransferred { .. } => None,
        };

        if !self.store.append(&record).await? {
            debug!(id = %record.id, %position, "Duplicate event ignored");
            self.guard.advance(position);
            return Ok(Applied::Duplicate);
        }
        if let Some(row) = update {
            self.store.save(&row).await?;
        }

        self.guard.advance(position);
        Ok(Applied::Recorded(record.kind()))
    }

    /// Creates the row on first reference.
    async fn on_meme_upvoted(&mut self, meme_id: MemeId) -> Result<MemeUpvoteCount, IngestError> {
        let mut row = match self.store.lookup(meme_id).await? {
            Lookup::Found(row) => row,
            Lookup::NotFound => MemeUpvoteCount::new(meme_id),
        };
        row.upvote_amount = row
            .upvote_amount
            .checked_add(1)
            .ok_or_else(|| StoreError::Corrupt(format!("upvote overflow for meme {meme_id}")))?;
        Ok(row)
    }

    /// Never creates a row: a winner without upvotes keeps no attribution.
    async fn on_battle_completed(
        &mut self,
        winning_meme_id: MemeId,
        resolution: Resolution<'_>,
    ) -> Result<Option<MemeUpvoteCount>, IngestError> {
        let mut row = match self.store.lookup(winning_meme_id).await? {
            Lookup::Found(row) => row,
            Lookup::NotFound => {
                debug!(
                    meme_id = %winning_meme_id,
                    category = resolution.category,
                    "Winning meme has no upvote row, attribution dropped"
                );
                return Ok(None);
            }
        };

        if let Some(previous) = row.battle_completed {
            warn!(
                meme_id = %winning_meme_id,
                previous = %previous,
                "Meme declared winner more than once, overwriting"
            );
        }
        row.winner = Some(resolution.winner);
        row.category = resolution.category.to_string();
        row.battle_completed = Some(resolution.completed_by);
        Ok(Some(row))
    }
}

struct Resolution<'a> {
    category: &'a str,
    winner: alloy_primitives::Address,
    completed_by: EventId,
}
