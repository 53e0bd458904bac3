use std::str::FromStr;

use alloy_primitives::{Address, B256, U256};
use chrono::NaiveDateTime;
use memefist_aggregator::{
    EventId, EventKind, EventPayload, EventRecord, MemeId, MemeUpvoteCount, StoreError,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// `SELECT` list for [`EventRow`]; renders the `BYTEA` id as `0x` hex.
pub const EVENT_COLUMNS: &str = "'0x' || encode(id, 'hex') AS id, kind, category, start_time, \
     end_time, meme_id, creator, voter, winner, previous_owner, new_owner, block_number, \
     log_index, block_timestamp, transaction_hash, indexed_at";

/// `SELECT` list for [`MemeUpvoteCountRow`].
pub const UPVOTE_COLUMNS: &str = "meme_id, upvote_amount, COALESCE(winner, '') AS winner, \
     category, '0x' || encode(battle_completed, 'hex') AS battle_completed";

// ─── Event ──────────────────────────────────────────────────────────────────

/// An immutable record of one MemeBattle event, flattened into nullable
/// payload columns.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventRow {
    pub id: String,
    pub kind: String,
    pub category: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub meme_id: Option<String>,
    pub creator: Option<String>,
    pub voter: Option<String>,
    pub winner: Option<String>,
    pub previous_owner: Option<String>,
    pub new_owner: Option<String>,
    pub block_number: i64,
    pub log_index: i32,
    pub block_timestamp: i64,
    pub transaction_hash: String,
    pub indexed_at: NaiveDateTime,
}

/// Insert-ready event (no `indexed_at`).
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub id: Vec<u8>,
    pub kind: &'static str,
    pub category: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub meme_id: Option<String>,
    pub creator: Option<String>,
    pub voter: Option<String>,
    pub winner: Option<String>,
    pub previous_owner: Option<String>,
    pub new_owner: Option<String>,
    pub block_number: i64,
    pub log_index: i32,
    pub block_timestamp: i64,
    pub transaction_hash: String,
}

impl TryFrom<&EventRecord> for NewEvent {
    type Error = StoreError;

    fn try_from(record: &EventRecord) -> Result<Self, Self::Error> {
        let mut row = NewEvent {
            id: record.id.as_bytes().to_vec(),
            kind: record.kind().as_str(),
            meme_id: record.payload.meme_id().map(|id| id.to_string()),
            category: record.payload.category().map(str::to_string),
            block_number: to_i64(record.block_number, "block_number")?,
            log_index: i32::try_from(record.log_index).map_err(corrupt)?,
            block_timestamp: to_i64(record.block_timestamp, "block_timestamp")?,
            transaction_hash: format!("{:#x}", record.transaction_hash),
            ..Default::default()
        };

        match &record.payload {
            EventPayload::BattleStarted {
                start_time,
                end_time,
                ..
            } => {
                row.start_time = Some(start_time.to_string());
                row.end_time = Some(end_time.to_string());
            }
            EventPayload::BattleCompleted { winner, .. } => {
                row.winner = Some(format!("{winner:#x}"));
            }
            EventPayload::MemeSubmitted { creator, .. } => {
                row.creator = Some(format!("{creator:#x}"));
            }
            EventPayload::MemeUpvoted { voter, .. } => {
                row.voter = Some(format!("{voter:#x}"));
            }
            EventPayload::MemeInfoRequested { .. } => {}
            EventPayload::OwnershipTransferred {
                previous_owner,
                new_owner,
            } => {
                row.previous_owner = Some(format!("{previous_owner:#x}"));
                row.new_owner = Some(format!("{new_owner:#x}"));
            }
        }
        Ok(row)
    }
}

impl TryFrom<&EventRow> for EventRecord {
    type Error = StoreError;

    fn try_from(row: &EventRow) -> Result<Self, Self::Error> {
        let kind = EventKind::from_str(&row.kind).map_err(corrupt)?;
        let payload = match kind {
            EventKind::BattleStarted => EventPayload::BattleStarted {
                category: required(&row.category, "category")?.clone(),
                start_time: parse_u256(required(&row.start_time, "start_time")?)?,
                end_time: parse_u256(required(&row.end_time, "end_time")?)?,
            },
            EventKind::BattleCompleted => EventPayload::BattleCompleted {
                category: required(&row.category, "category")?.clone(),
                winner: parse_address(required(&row.winner, "winner")?)?,
                winning_meme_id: parse_meme_id(required(&row.meme_id, "meme_id")?)?,
            },
            EventKind::MemeSubmitted => EventPayload::MemeSubmitted {
                meme_id: parse_meme_id(required(&row.meme_id, "meme_id")?)?,
                creator: parse_address(required(&row.creator, "creator")?)?,
                category: required(&row.category, "category")?.clone(),
            },
            EventKind::MemeUpvoted => EventPayload::MemeUpvoted {
                meme_id: parse_meme_id(required(&row.meme_id, "meme_id")?)?,
                voter: parse_address(required(&row.voter, "voter")?)?,
            },
            EventKind::MemeInfoRequested => EventPayload::MemeInfoRequested {
                meme_id: parse_meme_id(required(&row.meme_id, "meme_id")?)?,
            },
            EventKind::OwnershipTransferred => EventPayload::OwnershipTransferred {
                previous_owner: parse_address(required(&row.previous_owner, "previous_owner")?)?,
                new_owner: parse_address(required(&row.new_owner, "new_owner")?)?,
            },
        };

        Ok(EventRecord {
            id: EventId::from_str(&row.id).map_err(corrupt)?,
            payload,
            block_number: u64::try_from(row.block_number).map_err(corrupt)?,
            block_timestamp: u64::try_from(row.block_timestamp).map_err(corrupt)?,
            transaction_hash: B256::from_str(&row.transaction_hash).map_err(corrupt)?,
            log_index: u32::try_from(row.log_index).map_err(corrupt)?,
        })
    }
}

// ─── MemeUpvoteCount ────────────────────────────────────────────────────────

/// Aggregate row as served to readers. `winner` is empty until the meme wins.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemeUpvoteCountRow {
    pub meme_id: String,
    pub upvote_amount: i64,
    pub winner: String,
    pub category: String,
    pub battle_completed: Option<String>,
}

impl TryFrom<MemeUpvoteCountRow> for MemeUpvoteCount {
    type Error = StoreError;

    fn try_from(row: MemeUpvoteCountRow) -> Result<Self, Self::Error> {
        Ok(MemeUpvoteCount {
            meme_id: parse_meme_id(&row.meme_id)?,
            upvote_amount: u64::try_from(row.upvote_amount).map_err(corrupt)?,
            winner: match row.winner.as_str() {
                "" => None,
                raw => Some(parse_address(raw)?),
            },
            category: row.category,
            battle_completed: row
                .battle_completed
                .as_deref()
                .map(EventId::from_str)
                .transpose()
                .map_err(corrupt)?,
        })
    }
}

/// Write-side form of [`MemeUpvoteCount`]. `winner` stays NULL until the meme
/// wins.
#[derive(Debug, Clone)]
pub struct NewUpvoteCount {
    pub meme_id: String,
    pub upvote_amount: i64,
    pub winner: Option<String>,
    pub category: String,
    pub battle_completed: Option<Vec<u8>>,
}

impl TryFrom<&MemeUpvoteCount> for NewUpvoteCount {
    type Error = StoreError;

    fn try_from(row: &MemeUpvoteCount) -> Result<Self, Self::Error> {
        Ok(NewUpvoteCount {
            meme_id: row.meme_id.to_string(),
            upvote_amount: to_i64(row.upvote_amount, "upvote_amount")?,
            winner: row.winner.map(|w| format!("{w:#x}")),
            category: row.category.clone(),
            battle_completed: row.battle_completed.map(|id| id.as_bytes().to_vec()),
        })
    }
}

// ─── Leaderboard ────────────────────────────────────────────────────────────

/// Battles won per winner address.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WinnerTallyRow {
    pub winner: String,
    pub wins: i64,
    pub upvotes: i64,
}

/// Upvotes received on each creator's submitted memes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreatorTallyRow {
    pub creator: String,
    pub memes: i64,
    pub upvotes: i64,
}

// ─── IndexedBlock ───────────────────────────────────────────────────────────

/// A block that has been processed by the indexer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IndexedBlock {
    pub block_number: i64,
    pub block_hash: String,
    pub parent_hash: String,
    pub timestamp: i64,
}

// ─── Conversions ────────────────────────────────────────────────────────────

/// Postgres has no unsigned integers. Values above `i64::MAX` are refused
/// rather than clamped.
pub fn to_i64(value: u64, column: &str) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Corrupt(format!("{column} {value} does not fit in BIGINT")))
}

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(e.to_string())
}

fn required<'a>(value: &'a Option<String>, column: &str) -> Result<&'a String, StoreError> {
    value
        .as_ref()
        .ok_or_else(|| StoreError::Corrupt(format!("{column} is NULL")))
}

fn parse_meme_id(raw: &str) -> Result<MemeId, StoreError> {
    MemeId::from_str(raw).map_err(corrupt)
}

fn parse_u256(raw: &str) -> Result<U256, StoreError> {
    U256::from_str_radix(raw, 10).map_err(corrupt)
}

fn parse_address(raw: &str) -> Result<Address, StoreError> {
    Address::from_str(raw).map_err(corrupt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_from(new: NewEvent, id: &EventId) -> EventRow {
        EventRow {
            id: id.to_string(),
            kind: new.kind.to_string(),
            category: new.category,
            start_time: new.start_time,
            end_time: new.end_time,
            meme_id: new.meme_id,
            creator: new.creator,
            voter: new.voter,
            winner: new.winner,
            previous_owner: new.previous_owner,
            new_owner: new.new_owner,
            block_number: new.block_number,
            log_index: new.log_index,
            block_timestamp: new.block_timestamp,
            transaction_hash: new.transaction_hash,
            indexed_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn battle_completed_flattens_winner_and_meme() {
        let tx = B256::repeat_byte(0x42);
        let record = EventRecord {
            id: EventId::new(tx, 1),
            payload: EventPayload::BattleCompleted {
                category: "Funny".into(),
                winner: Address::repeat_byte(0xaa),
                winning_meme_id: MemeId::from(234),
            },
            block_number: 9,
            block_timestamp: 1_700_000_000,
            transaction_hash: tx,
            log_index: 1,
        };

        let new = NewEvent::try_from(&record).unwrap();
        assert_eq!(new.kind, "battle_completed");
        assert_eq!(new.meme_id.as_deref(), Some("234"));
        assert_eq!(new.category.as_deref(), Some("Funny"));
        assert_eq!(
            new.winner.as_deref(),
            Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
        assert_eq!(new.voter, None);

        let restored = EventRecord::try_from(&row_from(new, &record.id)).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn empty_winner_means_unresolved() {
        let row = MemeUpvoteCountRow {
            meme_id: "42".into(),
            upvote_amount: 2,
            winner: String::new(),
            category: String::new(),
            battle_completed: None,
        };

        let count = MemeUpvoteCount::try_from(row).unwrap();
        assert_eq!(count.meme_id, MemeId::from(42));
        assert_eq!(count.upvote_amount, 2);
        assert_eq!(count.winner, None);
    }

    #[test]
    fn missing_payload_column_is_corrupt() {
        let tx = B256::repeat_byte(0x01);
        let record = EventRecord {
            id: EventId::new(tx, 0),
            payload: EventPayload::MemeInfoRequested {
                meme_id: MemeId::from(1),
            },
            block_number: 1,
            block_timestamp: 1,
            transaction_hash: tx,
            log_index: 0,
        };
        let mut row = row_from(NewEvent::try_from(&record).unwrap(), &record.id);
        row.meme_id = None;

        assert!(matches!(
            EventRecord::try_from(&row),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn oversized_numbers_are_refused() {
        assert_eq!(to_i64(7, "block_number").unwrap(), 7);
        assert!(matches!(
            to_i64(u64::MAX, "block_number"),
            Err(StoreError::Corrupt(_))
        ));

        let mut count = MemeUpvoteCount::new(MemeId::from(1));
        count.upvote_amount = u64::MAX;
        assert!(NewUpvoteCount::try_from(&count).is_err());

        count.upvote_amount = 3;
        count.winner = Some(Address::repeat_byte(0xaa));
        let new = NewUpvoteCount::try_from(&count).unwrap();
        assert_eq!(new.upvote_amount, 3);
        assert_eq!(
            new.winner.as_deref(),
            Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
    }

    #[test]
    fn event_past_bigint_range_is_refused() {
        let tx = B256::repeat_byte(0x02);
        let record = EventRecord {
            id: EventId::new(tx, 0),
            payload: EventPayload::MemeInfoRequested {
                meme_id: MemeId::from(1),
            },
            block_number: u64::MAX,
            block_timestamp: 1,
            transaction_hash: tx,
            log_index: 0,
        };

        assert!(matches!(
            NewEvent::try_from(&record),
            Err(StoreError::Corrupt(_))
        ));
    }
}
