//! In-memory backend. Each instance is an isolated store, which is what the
//! aggregator tests build on.

use std::collections::{BTreeMap, HashMap};

use crate::model::{EventId, EventKind, EventRecord, MemeId, MemeUpvoteCount};
use crate::query::{
    BattleSummary, CreatorTally, EventFilter, LeaderboardStats, UpvoteFilter, WinnerTally,
    summarize_battles, tally_creators, tally_winners,
};
use crate::store::{EventLog, Lookup, StoreError, UpvoteCounts};

#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Append order, which the aggregator keeps equal to chain order.
    events: Vec<EventRecord>,
    by_id: HashMap<EventId, usize>,
    counts: BTreeMap<MemeId, MemeUpvoteCount>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn upvote_row_count(&self) -> usize {
        self.counts.len()
    }

    pub fn event(&self, id: &EventId) -> Option<&EventRecord> {
        self.by_id.get(id).and_then(|&idx| self.events.get(idx))
    }

    /// Newest first.
    pub fn events(&self, filter: &EventFilter) -> Vec<&EventRecord> {
        self.events
            .iter()
            .rev()
            .filter(|record| filter.matches(record))
            .take(filter.limit)
            .collect()
    }

    pub fn upvote_count(&self, meme_id: MemeId) -> Option<&MemeUpvoteCount> {
        self.counts.get(&meme_id)
    }

    pub fn upvote_counts(&self, filter: &UpvoteFilter) -> Vec<&MemeUpvoteCount> {
        let mut rows: Vec<&MemeUpvoteCount> =
            self.counts.values().filter(|row| filter.matches(row)).collect();
        rows.sort_by(|a, b| filter.compare(a, b));
        rows.truncate(filter.limit);
        rows
    }

    pub fn leaderboard_stats(&self) -> LeaderboardStats {
        let count_kind = |kind: EventKind| {
            self.events.iter().filter(|record| record.kind() == kind).count() as u64
        };
        LeaderboardStats {
            total_memes: count_kind(EventKind::MemeSubmitted),
            total_upvotes: self
                .counts
                .values()
                .fold(0u64, |sum, row| sum.saturating_add(row.upvote_amount)),
            completed_battles: count_kind(EventKind::BattleCompleted),
        }
    }

    pub fn winners(&self, limit: usize) -> Vec<WinnerTally> {
        tally_winners(self.counts.values(), limit)
    }

    pub fn creators(&self, limit: usize) -> Vec<CreatorTally> {
        tally_creators(&self.events, self.counts.values(), limit)
    }

    pub fn battles(&self, now: u64) -> Vec<BattleSummary> {
        summarize_battles(&self.events, now)
    }
}

impl EventLog for MemoryStore {
    async fn contains(&mut self, id: &EventId) -> Result<bool, StoreError> {
        Ok(self.by_id.contains_key(id))
    }

    async fn append(&mut self, record: &EventRecord) -> Result<bool, StoreError> {
        if self.by_id.contains_key(&record.id) {
            return Ok(false);
        }
        self.by_id.insert(record.id, self.events.len());
        self.events.push(record.clone());
        Ok(true)
    }
}

impl UpvoteCounts for MemoryStore {
    async fn lookup(&mut self, meme_id: MemeId) -> Result<Lookup, StoreError> {
        Ok(match self.counts.get(&meme_id) {
            Some(row) => Lookup::Found(row.clone()),
            None => Lookup::NotFound,
        })
    }

    async fn save(&mut self, row: &MemeUpvoteCount) -> Result<(), StoreError> {
        self.counts.insert(row.meme_id, row.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256};

    use super::*;
    use crate::model::EventPayload;
    use crate::query::UpvoteOrder;

    fn upvote_record(block: u64, meme: u64) -> EventRecord {
        let transaction_hash = B256::with_last_byte(block as u8);
        EventRecord {
            id: EventId::new(transaction_hash, 0),
            payload: EventPayload::MemeUpvoted {
                meme_id: meme.into(),
                voter: Address::ZERO,
            },
            block_number: block,
            block_timestamp: 0,
            transaction_hash,
            log_index: 0,
        }
    }

    #[tokio::test]
    async fn append_rejects_known_ids() {
        let mut store = MemoryStore::new();
        let record = upvote_record(1, 1);

        assert!(!store.contains(&record.id).await.unwrap());
        assert!(store.append(&record).await.unwrap());
        assert!(store.contains(&record.id).await.unwrap());
        assert!(!store.append(&record).await.unwrap());
        assert_eq!(store.event_count(), 1);
        assert_eq!(store.event(&record.id), Some(&record));
    }

    #[tokio::test]
    async fn lookup_distinguishes_missing_rows() {
        let mut store = MemoryStore::new();
        assert_eq!(store.lookup(5.into()).await.unwrap(), Lookup::NotFound);

        let mut row = MemeUpvoteCount::new(5.into());
        row.upvote_amount = 3;
        store.save(&row).await.unwrap();
        assert_eq!(store.lookup(5.into()).await.unwrap(), Lookup::Found(row));
    }

    #[tokio::test]
    async fn events_are_filtered_and_newest_first() {
        let mut store = MemoryStore::new();
        for (block, meme) in [(1, 1), (2, 2), (3, 1)] {
            store.append(&upvote_record(block, meme)).await.unwrap();
        }

        let filter = EventFilter {
            meme_id: Some(1.into()),
            ..EventFilter::default()
        };
        let blocks: Vec<u64> = store.events(&filter).iter().map(|r| r.block_number).collect();
        assert_eq!(blocks, vec![3, 1]);

        let none = EventFilter {
            kind: Some(EventKind::BattleStarted),
            ..EventFilter::default()
        };
        assert!(store.events(&none).is_empty());
    }

    #[tokio::test]
    async fn upvote_counts_sort_and_limit() {
        let mut store = MemoryStore::new();
        for (meme, amount) in [(1u64, 4u64), (2, 9), (3, 4)] {
            let mut row = MemeUpvoteCount::new(meme.into());
            row.upvote_amount = amount;
            store.save(&row).await.unwrap();
        }

        let most = UpvoteFilter {
            limit: 2,
            ..UpvoteFilter::default()
        };
        let ids: Vec<MemeId> = store.upvote_counts(&most).iter().map(|r| r.meme_id).collect();
        assert_eq!(ids, vec![MemeId::from(2), MemeId::from(1)]);

        let least = UpvoteFilter {
            order: UpvoteOrder::LeastUpvoted,
            ..UpvoteFilter::default()
        };
        let ids: Vec<MemeId> = store.upvote_counts(&least).iter().map(|r| r.meme_id).collect();
        assert_eq!(ids, vec![MemeId::from(1), MemeId::from(3), MemeId::from(2)]);
    }
}
