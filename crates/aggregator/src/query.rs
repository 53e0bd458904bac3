//! Read contract consumed by leaderboard and battle views.
//!
//! Filters and derived summaries are backend-agnostic: [`MemoryStore`]
//! evaluates them directly, the Postgres repositories translate them to SQL.
//!
//! [`MemoryStore`]: crate::memory::MemoryStore

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use alloy_primitives::Address;
use serde::Serialize;

use crate::model::{EventId, EventKind, EventPayload, EventRecord, MemeId, MemeUpvoteCount};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 500;

/// Clamp a caller-supplied page size.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

// ─── Events ─────────────────────────────────────────────────────────────────

/// Event log query, newest first.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub kind: Option<EventKind>,
    /// Matches the meme an event refers to (the winner for `BattleCompleted`).
    pub meme_id: Option<MemeId>,
    pub limit: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            kind: None,
            meme_id: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl EventFilter {
    pub fn matches(&self, record: &EventRecord) -> bool {
        self.kind.is_none_or(|kind| record.kind() == kind)
            && self
                .meme_id
                .is_none_or(|id| record.payload.meme_id() == Some(id))
    }
}

// ─── Upvote counts ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpvoteOrder {
    #[default]
    MostUpvoted,
    LeastUpvoted,
    MemeId,
}

impl UpvoteOrder {
    pub const fn as_str(self) -> &'static str {
        match self {
            UpvoteOrder::MostUpvoted => "most_upvoted",
            UpvoteOrder::LeastUpvoted => "least_upvoted",
            UpvoteOrder::MemeId => "meme_id",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown order: {0} (expected most_upvoted, least_upvoted or meme_id)")]
pub struct UnknownOrder(pub String);

impl FromStr for UpvoteOrder {
    type Err = UnknownOrder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "most_upvoted" => Ok(UpvoteOrder::MostUpvoted),
            "least_upvoted" => Ok(UpvoteOrder::LeastUpvoted),
            "meme_id" => Ok(UpvoteOrder::MemeId),
            other => Err(UnknownOrder(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpvoteFilter {
    pub category: Option<String>,
    pub winner: Option<Address>,
    pub order: UpvoteOrder,
    pub limit: usize,
}

impl Default for UpvoteFilter {
    fn default() -> Self {
        Self {
            category: None,
            winner: None,
            order: UpvoteOrder::default(),
            limit: DEFAULT_LIMIT,
        }
    }
}

impl UpvoteFilter {
    pub fn matches(&self, row: &MemeUpvoteCount) -> bool {
        self.category
            .as_deref()
            .is_none_or(|category| row.category == category)
            && self.winner.is_none_or(|winner| row.winner == Some(winner))
    }

    /// Ties on upvotes fall back to ascending meme id so pages are stable.
    pub fn compare(&self, a: &MemeUpvoteCount, b: &MemeUpvoteCount) -> Ordering {
        match self.order {
            UpvoteOrder::MostUpvoted => b
                .upvote_amount
                .cmp(&a.upvote_amount)
                .then(a.meme_id.cmp(&b.meme_id)),
            UpvoteOrder::LeastUpvoted => a
                .upvote_amount
                .cmp(&b.upvote_amount)
                .then(a.meme_id.cmp(&b.meme_id)),
            UpvoteOrder::MemeId => a.meme_id.cmp(&b.meme_id),
        }
    }
}

// ─── Leaderboard ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeaderboardStats {
    /// Number of `MemeSubmitted` events.
    pub total_memes: u64,
    /// Sum of all upvote counters.
    pub total_upvotes: u64,
    /// Number of `BattleCompleted` events.
    pub completed_battles: u64,
}

/// Battles won per winner address, counted from resolved upvote rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WinnerTally {
    pub winner: Address,
    pub wins: u64,
    /// Upvotes collected by this winner's winning memes.
    pub upvotes: u64,
}

/// Most wins first, then most upvotes.
pub fn tally_winners<'a>(
    rows: impl IntoIterator<Item = &'a MemeUpvoteCount>,
    limit: usize,
) -> Vec<WinnerTally> {
    let mut by_winner: HashMap<Address, WinnerTally> = HashMap::new();
    for row in rows {
        let Some(winner) = row.winner else { continue };
        let tally = by_winner.entry(winner).or_insert(WinnerTally {
            winner,
            wins: 0,
            upvotes: 0,
        });
        tally.wins += 1;
        tally.upvotes = tally.upvotes.saturating_add(row.upvote_amount);
    }

    let mut tallies: Vec<WinnerTally> = by_winner.into_values().collect();
    tallies.sort_by(|a, b| {
        b.wins
            .cmp(&a.wins)
            .then(b.upvotes.cmp(&a.upvotes))
            .then(a.winner.cmp(&b.winner))
    });
    tallies.truncate(limit);
    tallies
}

/// Upvotes received on the memes a creator submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatorTally {
    pub creator: Address,
    /// Memes submitted by this creator.
    pub memes: u64,
    pub upvotes: u64,
}

/// Join `MemeSubmitted` creators with the upvote rows of their memes. Most
/// upvotes first, then most memes.
///
/// The first submission of a meme id owns it. Upvoted memes that were never
/// submitted are not attributed to anyone.
pub fn tally_creators<'a>(
    records: impl IntoIterator<Item = &'a EventRecord>,
    rows: impl IntoIterator<Item = &'a MemeUpvoteCount>,
    limit: usize,
) -> Vec<CreatorTally> {
    let mut owner: HashMap<MemeId, Address> = HashMap::new();
    for record in records {
        if let EventPayload::MemeSubmitted {
            meme_id, creator, ..
        } = &record.payload
        {
            owner.entry(*meme_id).or_insert(*creator);
        }
    }

    let mut by_creator: HashMap<Address, CreatorTally> = HashMap::new();
    for creator in owner.values() {
        by_creator
            .entry(*creator)
            .or_insert(CreatorTally {
                creator: *creator,
                memes: 0,
                upvotes: 0,
            })
            .memes += 1;
    }
    for row in rows {
        let Some(creator) = owner.get(&row.meme_id) else { continue };
        if let Some(tally) = by_creator.get_mut(creator) {
            tally.upvotes = tally.upvotes.saturating_add(row.upvote_amount);
        }
    }

    let mut tallies: Vec<CreatorTally> = by_creator.into_values().collect();
    tallies.sort_by(|a, b| {
        b.upvotes
            .cmp(&a.upvotes)
            .then(b.memes.cmp(&a.memes))
            .then(a.creator.cmp(&b.creator))
    });
    tallies.truncate(limit);
    tallies
}

// ─── Battles ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    Upcoming,
    Ongoing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BattleSummary {
    pub category: String,
    pub start_time: u64,
    pub end_time: u64,
    pub status: BattleStatus,
    pub started_by: EventId,
    pub completed_by: Option<EventId>,
    pub winner: Option<Address>,
    pub winning_meme_id: Option<MemeId>,
}

/// Pair each `BattleStarted` with the first later `BattleCompleted` of the
/// same category. Records must be in ascending chain order; other kinds are
/// skipped. Returns newest battle first.
///
/// A battle is closed once completed or once `now` reaches its end time,
/// upcoming before its start time, ongoing otherwise.
pub fn summarize_battles<'a>(
    records: impl IntoIterator<Item = &'a EventRecord>,
    now: u64,
) -> Vec<BattleSummary> {
    let mut battles: Vec<BattleSummary> = Vec::new();
    let mut open: HashMap<String, usize> = HashMap::new();

    for record in records {
        match &record.payload {
            EventPayload::BattleStarted {
                category,
                start_time,
                end_time,
            } => {
                let start_time = u64::try_from(*start_time).unwrap_or(u64::MAX);
                let end_time = u64::try_from(*end_time).unwrap_or(u64::MAX);
                let status = if now < start_time {
                    BattleStatus::Upcoming
                } else if now >= end_time {
                    BattleStatus::Closed
                } else {
                    BattleStatus::Ongoing
                };
                open.insert(category.clone(), battles.len());
                battles.push(BattleSummary {
                    category: category.clone(),
                    start_time,
                    end_time,
                    status,
                    started_by: record.id,
                    completed_by: None,
                    winner: None,
                    winning_meme_id: None,
                });
            }
            EventPayload::BattleCompleted {
                category,
                winner,
                winning_meme_id,
            } => {
                let Some(battle) = open.remove(category).and_then(|idx| battles.get_mut(idx))
                else {
                    continue;
                };
                battle.status = BattleStatus::Closed;
                battle.completed_by = Some(record.id);
                battle.winner = Some(*winner);
                battle.winning_meme_id = Some(*winning_meme_id);
            }
            _ => {}
        }
    }

    battles.reverse();
    battles
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{B256, U256};

    use super::*;

    fn record(block: u64, payload: EventPayload) -> EventRecord {
        let transaction_hash = B256::with_last_byte(block as u8);
        EventRecord {
            id: EventId::new(transaction_hash, 0),
            payload,
            block_number: block,
            block_timestamp: 0,
            transaction_hash,
            log_index: 0,
        }
    }

    fn started(block: u64, category: &str, start: u64, end: u64) -> EventRecord {
        record(
            block,
            EventPayload::BattleStarted {
                category: category.into(),
                start_time: U256::from(start),
                end_time: U256::from(end),
            },
        )
    }

    fn completed(block: u64, category: &str, meme: u64) -> EventRecord {
        record(
            block,
            EventPayload::BattleCompleted {
                category: category.into(),
                winner: Address::repeat_byte(0xaa),
                winning_meme_id: meme.into(),
            },
        )
    }

    fn row(meme: u64, upvotes: u64, winner: Option<Address>, category: &str) -> MemeUpvoteCount {
        MemeUpvoteCount {
            meme_id: meme.into(),
            upvote_amount: upvotes,
            winner,
            category: category.into(),
            battle_completed: None,
        }
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);
    }

    #[test]
    fn battle_status_follows_clock_until_completed() {
        let records = [
            started(1, "Funny", 100, 200),
            started(2, "Cats", 300, 400),
            started(3, "Dogs", 50, 150),
        ];
        let battles = summarize_battles(&records, 160);

        assert_eq!(battles.len(), 3);
        assert_eq!(battles[0].category, "Dogs");
        assert_eq!(battles[0].status, BattleStatus::Closed);
        assert_eq!(battles[1].status, BattleStatus::Upcoming);
        assert_eq!(battles[2].status, BattleStatus::Ongoing);
    }

    #[test]
    fn completion_closes_the_latest_open_battle_of_its_category() {
        let records = [
            started(1, "Funny", 100, 200),
            completed(2, "Funny", 42),
            started(3, "Funny", 300, 400),
            completed(4, "Cats", 7),
        ];
        let battles = summarize_battles(&records, 150);

        assert_eq!(battles.len(), 2);
        let (second, first) = (&battles[0], &battles[1]);
        assert_eq!(first.status, BattleStatus::Closed);
        assert_eq!(first.winning_meme_id, Some(42.into()));
        assert_eq!(first.completed_by, Some(records[1].id));
        assert_eq!(second.status, BattleStatus::Upcoming);
        assert_eq!(second.winner, None);
    }

    #[test]
    fn winners_are_ranked_by_wins_then_upvotes() {
        let alice = Address::repeat_byte(0x01);
        let bob = Address::repeat_byte(0x02);
        let rows = [
            row(1, 5, Some(alice), "Funny"),
            row(2, 9, Some(bob), "Cats"),
            row(3, 1, Some(bob), "Dogs"),
            row(4, 50, None, ""),
        ];
        let tallies = tally_winners(&rows, 10);

        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[0].winner, bob);
        assert_eq!(tallies[0].wins, 2);
        assert_eq!(tallies[0].upvotes, 10);
        assert_eq!(tallies[1].winner, alice);
    }

    fn submitted(block: u64, meme: u64, creator: Address) -> EventRecord {
        record(
            block,
            EventPayload::MemeSubmitted {
                meme_id: meme.into(),
                creator,
                category: "Funny".into(),
            },
        )
    }

    #[test]
    fn creators_are_ranked_by_upvotes_on_their_memes() {
        let alice = Address::repeat_byte(0x01);
        let bob = Address::repeat_byte(0x02);
        let records = [
            submitted(1, 1, alice),
            submitted(2, 2, bob),
            submitted(3, 3, bob),
            // Resubmitting an id does not change its owner.
            submitted(4, 1, bob),
        ];
        let rows = [
            row(1, 6, None, ""),
            row(2, 2, None, ""),
            row(3, 3, None, ""),
            row(99, 40, None, ""),
        ];
        let tallies = tally_creators(&records, &rows, 10);

        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[0].creator, alice);
        assert_eq!(tallies[0].upvotes, 6);
        assert_eq!(tallies[0].memes, 1);
        assert_eq!(tallies[1].creator, bob);
        assert_eq!(tallies[1].upvotes, 5);
        assert_eq!(tallies[1].memes, 2);
        assert_eq!(tally_creators(&records, &rows, 1).len(), 1);
    }

    #[test]
    fn creator_without_upvotes_still_listed() {
        let carol = Address::repeat_byte(0x03);
        let no_rows: &[MemeUpvoteCount] = &[];
        let tallies = tally_creators(&[submitted(1, 5, carol)], no_rows, 10);

        assert_eq!(
            tallies,
            vec![CreatorTally {
                creator: carol,
                memes: 1,
                upvotes: 0,
            }]
        );
    }

    #[test]
    fn upvote_filter_matches_category_and_winner() {
        let alice = Address::repeat_byte(0x01);
        let filter = UpvoteFilter {
            category: Some("Funny".into()),
            winner: Some(alice),
            ..UpvoteFilter::default()
        };

        assert!(filter.matches(&row(1, 1, Some(alice), "Funny")));
        assert!(!filter.matches(&row(1, 1, Some(alice), "Cats")));
        assert!(!filter.matches(&row(1, 1, None, "Funny")));
    }

    #[test]
    fn upvote_order_parses() {
        assert_eq!("least_upvoted".parse::<UpvoteOrder>().unwrap(), UpvoteOrder::LeastUpvoted);
        assert!("random".parse::<UpvoteOrder>().is_err());
        for order in [UpvoteOrder::MostUpvoted, UpvoteOrder::LeastUpvoted, UpvoteOrder::MemeId] {
            assert_eq!(order.as_str().parse::<UpvoteOrder>().unwrap(), order);
        }
    }
}
