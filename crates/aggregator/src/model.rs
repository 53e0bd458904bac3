use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, B256, U256, hex};
use serde::{Serialize, Serializer};

// ─── Identifiers ────────────────────────────────────────────────────────────

/// Globally unique identifier of an event occurrence.
///
/// Laid out as the 32-byte transaction hash followed by the log index as
/// 4 little-endian bytes, the same bytes a subgraph derives with
/// `hash.concatI32(logIndex)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId([u8; 36]);

impl EventId {
    pub const LEN: usize = 36;

    pub fn new(transaction_hash: B256, log_index: u32) -> Self {
        let mut bytes = [0u8; Self::LEN];
        bytes[..32].copy_from_slice(transaction_hash.as_slice());
        bytes[32..].copy_from_slice(&log_index.to_le_bytes());
        Self(bytes)
    }

    /// Rebuild an id from its raw bytes (e.g. a `BYTEA` column).
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; Self::LEN]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn transaction_hash(&self) -> B256 {
        B256::from_slice(&self.0[..32])
    }

    pub fn log_index(&self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.0[32..]);
        u32::from_le_bytes(raw)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Failure to parse an [`EventId`] from its hex form.
#[derive(Debug, thiserror::Error)]
pub enum ParseEventIdError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("expected {expected} bytes, got {got}", expected = EventId::LEN)]
    Length { got: usize },
}

impl FromStr for EventId {
    type Err = ParseEventIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes).ok_or(ParseEventIdError::Length { got: bytes.len() })
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Meme identifier as emitted by the contract (`uint256`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MemeId(pub U256);

impl From<u64> for MemeId {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for MemeId {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for MemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for MemeId {
    type Err = alloy_primitives::ruint::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str_radix(s, 10).map(Self)
    }
}

/// Decimal string, so JavaScript clients don't lose precision.
impl Serialize for MemeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Canonical chain position of a log: block number, then log index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub block_number: u64,
    pub log_index: u32,
}

impl Position {
    pub const fn new(block_number: u64, log_index: u32) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

// ─── Events ─────────────────────────────────────────────────────────────────

/// Tag for the closed set of MemeBattle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BattleStarted,
    BattleCompleted,
    MemeSubmitted,
    MemeUpvoted,
    MemeInfoRequested,
    OwnershipTransferred,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::BattleStarted,
        EventKind::BattleCompleted,
        EventKind::MemeSubmitted,
        EventKind::MemeUpvoted,
        EventKind::MemeInfoRequested,
        EventKind::OwnershipTransferred,
    ];

    /// Storage and query-string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::BattleStarted => "battle_started",
            EventKind::BattleCompleted => "battle_completed",
            EventKind::MemeSubmitted => "meme_submitted",
            EventKind::MemeUpvoted => "meme_upvoted",
            EventKind::MemeInfoRequested => "meme_info_requested",
            EventKind::OwnershipTransferred => "ownership_transferred",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// Decoded event parameters, one variant per contract event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    BattleStarted {
        category: String,
        start_time: U256,
        end_time: U256,
    },
    BattleCompleted {
        category: String,
        winner: Address,
        winning_meme_id: MemeId,
    },
    MemeSubmitted {
        meme_id: MemeId,
        creator: Address,
        category: String,
    },
    MemeUpvoted {
        meme_id: MemeId,
        voter: Address,
    },
    MemeInfoRequested {
        meme_id: MemeId,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
}

impl EventPayload {
    pub const fn kind(&self) -> EventKind {
        match self {
            EventPayload::BattleStarted { .. } => EventKind::BattleStarted,
            EventPayload::BattleCompleted { .. } => EventKind::BattleCompleted,
            EventPayload::MemeSubmitted { .. } => EventKind::MemeSubmitted,
            EventPayload::MemeUpvoted { .. } => EventKind::MemeUpvoted,
            EventPayload::MemeInfoRequested { .. } => EventKind::MemeInfoRequested,
            EventPayload::OwnershipTransferred { .. } => EventKind::OwnershipTransferred,
        }
    }

    /// The meme an event refers to, if any. For `BattleCompleted` this is
    /// the winning meme.
    pub const fn meme_id(&self) -> Option<MemeId> {
        match self {
            EventPayload::BattleCompleted {
                winning_meme_id, ..
            } => Some(*winning_meme_id),
            EventPayload::MemeSubmitted { meme_id, .. }
            | EventPayload::MemeUpvoted { meme_id, .. }
            | EventPayload::MemeInfoRequested { meme_id } => Some(*meme_id),
            EventPayload::BattleStarted { .. } | EventPayload::OwnershipTransferred { .. } => None,
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            EventPayload::BattleStarted { category, .. }
            | EventPayload::BattleCompleted { category, .. }
            | EventPayload::MemeSubmitted { category, .. } => Some(category),
            _ => None,
        }
    }
}

/// Block and transaction metadata carried by every log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMeta {
    pub transaction_hash: B256,
    pub log_index: u32,
    pub block_number: u64,
    pub block_timestamp: u64,
}

/// A decoded chain event as delivered by the event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub meta: EventMeta,
    pub payload: EventPayload,
}

impl ChainEvent {
    pub fn id(&self) -> EventId {
        EventId::new(self.meta.transaction_hash, self.meta.log_index)
    }

    pub const fn position(&self) -> Position {
        Position::new(self.meta.block_number, self.meta.log_index)
    }
}

/// Immutable audit-log entry, one per observed event occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub id: EventId,
    pub payload: EventPayload,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: B256,
    pub log_index: u32,
}

impl EventRecord {
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub const fn position(&self) -> Position {
        Position::new(self.block_number, self.log_index)
    }
}

impl From<ChainEvent> for EventRecord {
    fn from(event: ChainEvent) -> Self {
        Self {
            id: event.id(),
            block_number: event.meta.block_number,
            block_timestamp: event.meta.block_timestamp,
            transaction_hash: event.meta.transaction_hash,
            log_index: event.meta.log_index,
            payload: event.payload,
        }
    }
}

// ─── Aggregates ─────────────────────────────────────────────────────────────

/// Per-meme upvote tally, plus battle attribution once the meme has won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemeUpvoteCount {
    pub meme_id: MemeId,
    pub upvote_amount: u64,
    /// `None` until a `BattleCompleted` names this meme as the winner.
    pub winner: Option<Address>,
    /// Empty until set by `BattleCompleted`.
    pub category: String,
    /// The `BattleCompleted` record that resolved this meme.
    pub battle_completed: Option<EventId>,
}

impl MemeUpvoteCount {
    /// A fresh row for a meme seen for the first time.
    pub const fn new(meme_id: MemeId) -> Self {
        Self {
            meme_id,
            upvote_amount: 0,
            winner: None,
            category: String::new(),
            battle_completed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_is_hash_then_little_endian_log_index() {
        let hash = B256::repeat_byte(0xab);
        let id = EventId::new(hash, 1);

        assert_eq!(&id.as_bytes()[..32], hash.as_slice());
        assert_eq!(&id.as_bytes()[32..], &[1, 0, 0, 0]);
        assert_eq!(id.transaction_hash(), hash);
        assert_eq!(id.log_index(), 1);
        assert!(id.to_string().ends_with("01000000"));
    }

    #[test]
    fn event_id_parses_its_display_form() {
        let id = EventId::new(B256::repeat_byte(0x11), 258);
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        assert!("0x1234".parse::<EventId>().is_err());
        assert!("not-hex".parse::<EventId>().is_err());
    }

    #[test]
    fn event_kind_string_forms_are_distinct() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("meme_downvoted".parse::<EventKind>().is_err());
    }

    #[test]
    fn positions_order_by_block_then_log_index() {
        assert!(Position::new(10, 5) < Position::new(11, 0));
        assert!(Position::new(10, 1) < Position::new(10, 2));
    }

    #[test]
    fn meme_id_serializes_as_decimal_string() {
        let id = MemeId::from(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!("42".parse::<MemeId>().unwrap(), id);
    }
}
