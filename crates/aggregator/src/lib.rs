//! Folds MemeBattle contract events into an audit log and per-meme upvote
//! aggregates.

pub mod aggregator;
pub mod memory;
pub mod model;
pub mod ordering;
pub mod query;
pub mod store;

pub use aggregator::{Aggregator, Applied, IngestError};
pub use memory::MemoryStore;
pub use model::{
    ChainEvent, EventId, EventKind, EventMeta, EventPayload, EventRecord, MemeId,
    MemeUpvoteCount, Position,
};
pub use ordering::{OrderingGuard, OutOfOrder};
pub use store::{EventLog, Lookup, StoreError, UpvoteCounts};
