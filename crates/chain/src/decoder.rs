use alloy::primitives::B256;
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use memefist_aggregator::{ChainEvent, EventMeta, EventPayload};

use crate::abi::MemeBattle;

/// Topic0 of every MemeBattle event the indexer subscribes to.
pub const EVENT_SIGNATURES: [B256; 6] = [
    MemeBattle::BattleStarted::SIGNATURE_HASH,
    MemeBattle::BattleCompleted::SIGNATURE_HASH,
    MemeBattle::MemeSubmitted::SIGNATURE_HASH,
    MemeBattle::MemeUpvoted::SIGNATURE_HASH,
    MemeBattle::MemeInfoRequested::SIGNATURE_HASH,
    MemeBattle::OwnershipTransferred::SIGNATURE_HASH,
];

/// A log that cannot be turned into a [`ChainEvent`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("log is missing {0}")]
    MissingField(&'static str),

    #[error("log at {tx:#x}:{log_index} was removed by a reorg")]
    Removed { tx: B256, log_index: u64 },

    #[error("log index {0} does not fit in u32")]
    LogIndexOverflow(u64),

    #[error("unknown event signature {0:?}")]
    UnknownEvent(Option<B256>),

    #[error("ABI decode failed: {0}")]
    Abi(#[from] alloy::sol_types::Error),
}

/// Decode a MemeBattle log together with its block/transaction metadata.
///
/// The log must carry `block_timestamp`; nodes that omit it need the caller
/// to fill it in from the block header first.
pub fn decode_log(log: &Log) -> Result<ChainEvent, DecodeError> {
    let transaction_hash = log
        .transaction_hash
        .ok_or(DecodeError::MissingField("transaction_hash"))?;
    let raw_index = log.log_index.ok_or(DecodeError::MissingField("log_index"))?;
    if log.removed {
        return Err(DecodeError::Removed {
            tx: transaction_hash,
            log_index: raw_index,
        });
    }

    let meta = EventMeta {
        transaction_hash,
        log_index: u32::try_from(raw_index).map_err(|_| DecodeError::LogIndexOverflow(raw_index))?,
        block_number: log
            .block_number
            .ok_or(DecodeError::MissingField("block_number"))?,
        block_timestamp: log
            .block_timestamp
            .ok_or(DecodeError::MissingField("block_timestamp"))?,
    };

    let payload = match log.topic0().copied() {
        Some(t) if t == MemeBattle::BattleStarted::SIGNATURE_HASH => {
            let d = log.log_decode::<MemeBattle::BattleStarted>()?.inner.data;
            EventPayload::BattleStarted {
                category: d.category,
                start_time: d.startTime,
                end_time: d.endTime,
            }
        }
        Some(t) if t == MemeBattle::BattleCompleted::SIGNATURE_HASH => {
            let d = log.log_decode::<MemeBattle::BattleCompleted>()?.inner.data;
            EventPayload::BattleCompleted {
                category: d.category,
                winner: d.winner,
                winning_meme_id: d.winningMemeId.into(),
            }
        }
        Some(t) if t == MemeBattle::MemeSubmitted::SIGNATURE_HASH => {
            let d = log.log_decode::<MemeBattle::MemeSubmitted>()?.inner.data;
            EventPayload::MemeSubmitted {
                meme_id: d.memeId.into(),
                creator: d.creator,
                category: d.category,
            }
        }
        Some(t) if t == MemeBattle::MemeUpvoted::SIGNATURE_HASH => {
            let d = log.log_decode::<MemeBattle::MemeUpvoted>()?.inner.data;
            EventPayload::MemeUpvoted {
                meme_id: d.memeId.into(),
                voter: d.voter,
            }
        }
        Some(t) if t == MemeBattle::MemeInfoRequested::SIGNATURE_HASH => {
            let d = log.log_decode::<MemeBattle::MemeInfoRequested>()?.inner.data;
            EventPayload::MemeInfoRequested {
                meme_id: d.memeId.into(),
            }
        }
        Some(t) if t == MemeBattle::OwnershipTransferred::SIGNATURE_HASH => {
            let d = log
                .log_decode::<MemeBattle::OwnershipTransferred>()?
                .inner
                .data;
            EventPayload::OwnershipTransferred {
                previous_owner: d.previousOwner,
                new_owner: d.newOwner,
            }
        }
        other => return Err(DecodeError::UnknownEvent(other)),
    };

    Ok(ChainEvent { meta, payload })
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, Log as PrimitiveLog, U256, address};
    use memefist_aggregator::{EventKind, MemeId};

    use super::*;

    const CONTRACT: Address = address!("1111111111111111111111111111111111111111");

    fn rpc_log<E: SolEvent>(event: &E) -> Log {
        Log {
            inner: PrimitiveLog {
                address: CONTRACT,
                data: event.encode_log_data(),
            },
            block_number: Some(12),
            block_timestamp: Some(1_700_000_000),
            transaction_hash: Some(B256::repeat_byte(0x42)),
            log_index: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn decodes_upvote_with_metadata() {
        let voter = Address::repeat_byte(0xbb);
        let log = rpc_log(&MemeBattle::MemeUpvoted {
            memeId: U256::from(42),
            voter,
        });

        let event = decode_log(&log).unwrap();
        assert_eq!(event.meta.block_number, 12);
        assert_eq!(event.meta.block_timestamp, 1_700_000_000);
        assert_eq!(event.meta.log_index, 3);
        assert_eq!(event.meta.transaction_hash, B256::repeat_byte(0x42));
        assert_eq!(
            event.payload,
            EventPayload::MemeUpvoted {
                meme_id: MemeId::from(42),
                voter,
            }
        );
    }

    #[test]
    fn decodes_every_event_kind() {
        let who = Address::repeat_byte(0x01);
        let logs = [
            rpc_log(&MemeBattle::BattleStarted {
                category: "Funny".into(),
                startTime: U256::from(1),
                endTime: U256::from(2),
            }),
            rpc_log(&MemeBattle::BattleCompleted {
                category: "Funny".into(),
                winner: who,
                winningMemeId: U256::from(7),
            }),
            rpc_log(&MemeBattle::MemeSubmitted {
                memeId: U256::from(7),
                creator: who,
                category: "Funny".into(),
            }),
            rpc_log(&MemeBattle::MemeUpvoted {
                memeId: U256::from(7),
                voter: who,
            }),
            rpc_log(&MemeBattle::MemeInfoRequested {
                memeId: U256::from(7),
            }),
            rpc_log(&MemeBattle::OwnershipTransferred {
                previousOwner: Address::ZERO,
                newOwner: who,
            }),
        ];

        let kinds: Vec<EventKind> = logs
            .iter()
            .map(|log| decode_log(log).unwrap().payload.kind())
            .collect();
        assert_eq!(kinds, EventKind::ALL.to_vec());
    }

    #[test]
    fn battle_completed_keeps_category_and_winner() {
        let log = rpc_log(&MemeBattle::BattleCompleted {
            category: "Cats".into(),
            winner: Address::repeat_byte(0xaa),
            winningMemeId: U256::from(234),
        });

        match decode_log(&log).unwrap().payload {
            EventPayload::BattleCompleted {
                category,
                winner,
                winning_meme_id,
            } => {
                assert_eq!(category, "Cats");
                assert_eq!(winner, Address::repeat_byte(0xaa));
                assert_eq!(winning_meme_id, MemeId::from(234));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn missing_timestamp_is_a_decode_error() {
        let mut log = rpc_log(&MemeBattle::MemeInfoRequested {
            memeId: U256::from(1),
        });
        log.block_timestamp = None;

        assert!(matches!(
            decode_log(&log),
            Err(DecodeError::MissingField("block_timestamp"))
        ));
    }

    #[test]
    fn removed_logs_are_rejected() {
        let mut log = rpc_log(&MemeBattle::MemeInfoRequested {
            memeId: U256::from(1),
        });
        log.removed = true;

        assert!(matches!(decode_log(&log), Err(DecodeError::Removed { .. })));
    }

    #[test]
    fn foreign_events_are_unknown() {
        let mut log = rpc_log(&MemeBattle::MemeInfoRequested {
            memeId: U256::from(1),
        });
        log.inner.data = alloy::primitives::LogData::new_unchecked(
            vec![B256::repeat_byte(0xee)],
            Default::default(),
        );

        assert!(matches!(decode_log(&log), Err(DecodeError::UnknownEvent(Some(_)))));
    }
}
