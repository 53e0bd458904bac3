//! Memefist Indexer — mirrors MemeBattle contract events into PostgreSQL.
//!
//! Flow:
//! 1. Connect to the RPC node & PostgreSQL, apply migrations
//! 2. Resume from the stored cursor (or START_BLOCK)
//! 3. Poll confirmed blocks in batches, decode MemeBattle logs in chain order
//! 4. Fold each event through the aggregator on one transaction per batch
//!
//! Guarantees:
//! - Only blocks at least CONFIRMATIONS behind head are read
//! - Events, aggregates, block record and cursor commit atomically per batch
//! - Replayed events are deduplicated by (transaction hash, log index)
//! - A parent-hash mismatch against `indexed_blocks` stops the indexer

use std::collections::HashMap;

use alloy::{
    consensus::BlockHeader,
    eips::BlockNumberOrTag,
    network::primitives::HeaderResponse,
    providers::Provider,
    rpc::types::{Filter, Log},
};
use eyre::Result;
use memefist_aggregator::{Aggregator, Applied};
use memefist_chain::{ChainProvider, EVENT_SIGNATURES, decode_log, provider};
use memefist_core::{AppError, Settings, telemetry};
use memefist_storage::{self as storage, PgStore, models::IndexedBlock};

#[tokio::main]
async fn main() -> Result<()> {
    // ── Initialisation ──────────────────────────────────────────────────
    telemetry::init();
    let settings = Settings::from_env()?;

    tracing::info!(
        rpc = %settings.rpc_url,
        contract = %settings.contract_address,
        "Starting Memefist Indexer"
    );

    let pool = storage::connect(&settings.database_url).await?;
    tracing::info!("Connected to database");

    storage::migrate(&pool).await?;
    tracing::info!("Database migrations applied");

    let provider = provider::create_provider(&settings.rpc_url)?;
    let chain_id = provider.get_chain_id().await?;
    tracing::info!(chain_id, "Connected to RPC");

    // ── Main Indexing Loop ──────────────────────────────────────────────
    let mut last_block = storage::repos::get_last_indexed_block(&pool).await?;
    if last_block == 0 && settings.start_block > 0 {
        last_block = settings.start_block as i64 - 1;
    }

    tracing::info!(from_block = last_block + 1, "Starting indexing loop");

    let poll_interval = std::time::Duration::from_secs(settings.poll_interval_secs);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutting down gracefully…");
                break;
            }
            result = index_next_batch(&provider, &pool, &mut last_block, &settings) => {
                match result {
                    Ok(true) => {}
                    Ok(false) => tokio::time::sleep(poll_interval).await,
                    Err(e) if matches!(e.downcast_ref::<AppError>(), Some(AppError::Reorg { .. })) => {
                        tracing::error!(error = %e, "Stopping: chain reorganised below the confirmation depth");
                        return Err(e);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Indexing error, retrying in 5s…");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                }
            }
        }
    }

    tracing::info!("Indexer stopped.");
    Ok(())
}

/// Index the next batch of confirmed blocks. Returns `Ok(true)` if work was
/// done, `Ok(false)` if caught up.
///
/// Any decode or ingest failure aborts the batch: the transaction is dropped
/// uncommitted and the cursor stays put, so the next attempt replays the
/// same range.
async fn index_next_batch(
    provider: &ChainProvider,
    pool: &sqlx::PgPool,
    last_block: &mut i64,
    settings: &Settings,
) -> Result<bool> {
    let chain_head = provider.get_block_number().await?;
    let safe_head = chain_head.saturating_sub(settings.confirmations) as i64;

    if *last_block >= safe_head {
        return Ok(false); // Caught up
    }

    let from = *last_block + 1;
    let to = std::cmp::min(from + settings.batch_size.max(1) as i64 - 1, safe_head);

    tracing::info!(from = from, to = to, head = chain_head, "Indexing batch");

    check_parent_hash(provider, pool, from).await?;

    // ── Fetch & decode ──────────────────────────────────────────────────
    let filter = Filter::new()
        .address(settings.contract_address)
        .event_signature(EVENT_SIGNATURES.to_vec())
        .from_block(from as u64)
        .to_block(to as u64);

    let mut logs = provider.get_logs(&filter).await?;
    logs.sort_by_key(|log| (log.block_number, log.log_index));
    fill_block_timestamps(provider, &mut logs).await?;

    let events = logs
        .iter()
        .map(decode_log)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Decode(e.to_string()))?;
    tracing::debug!(count = events.len(), "Decoded MemeBattle logs");

    // ── Atomic write: events + aggregates + block + cursor ──────────────
    let mut tx = pool.begin().await?;

    let resume = storage::repos::get_last_position(&mut *tx).await?;
    let mut aggregator = Aggregator::resume_from(PgStore::new(&mut *tx), resume);
    let (mut recorded, mut duplicates) = (0usize, 0usize);

    for event in events {
        let id = event.id();
        match aggregator
            .apply(event)
            .await
            .map_err(|e| AppError::Ingest(format!("{id}: {e}")))?
        {
            Applied::Recorded(kind) => {
                tracing::debug!(%id, %kind, "Recorded event");
                recorded += 1;
            }
            Applied::Duplicate => duplicates += 1,
        }
    }

    if let Some(block) = provider
        .get_block_by_number(BlockNumberOrTag::Number(to as u64))
        .await?
    {
        let indexed_block = IndexedBlock {
            block_number: to,
            block_hash: format!("{:#x}", block.header.hash()),
            parent_hash: format!("{:#x}", block.header.parent_hash()),
            timestamp: block.header.timestamp() as i64,
        };
        storage::repos::insert_block(&mut *tx, &indexed_block).await?;
    }

    storage::repos::set_last_indexed_block(&mut *tx, to).await?;

    tx.commit().await?;

    *last_block = to;

    tracing::info!(
        block = to,
        events = recorded,
        duplicates = duplicates,
        "Batch complete"
    );

    Ok(true)
}

/// Compare the chain's parent hash of `from` against the hash stored for
/// `from - 1` when the previous batch committed.
async fn check_parent_hash(provider: &ChainProvider, pool: &sqlx::PgPool, from: i64) -> Result<()> {
    if from <= 1 {
        return Ok(());
    }
    let Some(stored_hash) = storage::repos::get_block_hash(pool, from - 1).await? else {
        return Ok(());
    };

    let block = provider
        .get_block_by_number(BlockNumberOrTag::Number(from as u64))
        .await?
        .ok_or_else(|| AppError::Rpc(format!("Block {from} not found on chain")))?;
    let parent_hash = format!("{:#x}", block.header.parent_hash());

    if parent_hash != stored_hash {
        tracing::warn!(
            block = from,
            expected = %stored_hash,
            got = %parent_hash,
            "Reorg detected!"
        );
        return Err(AppError::Reorg {
            block: (from - 1) as u64,
            stored: stored_hash,
            chain: parent_hash,
        }
        .into());
    }
    Ok(())
}

/// Some nodes omit `blockTimestamp` on logs; fetch it from the header.
async fn fill_block_timestamps(provider: &ChainProvider, logs: &mut [Log]) -> Result<()> {
    let mut timestamps: HashMap<u64, u64> = HashMap::new();

    for log in logs.iter_mut().filter(|log| log.block_timestamp.is_none()) {
        // Leave it for the decoder to reject.
        let Some(number) = log.block_number else {
            continue;
        };
        let timestamp = match timestamps.get(&number) {
            Some(ts) => *ts,
            None => {
                let block = provider
                    .get_block_by_number(BlockNumberOrTag::Number(number))
                    .await?
                    .ok_or_else(|| AppError::Rpc(format!("Block {number} not found on chain")))?;
                let ts = block.header.timestamp();
                timestamps.insert(number, ts);
                ts
            }
        };
        log.block_timestamp = Some(timestamp);
    }

    Ok(())
}
