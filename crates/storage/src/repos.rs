use memefist_aggregator::query::{EventFilter, LeaderboardStats, UpvoteFilter, UpvoteOrder};
use memefist_aggregator::{EventId, EventKind, MemeId, Position};
use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::models::*;

// ─── Event Log ──────────────────────────────────────────────────────────────

/// Whether an event id is already logged.
pub async fn event_exists<'e, E>(executor: E, id: &EventId) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM events WHERE id = $1)")
        .bind(id.as_bytes())
        .fetch_one(executor)
        .await?;
    Ok(exists)
}

/// Append one event. Returns `false` if the id was already logged.
pub async fn insert_event<'e, E>(executor: E, row: &NewEvent) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO events (id, kind, category, start_time, end_time, meme_id, creator, voter,
                            winner, previous_owner, new_owner, block_number, log_index,
                            block_timestamp, transaction_hash)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(&row.id)
    .bind(row.kind)
    .bind(&row.category)
    .bind(&row.start_time)
    .bind(&row.end_time)
    .bind(&row.meme_id)
    .bind(&row.creator)
    .bind(&row.voter)
    .bind(&row.winner)
    .bind(&row.previous_owner)
    .bind(&row.new_owner)
    .bind(row.block_number)
    .bind(row.log_index)
    .bind(row.block_timestamp)
    .bind(&row.transaction_hash)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Position of the newest logged event, used to resume the ordering guard.
pub async fn get_last_position<'e, E>(executor: E) -> Result<Option<Position>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64, i32)> = sqlx::query_as(
        "SELECT block_number, log_index FROM events ORDER BY block_number DESC, log_index DESC LIMIT 1",
    )
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|(block, log_index)| {
        Position::new(block.max(0) as u64, log_index.max(0) as u32)
    }))
}

/// Get a single event by id.
pub async fn get_event(pool: &PgPool, id: &EventId) -> Result<Option<EventRow>, sqlx::Error> {
    sqlx::query_as::<_, EventRow>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
        .bind(id.as_bytes())
        .fetch_optional(pool)
        .await
}

/// Filtered event log, newest first.
pub async fn get_events(pool: &PgPool, filter: &EventFilter) -> Result<Vec<EventRow>, sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE TRUE"));

    if let Some(kind) = filter.kind {
        qb.push(" AND kind = ").push_bind(kind.as_str());
    }
    if let Some(meme_id) = filter.meme_id {
        qb.push(" AND meme_id = ").push_bind(meme_id.to_string());
    }

    qb.push(" ORDER BY block_number DESC, log_index DESC LIMIT ")
        .push_bind(filter.limit as i64);

    qb.build_query_as::<EventRow>().fetch_all(pool).await
}

/// Battle lifecycle events in chain order, for deriving battle summaries.
pub async fn get_battle_events(pool: &PgPool) -> Result<Vec<EventRow>, sqlx::Error> {
    sqlx::query_as::<_, EventRow>(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE kind IN ($1, $2) \
         ORDER BY block_number ASC, log_index ASC"
    ))
    .bind(EventKind::BattleStarted.as_str())
    .bind(EventKind::BattleCompleted.as_str())
    .fetch_all(pool)
    .await
}

// ─── Upvote Counts ──────────────────────────────────────────────────────────

/// Load one aggregate row, locking it for the rest of the transaction.
pub async fn get_upvote_count_for_update<'e, E>(
    executor: E,
    meme_id: MemeId,
) -> Result<Option<MemeUpvoteCountRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, MemeUpvoteCountRow>(&format!(
        "SELECT {UPVOTE_COLUMNS} FROM meme_upvote_counts WHERE meme_id = $1 FOR UPDATE"
    ))
    .bind(meme_id.to_string())
    .fetch_optional(executor)
    .await
}

/// Insert or overwrite an aggregate row.
pub async fn upsert_upvote_count<'e, E>(executor: E, row: &NewUpvoteCount) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO meme_upvote_counts (meme_id, upvote_amount, winner, category, battle_completed)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (meme_id) DO UPDATE
        SET upvote_amount = $2, winner = $3, category = $4, battle_completed = $5
        "#,
    )
    .bind(&row.meme_id)
    .bind(row.upvote_amount)
    .bind(&row.winner)
    .bind(&row.category)
    .bind(&row.battle_completed)
    .execute(executor)
    .await?;
    Ok(())
}

/// Get the aggregate for a single meme.
pub async fn get_upvote_count(
    pool: &PgPool,
    meme_id: MemeId,
) -> Result<Option<MemeUpvoteCountRow>, sqlx::Error> {
    sqlx::query_as::<_, MemeUpvoteCountRow>(&format!(
        "SELECT {UPVOTE_COLUMNS} FROM meme_upvote_counts WHERE meme_id = $1"
    ))
    .bind(meme_id.to_string())
    .fetch_optional(pool)
    .await
}

/// Filtered, sorted aggregates.
pub async fn get_upvote_counts(
    pool: &PgPool,
    filter: &UpvoteFilter,
) -> Result<Vec<MemeUpvoteCountRow>, sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {UPVOTE_COLUMNS} FROM meme_upvote_counts WHERE TRUE"
    ));

    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(winner) = filter.winner {
        qb.push(" AND winner = ").push_bind(format!("{winner:#x}"));
    }

    qb.push(match filter.order {
        UpvoteOrder::MostUpvoted => {
            " ORDER BY upvote_amount DESC, CAST(meme_id AS NUMERIC) ASC"
        }
        UpvoteOrder::LeastUpvoted => {
            " ORDER BY upvote_amount ASC, CAST(meme_id AS NUMERIC) ASC"
        }
        UpvoteOrder::MemeId => " ORDER BY CAST(meme_id AS NUMERIC) ASC",
    });
    qb.push(" LIMIT ").push_bind(filter.limit as i64);

    qb.build_query_as::<MemeUpvoteCountRow>()
        .fetch_all(pool)
        .await
}

// ─── Leaderboard ────────────────────────────────────────────────────────────

/// Totals shown above the leaderboard.
pub async fn get_leaderboard_stats(pool: &PgPool) -> Result<LeaderboardStats, sqlx::Error> {
    let (total_memes, completed_battles): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FILTER (WHERE kind = $1),
               COUNT(*) FILTER (WHERE kind = $2)
        FROM events
        "#,
    )
    .bind(EventKind::MemeSubmitted.as_str())
    .bind(EventKind::BattleCompleted.as_str())
    .fetch_one(pool)
    .await?;

    let (total_upvotes,): (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(upvote_amount), 0)::BIGINT FROM meme_upvote_counts")
            .fetch_one(pool)
            .await?;

    Ok(LeaderboardStats {
        total_memes: total_memes.max(0) as u64,
        total_upvotes: total_upvotes.max(0) as u64,
        completed_battles: completed_battles.max(0) as u64,
    })
}

/// Wins per winner address, most wins first.
pub async fn get_winner_tallies(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<WinnerTallyRow>, sqlx::Error> {
    sqlx::query_as::<_, WinnerTallyRow>(
        r#"
        SELECT winner,
               COUNT(*) AS wins,
               COALESCE(SUM(upvote_amount), 0)::BIGINT AS upvotes
        FROM meme_upvote_counts
        WHERE winner IS NOT NULL
        GROUP BY winner
        ORDER BY wins DESC, upvotes DESC, winner ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Upvotes on each creator's submitted memes, most upvotes first. The first
/// submission of a meme id owns it.
pub async fn get_creator_tallies(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<CreatorTallyRow>, sqlx::Error> {
    sqlx::query_as::<_, CreatorTallyRow>(
        r#"
        WITH submissions AS (
            SELECT DISTINCT ON (meme_id) meme_id, creator
            FROM events
            WHERE kind = $1
            ORDER BY meme_id, block_number ASC, log_index ASC
        )
        SELECT s.creator AS creator,
               COUNT(*) AS memes,
               COALESCE(SUM(c.upvote_amount), 0)::BIGINT AS upvotes
        FROM submissions s
        LEFT JOIN meme_upvote_counts c ON c.meme_id = s.meme_id
        GROUP BY s.creator
        ORDER BY upvotes DESC, memes DESC, s.creator ASC
        LIMIT $2
        "#,
    )
    .bind(EventKind::MemeSubmitted.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await
}

// ─── Block Queries ──────────────────────────────────────────────────────────

/// Insert a processed block.
pub async fn insert_block<'e, E>(executor: E, block: &IndexedBlock) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO indexed_blocks (block_number, block_hash, parent_hash, timestamp)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (block_number) DO UPDATE
        SET block_hash = $2, parent_hash = $3, timestamp = $4
        "#,
    )
    .bind(block.block_number)
    .bind(&block.block_hash)
    .bind(&block.parent_hash)
    .bind(block.timestamp)
    .execute(executor)
    .await?;
    Ok(())
}

/// Get the stored block hash for a specific block number.
pub async fn get_block_hash(
    pool: &PgPool,
    block_number: i64,
) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT block_hash FROM indexed_blocks WHERE block_number = $1")
            .bind(block_number)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|r| r.0))
}

// ─── Indexer State ──────────────────────────────────────────────────────────

/// Get the last indexed block from persistent state.
pub async fn get_last_indexed_block(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row: (String,) =
        sqlx::query_as("SELECT value FROM indexer_state WHERE key = 'last_indexed_block'")
            .fetch_one(pool)
            .await?;
    Ok(row.0.parse::<i64>().unwrap_or(0))
}

/// Set the last indexed block in persistent state.
pub async fn set_last_indexed_block<'e, E>(
    executor: E,
    block_number: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE indexer_state SET value = $1 WHERE key = 'last_indexed_block'")
        .bind(block_number.to_string())
        .execute(executor)
        .await?;
    Ok(())
}
