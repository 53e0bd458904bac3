//! Memefist API Server — read-only access to the MemeBattle event log and
//! per-meme upvote aggregates.

use std::{net::SocketAddr, str::FromStr, sync::Arc};

use alloy_primitives::Address;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use memefist_aggregator::{
    EventId, EventKind, EventRecord, MemeId,
    query::{EventFilter, UpvoteFilter, UpvoteOrder, clamp_limit, summarize_battles},
};
use memefist_core::{ApiSettings, telemetry};
use memefist_storage::{self as storage};
use serde::{Deserialize, Serialize};

/// Shared application state.
struct AppState {
    pool: sqlx::PgPool,
}

#[tokio::main]
async fn main() {
    telemetry::init();
    let settings = ApiSettings::from_env().expect("Failed to load settings");

    tracing::info!("Starting Memefist API Server");

    let pool = storage::connect(&settings.database_url)
        .await
        .expect("Failed to connect to database");

    storage::migrate(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Database ready");

    let state = Arc::new(AppState { pool });

    let app = Router::new()
        .route("/api/v1/events", get(list_events))
        .route("/api/v1/events/:id", get(get_event))
        .route("/api/v1/memes", get(list_memes))
        .route("/api/v1/memes/:meme_id", get(get_meme))
        .route("/api/v1/leaderboard/stats", get(get_leaderboard_stats))
        .route("/api/v1/leaderboard/winners", get(get_winners))
        .route("/api/v1/leaderboard/creators", get(get_creators))
        .route("/api/v1/battles", get(list_battles))
        .route("/health", get(health))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.api_port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}

// ─── Query Params ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct PaginationParams {
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct EventParams {
    kind: Option<String>,
    meme_id: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct MemeParams {
    category: Option<String>,
    winner: Option<String>,
    order: Option<String>,
    limit: Option<usize>,
}

impl EventParams {
    fn into_filter(self) -> Result<EventFilter, String> {
        Ok(EventFilter {
            kind: self
                .kind
                .as_deref()
                .map(EventKind::from_str)
                .transpose()
                .map_err(|e| e.to_string())?,
            meme_id: self.meme_id.as_deref().map(parse_meme_id).transpose()?,
            limit: clamp_limit(self.limit),
        })
    }
}

impl MemeParams {
    fn into_filter(self) -> Result<UpvoteFilter, String> {
        Ok(UpvoteFilter {
            category: self.category,
            winner: self
                .winner
                .as_deref()
                .map(Address::from_str)
                .transpose()
                .map_err(|e| format!("invalid winner address: {e}"))?,
            order: self
                .order
                .as_deref()
                .map(UpvoteOrder::from_str)
                .transpose()
                .map_err(|e| e.to_string())?
                .unwrap_or_default(),
            limit: clamp_limit(self.limit),
        })
    }
}

fn parse_meme_id(raw: &str) -> Result<MemeId, String> {
    MemeId::from_str(raw).map_err(|e| format!("invalid meme id {raw:?}: {e}"))
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
}

type ApiError = (StatusCode, Json<ApiResponse<String>>);

fn json_ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

fn json_err(status: StatusCode, msg: &str) -> ApiError {
    (
        status,
        Json(ApiResponse {
            success: false,
            data: msg.to_string(),
        }),
    )
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %e, "Query failed");
    json_err(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
}

fn bad_request(msg: String) -> ApiError {
    json_err(StatusCode::BAD_REQUEST, &msg)
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

/// GET /api/v1/events: event log, newest first, filterable by kind and meme.
async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = params.into_filter().map_err(bad_request)?;
    let events = storage::repos::get_events(&state.pool, &filter)
        .await
        .map_err(internal)?;
    Ok(json_ok(events))
}

/// GET /api/v1/events/:id: single event by `0x` transaction hash ‖ log index.
async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = EventId::from_str(&id).map_err(|e| bad_request(format!("invalid event id: {e}")))?;
    let event = storage::repos::get_event(&state.pool, &id)
        .await
        .map_err(internal)?;
    match event {
        Some(e) => Ok(json_ok(e)),
        None => Err(json_err(StatusCode::NOT_FOUND, "Event not found")),
    }
}

/// GET /api/v1/memes: upvote aggregates, filterable by category and winner.
async fn list_memes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MemeParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = params.into_filter().map_err(bad_request)?;
    let memes = storage::repos::get_upvote_counts(&state.pool, &filter)
        .await
        .map_err(internal)?;
    Ok(json_ok(memes))
}

/// GET /api/v1/memes/:meme_id: aggregate for one meme.
async fn get_meme(
    State(state): State<Arc<AppState>>,
    Path(meme_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let meme_id = parse_meme_id(&meme_id).map_err(bad_request)?;
    let meme = storage::repos::get_upvote_count(&state.pool, meme_id)
        .await
        .map_err(internal)?;
    match meme {
        Some(m) => Ok(json_ok(m)),
        None => Err(json_err(StatusCode::NOT_FOUND, "Meme has no upvotes")),
    }
}

/// GET /api/v1/leaderboard/stats: total memes, upvotes and completed battles.
async fn get_leaderboard_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = storage::repos::get_leaderboard_stats(&state.pool)
        .await
        .map_err(internal)?;
    Ok(json_ok(stats))
}

/// GET /api/v1/leaderboard/winners: battle wins per winner address.
async fn get_winners(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(params.limit) as i64;
    let winners = storage::repos::get_winner_tallies(&state.pool, limit)
        .await
        .map_err(internal)?;
    Ok(json_ok(winners))
}

/// GET /api/v1/leaderboard/creators: upvotes received per meme creator.
async fn get_creators(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(params.limit) as i64;
    let creators = storage::repos::get_creator_tallies(&state.pool, limit)
        .await
        .map_err(internal)?;
    Ok(json_ok(creators))
}

/// GET /api/v1/battles: battles with their status, newest first.
async fn list_battles(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let rows = storage::repos::get_battle_events(&state.pool)
        .await
        .map_err(internal)?;
    let records = rows
        .iter()
        .map(EventRecord::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(internal)?;

    let now = chrono::Utc::now().timestamp().max(0) as u64;
    Ok(json_ok(summarize_battles(&records, now)))
}
