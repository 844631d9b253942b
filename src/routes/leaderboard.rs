//! Leaderboard Endpoint

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::ApiError;
use crate::services::{Leaderboard, LeaderboardWindow};
use crate::AppState;

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    /// 그룹 ID (없으면 전체)
    pub scope: Option<String>,
    /// today | week | month | all (기본값: today)
    pub window: Option<String>,
    /// 1..=LEADERBOARD_MAX_LIMIT
    pub limit: Option<usize>,
}

// ============ Handlers ============

/// GET /leaderboard?scope=&window=&limit=
///
/// # Response
///
/// ```json
/// { "status": "ranked", "window": "this_week",
///   "entries": [{ "rank": 1, "user_id": "10001", "total_minutes": 420, ... }] }
/// { "status": "no_data", "window": "today" }
/// ```
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Leaderboard>, ApiError> {
    let window = match query.window.as_deref() {
        None => LeaderboardWindow::Today,
        Some(raw) => raw.parse::<LeaderboardWindow>().map_err(ApiError::BadRequest)?,
    };

    let board = state
        .service
        .query_leaderboard(query.scope.as_deref(), window, query.limit, Utc::now())
        .await?;

    Ok(Json(board))
}
