//! User Endpoints
//!
//! 사용자 등록, 통계, 업적, 일일 목표, 체크인 취소.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{CheckinEntry, User};
use crate::error::ApiError;
use crate::services::{AchievementsView, GoalProgress, UserStats};
use crate::AppState;

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub user_id: String,
    pub nickname: Option<String>,
}

/// 목표 설정 요청 (`minutes: null` 이면 해제)
#[derive(Debug, Deserialize)]
pub struct GoalRequest {
    pub minutes: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct GoalResponse {
    pub user_id: String,
    pub daily_goal: Option<i32>,
    /// 목표가 없으면 null
    pub progress: Option<GoalProgress>,
}

#[derive(Debug, Deserialize)]
pub struct UndoQuery {
    /// 기본값: 오늘 (기준 오프셋)
    pub day: Option<NaiveDate>,
}

// ============ Handlers ============

/// POST /users
///
/// 사용자 등록 (이미 있으면 닉네임만 갱신)
pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(req) = payload?;
    let user = state
        .service
        .register_user(&req.user_id, req.nickname.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /users/:user_id/stats
///
/// 누적/가불 합계, 부채, 스트릭, 최근 기록
pub async fn get_user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStats>, ApiError> {
    let stats = state.service.query_user_stats(&user_id, Utc::now()).await?;
    Ok(Json(stats))
}

/// GET /users/:user_id/achievements
///
/// 보유 업적 + 전체 카탈로그 (조회 시 누락분 보충 부여)
pub async fn get_achievements(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<AchievementsView>, ApiError> {
    let view = state.service.query_achievements(&user_id).await?;
    Ok(Json(view))
}

/// GET /users/:user_id/goal
pub async fn get_goal(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<GoalResponse>, ApiError> {
    let progress = state.service.query_goal(&user_id, Utc::now()).await?;

    Ok(Json(GoalResponse {
        daily_goal: progress.map(|p| p.goal),
        user_id,
        progress,
    }))
}

/// PUT /users/:user_id/goal
pub async fn set_goal(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<GoalRequest>, JsonRejection>,
) -> Result<Json<GoalResponse>, ApiError> {
    let Json(req) = payload?;
    let user = state.service.set_daily_goal(&user_id, req.minutes).await?;
    let progress = state.service.query_goal(&user.user_id, Utc::now()).await?;

    Ok(Json(GoalResponse {
        user_id: user.user_id,
        daily_goal: user.daily_goal,
        progress,
    }))
}

/// DELETE /users/:user_id/checkins/last?day=YYYY-MM-DD
///
/// 해당 날짜의 가장 최근 체크인 1건 취소
pub async fn undo_last_checkin(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<UndoQuery>,
) -> Result<Json<CheckinEntry>, ApiError> {
    let day = query
        .day
        .unwrap_or_else(|| state.service.calendar().day_of(Utc::now()));

    let removed = state.service.undo_last_entry(&user_id, day).await?;
    Ok(Json(removed))
}
