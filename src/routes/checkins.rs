//! Check-in Endpoints
//!
//! 채팅 전송 계층이 파싱을 끝낸 체크인을 받아 엔진에 넘긴다.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::CheckinEntry;
use crate::error::ApiError;
use crate::services::{CheckinResult, SubmitCheckin};
use crate::AppState;

// ============ Request/Response Types ============

/// 체크인 요청
#[derive(Debug, Deserialize)]
pub struct CheckinRequest {
    pub user_id: String,
    /// 그룹 ID (없으면 개인 채팅)
    #[serde(alias = "group_id")]
    pub scope: Option<String>,
    pub duration_minutes: i64,
    pub content: String,
    #[serde(default)]
    pub is_loan: bool,
    /// 없으면 서버 수신 시각
    pub timestamp: Option<DateTime<Utc>>,
    pub nickname: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

/// 분류 라벨 요청
#[derive(Debug, Deserialize)]
pub struct ClassificationRequest {
    pub category: String,
    pub subcategory: Option<String>,
}

// ============ Handlers ============

/// POST /checkins
///
/// 체크인 기록
///
/// # Response
///
/// ```json
/// {
///   "entry": { "id": "...", "duration_minutes": 50, "is_loan": false, ... },
///   "debt_before": 120,
///   "debt_after": 70,
///   "repaid_minutes": 50,
///   "streak_days": 3,
///   "is_new_streak_segment": false,
///   "new_achievements": [{ "id": "streak_3", "name": "Warming Up", ... }],
///   "goal_progress": { "percent": 83, "achieved_just_now": false, ... }
/// }
/// ```
pub async fn submit_checkin(
    State(state): State<AppState>,
    payload: Result<Json<CheckinRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckinResult>), ApiError> {
    let Json(req) = payload?;
    let result = state
        .service
        .submit_checkin(SubmitCheckin {
            user_id: req.user_id,
            scope: req.scope,
            duration_minutes: req.duration_minutes,
            content: req.content,
            is_loan: req.is_loan,
            timestamp: req.timestamp.unwrap_or_else(Utc::now),
            nickname: req.nickname,
            category: req.category,
            subcategory: req.subcategory,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

/// PATCH /checkins/:id/classification
///
/// 외부 분류기가 붙인 라벨 저장
pub async fn classify_checkin(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ClassificationRequest>, JsonRejection>,
) -> Result<Json<CheckinEntry>, ApiError> {
    let Json(req) = payload?;
    let entry_id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("invalid check-in id `{}`", id)))?;

    let entry = state
        .service
        .classify_entry(entry_id, &req.category, req.subcategory.as_deref())
        .await?;

    Ok(Json(entry))
}
