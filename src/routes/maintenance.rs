//! Reminder & Maintenance Endpoints
//!
//! 스케줄러(외부)가 호출한다. 엔진은 타이머를 갖지 않는다.

use axum::{extract::State, Json};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::error::ApiError;
use crate::services::{StreakRisk, SweepReport};
use crate::AppState;

// ============ Request/Response Types ============

#[derive(Debug, Default, Deserialize)]
pub struct SweepRequest {
    /// 마감된 날 (기본값: 어제)
    pub day: Option<NaiveDate>,
}

// ============ Handlers ============

/// GET /reminders/streak-risk
///
/// 어제까지 이어졌지만 오늘 아직 체크인하지 않은 사용자
pub async fn streak_risk(
    State(state): State<AppState>,
) -> Result<Json<Vec<StreakRisk>>, ApiError> {
    let users = state.service.streak_at_risk(Utc::now()).await?;
    Ok(Json(users))
}

/// POST /maintenance/streak-sweep
///
/// 마감된 날에 체크인하지 않은 사용자의 스트릭을 0 으로 (오늘 이후 날짜는 400)
pub async fn streak_sweep(
    State(state): State<AppState>,
    body: Option<Json<SweepRequest>>,
) -> Result<Json<SweepReport>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let now = Utc::now();

    let day = match req.day {
        Some(day) => day,
        None => {
            let calendar = state.service.calendar();
            calendar
                .previous_day(calendar.day_of(now))
                .ok_or_else(|| ApiError::BadRequest("no previous day".to_string()))?
        }
    };

    let report = state.service.sweep_broken_streaks(day, now).await?;
    Ok(Json(report))
}
