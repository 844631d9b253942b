//! Reporting Endpoints
//!
//! 관리자 대시보드용 읽기 전용 집계. 인증은 앞단에서 처리한다고 가정.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db::{CategoryTotal, DailyTotal, DateRange};
use crate::error::ApiError;
use crate::services::Overview;
use crate::AppState;

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    /// 기본 7일, 최대 90일
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    pub user_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

// ============ Handlers ============

/// GET /stats/overview
///
/// 전체/오늘/이번 주/이번 달 체크인 수, 시간, 참여 인원
pub async fn overview(State(state): State<AppState>) -> Result<Json<Overview>, ApiError> {
    let overview = state.service.overview(Utc::now()).await?;
    Ok(Json(overview))
}

/// GET /stats/trend?days=
///
/// 일별 추세 (오래된 날부터)
pub async fn trend(
    State(state): State<AppState>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Vec<DailyTotal>>, ApiError> {
    let days = query.days.unwrap_or(7);
    let trend = state.service.daily_trend(days, Utc::now()).await?;
    Ok(Json(trend))
}

/// GET /stats/categories?user_id=&start=&end=
///
/// 분류별 합계 (일반 체크인만)
pub async fn categories(
    State(state): State<AppState>,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<Vec<CategoryTotal>>, ApiError> {
    let range = DateRange {
        start: query.start,
        end: query.end,
    };
    let totals = state
        .service
        .category_breakdown(query.user_id.as_deref(), range)
        .await?;
    Ok(Json(totals))
}
