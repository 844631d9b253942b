//! API Routes Module
//!
//! 모든 HTTP 엔드포인트 정의
//!
//! # Routes
//! - `/health` - 헬스 체크
//! - `/checkins/*` - 체크인 기록, 분류 라벨
//! - `/users/*` - 사용자 등록, 통계, 업적, 목표, 체크인 취소
//! - `/leaderboard` - 구간별 순위
//! - `/reminders/*`, `/maintenance/*` - 스트릭 위험 알림, 하루 마감 sweep
//! - `/stats/*` - 관리자 집계

pub mod checkins;
pub mod health;
pub mod leaderboard;
pub mod maintenance;
pub mod stats;
pub mod users;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// 라우터 생성
///
/// # Route Structure
///
/// ```text
/// GET    /health                              - 서버 상태 확인
///
/// POST   /checkins                            - 체크인 기록
/// PATCH  /checkins/:id/classification         - 분류 라벨 저장
///
/// POST   /users                               - 사용자 등록
/// GET    /users/:user_id/stats                - 사용자 통계
/// GET    /users/:user_id/achievements         - 업적 (누락분 보충)
/// GET    /users/:user_id/goal                 - 목표 진행도
/// PUT    /users/:user_id/goal                 - 목표 설정/해제
/// DELETE /users/:user_id/checkins/last        - 그날 마지막 체크인 취소
///
/// GET    /leaderboard                         - 순위
/// GET    /reminders/streak-risk               - 스트릭 위험 사용자
/// POST   /maintenance/streak-sweep            - 끊긴 스트릭 정리
///
/// GET    /stats/overview                      - 전체 현황
/// GET    /stats/trend                         - 일별 추세
/// GET    /stats/categories                    - 분류별 합계
/// ```
pub fn create_router(state: AppState) -> Router {
    // 프로덕션에서는 특정 도메인만 허용, 개발 환경에서는 localhost 허용
    let cors = if state.config.is_production() {
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "https://yourdomain.com".to_string());
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        CorsLayer::new()
            .allow_origin([
                HeaderValue::from_static("http://localhost:5173"), // Vite dev server
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:5173"),
            ])
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        // Health check
        .route("/health", get(health::health_check))

        // Check-ins
        .route("/checkins", post(checkins::submit_checkin))
        .route("/checkins/:id/classification", patch(checkins::classify_checkin))

        // Users
        .route("/users", post(users::register_user))
        .route("/users/:user_id/stats", get(users::get_user_stats))
        .route("/users/:user_id/achievements", get(users::get_achievements))
        .route("/users/:user_id/goal", get(users::get_goal).put(users::set_goal))
        .route("/users/:user_id/checkins/last", delete(users::undo_last_checkin))

        // Leaderboard
        .route("/leaderboard", get(leaderboard::get_leaderboard))

        // Reminders & maintenance
        .route("/reminders/streak-risk", get(maintenance::streak_risk))
        .route("/maintenance/streak-sweep", post(maintenance::streak_sweep))

        // Reporting
        .route("/stats/overview", get(stats::overview))
        .route("/stats/trend", get(stats::trend))
        .route("/stats/categories", get(stats::categories))

        // 미들웨어
        .layer(TraceLayer::new_for_http())
        .layer(cors)

        // 상태 주입
        .with_state(state)
}
