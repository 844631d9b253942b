//! Check-in Tracker API Server
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Chat bot transport / Admin dashboard            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum Web Server                         │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                      Routes Layer                        ││
//! │  │  /checkins  /users/*  /leaderboard  /stats/*            ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Services Layer                        ││
//! │  │  CheckinService (debt, streak, achievements, goal)      ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Data Layer                            ││
//! │  │  PostgreSQL (sqlx)    In-memory (memory://)             ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkin_tracker::{
    db::CheckinStore, routes, AppState, CheckinService, Config, Database, MemoryStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 환경변수 로드
    dotenvy::dotenv().ok();

    // 로깅 초기화
    // RUST_LOG=debug,sqlx=warn 형태로 레벨 제어 가능
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "checkin_tracker=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting check-in tracker API server");

    // 설정 로드
    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(
        tz_offset_minutes = config.tz_offset_minutes,
        environment = ?config.environment,
        "Configuration loaded"
    );

    // 저장소 선택
    let store: Arc<dyn CheckinStore> = if config.uses_memory_store() {
        tracing::warn!("Using in-memory store, data will not survive a restart");
        Arc::new(MemoryStore::new())
    } else {
        let db = Database::connect(&config.database_url)
            .await
            .context("failed to connect to database")?;
        tracing::info!("Database connected");

        db.run_migrations().await.context("failed to run migrations")?;
        tracing::info!("Migrations completed");
        Arc::new(db)
    };

    // 서비스 초기화
    let service = CheckinService::new(store, &config)?;

    // 앱 상태 구성
    let state = AppState {
        service: Arc::new(service),
        config: Arc::new(config.clone()),
    };

    // 라우터 구성
    let app = routes::create_router(state);

    // 서버 시작
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
