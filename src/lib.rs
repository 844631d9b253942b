//! Check-in Tracker API Library
//!
//! # Overview
//!
//! 그룹 채팅 체크인 봇의 백엔드. 체크인 기록을 가불 부채, 연속 일수,
//! 업적, 일일 목표, 리더보드로 바꿔 준다.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                         API                              │
//! │                                                          │
//! │  ┌─────────┐  ┌──────────────┐  ┌─────────┐  ┌───────┐  │
//! │  │ Routes  │─▶│CheckinService│─▶│   DB    │  │ Types │  │
//! │  └─────────┘  └──────────────┘  └────┬────┘  └───────┘  │
//! │                                      │                   │
//! └──────────────────────────────────────┼───────────────────┘
//!                                        │
//!                          ┌─────────────┴─────────────┐
//!                          ▼                           ▼
//!                   ┌────────────┐              ┌────────────┐
//!                   │ PostgreSQL │              │  In-memory │
//!                   └────────────┘              └────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 및 처리
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: 체크인 엔진 (부채, 스트릭, 업적, 목표, 리더보드)
//! - `db`: 저장소 (PostgreSQL / In-memory)
//! - `types`: 공통 타입 정의
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkin_tracker::{config::Config, db::MemoryStore, services::CheckinService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let service = CheckinService::new(Arc::new(MemoryStore::new()), &config)?;
//!
//!     // ... 서버 시작
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use db::{Database, MemoryStore};
pub use error::ApiError;
pub use services::CheckinService;

/// 애플리케이션 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CheckinService>,
    pub config: Arc<Config>,
}
