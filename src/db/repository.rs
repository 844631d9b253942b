//! Repository Pattern Implementation
//!
//! 체크인 엔진이 사용하는 저장소 인터페이스.
//!
//! ```text
//! CheckinService ──▶ dyn CheckinStore
//!                      ├── Database     (PostgreSQL, db/mod.rs)
//!                      └── MemoryStore  (테스트 / memory://, db/memory.rs)
//! ```
//!
//! 사용자 상태를 바꾸는 메서드는 모두 `expected_version` 을 받으며,
//! 버전이 다르면 `StoreError::Conflict` 를 반환한다.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use uuid::Uuid;

use super::models::{
    AchievementGrant, Aggregate, CategoryTotal, CheckinCommit, CheckinEntry, CommitOutcome,
    DailyTotal, DateRange, EntryFilter, GrantOutcome, LedgerTotals, User, UserStateUpdate,
    UserTotal, WindowTotals,
};
use crate::error::StoreError;
use crate::services::AchievementId;

pub type StoreResult<T> = Result<T, StoreError>;

/// Ledger / User / Achievement 저장소
#[async_trait]
pub trait CheckinStore: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;

    // ============ Users ============

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>>;

    /// 없으면 생성, 있으면 닉네임만 갱신 (버전 변경 없음)
    async fn upsert_user(&self, user_id: &str, nickname: Option<&str>) -> StoreResult<User>;

    async fn set_daily_goal(
        &self,
        user_id: &str,
        expected_version: i64,
        goal: Option<i32>,
    ) -> StoreResult<User>;

    async fn update_streak(&self, update: &UserStateUpdate) -> StoreResult<User>;

    async fn count_users(&self) -> StoreResult<i64>;

    /// streak_days > 0 이고 last_checkin_date == date 인 사용자
    async fn users_last_checked_in_on(&self, date: NaiveDate) -> StoreResult<Vec<User>>;

    /// streak_days > 0 이고 last_checkin_date < day 인 사용자
    async fn users_with_stale_streak(&self, day: NaiveDate) -> StoreResult<Vec<User>>;

    // ============ Ledger ============

    /// 기록 추가 + 사용자 상태 + 업적을 하나의 단위로 커밋
    async fn commit_checkin(&self, commit: &CheckinCommit) -> StoreResult<CommitOutcome>;

    /// 최신순
    async fn entries(&self, user_id: &str, filter: &EntryFilter) -> StoreResult<Vec<CheckinEntry>>;

    async fn aggregate(&self, user_id: &str, filter: &EntryFilter) -> StoreResult<Aggregate>;

    async fn ledger_totals(&self, user_id: &str) -> StoreResult<LedgerTotals>;

    async fn delete_most_recent(
        &self,
        user_id: &str,
        range: &DateRange,
    ) -> StoreResult<Option<CheckinEntry>>;

    async fn classify_entry(
        &self,
        entry_id: Uuid,
        category: &str,
        subcategory: Option<&str>,
    ) -> StoreResult<Option<CheckinEntry>>;

    // ============ Achievements ============

    async fn grants(&self, user_id: &str) -> StoreResult<Vec<AchievementGrant>>;

    /// 이미 있으면 `AlreadyHeld` (에러 아님)
    async fn grant(
        &self,
        user_id: &str,
        achievement: AchievementId,
        unlocked_at: DateTime<Utc>,
    ) -> StoreResult<GrantOutcome>;

    // ============ Aggregates ============

    /// 사용자별 일반 체크인 합계 (정렬 안 됨)
    async fn user_totals(
        &self,
        scope: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<UserTotal>>;

    async fn window_totals(&self, since: Option<DateTime<Utc>>) -> StoreResult<WindowTotals>;

    /// 기준 오프셋의 날짜별 합계 (날짜 오름차순)
    async fn daily_totals(
        &self,
        range: &DateRange,
        offset: FixedOffset,
    ) -> StoreResult<Vec<DailyTotal>>;

    async fn category_totals(
        &self,
        user_id: Option<&str>,
        range: &DateRange,
    ) -> StoreResult<Vec<CategoryTotal>>;
}
