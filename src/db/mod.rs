//! Database Module
//!
//! PostgreSQL 저장소 (SQLx PgPool).
//!
//! - 체크인 커밋은 단일 트랜잭션: 기록 INSERT + 사용자 UPDATE (버전 검사) + 업적 INSERT
//! - 업적은 (user_id, achievement_id) PK + `ON CONFLICT DO NOTHING` 으로 중복 부여 방지
//! - 집계는 모두 SQL (SUM / COUNT / GROUP BY) 에서 처리

mod memory;
mod models;
mod repository;

pub use memory::MemoryStore;
pub use models::*;
pub use repository::{CheckinStore, StoreResult};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::error::StoreError;
use crate::services::AchievementId;

const USER_COLUMNS: &str = r#"
    user_id, nickname, streak_days, max_streak, last_checkin_date,
    daily_goal, version, created_at, updated_at
"#;

const ENTRY_COLUMNS: &str = r#"
    id, user_id, scope, duration_minutes, content, is_loan,
    category, subcategory, created_at
"#;

/// `EntryFilter` 조건 ($1 = user_id, $2..$5 = 필터)
const ENTRY_FILTER: &str = r#"
    user_id = $1
    AND ($2::TEXT IS NULL OR scope = $2)
    AND ($3::BOOLEAN IS NULL OR is_loan = $3)
    AND ($4::TIMESTAMPTZ IS NULL OR created_at >= $4)
    AND ($5::TIMESTAMPTZ IS NULL OR created_at < $5)
"#;

/// 데이터베이스 연결 및 쿼리 담당
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10 (트래픽에 따라 조정)
    /// - min_connections: 1 (idle 시 최소 유지)
    /// - acquire_timeout: 3초 (커넥션 획득 대기)
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckinStore for Database {
    /// Health check
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn upsert_user(&self, user_id: &str, nickname: Option<&str>) -> StoreResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (user_id, nickname, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET
                nickname = COALESCE(EXCLUDED.nickname, users.nickname),
                updated_at = NOW()
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(nickname)
            .fetch_one(&self.pool)
            .await?;

        Ok(user)
    }

    async fn set_daily_goal(
        &self,
        user_id: &str,
        expected_version: i64,
        goal: Option<i32>,
    ) -> StoreResult<User> {
        let sql = format!(
            r#"
            UPDATE users
            SET daily_goal = $3, version = version + 1, updated_at = NOW()
            WHERE user_id = $1 AND version = $2
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(expected_version)
            .bind(goal)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::Conflict(user_id.to_string()))
    }

    async fn update_streak(&self, update: &UserStateUpdate) -> StoreResult<User> {
        let sql = format!(
            r#"
            UPDATE users
            SET streak_days = $3, max_streak = $4, last_checkin_date = $5,
                version = version + 1, updated_at = NOW()
            WHERE user_id = $1 AND version = $2
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&update.user_id)
            .bind(update.expected_version)
            .bind(update.streak_days)
            .bind(update.max_streak)
            .bind(update.last_checkin_date)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::Conflict(update.user_id.clone()))
    }

    async fn count_users(&self) -> StoreResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    async fn users_last_checked_in_on(&self, date: NaiveDate) -> StoreResult<Vec<User>> {
        let sql = format!(
            r#"
            SELECT {} FROM users
            WHERE streak_days > 0 AND last_checkin_date = $1
            ORDER BY streak_days DESC, user_id
            "#,
            USER_COLUMNS
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    async fn users_with_stale_streak(&self, day: NaiveDate) -> StoreResult<Vec<User>> {
        let sql = format!(
            r#"
            SELECT {} FROM users
            WHERE streak_days > 0
              AND (last_checkin_date IS NULL OR last_checkin_date < $1)
            ORDER BY user_id
            "#,
            USER_COLUMNS
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(day)
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    async fn commit_checkin(&self, commit: &CheckinCommit) -> StoreResult<CommitOutcome> {
        let mut tx = self.pool.begin().await?;

        // 1. 사용자 상태 (버전 검사)
        let updated = sqlx::query(
            r#"
            UPDATE users
            SET streak_days = $3, max_streak = $4, last_checkin_date = $5,
                version = version + 1, updated_at = NOW()
            WHERE user_id = $1 AND version = $2
            "#,
        )
        .bind(&commit.user.user_id)
        .bind(commit.user.expected_version)
        .bind(commit.user.streak_days)
        .bind(commit.user.max_streak)
        .bind(commit.user.last_checkin_date)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict(commit.user.user_id.clone()));
        }

        // 2. 기록 추가
        let entry = &commit.entry;
        let sql = format!(
            r#"
            INSERT INTO checkins (
                id, user_id, scope, duration_minutes, content, is_loan,
                category, subcategory, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );
        let inserted = sqlx::query_as::<_, CheckinEntry>(&sql)
            .bind(Uuid::new_v4())
            .bind(&entry.user_id)
            .bind(&entry.scope)
            .bind(entry.duration_minutes)
            .bind(&entry.content)
            .bind(entry.is_loan)
            .bind(&entry.category)
            .bind(&entry.subcategory)
            .bind(entry.created_at)
            .fetch_one(&mut *tx)
            .await?;

        // 3. 업적 (이미 있으면 무시)
        let mut granted = Vec::with_capacity(commit.grants.len());
        for achievement in &commit.grants {
            let rows = sqlx::query(
                r#"
                INSERT INTO achievements (user_id, achievement_id, unlocked_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, achievement_id) DO NOTHING
                "#,
            )
            .bind(&entry.user_id)
            .bind(achievement.as_str())
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if rows == 1 {
                granted.push(*achievement);
            }
        }

        tx.commit().await?;

        Ok(CommitOutcome {
            entry: inserted,
            granted,
        })
    }

    async fn entries(&self, user_id: &str, filter: &EntryFilter) -> StoreResult<Vec<CheckinEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM checkins
            WHERE {}
            ORDER BY created_at DESC, recorded_at DESC
            LIMIT $6
            "#,
            ENTRY_COLUMNS, ENTRY_FILTER
        );
        let entries = sqlx::query_as::<_, CheckinEntry>(&sql)
            .bind(user_id)
            .bind(&filter.scope)
            .bind(filter.is_loan)
            .bind(filter.range.start)
            .bind(filter.range.end)
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    async fn aggregate(&self, user_id: &str, filter: &EntryFilter) -> StoreResult<Aggregate> {
        let sql = format!(
            r#"
            SELECT
                COUNT(*) AS count,
                COALESCE(SUM(duration_minutes), 0)::BIGINT AS total_minutes
            FROM checkins
            WHERE {}
            "#,
            ENTRY_FILTER
        );
        let aggregate = sqlx::query_as::<_, Aggregate>(&sql)
            .bind(user_id)
            .bind(&filter.scope)
            .bind(filter.is_loan)
            .bind(filter.range.start)
            .bind(filter.range.end)
            .fetch_one(&self.pool)
            .await?;

        Ok(aggregate)
    }

    async fn ledger_totals(&self, user_id: &str) -> StoreResult<LedgerTotals> {
        let totals = sqlx::query_as::<_, LedgerTotals>(
            r#"
            SELECT
                COALESCE(SUM(duration_minutes) FILTER (WHERE NOT is_loan), 0)::BIGINT AS normal_minutes,
                COUNT(*) FILTER (WHERE NOT is_loan) AS normal_count,
                COALESCE(SUM(duration_minutes) FILTER (WHERE is_loan), 0)::BIGINT AS loan_minutes,
                COUNT(*) FILTER (WHERE is_loan) AS loan_count
            FROM checkins
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(totals)
    }

    async fn delete_most_recent(
        &self,
        user_id: &str,
        range: &DateRange,
    ) -> StoreResult<Option<CheckinEntry>> {
        let sql = format!(
            r#"
            DELETE FROM checkins
            WHERE id = (
                SELECT id FROM checkins
                WHERE user_id = $1
                  AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
                  AND ($3::TIMESTAMPTZ IS NULL OR created_at < $3)
                ORDER BY created_at DESC, recorded_at DESC
                LIMIT 1
            )
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );
        let removed = sqlx::query_as::<_, CheckinEntry>(&sql)
            .bind(user_id)
            .bind(range.start)
            .bind(range.end)
            .fetch_optional(&self.pool)
            .await?;

        Ok(removed)
    }

    async fn classify_entry(
        &self,
        entry_id: Uuid,
        category: &str,
        subcategory: Option<&str>,
    ) -> StoreResult<Option<CheckinEntry>> {
        let sql = format!(
            r#"
            UPDATE checkins
            SET category = $2, subcategory = $3
            WHERE id = $1
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );
        let entry = sqlx::query_as::<_, CheckinEntry>(&sql)
            .bind(entry_id)
            .bind(category)
            .bind(subcategory)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    async fn grants(&self, user_id: &str) -> StoreResult<Vec<AchievementGrant>> {
        let grants = sqlx::query_as::<_, AchievementGrant>(
            r#"
            SELECT user_id, achievement_id, unlocked_at
            FROM achievements
            WHERE user_id = $1
            ORDER BY unlocked_at, achievement_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(grants)
    }

    async fn grant(
        &self,
        user_id: &str,
        achievement: AchievementId,
        unlocked_at: DateTime<Utc>,
    ) -> StoreResult<GrantOutcome> {
        let rows = sqlx::query(
            r#"
            INSERT INTO achievements (user_id, achievement_id, unlocked_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, achievement_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(achievement.as_str())
        .bind(unlocked_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(if rows == 1 {
            GrantOutcome::Granted
        } else {
            GrantOutcome::AlreadyHeld
        })
    }

    async fn user_totals(
        &self,
        scope: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<UserTotal>> {
        let totals = sqlx::query_as::<_, UserTotal>(
            r#"
            SELECT
                c.user_id,
                u.nickname,
                u.streak_days,
                SUM(c.duration_minutes)::BIGINT AS total_minutes,
                COUNT(*) AS entry_count
            FROM checkins c
            JOIN users u ON u.user_id = c.user_id
            WHERE NOT c.is_loan
              AND ($1::TEXT IS NULL OR c.scope = $1)
              AND ($2::TIMESTAMPTZ IS NULL OR c.created_at >= $2)
            GROUP BY c.user_id, u.nickname, u.streak_days
            "#,
        )
        .bind(scope)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(totals)
    }

    async fn window_totals(&self, since: Option<DateTime<Utc>>) -> StoreResult<WindowTotals> {
        let totals = sqlx::query_as::<_, WindowTotals>(
            r#"
            SELECT
                COUNT(*) AS entries,
                COALESCE(SUM(duration_minutes), 0)::BIGINT AS minutes,
                COALESCE(SUM(duration_minutes) FILTER (WHERE is_loan), 0)::BIGINT AS loan_minutes,
                COUNT(DISTINCT user_id) AS users
            FROM checkins
            WHERE ($1::TIMESTAMPTZ IS NULL OR created_at >= $1)
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(totals)
    }

    async fn daily_totals(
        &self,
        range: &DateRange,
        offset: FixedOffset,
    ) -> StoreResult<Vec<DailyTotal>> {
        let totals = sqlx::query_as::<_, DailyTotal>(
            r#"
            SELECT
                ((created_at AT TIME ZONE 'UTC') + make_interval(secs => $1))::DATE AS date,
                COUNT(*) AS entries,
                COALESCE(SUM(duration_minutes), 0)::BIGINT AS minutes,
                COUNT(DISTINCT user_id) AS users
            FROM checkins
            WHERE ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
              AND ($3::TIMESTAMPTZ IS NULL OR created_at < $3)
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(offset.local_minus_utc() as f64)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(totals)
    }

    async fn category_totals(
        &self,
        user_id: Option<&str>,
        range: &DateRange,
    ) -> StoreResult<Vec<CategoryTotal>> {
        let totals = sqlx::query_as::<_, CategoryTotal>(
            r#"
            SELECT
                category,
                subcategory,
                COUNT(*) AS entries,
                SUM(duration_minutes)::BIGINT AS minutes
            FROM checkins
            WHERE NOT is_loan
              AND category IS NOT NULL
              AND ($1::TEXT IS NULL OR user_id = $1)
              AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
              AND ($3::TIMESTAMPTZ IS NULL OR created_at < $3)
            GROUP BY category, subcategory
            ORDER BY minutes DESC, category, subcategory NULLS FIRST
            "#,
        )
        .bind(user_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(totals)
    }
}
