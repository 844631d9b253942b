//! Database Models
//!
//! Rows for users, the check-in ledger and achievement grants, plus the
//! aggregate shapes the ledger queries return.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::AchievementId;

/// 사용자 상태
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    /// 외부 계정 식별자 (예: QQ 번호)
    pub user_id: String,

    /// 표시 이름 (그룹 명함 또는 닉네임)
    pub nickname: Option<String>,

    /// 현재 연속 체크인 일수
    pub streak_days: i32,

    /// 역대 최대 연속 일수 (감소하지 않음)
    pub max_streak: i32,

    /// 스트릭을 마지막으로 갱신한 일반 체크인의 날짜 (기준 오프셋)
    pub last_checkin_date: Option<NaiveDate>,

    /// 일일 목표 (분)
    pub daily_goal: Option<i32>,

    /// 낙관적 동시성 제어용 버전
    #[serde(skip)]
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 체크인 기록 (duration / is_loan 은 생성 후 불변)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CheckinEntry {
    pub id: Uuid,
    pub user_id: String,

    /// 그룹 ID 또는 "private"
    pub scope: String,

    pub duration_minutes: i32,
    pub content: String,

    /// 가불(loan) 체크인 여부
    pub is_loan: bool,

    /// 외부 분류기가 붙인 라벨 (엔진은 해석하지 않음)
    pub category: Option<String>,
    pub subcategory: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// 새 체크인 (ID는 저장 시 부여)
#[derive(Debug, Clone)]
pub struct NewCheckinEntry {
    pub user_id: String,
    pub scope: String,
    pub duration_minutes: i32,
    pub content: String,
    pub is_loan: bool,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 업적 획득 기록 (user_id, achievement_id 당 1건)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AchievementGrant {
    pub user_id: String,
    pub achievement_id: String,
    pub unlocked_at: DateTime<Utc>,
}

/// 반개구간 [start, end) 시간 범위, None 은 무한
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts < e)
    }
}

/// 체크인 조회 필터
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub scope: Option<String>,
    pub is_loan: Option<bool>,
    pub range: DateRange,
    pub limit: Option<i64>,
}

impl EntryFilter {
    /// 일반(non-loan) 체크인만
    pub fn normal() -> Self {
        Self {
            is_loan: Some(false),
            ..Default::default()
        }
    }

    pub fn within(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit as i64);
        self
    }

    pub fn matches(&self, entry: &CheckinEntry) -> bool {
        self.scope.as_deref().map_or(true, |s| entry.scope == s)
            && self.is_loan.map_or(true, |l| entry.is_loan == l)
            && self.range.contains(entry.created_at)
    }
}

/// count / sum 집계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize)]
pub struct Aggregate {
    pub count: i64,
    pub total_minutes: i64,
}

/// 사용자 전체 기록의 일반/가불 합계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct LedgerTotals {
    pub normal_minutes: i64,
    pub normal_count: i64,
    pub loan_minutes: i64,
    pub loan_count: i64,
}

impl LedgerTotals {
    /// 새 체크인이 반영된 합계
    pub fn with_entry(self, minutes: i32, is_loan: bool) -> Self {
        let minutes = minutes as i64;
        if is_loan {
            Self {
                loan_minutes: self.loan_minutes + minutes,
                loan_count: self.loan_count + 1,
                ..self
            }
        } else {
            Self {
                normal_minutes: self.normal_minutes + minutes,
                normal_count: self.normal_count + 1,
                ..self
            }
        }
    }
}

/// 사용자별 일반 체크인 합계 (리더보드 입력)
#[derive(Debug, Clone, FromRow)]
pub struct UserTotal {
    pub user_id: String,
    pub nickname: Option<String>,
    pub streak_days: i32,
    pub total_minutes: i64,
    pub entry_count: i64,
}

/// 분류별 합계
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub subcategory: Option<String>,
    pub entries: i64,
    pub minutes: i64,
}

/// 일별 합계 (기준 오프셋의 날짜)
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub entries: i64,
    pub minutes: i64,
    pub users: i64,
}

/// 기간 합계 (전체 그룹)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize)]
pub struct WindowTotals {
    pub entries: i64,
    pub minutes: i64,
    pub loan_minutes: i64,
    pub users: i64,
}

/// 사용자 스트릭 갱신 (expected_version 과 일치할 때만 적용)
#[derive(Debug, Clone)]
pub struct UserStateUpdate {
    pub user_id: String,
    pub expected_version: i64,
    pub streak_days: i32,
    pub max_streak: i32,
    pub last_checkin_date: Option<NaiveDate>,
}

/// 체크인 1건의 원자적 커밋 단위
///
/// 기록 추가 + 사용자 상태 갱신 + 업적 부여가 모두 적용되거나 모두 적용되지 않음
#[derive(Debug, Clone)]
pub struct CheckinCommit {
    pub user: UserStateUpdate,
    pub entry: NewCheckinEntry,
    pub grants: Vec<AchievementId>,
}

/// 커밋 결과
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub entry: CheckinEntry,
    /// 이번 커밋에서 실제로 새로 추가된 업적만
    pub granted: Vec<AchievementId>,
}

/// 단건 업적 부여 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantOutcome {
    Granted,
    AlreadyHeld,
}
