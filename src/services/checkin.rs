//! Check-in Service
//!
//! 모든 체크인/조회 연산의 진입점.
//!
//! ```text
//! submit_checkin
//!   validate ──▶ lock(user) ──▶ read (user, totals, today, grants)
//!                                  │
//!                  debt / streak / achievements / goal 계산
//!                                  │
//!                  commit_checkin (기록 + 사용자 + 업적, 한 번에)
//!                                  │
//!                  버전 충돌이면 read 부터 다시 (최대 retry_limit 회)
//! ```
//!
//! 리더보드와 통계 조회는 락 없이 저장소의 단일 읽기로 처리한다.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::achievements::{
    catalog, not_yet_held, streak_badges_for, AchievementDef, AchievementId, RuleContext, RuleSet,
};
use super::calendar::Calendar;
use super::debt::{compute_debt, DebtChange};
use super::goal::GoalProgress;
use super::leaderboard::{clamp_limit, rank, Leaderboard, LeaderboardWindow};
use super::streak::StreakState;
use super::user_lock::UserLocks;
use crate::config::Config;
use crate::db::{
    AchievementGrant, CategoryTotal, CheckinCommit, CheckinEntry, CheckinStore, DailyTotal,
    DateRange, EntryFilter, GrantOutcome, NewCheckinEntry, User, WindowTotals,
};
use crate::error::{EngineError, StoreError};
use crate::types::{
    format_minutes, Minutes, UserId, MAX_DAILY_GOAL_MINUTES, PRIVATE_SCOPE,
};

/// 추세 조회 최대 일수
pub const MAX_TREND_DAYS: u32 = 90;

// ============ Inputs / Outputs ============

/// 구조화된 체크인 요청 (자연어 파싱은 호출자 몫)
#[derive(Debug, Clone)]
pub struct SubmitCheckin {
    pub user_id: String,
    /// 그룹 ID, 없으면 개인 채팅
    pub scope: Option<String>,
    pub duration_minutes: i64,
    pub content: String,
    pub is_loan: bool,
    pub timestamp: DateTime<Utc>,
    pub nickname: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

/// 검증을 통과한 체크인
#[derive(Debug, Clone)]
struct ValidCheckin {
    user_id: UserId,
    scope: String,
    minutes: Minutes,
    content: String,
    is_loan: bool,
    timestamp: DateTime<Utc>,
    nickname: Option<String>,
    category: Option<String>,
    subcategory: Option<String>,
}

impl SubmitCheckin {
    fn validate(self) -> Result<ValidCheckin, EngineError> {
        let user_id = UserId::new(&self.user_id).map_err(EngineError::Validation)?;
        let minutes = Minutes::new(self.duration_minutes).map_err(EngineError::Validation)?;

        let content = self.content.trim().to_string();
        if content.is_empty() {
            return Err(EngineError::validation("content must not be empty"));
        }

        let category = non_blank(self.category);
        let subcategory = non_blank(self.subcategory);
        if category.is_none() && subcategory.is_some() {
            return Err(EngineError::validation("subcategory requires a category"));
        }

        Ok(ValidCheckin {
            user_id,
            scope: non_blank(self.scope).unwrap_or_else(|| PRIVATE_SCOPE.to_string()),
            minutes,
            content,
            is_loan: self.is_loan,
            timestamp: self.timestamp,
            nickname: non_blank(self.nickname),
            category,
            subcategory,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 체크인 결과
#[derive(Debug, Clone, Serialize)]
pub struct CheckinResult {
    pub entry: CheckinEntry,
    pub debt_before: i64,
    pub debt_after: i64,
    pub repaid_minutes: i64,
    pub streak_days: i32,
    pub max_streak: i32,
    pub is_new_streak_segment: bool,
    pub new_achievements: Vec<AchievementDef>,
    pub goal_progress: Option<GoalProgress>,
    /// 체크인 날짜 기준 오늘의 일반 체크인 합계 (이번 건 포함)
    pub today_normal_minutes: i64,
    pub today_entry_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub user_id: String,
    pub nickname: Option<String>,
    pub total_normal_minutes: i64,
    pub normal_count: i64,
    pub total_loan_minutes: i64,
    pub loan_count: i64,
    pub debt: i64,
    pub streak_days: i32,
    pub max_streak: i32,
    pub last_checkin_date: Option<NaiveDate>,
    pub daily_goal: Option<i32>,
    pub today_normal_minutes: i64,
    pub average_normal_minutes: i64,
    pub category_breakdown: Vec<CategoryTotal>,
    pub recent_entries: Vec<CheckinEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeldAchievement {
    #[serde(flatten)]
    pub def: AchievementDef,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AchievementsView {
    pub held: Vec<HeldAchievement>,
    pub catalog: Vec<AchievementDef>,
    /// 이번 조회에서 보충 부여된 업적
    pub backfilled: Vec<AchievementId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakRisk {
    pub user_id: String,
    pub nickname: Option<String>,
    pub streak_days: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub day: NaiveDate,
    pub examined: usize,
    pub reset: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub total_users: i64,
    pub all_time: WindowTotals,
    pub today: WindowTotals,
    pub this_week: WindowTotals,
    pub this_month: WindowTotals,
}

// ============ Service ============

pub struct CheckinService {
    store: Arc<dyn CheckinStore>,
    calendar: Calendar,
    rules: RuleSet,
    locks: UserLocks,
    retry_limit: u32,
    leaderboard_max: usize,
    recent_entries: usize,
}

impl CheckinService {
    pub fn new(store: Arc<dyn CheckinStore>, config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            calendar: Calendar::new(config.utc_offset()?),
            rules: RuleSet::new(config.early_bird_hours, config.night_owl_hours),
            locks: UserLocks::new(),
            retry_limit: config.commit_retry_limit.max(1),
            leaderboard_max: config.leaderboard_max_limit,
            recent_entries: config.recent_entries,
        })
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub async fn health_check(&self) -> Result<(), EngineError> {
        self.store.health_check().await?;
        Ok(())
    }

    /// 버전 충돌 시 `op` 전체를 다시 실행
    async fn with_retry<T, F, Fut>(&self, user_id: &str, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        for attempt in 1..=self.retry_limit {
            match op().await {
                Err(EngineError::Storage(StoreError::Conflict(_))) => {
                    tracing::warn!(user_id, attempt, "version conflict, retrying");
                }
                other => return other,
            }
        }

        Err(EngineError::ConcurrencyConflict {
            user_id: user_id.to_string(),
            attempts: self.retry_limit,
        })
    }

    // ============ Check-in ============

    /// 체크인 1건 처리
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = %request.user_id, minutes = request.duration_minutes, is_loan = request.is_loan)
    )]
    pub async fn submit_checkin(&self, request: SubmitCheckin) -> Result<CheckinResult, EngineError> {
        let checkin = request.validate()?;
        let user_id = checkin.user_id.as_str();

        let _guard = self.locks.acquire(user_id).await;
        let checkin = &checkin;
        let result = self
            .with_retry(user_id, move || self.try_submit(checkin))
            .await?;

        tracing::info!(
            user_id,
            scope = %checkin.scope,
            duration = %format_minutes(checkin.minutes.get() as i64),
            debt = result.debt_after,
            streak = result.streak_days,
            new_achievements = result.new_achievements.len(),
            "check-in recorded"
        );
        Ok(result)
    }

    /// 읽기 → 계산 → 커밋 (한 번의 시도)
    ///
    /// 커밋 이후에는 저장소를 읽지 않는다. 재시도해도 기록이 중복되지 않음.
    async fn try_submit(&self, checkin: &ValidCheckin) -> Result<CheckinResult, EngineError> {
        let user_id = checkin.user_id.as_str();
        let minutes = checkin.minutes.get();
        let day = self.calendar.day_of(checkin.timestamp);

        let user = self
            .store
            .upsert_user(user_id, checkin.nickname.as_deref())
            .await?;
        let totals = self.store.ledger_totals(user_id).await?;
        let today_before = self
            .store
            .aggregate(
                user_id,
                &EntryFilter::normal().within(self.calendar.day_range(day)),
            )
            .await?;
        let held: HashSet<AchievementId> = self
            .store
            .grants(user_id)
            .await?
            .iter()
            .filter_map(|g| g.achievement_id.parse().ok())
            .collect();

        let debt = DebtChange::apply(&totals, minutes, checkin.is_loan);
        let streak = StreakState::of(&user);
        let transition = if checkin.is_loan {
            streak.on_loan_checkin()
        } else {
            streak.on_normal_checkin(day)
        };

        let ctx = RuleContext {
            streak_days: transition.state.streak_days,
            total_normal_minutes: totals.with_entry(minutes, checkin.is_loan).normal_minutes,
            debt_before: debt.debt_before,
            debt_after: debt.debt_after,
            is_loan_entry: checkin.is_loan,
            local_hour: self.calendar.local_hour(checkin.timestamp),
        };
        let candidates = not_yet_held(self.rules.evaluate(&ctx), &held);

        let commit = CheckinCommit {
            user: transition.state.to_update(user_id, user.version),
            entry: NewCheckinEntry {
                user_id: user_id.to_string(),
                scope: checkin.scope.clone(),
                duration_minutes: minutes,
                content: checkin.content.clone(),
                is_loan: checkin.is_loan,
                category: checkin.category.clone(),
                subcategory: checkin.subcategory.clone(),
                created_at: checkin.timestamp,
            },
            grants: candidates,
        };
        let outcome = self.store.commit_checkin(&commit).await?;

        let (today_minutes, today_count, last_entry) = if checkin.is_loan {
            (today_before.total_minutes, today_before.count, 0)
        } else {
            (
                today_before.total_minutes + minutes as i64,
                today_before.count + 1,
                minutes as i64,
            )
        };

        Ok(CheckinResult {
            entry: outcome.entry,
            debt_before: debt.debt_before,
            debt_after: debt.debt_after,
            repaid_minutes: debt.repaid_minutes,
            streak_days: transition.state.streak_days,
            max_streak: transition.state.max_streak,
            is_new_streak_segment: transition.new_segment,
            new_achievements: outcome.granted.iter().map(|id| id.definition()).collect(),
            goal_progress: GoalProgress::compute(user.daily_goal, today_minutes, last_entry),
            today_normal_minutes: today_minutes,
            today_entry_count: today_count,
        })
    }

    /// 방금 분류된 라벨을 기록에 붙임
    pub async fn classify_entry(
        &self,
        entry_id: Uuid,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<CheckinEntry, EngineError> {
        let category = category.trim();
        if category.is_empty() {
            return Err(EngineError::validation("category must not be empty"));
        }
        let subcategory = subcategory.map(str::trim).filter(|s| !s.is_empty());

        self.store
            .classify_entry(entry_id, category, subcategory)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("check-in {}", entry_id)))
    }

    /// 해당 날짜의 가장 최근 기록 1건 삭제
    ///
    /// 부채는 다음 계산 때 자연히 반영되고, 스트릭은 되돌리지 않는다.
    pub async fn undo_last_entry(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<CheckinEntry, EngineError> {
        let user_id = UserId::new(user_id).map_err(EngineError::Validation)?;
        let _guard = self.locks.acquire(user_id.as_str()).await;

        let removed = self
            .store
            .delete_most_recent(user_id.as_str(), &self.calendar.day_range(day))
            .await?
            .ok_or_else(|| {
                EngineError::not_found(format!("check-in for {} on {}", user_id, day))
            })?;

        tracing::info!(
            user_id = %user_id,
            entry_id = %removed.id,
            minutes = removed.duration_minutes,
            "check-in undone"
        );
        Ok(removed)
    }

    // ============ Users & Goals ============

    pub async fn register_user(
        &self,
        user_id: &str,
        nickname: Option<&str>,
    ) -> Result<User, EngineError> {
        let user_id = UserId::new(user_id).map_err(EngineError::Validation)?;
        let nickname = nickname.map(str::trim).filter(|n| !n.is_empty());
        Ok(self.store.upsert_user(user_id.as_str(), nickname).await?)
    }

    /// 일일 목표 설정 (None 이면 해제)
    pub async fn set_daily_goal(
        &self,
        user_id: &str,
        minutes: Option<i32>,
    ) -> Result<User, EngineError> {
        let user_id = UserId::new(user_id).map_err(EngineError::Validation)?;
        if let Some(goal) = minutes {
            if !(1..=MAX_DAILY_GOAL_MINUTES).contains(&goal) {
                return Err(EngineError::validation(format!(
                    "daily goal must be between 1 and {} minutes, got {}",
                    MAX_DAILY_GOAL_MINUTES, goal
                )));
            }
        }

        let uid = user_id.as_str();
        let _guard = self.locks.acquire(uid).await;
        let user = self
            .with_retry(uid, move || async move {
                let user = self.store.upsert_user(uid, None).await?;
                Ok::<_, EngineError>(self.store.set_daily_goal(uid, user.version, minutes).await?)
            })
            .await?;

        tracing::info!(user_id = uid, goal = ?minutes, "daily goal updated");
        Ok(user)
    }

    /// 오늘의 목표 진행도 (목표가 없으면 None)
    pub async fn query_goal(
        &self,
        user_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<GoalProgress>, EngineError> {
        let user = self.require_user(user_id).await?;
        let today = self
            .store
            .aggregate(
                &user.user_id,
                &EntryFilter::normal().within(self.calendar.day_range(self.calendar.day_of(as_of))),
            )
            .await?;

        Ok(GoalProgress::compute(user.daily_goal, today.total_minutes, 0))
    }

    async fn require_user(&self, user_id: &str) -> Result<User, EngineError> {
        let user_id = UserId::new(user_id).map_err(EngineError::Validation)?;
        self.store
            .find_user(user_id.as_str())
            .await?
            .ok_or_else(|| EngineError::not_found(format!("user {}", user_id)))
    }

    pub async fn query_user_stats(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserStats, EngineError> {
        let user = self.require_user(user_id).await?;
        let uid = user.user_id.as_str();

        let totals = self.store.ledger_totals(uid).await?;
        let today = self
            .store
            .aggregate(
                uid,
                &EntryFilter::normal().within(self.calendar.day_range(self.calendar.day_of(now))),
            )
            .await?;
        let recent_entries = self
            .store
            .entries(uid, &EntryFilter::default().limit(self.recent_entries))
            .await?;
        let category_breakdown = self
            .store
            .category_totals(Some(uid), &DateRange::default())
            .await?;

        let average_normal_minutes = if totals.normal_count > 0 {
            totals.normal_minutes / totals.normal_count
        } else {
            0
        };

        Ok(UserStats {
            user_id: user.user_id.clone(),
            nickname: user.nickname.clone(),
            total_normal_minutes: totals.normal_minutes,
            normal_count: totals.normal_count,
            total_loan_minutes: totals.loan_minutes,
            loan_count: totals.loan_count,
            debt: compute_debt(&totals),
            streak_days: user.streak_days,
            max_streak: user.max_streak,
            last_checkin_date: user.last_checkin_date,
            daily_goal: user.daily_goal,
            today_normal_minutes: today.total_minutes,
            average_normal_minutes,
            category_breakdown,
            recent_entries,
        })
    }

    // ============ Leaderboard ============

    pub async fn query_leaderboard(
        &self,
        scope: Option<&str>,
        window: LeaderboardWindow,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Leaderboard, EngineError> {
        let scope = scope.map(str::trim).filter(|s| !s.is_empty());
        let since = window.since(&self.calendar, now);
        let totals = self.store.user_totals(scope, since).await?;

        Ok(rank(totals, window, clamp_limit(limit, self.leaderboard_max)))
    }

    // ============ Achievements ============

    /// 보유 업적 + 카탈로그. 조회 전에 누락된 업적을 보충 부여한다.
    pub async fn query_achievements(&self, user_id: &str) -> Result<AchievementsView, EngineError> {
        let user = self.require_user(user_id).await?;
        let uid = user.user_id.as_str();

        let backfilled = {
            let _guard = self.locks.acquire(uid).await;
            self.backfill(&user).await?
        };

        let held = self
            .store
            .grants(uid)
            .await?
            .into_iter()
            .filter_map(held_achievement)
            .collect();

        Ok(AchievementsView {
            held,
            catalog: catalog(),
            backfilled,
        })
    }

    /// 전체 기록을 시간순으로 재생해 받아야 했던 업적을 부여
    async fn backfill(&self, user: &User) -> Result<Vec<AchievementId>, EngineError> {
        let uid = user.user_id.as_str();
        let mut history = self.store.entries(uid, &EntryFilter::default()).await?;
        history.reverse();

        let mut due: BTreeMap<AchievementId, DateTime<Utc>> =
            self.rules.replay(&history, &self.calendar);
        let now = Utc::now();
        for id in streak_badges_for(user.max_streak) {
            due.entry(id).or_insert(now);
        }

        let mut granted = Vec::new();
        for (id, unlocked_at) in due {
            if self.store.grant(uid, id, unlocked_at).await? == GrantOutcome::Granted {
                granted.push(id);
            }
        }

        if !granted.is_empty() {
            tracing::info!(user_id = uid, count = granted.len(), "achievements backfilled");
        }
        Ok(granted)
    }

    // ============ Reminders & Sweep ============

    /// 어제까지 이어졌고 오늘 아직 체크인하지 않은 사용자
    pub async fn streak_at_risk(&self, now: DateTime<Utc>) -> Result<Vec<StreakRisk>, EngineError> {
        let today = self.calendar.day_of(now);
        let Some(yesterday) = self.calendar.previous_day(today) else {
            return Ok(Vec::new());
        };

        Ok(self
            .store
            .users_last_checked_in_on(yesterday)
            .await?
            .into_iter()
            .filter(|u| StreakState::of(u).is_at_risk(today))
            .map(|u| StreakRisk {
                user_id: u.user_id,
                nickname: u.nickname,
                streak_days: u.streak_days,
            })
            .collect())
    }

    /// `day` 에 체크인하지 않은 사용자의 스트릭을 0 으로
    ///
    /// `day` 는 마감된 날 (`now` 기준 오늘보다 이전). 사용자마다 체크인과 같은 락을 잡고
    /// 다시 읽어 판단한다.
    pub async fn sweep_broken_streaks(
        &self,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, EngineError> {
        let today = self.calendar.day_of(now);
        if day >= today {
            return Err(EngineError::validation(format!(
                "cannot sweep {}: the day has not closed yet (today is {})",
                day, today
            )));
        }

        let candidates = self.store.users_with_stale_streak(day).await?;
        let examined = candidates.len();
        let mut reset = Vec::new();

        for candidate in candidates {
            let uid = candidate.user_id.as_str();
            let _guard = self.locks.acquire(uid).await;

            let was_reset = self
                .with_retry(uid, move || async move {
                    let Some(user) = self.store.find_user(uid).await? else {
                        return Ok(false);
                    };
                    let state = StreakState::of(&user);
                    if !state.is_broken_on(day) {
                        return Ok(false);
                    }
                    self.store
                        .update_streak(&state.reset().to_update(uid, user.version))
                        .await?;
                    Ok::<_, EngineError>(true)
                })
                .await?;

            if was_reset {
                reset.push(candidate.user_id.clone());
            }
        }

        tracing::info!(%day, examined, reset = reset.len(), "streak sweep finished");
        Ok(SweepReport {
            day,
            examined,
            reset,
        })
    }

    // ============ Reporting ============

    pub async fn overview(&self, now: DateTime<Utc>) -> Result<Overview, EngineError> {
        Ok(Overview {
            total_users: self.store.count_users().await?,
            all_time: self.store.window_totals(None).await?,
            today: self
                .store
                .window_totals(Some(self.calendar.today_start(now)))
                .await?,
            this_week: self
                .store
                .window_totals(Some(self.calendar.week_start(now)))
                .await?,
            this_month: self
                .store
                .window_totals(Some(self.calendar.month_start(now)))
                .await?,
        })
    }

    /// 최근 `days` 일의 일별 합계 (오래된 날부터, 기록 없는 날은 0)
    pub async fn daily_trend(
        &self,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<DailyTotal>, EngineError> {
        if !(1..=MAX_TREND_DAYS).contains(&days) {
            return Err(EngineError::validation(format!(
                "days must be between 1 and {}, got {}",
                MAX_TREND_DAYS, days
            )));
        }

        let today = self.calendar.day_of(now);
        let first = today
            .checked_sub_days(Days::new(days as u64 - 1))
            .unwrap_or(today);
        let range = DateRange {
            start: Some(self.calendar.start_of_day(first)),
            end: self.calendar.day_range(today).end,
        };

        let mut found: BTreeMap<NaiveDate, DailyTotal> = self
            .store
            .daily_totals(&range, self.calendar.offset())
            .await?
            .into_iter()
            .map(|d| (d.date, d))
            .collect();

        Ok(first
            .iter_days()
            .take(days as usize)
            .map(|date| {
                found.remove(&date).unwrap_or(DailyTotal {
                    date,
                    entries: 0,
                    minutes: 0,
                    users: 0,
                })
            })
            .collect())
    }

    pub async fn category_breakdown(
        &self,
        user_id: Option<&str>,
        range: DateRange,
    ) -> Result<Vec<CategoryTotal>, EngineError> {
        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start >= end {
                return Err(EngineError::validation("start must be before end"));
            }
        }
        let user_id = user_id.map(str::trim).filter(|u| !u.is_empty());
        Ok(self.store.category_totals(user_id, &range).await?)
    }
}

fn held_achievement(grant: AchievementGrant) -> Option<HeldAchievement> {
    match grant.achievement_id.parse::<AchievementId>() {
        Ok(id) => Some(HeldAchievement {
            def: id.definition(),
            unlocked_at: grant.unlocked_at,
        }),
        Err(e) => {
            tracing::warn!(user_id = %grant.user_id, "skipping stored grant: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use chrono::{FixedOffset, TimeZone};
    use tokio_test::{assert_err, assert_ok};

    fn setup() -> (Arc<MemoryStore>, CheckinService) {
        let store = Arc::new(MemoryStore::new());
        let service = CheckinService::new(store.clone(), &Config::default()).unwrap();
        (store, service)
    }

    /// 2024-03-{day} {hour}:00 (+08)
    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, day, hour, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn checkin(user: &str, minutes: i64, is_loan: bool, timestamp: DateTime<Utc>) -> SubmitCheckin {
        SubmitCheckin {
            user_id: user.to_string(),
            scope: Some("group-1".to_string()),
            duration_minutes: minutes,
            content: "reading".to_string(),
            is_loan,
            timestamp,
            nickname: None,
            category: None,
            subcategory: None,
        }
    }

    fn ids(result: &CheckinResult) -> Vec<AchievementId> {
        result.new_achievements.iter().map(|a| a.id).collect()
    }

    #[tokio::test]
    async fn test_first_checkin_then_same_day() {
        let (_, service) = setup();

        let first = assert_ok!(service.submit_checkin(checkin("u1", 30, false, at(4, 14))).await);
        assert_eq!(first.streak_days, 1);
        assert_eq!(first.debt_after, 0);
        assert!(first.is_new_streak_segment);
        assert_eq!(ids(&first), vec![AchievementId::FirstCheckin]);

        let second = assert_ok!(service.submit_checkin(checkin("u1", 30, false, at(4, 16))).await);
        assert_eq!(second.streak_days, 1);
        assert!(!second.is_new_streak_segment);
        assert_eq!(second.today_normal_minutes, 60);
        assert_eq!(second.today_entry_count, 2);
        assert_eq!(ids(&second), vec![AchievementId::Minutes60]);

        let view = service.query_achievements("u1").await.unwrap();
        let first_count = view
            .held
            .iter()
            .filter(|h| h.def.id == AchievementId::FirstCheckin)
            .count();
        assert_eq!(first_count, 1);
    }

    #[tokio::test]
    async fn test_loan_then_repayment() {
        let (_, service) = setup();

        let loan = service.submit_checkin(checkin("u1", 120, true, at(4, 14))).await.unwrap();
        assert_eq!(loan.debt_after, 120);
        assert!(loan.new_achievements.is_empty());
        assert_eq!(loan.streak_days, 0);

        let partial = service.submit_checkin(checkin("u1", 50, false, at(4, 15))).await.unwrap();
        assert_eq!(partial.debt_before, 120);
        assert_eq!(partial.debt_after, 70);
        assert_eq!(partial.repaid_minutes, 50);
        assert!(!ids(&partial).contains(&AchievementId::DebtFree));

        let full = service.submit_checkin(checkin("u1", 80, false, at(4, 16))).await.unwrap();
        assert_eq!(full.debt_after, 0);
        assert_eq!(full.repaid_minutes, 70);
        assert!(ids(&full).contains(&AchievementId::DebtFree));

        // 부채 0 상태의 다음 체크인은 다시 부여하지 않음
        let more = service.submit_checkin(checkin("u1", 10, false, at(4, 17))).await.unwrap();
        assert!(!ids(&more).contains(&AchievementId::DebtFree));

        let stats = service.query_user_stats("u1", at(4, 18)).await.unwrap();
        assert_eq!(stats.debt, 0);
        assert_eq!(stats.total_loan_minutes, 120);
        assert_eq!(stats.total_normal_minutes, 140);
    }

    #[tokio::test]
    async fn test_seventh_day_hits_streak_and_goal() {
        let (_, service) = setup();
        service.set_daily_goal("u1", Some(60)).await.unwrap();

        for day in 1..=6 {
            service
                .submit_checkin(checkin("u1", 10, false, at(day, 14)))
                .await
                .unwrap();
        }

        let seventh = service.submit_checkin(checkin("u1", 60, false, at(7, 14))).await.unwrap();
        assert_eq!(seventh.streak_days, 7);
        assert_eq!(seventh.max_streak, 7);
        assert!(ids(&seventh).contains(&AchievementId::Streak7));

        let goal = seventh.goal_progress.unwrap();
        assert!(goal.achieved_just_now);
        assert_eq!(goal.percent, 100);

        // 같은 날 추가 체크인은 축하 대상 아님
        let extra = service.submit_checkin(checkin("u1", 5, false, at(7, 15))).await.unwrap();
        assert!(!extra.goal_progress.unwrap().achieved_just_now);

        let standalone = service.query_goal("u1", at(7, 20)).await.unwrap().unwrap();
        assert_eq!(standalone.today_normal_minutes, 65);
        assert!(!standalone.achieved_just_now);
    }

    #[tokio::test]
    async fn test_gap_resets_streak_and_keeps_max() {
        let (_, service) = setup();
        for day in 1..=3 {
            service
                .submit_checkin(checkin("u1", 10, false, at(day, 14)))
                .await
                .unwrap();
        }

        let after_gap = service.submit_checkin(checkin("u1", 10, false, at(6, 14))).await.unwrap();
        assert_eq!(after_gap.streak_days, 1);
        assert_eq!(after_gap.max_streak, 3);
        assert!(after_gap.is_new_streak_segment);
    }

    #[tokio::test]
    async fn test_loan_does_not_extend_streak() {
        let (_, service) = setup();
        service.submit_checkin(checkin("u1", 10, false, at(1, 14))).await.unwrap();

        let loan = service.submit_checkin(checkin("u1", 10, true, at(2, 14))).await.unwrap();
        assert_eq!(loan.streak_days, 1);

        let stats = service.query_user_stats("u1", at(2, 15)).await.unwrap();
        assert_eq!(stats.last_checkin_date, Some(date(1)));
    }

    #[tokio::test]
    async fn test_time_of_day_badges() {
        let (_, service) = setup();
        let early = service.submit_checkin(checkin("u1", 10, false, at(4, 6))).await.unwrap();
        assert!(ids(&early).contains(&AchievementId::EarlyBird));

        let late = service.submit_checkin(checkin("u1", 10, false, at(4, 23))).await.unwrap();
        assert!(ids(&late).contains(&AchievementId::NightOwl));

        let loan = service.submit_checkin(checkin("u2", 10, true, at(4, 6))).await.unwrap();
        assert!(loan.new_achievements.is_empty());
    }

    #[tokio::test]
    async fn test_validation_rejects_before_any_write() {
        let (store, service) = setup();

        for bad in [
            checkin("u1", 0, false, at(4, 14)),
            checkin("u1", 10_081, false, at(4, 14)),
            checkin("  ", 30, false, at(4, 14)),
            SubmitCheckin {
                content: "   ".to_string(),
                ..checkin("u1", 30, false, at(4, 14))
            },
        ] {
            let err = assert_err!(service.submit_checkin(bad).await);
            assert!(matches!(err, EngineError::Validation(_)));
        }

        assert_eq!(store.count_users().await.unwrap(), 0);
        assert!(matches!(
            service.set_daily_goal("u1", Some(0)).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_private_scope_and_nickname() {
        let (store, service) = setup();
        let result = service
            .submit_checkin(SubmitCheckin {
                scope: None,
                nickname: Some(" Alice ".to_string()),
                ..checkin("u1", 30, false, at(4, 14))
            })
            .await
            .unwrap();
        assert_eq!(result.entry.scope, PRIVATE_SCOPE);

        let user = store.find_user("u1").await.unwrap().unwrap();
        assert_eq!(user.nickname.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_conflict_is_retried() {
        let (store, service) = setup();
        store.inject_conflicts(2);

        let result = assert_ok!(service.submit_checkin(checkin("u1", 30, false, at(4, 14))).await);
        assert_eq!(result.streak_days, 1);

        let totals = store.ledger_totals("u1").await.unwrap();
        assert_eq!(totals.normal_count, 1);
    }

    #[tokio::test]
    async fn test_conflict_surfaces_after_limit() {
        let (store, service) = setup();
        store.inject_conflicts(3);

        let err = service
            .submit_checkin(checkin("u1", 30, false, at(4, 14)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ConcurrencyConflict { attempts: 3, .. }
        ));

        // 부분 적용 없음
        assert_eq!(store.ledger_totals("u1").await.unwrap().normal_count, 0);
        assert!(store.grants("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_same_user_checkins() {
        let (store, service) = setup();
        let service = Arc::new(service);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .submit_checkin(checkin("u1", 10, false, at(4, 10 + i)))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let user = store.find_user("u1").await.unwrap().unwrap();
        assert_eq!(user.streak_days, 1);
        assert_eq!(store.ledger_totals("u1").await.unwrap().normal_count, 8);

        let first_grants = store
            .grants("u1")
            .await
            .unwrap()
            .into_iter()
            .filter(|g| g.achievement_id == "first_checkin")
            .count();
        assert_eq!(first_grants, 1);
    }

    #[tokio::test]
    async fn test_leaderboard_excludes_loans_and_orders_ties() {
        let (_, service) = setup();
        let now = at(6, 20);

        assert!(matches!(
            service
                .query_leaderboard(None, LeaderboardWindow::AllTime, None, now)
                .await
                .unwrap(),
            Leaderboard::NoData { .. }
        ));

        service.submit_checkin(checkin("bob", 40, false, at(6, 9))).await.unwrap();
        service.submit_checkin(checkin("amy", 40, false, at(6, 10))).await.unwrap();
        service.submit_checkin(checkin("cat", 500, true, at(6, 11))).await.unwrap();
        service.submit_checkin(checkin("dan", 90, false, at(1, 11))).await.unwrap();

        let today = service
            .query_leaderboard(Some("group-1"), LeaderboardWindow::Today, None, now)
            .await
            .unwrap();
        let order: Vec<_> = today.entries().iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(order, vec!["amy", "bob"]);

        let all = service
            .query_leaderboard(None, LeaderboardWindow::AllTime, Some(1), now)
            .await
            .unwrap();
        assert_eq!(all.entries().len(), 1);
        assert_eq!(all.entries()[0].user_id, "dan");

        let other_group = service
            .query_leaderboard(Some("group-2"), LeaderboardWindow::AllTime, None, now)
            .await
            .unwrap();
        assert!(matches!(other_group, Leaderboard::NoData { .. }));
    }

    #[tokio::test]
    async fn test_undo_removes_latest_of_day() {
        let (_, service) = setup();
        service.submit_checkin(checkin("u1", 120, true, at(4, 9))).await.unwrap();
        service.submit_checkin(checkin("u1", 50, false, at(4, 10))).await.unwrap();
        service.submit_checkin(checkin("u1", 20, false, at(5, 10))).await.unwrap();

        let removed = service.undo_last_entry("u1", date(4)).await.unwrap();
        assert_eq!(removed.duration_minutes, 50);

        let stats = service.query_user_stats("u1", at(5, 12)).await.unwrap();
        assert_eq!(stats.debt, 100);
        // 스트릭은 되돌리지 않음
        assert_eq!(stats.streak_days, 2);

        service.undo_last_entry("u1", date(4)).await.unwrap();
        assert!(matches!(
            service.undo_last_entry("u1", date(4)).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_risk_and_sweep() {
        let (store, service) = setup();
        service.submit_checkin(checkin("keeper", 10, false, at(4, 9))).await.unwrap();
        service.submit_checkin(checkin("keeper", 10, false, at(5, 9))).await.unwrap();
        service.submit_checkin(checkin("slacker", 10, false, at(4, 9))).await.unwrap();

        let at_risk = service.streak_at_risk(at(6, 8)).await.unwrap();
        assert_eq!(
            at_risk,
            vec![StreakRisk {
                user_id: "keeper".to_string(),
                nickname: None,
                streak_days: 2,
            }]
        );

        // 3월 5일 마감: slacker 만 끊김
        let report = service.sweep_broken_streaks(date(5), at(6, 0)).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.reset, vec!["slacker".to_string()]);

        let slacker = store.find_user("slacker").await.unwrap().unwrap();
        assert_eq!(slacker.streak_days, 0);
        assert_eq!(slacker.max_streak, 1);
        let keeper = store.find_user("keeper").await.unwrap().unwrap();
        assert_eq!(keeper.streak_days, 2);

        // 두 번째 sweep 은 할 일이 없음
        let again = service.sweep_broken_streaks(date(5), at(6, 0)).await.unwrap();
        assert!(again.reset.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_refuses_open_day() {
        let (store, service) = setup();
        for day in 1..=5 {
            service.submit_checkin(checkin("u1", 30, false, at(day, 9))).await.unwrap();
        }

        // 3월 6일 아침: 오늘과 내일은 아직 마감 전
        assert!(matches!(
            service.sweep_broken_streaks(date(6), at(6, 8)).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            service.sweep_broken_streaks(date(7), at(6, 8)).await,
            Err(EngineError::Validation(_))
        ));
        assert_eq!(store.find_user("u1").await.unwrap().unwrap().streak_days, 5);

        let result = service.submit_checkin(checkin("u1", 30, false, at(6, 20))).await.unwrap();
        assert_eq!(result.streak_days, 6);
    }

    #[tokio::test]
    async fn test_backfill_is_idempotent() {
        let (store, service) = setup();
        store.upsert_user("u1", None).await.unwrap();

        // 업적 없이 기록만 직접 추가 (예전 규칙 시절 데이터)
        for (version, day) in (1..=3).enumerate() {
            store
                .commit_checkin(&CheckinCommit {
                    user: crate::db::UserStateUpdate {
                        user_id: "u1".to_string(),
                        expected_version: version as i64,
                        streak_days: day as i32,
                        max_streak: day as i32,
                        last_checkin_date: Some(date(day)),
                    },
                    entry: NewCheckinEntry {
                        user_id: "u1".to_string(),
                        scope: "group-1".to_string(),
                        duration_minutes: 30,
                        content: "legacy".to_string(),
                        is_loan: false,
                        category: None,
                        subcategory: None,
                        created_at: at(day, 14),
                    },
                    grants: Vec::new(),
                })
                .await
                .unwrap();
        }

        let first = service.query_achievements("u1").await.unwrap();
        assert_eq!(
            first.backfilled,
            vec![
                AchievementId::FirstCheckin,
                AchievementId::Streak3,
                AchievementId::Minutes60,
            ]
        );
        assert_eq!(first.held.len(), 3);
        assert_eq!(first.catalog.len(), AchievementId::ALL.len());

        let streak3 = first
            .held
            .iter()
            .find(|h| h.def.id == AchievementId::Streak3)
            .unwrap();
        assert_eq!(streak3.unlocked_at, at(3, 14));

        let second = service.query_achievements("u1").await.unwrap();
        assert!(second.backfilled.is_empty());
        assert_eq!(second.held.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_user_queries() {
        let (_, service) = setup();
        assert!(matches!(
            service.query_user_stats("ghost", Utc::now()).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            service.query_achievements("ghost").await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            service.classify_entry(Uuid::new_v4(), "study", None).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_classification_and_breakdown() {
        let (_, service) = setup();
        let r = service.submit_checkin(checkin("u1", 45, false, at(4, 14))).await.unwrap();
        service
            .submit_checkin(SubmitCheckin {
                category: Some("study".to_string()),
                subcategory: Some("math".to_string()),
                ..checkin("u1", 15, false, at(4, 15))
            })
            .await
            .unwrap();

        let labelled = service
            .classify_entry(r.entry.id, "study", Some("math"))
            .await
            .unwrap();
        assert_eq!(labelled.category.as_deref(), Some("study"));

        let breakdown = service
            .category_breakdown(Some("u1"), DateRange::default())
            .await
            .unwrap();
        assert_eq!(
            breakdown,
            vec![CategoryTotal {
                category: "study".to_string(),
                subcategory: Some("math".to_string()),
                entries: 2,
                minutes: 60,
            }]
        );

        let stats = service.query_user_stats("u1", at(4, 20)).await.unwrap();
        assert_eq!(stats.average_normal_minutes, 30);
        assert_eq!(stats.recent_entries.len(), 2);
        assert_eq!(stats.recent_entries[0].duration_minutes, 15);
    }

    #[tokio::test]
    async fn test_reporting_windows() {
        let (_, service) = setup();
        service.submit_checkin(checkin("u1", 30, false, at(4, 14))).await.unwrap();
        service.submit_checkin(checkin("u2", 20, true, at(6, 14))).await.unwrap();
        service.submit_checkin(checkin("u1", 10, false, at(6, 15))).await.unwrap();

        let now = at(6, 20);
        let overview = service.overview(now).await.unwrap();
        assert_eq!(overview.total_users, 2);
        assert_eq!(overview.all_time.entries, 3);
        assert_eq!(overview.today.entries, 2);
        assert_eq!(overview.today.users, 2);
        assert_eq!(overview.today.loan_minutes, 20);
        assert_eq!(overview.this_week.minutes, 60);

        let trend = service.daily_trend(3, now).await.unwrap();
        let minutes: Vec<_> = trend.iter().map(|d| (d.date, d.minutes)).collect();
        assert_eq!(minutes, vec![(date(4), 30), (date(5), 0), (date(6), 30)]);

        assert!(matches!(
            service.daily_trend(0, now).await,
            Err(EngineError::Validation(_))
        ));
    }
}
