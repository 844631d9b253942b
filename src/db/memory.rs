//! In-memory `CheckinStore`
//!
//! 테스트와 `DATABASE_URL=memory://` 로컬 실행용.
//! 하나의 `RwLock` 아래에서 커밋 전체를 적용하므로 부분 적용이 없다.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{
    AchievementGrant, Aggregate, CategoryTotal, CheckinCommit, CheckinEntry, CommitOutcome,
    DailyTotal, DateRange, EntryFilter, GrantOutcome, LedgerTotals, User, UserStateUpdate,
    UserTotal, WindowTotals,
};
use super::repository::{CheckinStore, StoreResult};
use crate::error::StoreError;
use crate::services::AchievementId;

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    /// 삽입 순서 유지
    entries: Vec<CheckinEntry>,
    grants: BTreeMap<(String, String), AchievementGrant>,
}

impl Inner {
    /// 필터에 맞는 기록, 최신순 (created_at 같으면 나중에 추가된 것 먼저)
    fn matching<'a>(
        &'a self,
        mut pred: impl FnMut(&CheckinEntry) -> bool,
    ) -> Vec<&'a CheckinEntry> {
        let mut found: Vec<(usize, &CheckinEntry)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| pred(e))
            .collect();
        found.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        found.into_iter().map(|(_, e)| e).collect()
    }

    fn user_mut(&mut self, user_id: &str, expected_version: i64) -> StoreResult<&mut User> {
        match self.users.get_mut(user_id) {
            Some(user) if user.version == expected_version => Ok(user),
            _ => Err(StoreError::Conflict(user_id.to_string())),
        }
    }
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    #[cfg(test)]
    injected_conflicts: std::sync::atomic::AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            #[cfg(test)]
            injected_conflicts: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// 다음 `n` 번의 커밋을 버전 충돌로 거부 (다른 프로세스의 writer 흉내)
    #[cfg(test)]
    pub fn inject_conflicts(&self, n: u32) {
        self.injected_conflicts
            .store(n, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn take_injected_conflict(&self) -> bool {
        use std::sync::atomic::Ordering;
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[cfg(not(test))]
    fn take_injected_conflict(&self) -> bool {
        false
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckinStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(user_id).cloned())
    }

    async fn upsert_user(&self, user_id: &str, nickname: Option<&str>) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let user = inner
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| User {
                user_id: user_id.to_string(),
                nickname: None,
                streak_days: 0,
                max_streak: 0,
                last_checkin_date: None,
                daily_goal: None,
                version: 0,
                created_at: now,
                updated_at: now,
            });
        if let Some(nickname) = nickname {
            user.nickname = Some(nickname.to_string());
        }
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn set_daily_goal(
        &self,
        user_id: &str,
        expected_version: i64,
        goal: Option<i32>,
    ) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        let user = inner.user_mut(user_id, expected_version)?;
        user.daily_goal = goal;
        user.version += 1;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_streak(&self, update: &UserStateUpdate) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        let user = inner.user_mut(&update.user_id, update.expected_version)?;
        user.streak_days = update.streak_days;
        user.max_streak = update.max_streak;
        user.last_checkin_date = update.last_checkin_date;
        user.version += 1;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn count_users(&self) -> StoreResult<i64> {
        let inner = self.inner.read().await;
        Ok(inner.users.len() as i64)
    }

    async fn users_last_checked_in_on(&self, date: NaiveDate) -> StoreResult<Vec<User>> {
        let inner = self.inner.read().await;
        let mut users: Vec<User> = inner
            .users
            .values()
            .filter(|u| u.streak_days > 0 && u.last_checkin_date == Some(date))
            .cloned()
            .collect();
        users.sort_by(|a, b| {
            b.streak_days
                .cmp(&a.streak_days)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(users)
    }

    async fn users_with_stale_streak(&self, day: NaiveDate) -> StoreResult<Vec<User>> {
        let inner = self.inner.read().await;
        let mut users: Vec<User> = inner
            .users
            .values()
            .filter(|u| u.streak_days > 0 && u.last_checkin_date.map_or(true, |d| d < day))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(users)
    }

    async fn commit_checkin(&self, commit: &CheckinCommit) -> StoreResult<CommitOutcome> {
        if self.take_injected_conflict() {
            return Err(StoreError::Conflict(commit.user.user_id.clone()));
        }

        let mut inner = self.inner.write().await;

        let update = &commit.user;
        let user = inner.user_mut(&update.user_id, update.expected_version)?;
        user.streak_days = update.streak_days;
        user.max_streak = update.max_streak;
        user.last_checkin_date = update.last_checkin_date;
        user.version += 1;
        user.updated_at = Utc::now();

        let new = &commit.entry;
        let entry = CheckinEntry {
            id: Uuid::new_v4(),
            user_id: new.user_id.clone(),
            scope: new.scope.clone(),
            duration_minutes: new.duration_minutes,
            content: new.content.clone(),
            is_loan: new.is_loan,
            category: new.category.clone(),
            subcategory: new.subcategory.clone(),
            created_at: new.created_at,
        };
        inner.entries.push(entry.clone());

        let mut granted = Vec::with_capacity(commit.grants.len());
        for achievement in &commit.grants {
            let key = (new.user_id.clone(), achievement.as_str().to_string());
            if !inner.grants.contains_key(&key) {
                inner.grants.insert(
                    key,
                    AchievementGrant {
                        user_id: new.user_id.clone(),
                        achievement_id: achievement.as_str().to_string(),
                        unlocked_at: new.created_at,
                    },
                );
                granted.push(*achievement);
            }
        }

        Ok(CommitOutcome { entry, granted })
    }

    async fn entries(&self, user_id: &str, filter: &EntryFilter) -> StoreResult<Vec<CheckinEntry>> {
        let inner = self.inner.read().await;
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(inner
            .matching(|e| e.user_id == user_id && filter.matches(e))
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn aggregate(&self, user_id: &str, filter: &EntryFilter) -> StoreResult<Aggregate> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.user_id == user_id && filter.matches(e))
            .fold(Aggregate::default(), |acc, e| Aggregate {
                count: acc.count + 1,
                total_minutes: acc.total_minutes + e.duration_minutes as i64,
            }))
    }

    async fn ledger_totals(&self, user_id: &str) -> StoreResult<LedgerTotals> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .fold(LedgerTotals::default(), |acc, e| {
                acc.with_entry(e.duration_minutes, e.is_loan)
            }))
    }

    async fn delete_most_recent(
        &self,
        user_id: &str,
        range: &DateRange,
    ) -> StoreResult<Option<CheckinEntry>> {
        let mut inner = self.inner.write().await;
        let target = inner
            .matching(|e| e.user_id == user_id && range.contains(e.created_at))
            .first()
            .map(|e| e.id);

        Ok(target.and_then(|id| {
            let pos = inner.entries.iter().position(|e| e.id == id)?;
            Some(inner.entries.remove(pos))
        }))
    }

    async fn classify_entry(
        &self,
        entry_id: Uuid,
        category: &str,
        subcategory: Option<&str>,
    ) -> StoreResult<Option<CheckinEntry>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .map(|e| {
                e.category = Some(category.to_string());
                e.subcategory = subcategory.map(str::to_string);
                e.clone()
            }))
    }

    async fn grants(&self, user_id: &str) -> StoreResult<Vec<AchievementGrant>> {
        let inner = self.inner.read().await;
        let mut grants: Vec<AchievementGrant> = inner
            .grants
            .values()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect();
        grants.sort_by(|a, b| {
            a.unlocked_at
                .cmp(&b.unlocked_at)
                .then_with(|| a.achievement_id.cmp(&b.achievement_id))
        });
        Ok(grants)
    }

    async fn grant(
        &self,
        user_id: &str,
        achievement: AchievementId,
        unlocked_at: DateTime<Utc>,
    ) -> StoreResult<GrantOutcome> {
        let mut inner = self.inner.write().await;
        let key = (user_id.to_string(), achievement.as_str().to_string());
        if inner.grants.contains_key(&key) {
            return Ok(GrantOutcome::AlreadyHeld);
        }
        inner.grants.insert(
            key,
            AchievementGrant {
                user_id: user_id.to_string(),
                achievement_id: achievement.as_str().to_string(),
                unlocked_at,
            },
        );
        Ok(GrantOutcome::Granted)
    }

    async fn user_totals(
        &self,
        scope: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<UserTotal>> {
        let inner = self.inner.read().await;
        let mut by_user: HashMap<&str, (i64, i64)> = HashMap::new();
        for e in inner.entries.iter().filter(|e| {
            !e.is_loan
                && scope.map_or(true, |s| e.scope == s)
                && since.map_or(true, |s| e.created_at >= s)
        }) {
            let slot = by_user.entry(e.user_id.as_str()).or_default();
            slot.0 += e.duration_minutes as i64;
            slot.1 += 1;
        }

        Ok(by_user
            .into_iter()
            .map(|(user_id, (total_minutes, entry_count))| {
                let user = inner.users.get(user_id);
                UserTotal {
                    user_id: user_id.to_string(),
                    nickname: user.and_then(|u| u.nickname.clone()),
                    streak_days: user.map_or(0, |u| u.streak_days),
                    total_minutes,
                    entry_count,
                }
            })
            .collect())
    }

    async fn window_totals(&self, since: Option<DateTime<Utc>>) -> StoreResult<WindowTotals> {
        let inner = self.inner.read().await;
        let mut users = std::collections::HashSet::new();
        let mut totals = WindowTotals::default();
        for e in inner
            .entries
            .iter()
            .filter(|e| since.map_or(true, |s| e.created_at >= s))
        {
            totals.entries += 1;
            totals.minutes += e.duration_minutes as i64;
            if e.is_loan {
                totals.loan_minutes += e.duration_minutes as i64;
            }
            users.insert(e.user_id.as_str());
        }
        totals.users = users.len() as i64;
        Ok(totals)
    }

    async fn daily_totals(
        &self,
        range: &DateRange,
        offset: FixedOffset,
    ) -> StoreResult<Vec<DailyTotal>> {
        let inner = self.inner.read().await;
        let mut by_day: BTreeMap<NaiveDate, (i64, i64, std::collections::HashSet<&str>)> =
            BTreeMap::new();
        for e in inner.entries.iter().filter(|e| range.contains(e.created_at)) {
            let day = e.created_at.with_timezone(&offset).date_naive();
            let slot = by_day.entry(day).or_default();
            slot.0 += 1;
            slot.1 += e.duration_minutes as i64;
            slot.2.insert(e.user_id.as_str());
        }

        Ok(by_day
            .into_iter()
            .map(|(date, (entries, minutes, users))| DailyTotal {
                date,
                entries,
                minutes,
                users: users.len() as i64,
            })
            .collect())
    }

    async fn category_totals(
        &self,
        user_id: Option<&str>,
        range: &DateRange,
    ) -> StoreResult<Vec<CategoryTotal>> {
        let inner = self.inner.read().await;
        let mut by_label: BTreeMap<(String, Option<String>), (i64, i64)> = BTreeMap::new();
        for e in inner.entries.iter().filter(|e| {
            !e.is_loan
                && user_id.map_or(true, |u| e.user_id == u)
                && range.contains(e.created_at)
        }) {
            if let Some(category) = &e.category {
                let slot = by_label
                    .entry((category.clone(), e.subcategory.clone()))
                    .or_default();
                slot.0 += 1;
                slot.1 += e.duration_minutes as i64;
            }
        }

        let mut totals: Vec<CategoryTotal> = by_label
            .into_iter()
            .map(|((category, subcategory), (entries, minutes))| CategoryTotal {
                category,
                subcategory,
                entries,
                minutes,
            })
            .collect();
        // BTreeMap 순서(category, subcategory) 위에 분(minutes) 내림차순 안정 정렬
        totals.sort_by(|a, b| b.minutes.cmp(&a.minutes));
        Ok(totals)
    }
}
