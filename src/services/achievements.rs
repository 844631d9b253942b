//! Achievement Engine
//!
//! 규칙 = (업적 ID, 순수 predicate) 의 고정 목록.
//! 모든 규칙은 같은 읽기 전용 `RuleContext` 를 보고 판단하며,
//! 실제 부여는 저장소의 insert-if-absent 로 한 번만 일어난다.
//!
//! ```text
//! RuleContext ──▶ [first_checkin, streak_3, ..., night_owl] ──▶ 후보 ID
//!                                                             │
//!                          이미 보유한 업적 제외 ◀─────────────┘
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::calendar::Calendar;
use super::debt::DebtChange;
use super::streak::StreakState;
use crate::config::HourWindow;
use crate::db::{CheckinEntry, LedgerTotals};

/// 업적 ID (고정 카탈로그)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AchievementId {
    #[serde(rename = "first_checkin")]
    FirstCheckin,
    #[serde(rename = "streak_3")]
    Streak3,
    #[serde(rename = "streak_7")]
    Streak7,
    #[serde(rename = "streak_30")]
    Streak30,
    #[serde(rename = "minutes_60")]
    Minutes60,
    #[serde(rename = "minutes_600")]
    Minutes600,
    #[serde(rename = "minutes_6000")]
    Minutes6000,
    #[serde(rename = "debt_free")]
    DebtFree,
    #[serde(rename = "early_bird")]
    EarlyBird,
    #[serde(rename = "night_owl")]
    NightOwl,
}

impl AchievementId {
    pub const ALL: [AchievementId; 10] = [
        AchievementId::FirstCheckin,
        AchievementId::Streak3,
        AchievementId::Streak7,
        AchievementId::Streak30,
        AchievementId::Minutes60,
        AchievementId::Minutes600,
        AchievementId::Minutes6000,
        AchievementId::DebtFree,
        AchievementId::EarlyBird,
        AchievementId::NightOwl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementId::FirstCheckin => "first_checkin",
            AchievementId::Streak3 => "streak_3",
            AchievementId::Streak7 => "streak_7",
            AchievementId::Streak30 => "streak_30",
            AchievementId::Minutes60 => "minutes_60",
            AchievementId::Minutes600 => "minutes_600",
            AchievementId::Minutes6000 => "minutes_6000",
            AchievementId::DebtFree => "debt_free",
            AchievementId::EarlyBird => "early_bird",
            AchievementId::NightOwl => "night_owl",
        }
    }

    pub fn definition(&self) -> AchievementDef {
        let (name, description) = match self {
            AchievementId::FirstCheckin => ("First Step", "Complete your first check-in"),
            AchievementId::Streak3 => ("Warming Up", "Check in 3 days in a row"),
            AchievementId::Streak7 => ("One Week Strong", "Check in 7 days in a row"),
            AchievementId::Streak30 => ("Unstoppable", "Check in 30 days in a row"),
            AchievementId::Minutes60 => ("First Hour", "Log 60 minutes in total"),
            AchievementId::Minutes600 => ("Ten Hours In", "Log 600 minutes in total"),
            AchievementId::Minutes6000 => ("Hundred Hours", "Log 6000 minutes in total"),
            AchievementId::DebtFree => ("Debt Free", "Pay back all borrowed minutes"),
            AchievementId::EarlyBird => ("Early Bird", "Check in during the early morning"),
            AchievementId::NightOwl => ("Night Owl", "Check in late at night"),
        };
        AchievementDef {
            id: *self,
            name,
            description,
        }
    }
}

impl fmt::Display for AchievementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AchievementId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown achievement `{}`", s))
    }
}

/// 카탈로그 항목
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AchievementDef {
    pub id: AchievementId,
    pub name: &'static str,
    pub description: &'static str,
}

pub fn catalog() -> Vec<AchievementDef> {
    AchievementId::ALL.iter().map(|id| id.definition()).collect()
}

/// 규칙 평가 입력 (체크인 반영 후 상태)
#[derive(Debug, Clone, Copy)]
pub struct RuleContext {
    pub streak_days: i32,
    pub total_normal_minutes: i64,
    pub debt_before: i64,
    pub debt_after: i64,
    pub is_loan_entry: bool,
    /// 기준 오프셋의 시 (0..24)
    pub local_hour: u32,
}

type Predicate = fn(&RuleContext, &RuleSet) -> bool;

fn first_checkin(_: &RuleContext, _: &RuleSet) -> bool {
    true
}

fn streak_3(ctx: &RuleContext, _: &RuleSet) -> bool {
    ctx.streak_days >= 3
}

fn streak_7(ctx: &RuleContext, _: &RuleSet) -> bool {
    ctx.streak_days >= 7
}

fn streak_30(ctx: &RuleContext, _: &RuleSet) -> bool {
    ctx.streak_days >= 30
}

fn minutes_60(ctx: &RuleContext, _: &RuleSet) -> bool {
    ctx.total_normal_minutes >= 60
}

fn minutes_600(ctx: &RuleContext, _: &RuleSet) -> bool {
    ctx.total_normal_minutes >= 600
}

fn minutes_6000(ctx: &RuleContext, _: &RuleSet) -> bool {
    ctx.total_normal_minutes >= 6000
}

fn debt_free(ctx: &RuleContext, _: &RuleSet) -> bool {
    ctx.debt_before > 0 && ctx.debt_after == 0
}

fn early_bird(ctx: &RuleContext, rules: &RuleSet) -> bool {
    rules.early_bird.contains(ctx.local_hour)
}

fn night_owl(ctx: &RuleContext, rules: &RuleSet) -> bool {
    rules.night_owl.contains(ctx.local_hour)
}

/// 평가 순서 = 응답에 나열되는 순서
const RULES: [(AchievementId, Predicate); 10] = [
    (AchievementId::FirstCheckin, first_checkin),
    (AchievementId::Streak3, streak_3),
    (AchievementId::Streak7, streak_7),
    (AchievementId::Streak30, streak_30),
    (AchievementId::Minutes60, minutes_60),
    (AchievementId::Minutes600, minutes_600),
    (AchievementId::Minutes6000, minutes_6000),
    (AchievementId::DebtFree, debt_free),
    (AchievementId::EarlyBird, early_bird),
    (AchievementId::NightOwl, night_owl),
];

/// 설정에 따라 달라지는 규칙 파라미터
#[derive(Debug, Clone, Copy)]
pub struct RuleSet {
    pub early_bird: HourWindow,
    pub night_owl: HourWindow,
}

impl RuleSet {
    pub fn new(early_bird: HourWindow, night_owl: HourWindow) -> Self {
        Self {
            early_bird,
            night_owl,
        }
    }

    /// 조건을 만족하는 모든 업적 (보유 여부와 무관)
    ///
    /// 가불 체크인은 어떤 규칙도 만족시키지 않는다.
    pub fn evaluate(&self, ctx: &RuleContext) -> Vec<AchievementId> {
        if ctx.is_loan_entry {
            return Vec::new();
        }
        RULES
            .iter()
            .filter(|(_, predicate)| predicate(ctx, self))
            .map(|(id, _)| *id)
            .collect()
    }

    /// 기록 전체를 시간순으로 재생해 각 업적을 처음 만족한 시각을 구함
    ///
    /// `entries` 는 오래된 순. 백필(backfill) 에 사용.
    pub fn replay(
        &self,
        entries: &[CheckinEntry],
        calendar: &Calendar,
    ) -> BTreeMap<AchievementId, DateTime<Utc>> {
        let mut first_met = BTreeMap::new();
        let mut totals = LedgerTotals::default();
        let mut streak = StreakState {
            streak_days: 0,
            max_streak: 0,
            last_checkin_date: None,
        };

        for entry in entries {
            let debt = DebtChange::apply(&totals, entry.duration_minutes, entry.is_loan);
            totals = totals.with_entry(entry.duration_minutes, entry.is_loan);
            if !entry.is_loan {
                streak = streak
                    .on_normal_checkin(calendar.day_of(entry.created_at))
                    .state;
            }

            let ctx = RuleContext {
                streak_days: streak.streak_days,
                total_normal_minutes: totals.normal_minutes,
                debt_before: debt.debt_before,
                debt_after: debt.debt_after,
                is_loan_entry: entry.is_loan,
                local_hour: calendar.local_hour(entry.created_at),
            };
            for id in self.evaluate(&ctx) {
                first_met.entry(id).or_insert(entry.created_at);
            }
        }

        first_met
    }
}

/// 저장된 최대 스트릭 기준으로 받을 수 있는 스트릭 업적
///
/// 기록이 취소되어 재생 결과가 짧아져도 이미 도달했던 스트릭은 인정한다.
pub fn streak_badges_for(max_streak: i32) -> Vec<AchievementId> {
    [
        (3, AchievementId::Streak3),
        (7, AchievementId::Streak7),
        (30, AchievementId::Streak30),
    ]
    .into_iter()
    .filter(|(threshold, _)| max_streak >= *threshold)
    .map(|(_, id)| id)
    .collect()
}

/// 후보 중 아직 보유하지 않은 것
pub fn not_yet_held(
    candidates: Vec<AchievementId>,
    held: &HashSet<AchievementId>,
) -> Vec<AchievementId> {
    candidates
        .into_iter()
        .filter(|id| !held.contains(id))
        .collect()
}
