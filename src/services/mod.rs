//! Services Module
//!
//! 체크인 회계 & 게임화 엔진
//!
//! # Services
//! - `CheckinService`: 모든 연산의 진입점 (사용자 락 + 원자적 커밋)
//! - `debt`: 가불 부채 계산
//! - `streak`: 연속 체크인 상태 머신
//! - `achievements`: 업적 카탈로그와 규칙
//! - `goal`: 일일 목표 진행도
//! - `leaderboard`: 구간별 순위
//! - `calendar`: 기준 오프셋의 날짜 경계

mod achievements;
mod calendar;
mod checkin;
mod debt;
mod goal;
mod leaderboard;
mod streak;
mod user_lock;

pub use achievements::{catalog, AchievementDef, AchievementId, RuleContext, RuleSet};
pub use calendar::Calendar;
pub use checkin::{
    AchievementsView, CheckinResult, CheckinService, HeldAchievement, Overview, StreakRisk,
    SubmitCheckin, SweepReport, UserStats, MAX_TREND_DAYS,
};
pub use debt::{compute_debt, DebtChange};
pub use goal::GoalProgress;
pub use leaderboard::{Leaderboard, LeaderboardWindow, RankedUser};
pub use streak::{StreakPhase, StreakState, StreakTransition};
pub use user_lock::UserLocks;
