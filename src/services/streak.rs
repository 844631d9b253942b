//! Streak Tracker
//!
//! 사용자별 연속 체크인 상태 머신. 날짜는 `Calendar` 의 기준 오프셋을 따른다.
//!
//! ```text
//!                normal check-in (day D)
//! NoHistory ───────────────────────────────▶ Active(1)
//!
//! Active(n), last == D      ──▶ Active(n)      (같은 날, 변화 없음)
//! Active(n), last == D - 1  ──▶ Active(n + 1)
//! Active(n), 그 외          ──▶ Active(1)      (새 구간)
//! ```
//!
//! 가불 체크인은 전이를 일으키지 않는다.
//! 끊긴 스트릭을 0 으로 만드는 것은 하루 마감 sweep 의 몫이다.

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::{User, UserStateUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakPhase {
    NoHistory,
    Active(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreakState {
    pub streak_days: i32,
    pub max_streak: i32,
    pub last_checkin_date: Option<NaiveDate>,
}

/// 전이 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakTransition {
    pub state: StreakState,
    /// 상태가 바뀌었는지
    pub changed: bool,
    /// 1 부터 새로 시작했는지 (첫 체크인 또는 끊긴 뒤 재시작)
    pub new_segment: bool,
}

impl StreakTransition {
    fn unchanged(state: StreakState) -> Self {
        Self {
            state,
            changed: false,
            new_segment: false,
        }
    }
}

impl StreakState {
    pub fn of(user: &User) -> Self {
        Self {
            streak_days: user.streak_days,
            max_streak: user.max_streak,
            last_checkin_date: user.last_checkin_date,
        }
    }

    pub fn phase(&self) -> StreakPhase {
        match self.last_checkin_date {
            None => StreakPhase::NoHistory,
            Some(_) => StreakPhase::Active(self.streak_days),
        }
    }

    /// 일반 체크인 (day) 에 의한 전이
    pub fn on_normal_checkin(&self, day: NaiveDate) -> StreakTransition {
        let (streak_days, new_segment) = match self.last_checkin_date {
            None => (1, true),
            Some(last) if last == day => return StreakTransition::unchanged(*self),
            // 과거 날짜로 들어온 체크인은 현재 스트릭을 건드리지 않음
            Some(last) if day < last => return StreakTransition::unchanged(*self),
            Some(last) if last.succ_opt() == Some(day) => (self.streak_days + 1, self.streak_days == 0),
            Some(_) => (1, true),
        };

        StreakTransition {
            state: StreakState {
                streak_days,
                max_streak: self.max_streak.max(streak_days),
                last_checkin_date: Some(day),
            },
            changed: true,
            new_segment,
        }
    }

    /// 가불 체크인: 전이 없음
    pub fn on_loan_checkin(&self) -> StreakTransition {
        StreakTransition::unchanged(*self)
    }

    /// `today` 기준 어제 마지막으로 체크인했고 아직 오늘은 안 한 상태
    pub fn is_at_risk(&self, today: NaiveDate) -> bool {
        self.streak_days > 0
            && self
                .last_checkin_date
                .and_then(|last| last.succ_opt())
                .map_or(false, |next| next == today)
    }

    /// `day` 에 체크인하지 않아 끊긴 상태 (sweep 대상)
    pub fn is_broken_on(&self, day: NaiveDate) -> bool {
        self.streak_days > 0 && self.last_checkin_date.map_or(true, |last| last < day)
    }

    /// sweep 결과: streak_days 만 0, 최대값과 마지막 날짜는 유지
    pub fn reset(&self) -> Self {
        Self {
            streak_days: 0,
            ..*self
        }
    }

    pub fn to_update(&self, user_id: &str, expected_version: i64) -> UserStateUpdate {
        UserStateUpdate {
            user_id: user_id.to_string(),
            expected_version,
            streak_days: self.streak_days,
            max_streak: self.max_streak,
            last_checkin_date: self.last_checkin_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    const EMPTY: StreakState = StreakState {
        streak_days: 0,
        max_streak: 0,
        last_checkin_date: None,
    };

    #[test]
    fn test_first_checkin_starts_streak() {
        assert_eq!(EMPTY.phase(), StreakPhase::NoHistory);
        let t = EMPTY.on_normal_checkin(day(4));
        assert_eq!(t.state.streak_days, 1);
        assert_eq!(t.state.max_streak, 1);
        assert_eq!(t.state.last_checkin_date, Some(day(4)));
        assert!(t.changed && t.new_segment);
        assert_eq!(t.state.phase(), StreakPhase::Active(1));
    }

    #[test]
    fn test_same_day_is_idempotent() {
        let s = EMPTY.on_normal_checkin(day(4)).state;
        let again = s.on_normal_checkin(day(4));
        assert!(!again.changed);
        assert_eq!(again.state, s);
    }

    #[test]
    fn test_consecutive_day_extends() {
        let mut s = EMPTY;
        for d in 1..=7 {
            s = s.on_normal_checkin(day(d)).state;
        }
        assert_eq!(s.streak_days, 7);
        assert_eq!(s.max_streak, 7);
    }

    #[test]
    fn test_gap_resets_but_max_survives() {
        let s = StreakState {
            streak_days: 5,
            max_streak: 5,
            last_checkin_date: Some(day(5)),
        };
        let t = s.on_normal_checkin(day(7));
        assert_eq!(t.state.streak_days, 1);
        assert_eq!(t.state.max_streak, 5);
        assert!(t.new_segment);
    }

    #[test]
    fn test_backdated_checkin_leaves_state() {
        let s = StreakState {
            streak_days: 3,
            max_streak: 3,
            last_checkin_date: Some(day(10)),
        };
        let t = s.on_normal_checkin(day(8));
        assert!(!t.changed);
        assert_eq!(t.state, s);
    }

    #[test]
    fn test_loan_never_transitions() {
        let s = StreakState {
            streak_days: 2,
            max_streak: 4,
            last_checkin_date: Some(day(1)),
        };
        assert_eq!(s.on_loan_checkin().state, s);
        assert!(!s.on_loan_checkin().changed);
    }

    #[test]
    fn test_restart_after_sweep_counts_as_new_segment() {
        // sweep 으로 0 이 된 뒤 어제 날짜가 남아 있어도 1 부터 다시 시작
        let swept = StreakState {
            streak_days: 0,
            max_streak: 9,
            last_checkin_date: Some(day(3)),
        };
        let t = swept.on_normal_checkin(day(4));
        assert_eq!(t.state.streak_days, 1);
        assert!(t.new_segment);
        assert_eq!(t.state.max_streak, 9);
    }

    #[test]
    fn test_risk_and_break_detection() {
        let s = StreakState {
            streak_days: 4,
            max_streak: 4,
            last_checkin_date: Some(day(9)),
        };
        assert!(s.is_at_risk(day(10)));
        assert!(!s.is_at_risk(day(9)));
        assert!(!s.is_at_risk(day(11)));

        assert!(!s.is_broken_on(day(9)));
        assert!(s.is_broken_on(day(10)));
        assert_eq!(s.reset().streak_days, 0);
        assert_eq!(s.reset().max_streak, 4);
        assert!(!s.reset().is_broken_on(day(10)));
    }
}
