//! Leaderboard Aggregator
//!
//! 일반(non-loan) 체크인 합계로 순위를 매긴다.
//! 정렬: 총 분 내림차순 → user_id 오름차순. 자르기는 정렬 후.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::calendar::Calendar;
use crate::db::UserTotal;

/// 집계 구간 (시작 시각부터 현재까지)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardWindow {
    Today,
    ThisWeek,
    ThisMonth,
    AllTime,
}

impl LeaderboardWindow {
    /// 구간 시작 (AllTime 은 None)
    pub fn since(&self, calendar: &Calendar, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            LeaderboardWindow::Today => Some(calendar.today_start(now)),
            LeaderboardWindow::ThisWeek => Some(calendar.week_start(now)),
            LeaderboardWindow::ThisMonth => Some(calendar.month_start(now)),
            LeaderboardWindow::AllTime => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardWindow::Today => "today",
            LeaderboardWindow::ThisWeek => "this_week",
            LeaderboardWindow::ThisMonth => "this_month",
            LeaderboardWindow::AllTime => "all_time",
        }
    }
}

impl fmt::Display for LeaderboardWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaderboardWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "today" | "day" => Ok(LeaderboardWindow::Today),
            "week" | "this_week" => Ok(LeaderboardWindow::ThisWeek),
            "month" | "this_month" => Ok(LeaderboardWindow::ThisMonth),
            "all" | "all_time" => Ok(LeaderboardWindow::AllTime),
            other => Err(format!("unknown leaderboard window `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedUser {
    /// 1부터 시작
    pub rank: usize,
    pub user_id: String,
    pub nickname: Option<String>,
    pub total_minutes: i64,
    pub entry_count: i64,
    pub streak_days: i32,
}

/// 순위 결과. 빈 구간은 명시적인 `NoData`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Leaderboard {
    Ranked {
        window: LeaderboardWindow,
        entries: Vec<RankedUser>,
    },
    NoData {
        window: LeaderboardWindow,
    },
}

impl Leaderboard {
    pub fn entries(&self) -> &[RankedUser] {
        match self {
            Leaderboard::Ranked { entries, .. } => entries,
            Leaderboard::NoData { .. } => &[],
        }
    }
}

/// 요청 limit 를 1..=max 로 보정 (없으면 max)
pub fn clamp_limit(requested: Option<usize>, max: usize) -> usize {
    let max = max.max(1);
    requested.unwrap_or(max).clamp(1, max)
}

/// 합계 목록 → 순위표
pub fn rank(mut totals: Vec<UserTotal>, window: LeaderboardWindow, limit: usize) -> Leaderboard {
    totals.retain(|t| t.entry_count > 0);
    if totals.is_empty() {
        return Leaderboard::NoData { window };
    }

    totals.sort_by(|a, b| {
        b.total_minutes
            .cmp(&a.total_minutes)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    let entries = totals
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, t)| RankedUser {
            rank: i + 1,
            user_id: t.user_id,
            nickname: t.nickname,
            total_minutes: t.total_minutes,
            entry_count: t.entry_count,
            streak_days: t.streak_days,
        })
        .collect();

    Leaderboard::Ranked { window, entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn total(user_id: &str, minutes: i64) -> UserTotal {
        UserTotal {
            user_id: user_id.to_string(),
            nickname: None,
            streak_days: 0,
            total_minutes: minutes,
            entry_count: 1,
        }
    }

    #[test]
    fn test_empty_is_no_data() {
        let board = rank(Vec::new(), LeaderboardWindow::AllTime, 10);
        assert_eq!(
            board,
            Leaderboard::NoData {
                window: LeaderboardWindow::AllTime
            }
        );
        assert!(board.entries().is_empty());
    }

    #[test]
    fn test_ties_break_on_user_id() {
        let board = rank(
            vec![total("c", 50), total("b", 90), total("a", 50)],
            LeaderboardWindow::Today,
            10,
        );
        let order: Vec<_> = board.entries().iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(board.entries()[2].rank, 3);
    }

    #[test]
    fn test_truncates_after_sorting() {
        let board = rank(
            vec![total("low", 1), total("mid", 5), total("top", 9)],
            LeaderboardWindow::ThisWeek,
            2,
        );
        let order: Vec<_> = board.entries().iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(order, vec!["top", "mid"]);
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 10), 10);
        assert_eq!(clamp_limit(Some(0), 10), 1);
        assert_eq!(clamp_limit(Some(3), 10), 3);
        assert_eq!(clamp_limit(Some(500), 10), 10);
    }

    #[test]
    fn test_window_parsing_and_bounds() {
        assert_eq!("week".parse::<LeaderboardWindow>().unwrap(), LeaderboardWindow::ThisWeek);
        assert_eq!("ALL".parse::<LeaderboardWindow>().unwrap(), LeaderboardWindow::AllTime);
        assert!("year".parse::<LeaderboardWindow>().is_err());

        let cal = Calendar::new(FixedOffset::east_opt(0).unwrap());
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap();
        assert_eq!(LeaderboardWindow::AllTime.since(&cal, now), None);
        assert_eq!(
            LeaderboardWindow::ThisWeek.since(&cal, now),
            Some(Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap())
        );
        assert_eq!(
            LeaderboardWindow::ThisMonth.since(&cal, now),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(Leaderboard::NoData {
            window: LeaderboardWindow::Today,
        })
        .unwrap();
        assert_eq!(json["status"], "no_data");
        assert_eq!(json["window"], "today");
    }
}
