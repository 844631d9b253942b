//! Goal Progress Calculator

use serde::Serialize;

/// 오늘의 일반 체크인 합계 vs 일일 목표
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GoalProgress {
    pub today_normal_minutes: i64,
    pub goal: i32,
    /// 0..=100
    pub percent: u8,
    pub achieved: bool,
    /// 이번 체크인으로 처음 목표에 도달했는지 (축하 메시지는 하루 한 번)
    pub achieved_just_now: bool,
    pub remaining_minutes: i64,
}

impl GoalProgress {
    /// 목표가 없으면 None
    ///
    /// `last_entry_minutes` 는 방금 반영된 체크인의 분 (단순 조회면 0).
    pub fn compute(goal: Option<i32>, today_normal_minutes: i64, last_entry_minutes: i64) -> Option<Self> {
        let goal = goal.filter(|g| *g > 0)?;
        let target = goal as i64;

        let percent = (today_normal_minutes.max(0) * 100 / target).min(100) as u8;
        let achieved = today_normal_minutes >= target;
        let achieved_just_now = achieved && today_normal_minutes - last_entry_minutes < target;

        Some(Self {
            today_normal_minutes,
            goal,
            percent,
            achieved,
            achieved_just_now,
            remaining_minutes: (target - today_normal_minutes).max(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_goal_no_progress() {
        assert!(GoalProgress::compute(None, 120, 30).is_none());
    }

    #[test]
    fn test_crossing_fires_once() {
        // 0 → 60, 목표 60
        let hit = GoalProgress::compute(Some(60), 60, 60).unwrap();
        assert!(hit.achieved && hit.achieved_just_now);
        assert_eq!(hit.percent, 100);
        assert_eq!(hit.remaining_minutes, 0);

        // 60 → 90: 이미 달성된 날
        let after = GoalProgress::compute(Some(60), 90, 30).unwrap();
        assert!(after.achieved);
        assert!(!after.achieved_just_now);
        assert_eq!(after.percent, 100);
    }

    #[test]
    fn test_partial_progress() {
        let p = GoalProgress::compute(Some(90), 30, 30).unwrap();
        assert_eq!(p.percent, 33);
        assert!(!p.achieved);
        assert!(!p.achieved_just_now);
        assert_eq!(p.remaining_minutes, 60);
    }

    #[test]
    fn test_standalone_query_never_just_now() {
        let p = GoalProgress::compute(Some(60), 75, 0).unwrap();
        assert!(p.achieved);
        assert!(!p.achieved_just_now);
    }
}
