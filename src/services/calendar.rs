//! Calendar
//!
//! 고정 UTC 오프셋 기준의 날짜 경계 계산.
//! 스트릭의 "하루", 오늘/이번 주/이번 달 구간이 모두 여기서 나온다.

use chrono::{
    DateTime, Datelike, Days, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc,
};

use crate::db::DateRange;

#[derive(Debug, Clone, Copy)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Calendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// 기준 오프셋에서의 날짜
    pub fn day_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.offset).date_naive()
    }

    /// 기준 오프셋에서의 시 (0..24)
    pub fn local_hour(&self, ts: DateTime<Utc>) -> u32 {
        ts.with_timezone(&self.offset).hour()
    }

    /// 해당 날짜 00:00 (로컬) 의 UTC 시각
    pub fn start_of_day(&self, day: NaiveDate) -> DateTime<Utc> {
        let local_midnight = day.and_time(NaiveTime::MIN);
        (local_midnight - Duration::seconds(self.offset.local_minus_utc() as i64)).and_utc()
    }

    /// [day 00:00, 다음날 00:00)
    pub fn day_range(&self, day: NaiveDate) -> DateRange {
        DateRange {
            start: Some(self.start_of_day(day)),
            end: day
                .checked_add_days(Days::new(1))
                .map(|next| self.start_of_day(next)),
        }
    }

    pub fn today_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of_day(self.day_of(now))
    }

    /// 이번 주 월요일 00:00 (주 시작은 월요일)
    pub fn week_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.day_of(now);
        let back = today.weekday().num_days_from_monday() as u64;
        let monday = today.checked_sub_days(Days::new(back)).unwrap_or(today);
        self.start_of_day(monday)
    }

    /// 이번 달 1일 00:00
    pub fn month_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.day_of(now);
        let first = today.with_day(1).unwrap_or(today);
        self.start_of_day(first)
    }

    pub fn previous_day(&self, day: NaiveDate) -> Option<NaiveDate> {
        day.checked_sub_days(Days::new(1))
    }
}
