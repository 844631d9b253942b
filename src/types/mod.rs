//! Common Types Module
//!
//! 애플리케이션 전반에서 사용되는 공통 타입 정의

use std::fmt;

use serde::{Deserialize, Serialize};

/// 체크인 1건의 최대 시간 (분) - 일주일
pub const MAX_DURATION_MINUTES: i32 = 10_080;

/// 일일 목표 최대값 (분) - 하루
pub const MAX_DAILY_GOAL_MINUTES: i32 = 1_440;

/// 그룹이 아닌 개인 채팅에서 들어온 체크인의 scope
pub const PRIVATE_SCOPE: &str = "private";

/// 외부 계정 식별자 (예: QQ 번호)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: &str) -> Result<Self, String> {
        let id = id.trim();
        if id.is_empty() {
            Err("user id must not be empty".to_string())
        } else if id.len() > 64 {
            Err("user id must be at most 64 characters".to_string())
        } else {
            Ok(Self(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 체크인 시간 (분, 1..=10080)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Minutes(i32);

impl Minutes {
    pub fn new(value: i64) -> Result<Self, String> {
        if value <= 0 {
            Err(format!("duration must be positive, got {}", value))
        } else if value > MAX_DURATION_MINUTES as i64 {
            Err(format!(
                "duration must be at most {} minutes, got {}",
                MAX_DURATION_MINUTES, value
            ))
        } else {
            Ok(Self(value as i32))
        }
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

/// 로그용 시간 표시 (예: 95 → "1h35m")
pub fn format_minutes(total: i64) -> String {
    let hours = total / 60;
    let minutes = total % 60;
    match (hours, minutes) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h{}m", h, m),
    }
}
