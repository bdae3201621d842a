//! 时钟时间 (纳秒) 类型.
//!
//! 流中的时间戳统一用纳秒表示, 未定义的时间戳用 `Option<ClockTime>` 的 `None` 表示.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// 纳秒精度的时钟时间
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClockTime(u64);

impl ClockTime {
    pub const ZERO: ClockTime = ClockTime(0);
    pub const SECOND: ClockTime = ClockTime(1_000_000_000);
    pub const MSECOND: ClockTime = ClockTime(1_000_000);

    pub const fn from_nseconds(ns: u64) -> Self {
        Self(ns)
    }

    pub const fn from_mseconds(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    pub const fn from_seconds(s: u64) -> Self {
        Self(s.saturating_mul(1_000_000_000))
    }

    pub const fn nseconds(self) -> u64 {
        self.0
    }

    pub const fn mseconds(self) -> u64 {
        self.0 / 1_000_000
    }

    /// 差值, 结果为负时返回 None
    pub fn checked_sub(self, other: ClockTime) -> Option<ClockTime> {
        self.0.checked_sub(other.0).map(ClockTime)
    }
}

impl Add for ClockTime {
    type Output = ClockTime;

    fn add(self, rhs: ClockTime) -> ClockTime {
        ClockTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for ClockTime {
    type Output = ClockTime;

    fn sub(self, rhs: ClockTime) -> ClockTime {
        ClockTime(self.0.saturating_sub(rhs.0))
    }
}

impl From<Duration> for ClockTime {
    fn from(d: Duration) -> Self {
        ClockTime(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / 1_000_000_000;
        let nanos = self.0 % 1_000_000_000;
        write!(
            f,
            "{}:{:02}:{:02}.{:09}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            nanos
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_时钟时间换算() {
        let t = ClockTime::from_mseconds(1500);
        assert_eq!(t.nseconds(), 1_500_000_000);
        assert_eq!(t.mseconds(), 1500);
        assert_eq!(t.to_string(), "0:00:01.500000000");
        assert_eq!(ClockTime::ZERO.checked_sub(t), None);
        assert_eq!(t - ClockTime::SECOND, ClockTime::from_mseconds(500));
    }
}
