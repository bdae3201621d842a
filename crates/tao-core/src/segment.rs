//! 播放区间 (segment).
//!
//! 描述下游即将收到的数据所处的时间区间与播放速率.

use crate::timestamp::ClockTime;

/// 区间单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFormat {
    /// 未定义 (尚未收到 segment)
    Undefined,
    /// 时间
    Time,
    /// 字节 (解码输出端不接受)
    Bytes,
    /// 采样/帧序号
    Default,
}

/// 播放区间
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub format: SegmentFormat,
    pub rate: f64,
    pub start: Option<ClockTime>,
    pub stop: Option<ClockTime>,
}

impl Segment {
    /// 未定义的区间
    pub fn undefined() -> Self {
        Self {
            format: SegmentFormat::Undefined,
            rate: 1.0,
            start: None,
            stop: None,
        }
    }

    /// 时间区间, 速率 1.0
    pub fn time(start: ClockTime, stop: Option<ClockTime>) -> Self {
        Self {
            format: SegmentFormat::Time,
            rate: 1.0,
            start: Some(start),
            stop,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.format != SegmentFormat::Undefined
    }

    /// 正常速率正向播放
    pub fn is_normal_rate(&self) -> bool {
        (self.rate - 1.0).abs() < f64::EPSILON
    }
}

impl Default for Segment {
    fn default() -> Self {
        Self::undefined()
    }
}
