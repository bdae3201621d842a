//! 数据缓冲 (Buffer).
//!
//! 在通道与解码器之间流动的一段数据, 携带时间戳与标志位.

use bitflags::bitflags;
use bytes::Bytes;
use tao_core::ClockTime;

bitflags! {
    /// 缓冲标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// 非关键帧, 不能独立解码
        const DELTA_UNIT = 1 << 0;
        /// 码流头 (参数集等)
        const HEADER     = 1 << 1;
        /// 时间戳不连续
        const DISCONT    = 1 << 2;
        /// 空洞, 不含有效数据
        const GAP        = 1 << 3;
    }
}

/// 数据缓冲
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    /// 负载数据
    pub data: Bytes,
    /// 显示时间戳
    pub pts: Option<ClockTime>,
    /// 解码时间戳
    pub dts: Option<ClockTime>,
    /// 时长
    pub duration: Option<ClockTime>,
    /// 标志位
    pub flags: BufferFlags,
}

impl Buffer {
    /// 创建空缓冲
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            pts: None,
            dts: None,
            duration: None,
            flags: BufferFlags::empty(),
        }
    }

    /// 从数据创建缓冲
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    pub fn with_pts(mut self, pts: ClockTime) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_duration(mut self, duration: ClockTime) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_flags(mut self, flags: BufferFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// 能否作为解码起点: 非 delta 帧或码流头
    pub fn is_sync_point(&self) -> bool {
        !self.flags.contains(BufferFlags::DELTA_UNIT) || self.flags.contains(BufferFlags::HEADER)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
